use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use polars::prelude::*;
use regex::Regex;

use crate::config::{find_library, OSU_COLL_LIBS, OSU_TESTS};
use crate::report::{FileOutcome, ParseReport};
use crate::util::ResultRow;

/// Column names of the combined CSV, in order
pub const CSV_FORMAT: [&str; 10] = [
    "Collective Type",
    "Host Count",
    "Ranks Per Host",
    "Collectives Library",
    "Threshold",
    "Message Size",
    "Avg Latency (us)",
    "Min Latency (us)",
    "Max Latency (us)",
    "Iterations",
];

/// One data line of OSU output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub message_size: u64,
    pub avg_latency: f64,
    pub min_latency: f64,
    pub max_latency: f64,
    pub iterations: u64,
}

/// Classification of a single output line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Line {
    Data(Measurement),
    /// Starts like a data line but doesn't hold five numbers
    Malformed,
    /// Headers, blank lines, launcher chatter
    Other,
}

/// Metadata recovered from a result file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub test: String,
    pub host_count: u32,
    pub ranks_per_node: u32,
    pub library: String,
    pub preset: Option<String>,
}

fn as_count(value: f64) -> Option<u64> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Some(value as u64)
    } else {
        None
    }
}

/// Parse a line from the OSU output
///
/// Note: Only lines starting with a digit are considered table data rows
pub fn parse_line(line: &str) -> Line {
    if !line.starts_with(|c: char| c.is_ascii_digit()) {
        return Line::Other;
    }

    let fields: Vec<f64> = match line.split_whitespace().map(str::parse::<f64>).collect() {
        Ok(fields) => fields,
        Err(_) => return Line::Malformed,
    };
    let &[size, avg, min, max, iters] = fields.as_slice() else {
        return Line::Malformed;
    };

    match (as_count(size), as_count(iters)) {
        (Some(message_size), Some(iterations)) => Line::Data(Measurement {
            message_size,
            avg_latency: avg,
            min_latency: min,
            max_latency: max,
            iterations,
        }),
        _ => Line::Malformed,
    }
}

/// Recognizes result file names such as `osu_reduce_n2_ppn4_ucx_bcopy_only.out`
pub struct NameParser {
    re: Regex,
}

impl NameParser {
    pub fn new() -> Result<Self> {
        let alternatives = |names: Vec<&str>| {
            names
                .into_iter()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join("|")
        };
        let tests = alternatives(OSU_TESTS.iter().map(|t| t.collective()).collect());
        let libs = alternatives(OSU_COLL_LIBS.iter().map(|l| l.name).collect());
        let presets = alternatives(
            OSU_COLL_LIBS
                .iter()
                .flat_map(|l| l.presets.iter().map(|p| p.name))
                .collect(),
        );

        let re = Regex::new(&format!(
            concat!(
                r"^osu_(?P<test>{tests})_n(?P<hosts>\d+)_ppn(?P<ppn>\d+)",
                r"_(?P<lib>{libs})(?:_(?P<preset>{presets})_only)?\.out$"
            ),
            tests = tests,
            libs = libs,
            presets = presets,
        ))
        .context("Building the result file name pattern")?;
        Ok(NameParser { re })
    }

    /// Returns `None` for anything that isn't a result file of ours
    pub fn parse(&self, file_name: &str) -> Option<FileMeta> {
        let caps = self.re.captures(file_name)?;
        let library = &caps["lib"];
        let preset = caps.name("preset").map(|m| m.as_str().to_string());

        // Presets only exist for the library that declares them
        if let Some(name) = &preset {
            let lib = find_library(library)?;
            if !lib.presets.iter().any(|p| p.name == name.as_str()) {
                return None;
            }
        }

        Some(FileMeta {
            test: caps["test"].to_string(),
            host_count: caps["hosts"].parse().ok()?,
            ranks_per_node: caps["ppn"].parse().ok()?,
            library: library.to_string(),
            preset,
        })
    }
}

/// Turn the contents of one result file into rows, counting the lines that looked broken
pub fn parse_contents(meta: &FileMeta, contents: &str) -> (Vec<ResultRow>, usize) {
    let mut rows = Vec::new();
    let mut malformed = 0;
    for line in contents.lines() {
        match parse_line(line) {
            Line::Data(m) => rows.push(ResultRow {
                test: meta.test.clone(),
                host_count: meta.host_count,
                ranks_per_node: meta.ranks_per_node,
                library: meta.library.clone(),
                preset: meta.preset.clone(),
                message_size: m.message_size,
                avg_latency: m.avg_latency,
                min_latency: m.min_latency,
                max_latency: m.max_latency,
                iterations: m.iterations,
            }),
            Line::Malformed => malformed += 1,
            Line::Other => {}
        }
    }
    (rows, malformed)
}

fn parse_file(names: &NameParser, path: &Path) -> (Vec<ResultRow>, FileOutcome) {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let Some(meta) = names.parse(&file_name) else {
        debug!("Ignoring {}: not a result file name", file_name);
        return (
            Vec::new(),
            FileOutcome::Skipped {
                reason: "unrecognized file name".to_string(),
            },
        );
    };

    let contents = match fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            let outcome = FileOutcome::Skipped {
                reason: e.to_string(),
            };
            return (Vec::new(), outcome);
        }
    };

    let (rows, skipped_lines) = parse_contents(&meta, &contents);
    let outcome = FileOutcome::Parsed {
        rows: rows.len(),
        skipped_lines,
    };
    (rows, outcome)
}

/// Read every regular file in the results directory.
///
/// Only a directory that can't be listed is an error; individual files that don't parse
/// end up as [`FileOutcome::Skipped`] in the report.
pub fn parse_results(results_path: &Path) -> Result<(Vec<ResultRow>, ParseReport)> {
    let names = NameParser::new()?;
    let mut paths: Vec<PathBuf> = fs::read_dir(results_path)
        .with_context(|| format!("Reading results directory {}", results_path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut rows = Vec::new();
    let mut report = ParseReport::default();
    for path in paths {
        let (mut file_rows, outcome) = parse_file(&names, &path);
        rows.append(&mut file_rows);
        report.push(path, outcome);
    }
    Ok((rows, report))
}

/// Convert rows to a Polars DataFrame
pub fn rows_to_df(rows: &[ResultRow]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Series::new(CSV_FORMAT[0], rows.iter().map(|r| r.test.clone()).collect::<Vec<String>>()),
        Series::new(CSV_FORMAT[1], rows.iter().map(|r| r.host_count).collect::<Vec<u32>>()),
        Series::new(CSV_FORMAT[2], rows.iter().map(|r| r.ranks_per_node).collect::<Vec<u32>>()),
        Series::new(CSV_FORMAT[3], rows.iter().map(|r| r.library.clone()).collect::<Vec<String>>()),
        Series::new(
            CSV_FORMAT[4],
            rows.iter()
                .map(|r| r.preset.clone())
                .collect::<Vec<Option<String>>>(),
        ),
        Series::new(CSV_FORMAT[5], rows.iter().map(|r| r.message_size).collect::<Vec<u64>>()),
        Series::new(CSV_FORMAT[6], rows.iter().map(|r| r.avg_latency).collect::<Vec<f64>>()),
        Series::new(CSV_FORMAT[7], rows.iter().map(|r| r.min_latency).collect::<Vec<f64>>()),
        Series::new(CSV_FORMAT[8], rows.iter().map(|r| r.max_latency).collect::<Vec<f64>>()),
        Series::new(CSV_FORMAT[9], rows.iter().map(|r| r.iterations).collect::<Vec<u64>>()),
    ])
}

/// Parse a results directory and write the combined CSV, replacing any previous one
pub fn parse_path(results_path: &Path, csv_path: &Path) -> Result<ParseReport> {
    let (rows, report) = parse_results(results_path)?;
    let mut df = rows_to_df(&rows)?;

    info!("Writing {} rows to CSV at {}...", rows.len(), csv_path.display());
    let opened_file = fs::File::create(csv_path)
        .with_context(|| format!("Creating {}", csv_path.display()))?;
    CsvWriter::new(opened_file).finish(&mut df)?;
    info!("Wrote results to CSV at {}.", csv_path.display());

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> FileMeta {
        FileMeta {
            test: "reduce".to_string(),
            host_count: 2,
            ranks_per_node: 4,
            library: "ucx".to_string(),
            preset: None,
        }
    }

    #[test]
    fn data_line_yields_measurement() {
        assert_eq!(
            parse_line("1024 12.5 10.0 15.0 1000"),
            Line::Data(Measurement {
                message_size: 1024,
                avg_latency: 12.5,
                min_latency: 10.0,
                max_latency: 15.0,
                iterations: 1000,
            })
        );
    }

    #[test]
    fn non_digit_lines_are_ignored() {
        assert_eq!(parse_line(""), Line::Other);
        assert_eq!(parse_line("# Size       Avg Latency(us)"), Line::Other);
        assert_eq!(parse_line("   4   1.0   1.0   1.0   10"), Line::Other);
        assert_eq!(parse_line("/opt/ompi/bin/mpirun -H a:1,b:1"), Line::Other);
    }

    #[test]
    fn broken_data_lines_are_malformed() {
        assert_eq!(parse_line("1024 12.5 10.0 15.0"), Line::Malformed);
        assert_eq!(parse_line("1024 12.5 10.0 15.0 1000 7"), Line::Malformed);
        assert_eq!(parse_line("1024 12.5 abc 15.0 1000"), Line::Malformed);
        assert_eq!(parse_line("1024.5 12.5 10.0 15.0 1000"), Line::Malformed);
    }

    #[test]
    fn file_names_follow_the_grammar() {
        let names = NameParser::new().unwrap();
        assert_eq!(
            names.parse("osu_reduce_n2_ppn4_ucx.out"),
            Some(meta())
        );
        assert_eq!(
            names.parse("osu_bcast_n16_ppn1_non_ucx.out").map(|m| m.library),
            Some("non_ucx".to_string())
        );
        assert_eq!(
            names.parse("osu_barrier_n4_ppn8_ucx_zcopy_only.out").and_then(|m| m.preset),
            Some("zcopy".to_string())
        );
    }

    #[test]
    fn bad_file_names_are_rejected() {
        let names = NameParser::new().unwrap();
        for name in [
            "osu_reduce_n2_ppn4_ucx.err",
            "osu_reduce_n2_ppn4_ucx",
            "mpi_reduce_n2_ppn4_ucx.out",
            "osu_reduce_nx_ppn4_ucx.out",
            "osu_reduce_n2_ppn4.out",
            "osu_reduce_n2_ppn4_mystery.out",
            "osu_reduce_n2_ppn4_naive_short_only.out",
            "osu_reduce_n99999999999_ppn4_ucx.out",
        ] {
            assert_eq!(names.parse(name), None, "{}", name);
        }
    }

    #[test]
    fn contents_skip_header_and_count_malformed() {
        let contents = "mpirun -H a:4,b:4 osu_reduce -f\n\n\
                        # OSU MPI Reduce Latency Test\n\
                        # Size  Avg Latency(us)  Min Latency(us)  Max Latency(us)  Iterations\n\
                        1024 12.5 10.0 15.0 1000\n\
                        2048 20.0 18.0\n\
                        4096 30.5 28.0 33.0 1000\n";
        let (rows, malformed) = parse_contents(&meta(), contents);
        assert_eq!(malformed, 1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].message_size, 1024);
        assert_eq!(rows[1].avg_latency, 30.5);
        assert_eq!(rows[1].test, "reduce");
    }

    #[test]
    fn dataframe_has_one_column_per_header() {
        let (rows, _) = parse_contents(&meta(), "1 1.0 1.0 1.0 10\n2 2.0 2.0 2.0 10\n");
        let df = rows_to_df(&rows).unwrap();
        assert_eq!(df.shape(), (2, CSV_FORMAT.len()));
        assert_eq!(df.get_column_names(), CSV_FORMAT.to_vec());
    }
}
