use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use log::info;

use crate::config::{Launcher, CSV_FILE, RESULT_FOLDER};
use crate::matrix::{generate_runs, parse_host_list, MatrixConfig, PpnPolicy};
use crate::parse::parse_path;
use crate::util::pretty_print_runs;
use crate::wrapper::{run_matrix, RunOptions};

pub const USAGE: &str = "USAGE (#1 for parsing, #2 for execution):
1. osu_harness <path_to_results>
2. osu_harness <comma_separated_node_list> <max_ppn> [[<build_path>] <timeout_in_seconds>]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LauncherArg {
    /// srun inside a SLURM allocation, mpirun otherwise
    Auto,
    Mpirun,
    Srun,
}

/// Run OSU collective benchmarks across a cluster, or collect their results into a CSV
#[derive(Debug, Parser)]
#[command(name = "osu_harness", version, after_help = USAGE)]
pub struct Cli {
    /// Results directory to parse, or comma separated host list to benchmark
    pub target: String,

    /// Ranks per node (the maximum, for sweeping policies)
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub ppn: Option<u32>,

    /// Install prefix holding bin/mpirun and the OSU benchmarks
    #[arg(env = "OSU_BASE_PATH")]
    pub base_path: Option<PathBuf>,

    /// Kill each benchmark after this many seconds
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    #[arg(long, value_enum, default_value_t = LauncherArg::Auto)]
    pub launcher: LauncherArg,

    #[arg(long, value_enum, default_value_t = PpnPolicy::Extremes)]
    pub ppn_policy: PpnPolicy,

    /// Restrict UCX to these transports (UCX_TLS)
    #[arg(long)]
    pub transport: Option<String>,

    /// Don't sweep the UCX short/bcopy/zcopy thresholds
    #[arg(long)]
    pub no_thresholds: bool,

    /// Skip runs whose output already contains the last datapoint
    #[arg(long)]
    pub resume: bool,

    /// Print the commands without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Where parse mode writes the combined CSV
    #[arg(long, default_value = CSV_FILE)]
    pub csv: PathBuf,
}

#[derive(Debug)]
pub enum Mode {
    Parse {
        results: PathBuf,
        csv: PathBuf,
    },
    Run {
        matrix: MatrixConfig,
        options: RunOptions,
    },
}

impl Cli {
    /// Pick the mode from how many positionals were given
    pub fn into_mode(self) -> Result<Mode> {
        let Some(ppn) = self.ppn else {
            return Ok(Mode::Parse {
                results: PathBuf::from(self.target),
                csv: self.csv,
            });
        };

        let launcher = match self.launcher {
            LauncherArg::Auto => Launcher::detect(),
            LauncherArg::Mpirun => Launcher::Mpirun,
            LauncherArg::Srun => Launcher::Srun,
        };
        let matrix = MatrixConfig {
            hosts: parse_host_list(&self.target)?,
            ppn,
            ppn_policy: self.ppn_policy,
            base_path: self.base_path.unwrap_or_else(|| PathBuf::from(".")),
            launcher,
            transport: self.transport,
            check_thresholds: !self.no_thresholds,
        };
        let options = RunOptions {
            timeout: self.timeout.map(Duration::from_secs),
            resume: self.resume,
            dry_run: self.dry_run,
        };
        Ok(Mode::Run { matrix, options })
    }
}

/// Report a command line that didn't parse. Help and version requests are not errors.
pub fn usage_error(e: clap::Error) -> ExitCode {
    match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = e.print();
            ExitCode::SUCCESS
        }
        _ => {
            let _ = e.print();
            eprintln!();
            eprintln!("{}", USAGE);
            ExitCode::FAILURE
        }
    }
}

async fn run(matrix: MatrixConfig, options: RunOptions) -> Result<()> {
    // Make sure the path contains OMPI and OSU
    #[cfg(not(feature = "no_check_paths"))]
    crate::util::verify_install(&matrix.base_path)?;

    if !options.dry_run {
        let folder = matrix.base_path.join(RESULT_FOLDER);
        std::fs::create_dir_all(&folder)
            .with_context(|| format!("Creating results folder {}", folder.display()))?;
    }

    info!(
        "Benchmarking {} host(s) with {} (ppn {}, {:?})",
        matrix.hosts.len(),
        matrix.launcher,
        matrix.ppn,
        matrix.ppn_policy
    );
    let runs = generate_runs(&matrix);
    pretty_print_runs(&runs, termion::is_tty(&std::io::stdout()));

    let report = run_matrix(&runs, options).await;
    report.print_summary();
    Ok(())
}

pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.into_mode()? {
        Mode::Parse { results, csv } => {
            let report = parse_path(&results, &csv)?;
            report.print_summary();
            info!(
                "Collected {} rows, skipped {} file(s)",
                report.total_rows(),
                report.skipped_files()
            );
            Ok(())
        }
        Mode::Run { matrix, options } => run(matrix, options).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_positional_means_parse() {
        let cli = Cli::try_parse_from(["osu_harness", "results"]).unwrap();
        match cli.into_mode().unwrap() {
            Mode::Parse { results, csv } => {
                assert_eq!(results, PathBuf::from("results"));
                assert_eq!(csv, PathBuf::from(CSV_FILE));
            }
            other => panic!("unexpected mode {:?}", other),
        }
    }

    #[test]
    fn all_positionals_mean_run() {
        let cli = Cli::try_parse_from([
            "osu_harness",
            "a,b,c",
            "8",
            "/opt/ompi",
            "30",
            "--launcher",
            "srun",
            "--no-thresholds",
        ])
        .unwrap();
        match cli.into_mode().unwrap() {
            Mode::Run { matrix, options } => {
                assert_eq!(matrix.hosts, vec!["a", "b", "c"]);
                assert_eq!(matrix.ppn, 8);
                assert_eq!(matrix.base_path, PathBuf::from("/opt/ompi"));
                assert_eq!(matrix.launcher, Launcher::Srun);
                assert!(!matrix.check_thresholds);
                assert_eq!(options.timeout, Some(Duration::from_secs(30)));
                assert!(!options.resume);
            }
            other => panic!("unexpected mode {:?}", other),
        }
    }

    #[test]
    fn positional_count_is_bounded() {
        assert!(Cli::try_parse_from(["osu_harness", "a,b", "8", "/opt", "30", "extra"]).is_err());
        assert!(Cli::try_parse_from(["osu_harness"]).is_err());
    }

    #[test]
    fn zero_ppn_is_rejected() {
        assert!(Cli::try_parse_from(["osu_harness", "a,b", "0"]).is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(Cli::try_parse_from(["osu_harness", "a,b", "4", "/opt", "0"]).is_err());
        assert!(Cli::try_parse_from(["osu_harness", "a,b", "4", "/opt", "1"]).is_ok());
    }

    #[test]
    fn duplicate_hosts_fail_before_running() {
        let cli = Cli::try_parse_from(["osu_harness", "a,a", "2"]).unwrap();
        assert!(cli.into_mode().is_err());
    }
}
