//! Per-item outcomes of a matrix run or a parse pass, and their console summaries.

use std::path::PathBuf;

use prettytable::{row, Table};

use crate::wrapper::RunOutcome;

/// What happened to one benchmark run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub stem: PathBuf,
    pub command: String,
    /// The output already held the done marker before this run
    pub previously_done: bool,
    pub outcome: RunOutcome,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub records: Vec<RunRecord>,
}

impl RunReport {
    pub fn push(&mut self, record: RunRecord) {
        self.records.push(record);
    }

    pub fn failures(&self) -> impl Iterator<Item = &RunRecord> {
        self.records.iter().filter(|r| !r.outcome.is_success())
    }

    pub fn count(&self, pred: impl Fn(&RunOutcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn print_summary(&self) {
        let mut table = Table::new();
        table.add_row(row![b => "outcome", "runs"]);
        table.add_row(row![
            "completed",
            self.count(|o| matches!(o, RunOutcome::Completed))
        ]);
        table.add_row(row![
            "failed",
            self.count(|o| matches!(o, RunOutcome::Failed { .. }))
        ]);
        table.add_row(row![
            "timed out",
            self.count(|o| matches!(o, RunOutcome::TimedOut { .. }))
        ]);
        table.add_row(row!["skipped", self.count(|o| *o == RunOutcome::Skipped)]);
        table.add_row(row!["dry run", self.count(|o| *o == RunOutcome::DryRun)]);
        table.printstd();

        let failures: Vec<_> = self.failures().collect();
        if failures.is_empty() {
            return;
        }
        let mut failed = Table::new();
        failed.add_row(row![b => "output", "outcome"]);
        for record in failures {
            failed.add_row(row![
                Fr -> record.stem.display(),
                format!("{:?}", record.outcome)
            ]);
        }
        failed.printstd();
    }
}

/// What happened to one file in the results directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Parsed { rows: usize, skipped_lines: usize },
    Skipped { reason: String },
}

#[derive(Debug, Default)]
pub struct ParseReport {
    pub files: Vec<(PathBuf, FileOutcome)>,
}

impl ParseReport {
    pub fn push(&mut self, path: PathBuf, outcome: FileOutcome) {
        self.files.push((path, outcome));
    }

    pub fn total_rows(&self) -> usize {
        self.files
            .iter()
            .map(|(_, outcome)| match outcome {
                FileOutcome::Parsed { rows, .. } => *rows,
                FileOutcome::Skipped { .. } => 0,
            })
            .sum()
    }

    pub fn skipped_files(&self) -> usize {
        self.files
            .iter()
            .filter(|(_, o)| matches!(o, FileOutcome::Skipped { .. }))
            .count()
    }

    pub fn print_summary(&self) {
        let mut table = Table::new();
        table.add_row(row![b => "file", "rows", "note"]);
        for (path, outcome) in &self.files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match outcome {
                FileOutcome::Parsed { rows, skipped_lines } => {
                    let note = match skipped_lines {
                        0 => String::new(),
                        n => format!("{} malformed line(s)", n),
                    };
                    table.add_row(row![name, rows, note]);
                }
                FileOutcome::Skipped { reason } => {
                    table.add_row(row![Fy -> name, 0, reason]);
                }
            }
        }
        table.printstd();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(outcome: RunOutcome) -> RunRecord {
        RunRecord {
            stem: PathBuf::from("results/osu_bcast_n2_ppn1_ucx"),
            command: "true".to_string(),
            previously_done: false,
            outcome,
        }
    }

    #[test]
    fn run_report_counts_failures() {
        let mut report = RunReport::default();
        report.push(record(RunOutcome::Completed));
        report.push(record(RunOutcome::TimedOut {
            after: Duration::from_secs(5),
        }));
        report.push(record(RunOutcome::Failed {
            reason: "exited with code 1".into(),
        }));
        report.push(record(RunOutcome::Skipped));

        assert_eq!(report.failures().count(), 2);
        assert_eq!(report.count(|o| matches!(o, RunOutcome::Completed)), 1);
    }

    #[test]
    fn parse_report_totals() {
        let mut report = ParseReport::default();
        let parsed = |rows, skipped_lines| FileOutcome::Parsed {
            rows,
            skipped_lines,
        };
        report.push("a.out".into(), parsed(3, 1));
        report.push(
            "b.out".into(),
            FileOutcome::Skipped {
                reason: "bad name".into(),
            },
        );
        report.push("c.out".into(), parsed(2, 0));

        assert_eq!(report.total_rows(), 5);
        assert_eq!(report.skipped_files(), 1);
    }
}
