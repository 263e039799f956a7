use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tokio::process::Command;

use crate::config::OSU_DONE_MARK;
use crate::report::{RunRecord, RunReport};
use crate::util::RunDescriptor;

/// Knobs that apply to every run of the matrix
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Kill the benchmark after this long
    pub timeout: Option<Duration>,
    /// Really skip runs whose output already holds the done marker
    pub resume: bool,
    /// Only print the commands
    pub dry_run: bool,
}

/// How a single benchmark run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed { reason: String },
    TimedOut { after: Duration },
    Skipped,
    DryRun,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed | RunOutcome::Skipped | RunOutcome::DryRun)
    }
}

/// `.out` handle, holding the advisory lock for as long as it lives
enum OutputFile {
    Locked(Flock<File>),
    Unlocked(File),
}

impl Deref for OutputFile {
    type Target = File;

    fn deref(&self) -> &File {
        match self {
            OutputFile::Locked(lock) => &**lock,
            OutputFile::Unlocked(file) => file,
        }
    }
}

/// Open the output file and try to take an exclusive lock on it.
///
/// A lock held by another run is an error of kind `WouldBlock` and leaves the file
/// untouched. Any other locking failure is only warned about.
fn open_output(path: &Path) -> std::io::Result<OutputFile> {
    let file = OpenOptions::new().write(true).create(true).open(path)?;
    let output = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(lock) => OutputFile::Locked(lock),
        Err((_, errno)) if errno == Errno::EWOULDBLOCK => return Err(errno.into()),
        Err((file, errno)) => {
            warn!("Could not lock {}: {}", path.display(), errno);
            OutputFile::Unlocked(file)
        }
    };
    output.set_len(0)?;
    Ok(output)
}

pub fn output_paths(stem: &Path) -> (PathBuf, PathBuf) {
    let mut out = stem.as_os_str().to_owned();
    out.push(".out");
    let mut err = stem.as_os_str().to_owned();
    err.push(".err");
    (PathBuf::from(out), PathBuf::from(err))
}

/// Whether a previous run already wrote the last datapoint
pub fn is_done(out_path: &Path) -> bool {
    match fs::read(out_path) {
        Ok(contents) => String::from_utf8_lossy(&contents).contains(OSU_DONE_MARK),
        Err(_) => false,
    }
}

/// Spawn the command with its output going to the given files and wait for it
async fn spawn_and_wait(
    command: &str,
    out_file: &OutputFile,
    err_path: &Path,
    timeout: Option<Duration>,
) -> std::io::Result<RunOutcome> {
    // Command header, so every result file says how it was produced
    let mut header: &File = out_file;
    header.write_all(command.as_bytes())?;
    header.write_all(b"\n\n")?;
    header.flush()?;

    let err_file = File::create(err_path)?;
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::from(out_file.try_clone()?))
        .stderr(Stdio::from(err_file))
        .kill_on_drop(true)
        .spawn()?;

    let status = match timeout {
        Some(limit) => {
            let waited = tokio::time::timeout(limit, child.wait()).await;
            match waited {
                Ok(status) => status?,
                Err(_) => {
                    child.kill().await?;
                    return Ok(RunOutcome::TimedOut { after: limit });
                }
            }
        }
        None => child.wait().await?,
    };

    if status.success() {
        return Ok(RunOutcome::Completed);
    }
    let reason = match status.code() {
        Some(code) => format!("exited with code {}", code),
        None => "terminated by a signal".to_string(),
    };
    Ok(RunOutcome::Failed { reason })
}

/// Run one benchmark command, capturing its output to `<stem>.out` and `<stem>.err`.
///
/// A done marker in an existing `.out` is only reported unless `options.resume` is set;
/// by default the benchmark is always run again. Errors never escape, they become the
/// returned [`RunOutcome`].
pub async fn execute(command: &str, stem: &Path, options: RunOptions) -> (bool, RunOutcome) {
    let (out_path, err_path) = output_paths(stem);
    debug!("Command: {}", command);
    debug!("Output: {}", stem.display());

    let done = is_done(&out_path);
    if done {
        info!("Skipping {} (already done).", out_path.display());
        if options.resume {
            return (done, RunOutcome::Skipped);
        }
    } else {
        info!("Executing {}...", out_path.display());
    }

    if options.dry_run {
        info!("🌵 DRY RUN: {}", command);
        return (done, RunOutcome::DryRun);
    }

    let outcome = match open_output(&out_path) {
        Ok(out_file) => spawn_and_wait(command, &out_file, &err_path, options.timeout).await,
        Err(e) => Err(e),
    };

    // Don't leave empty error logs lying around
    if let Ok(meta) = fs::metadata(&err_path) {
        if meta.len() == 0 {
            if let Err(e) = fs::remove_file(&err_path) {
                warn!("Could not remove {}: {}", err_path.display(), e);
            }
        }
    }

    let outcome = outcome.unwrap_or_else(|e| match e.kind() {
        ErrorKind::WouldBlock => RunOutcome::Failed {
            reason: "output locked by another run".to_string(),
        },
        _ => RunOutcome::Failed {
            reason: e.to_string(),
        },
    });
    match &outcome {
        RunOutcome::Completed => info!("[SUCCESS] {}", out_path.display()),
        RunOutcome::Failed { reason } => {
            error!("Unexpected error in {}: {}", out_path.display(), reason)
        }
        RunOutcome::TimedOut { after } => {
            error!("{} timed out after {}s", out_path.display(), after.as_secs())
        }
        RunOutcome::Skipped | RunOutcome::DryRun => {}
    }
    (done, outcome)
}

/// Run every descriptor one after the other, collecting what happened to each
pub async fn run_matrix(runs: &[RunDescriptor], options: RunOptions) -> RunReport {
    let mut report = RunReport::default();
    for (i, run) in runs.iter().enumerate() {
        info!(
            "Running {} with {} on {} node(s), {} ppn ({} of {})",
            run.test.binary,
            run.library_label(),
            run.node_count,
            run.ppn,
            i + 1,
            runs.len()
        );
        let command = run.command();
        let stem = run.output_stem();
        let (previously_done, outcome) = execute(&command, &stem, options).await;
        report.push(RunRecord {
            stem,
            command,
            previously_done,
            outcome,
        });
    }
    report
}
