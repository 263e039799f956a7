use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use termion::color;

use crate::config::{
    mpi_path, BenchmarkSpec, Launcher, LibraryVariant, ThresholdPreset, OSU_TESTS, RESULT_FOLDER,
    SRUN_PATH,
};

/// Struct to describe a table row from the OSU output
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub test: String,
    pub host_count: u32,
    pub ranks_per_node: u32,
    pub library: String,
    pub preset: Option<String>, // Only set for threshold probing runs
    pub message_size: u64,
    pub avg_latency: f64,
    pub min_latency: f64,
    pub max_latency: f64,
    pub iterations: u64,
}

/// Everything needed to launch one benchmark and know where its output goes
#[derive(Debug, Clone)]
pub struct RunDescriptor {
    pub test: &'static BenchmarkSpec,
    pub library: &'static LibraryVariant,
    pub preset: Option<&'static ThresholdPreset>,
    pub node_count: usize,
    pub ppn: u32,
    /// First `node_count` hosts, each annotated with its slot count (`a:4,b:4`)
    pub host_list: String,
    pub launcher: Launcher,
    pub base_path: PathBuf,
    /// Restricts UCX to the given transports (`UCX_TLS`)
    pub transport: Option<String>,
}

impl RunDescriptor {
    /// Environment assignments for this run, in `KEY=VALUE` form
    pub fn env_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self
            .preset
            .map(|p| p.env.iter().map(|t| t.to_string()).collect())
            .unwrap_or_default();
        if let Some(tls) = &self.transport {
            tokens.push(format!("UCX_TLS={}", tls));
        }
        tokens
    }

    /// Render the shell command for the selected launcher
    pub fn command(&self) -> String {
        let test = self.test.path(&self.base_path);
        let env = self.env_tokens();
        let mut parts: Vec<String> = Vec::new();

        match self.launcher {
            Launcher::Srun => {
                // srun inherits the environment, so everything is passed inline
                if let Some(coll) = self.library.coll {
                    parts.push(format!("OMPI_MCA_coll={}", coll));
                }
                parts.extend(env);
                parts.push(SRUN_PATH.to_string());
                parts.push(format!("--nodes={}", self.node_count));
                parts.push(format!("--ntasks-per-node={}", self.ppn));
            }
            Launcher::Mpirun => {
                parts.push(mpi_path(&self.base_path).display().to_string());
                if let Some(coll) = self.library.coll {
                    parts.push("-mca coll".to_string());
                    parts.push(coll.to_string());
                }
                for token in env {
                    parts.push(format!("-x {}", token));
                }
                parts.push("--display-map --map-by core --bind-to core".to_string());
                parts.push(format!("-H {}", self.host_list));
            }
        }

        parts.push(test.display().to_string());
        parts.push("-f".to_string());
        parts.join(" ")
    }

    /// Library name as it appears in file names and the CSV (`ucx`, `ucx_bcopy_only`, ...)
    pub fn library_label(&self) -> String {
        match self.preset {
            Some(preset) => format!("{}{}", self.library.name, preset.suffix()),
            None => self.library.name.to_string(),
        }
    }

    /// Output path without extension; `.out` and `.err` get appended by the executor
    pub fn output_stem(&self) -> PathBuf {
        self.base_path.join(RESULT_FOLDER).join(format!(
            "{}_n{}_ppn{}_{}",
            self.test.binary,
            self.node_count,
            self.ppn,
            self.library_label()
        ))
    }
}

/// Pretty print the generated run matrix.
///
/// # Arguments
/// * `runs` - The descriptors to print, in execution order
/// * `color` - Whether to colorize the columns
pub fn pretty_print_runs(runs: &[RunDescriptor], color: bool) {
    println!("|-------------------------------------------------------------------|");
    println!("|     test      | nodes |  ppn  |       library        |  launcher  |");
    println!("|---------------+-------+-------+----------------------+------------|");
    for run in runs {
        if color {
            println!(
                "| {}{:<13}{} | {}{:>5}{} | {}{:>5}{} | {}{:<20}{} | {}{:<10}{} |",
                color::Fg(color::Yellow),
                run.test.binary,
                color::Fg(color::Reset),
                color::Fg(color::LightBlue),
                run.node_count,
                color::Fg(color::Reset),
                color::Fg(color::LightYellow),
                run.ppn,
                color::Fg(color::Reset),
                color::Fg(color::Magenta),
                run.library_label(),
                color::Fg(color::Reset),
                color::Fg(color::LightGreen),
                run.launcher,
                color::Fg(color::Reset),
            );
        } else {
            println!(
                "| {:<13} | {:>5} | {:>5} | {:<20} | {:<10} |",
                run.test.binary,
                run.node_count,
                run.ppn,
                run.library_label(),
                run.launcher,
            );
        }
    }
    println!("|-------------------------------------------------------------------|");
}

/// Make sure the install prefix contains Open MPI and the OSU collectives
pub fn verify_install(base_path: &Path) -> Result<()> {
    let mpirun = mpi_path(base_path);
    if !mpirun.exists() {
        bail!("Couldn't find {}", mpirun.display());
    }

    for test in OSU_TESTS {
        let binary = test.path(base_path);
        if !binary.exists() {
            bail!("Couldn't find {}", binary.display());
        }
    }

    Ok(())
}
