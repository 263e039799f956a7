//! Static tables describing what gets benchmarked and where things live on disk.

use std::fmt;
use std::path::{Path, PathBuf};

/// Last message size of the default OSU sweep. Present in the output once a run finished.
pub const OSU_DONE_MARK: &str = "1048576";

/// Location of the MPI launcher relative to the install prefix
pub const MPIRUN_PATH: &str = "bin/mpirun";

/// Location of the OSU collective binaries relative to the install prefix
pub const OSU_PATH: &str = "libexec/osu-micro-benchmarks/mpi/collective";

/// Workload-manager launcher, always invoked by absolute path
pub const SRUN_PATH: &str = "/usr/bin/srun";

pub const RESULT_FOLDER: &str = "results";
pub const CSV_FILE: &str = "osu_results.csv";

/// A single OSU collective benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BenchmarkSpec {
    /// Name of the executable, e.g. `osu_bcast`
    pub binary: &'static str,
}

impl BenchmarkSpec {
    /// Collective name without the `osu_` prefix (what ends up in the CSV)
    pub fn collective(&self) -> &'static str {
        self.binary.strip_prefix("osu_").unwrap_or(self.binary)
    }

    pub fn path(&self, base_path: &Path) -> PathBuf {
        base_path.join(OSU_PATH).join(self.binary)
    }
}

pub const OSU_TESTS: &[BenchmarkSpec] = &[
    BenchmarkSpec {
        binary: "osu_barrier",
    },
    BenchmarkSpec {
        binary: "osu_bcast",
    },
    BenchmarkSpec {
        binary: "osu_reduce",
    },
    BenchmarkSpec {
        binary: "osu_allreduce",
    },
];

/// Selects which Open MPI `coll` components may serve the collectives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryVariant {
    pub name: &'static str,
    /// Value for `-mca coll`; `None` leaves Open MPI's default selection untouched
    pub coll: Option<&'static str>,
    /// Presets swept on top of this variant when threshold sweeping is on
    pub presets: &'static [ThresholdPreset],
}

impl LibraryVariant {
    pub fn is_primary(&self) -> bool {
        !self.presets.is_empty()
    }
}

/// Forces the builtin UCX collectives onto a single transfer method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThresholdPreset {
    pub name: &'static str,
    pub env: &'static [&'static str],
}

impl ThresholdPreset {
    /// File name suffix, e.g. `_short_only`
    pub fn suffix(&self) -> String {
        format!("_{}_only", self.name)
    }
}

pub const UCX_THRESHOLDS: &[ThresholdPreset] = &[
    ThresholdPreset {
        name: "short",
        env: &[
            "UCX_BUILTIN_SHORT_MAX_TX_SIZE=inf",
            "UCX_BUILTIN_BCOPY_MAX_TX_SIZE=inf",
        ],
    },
    ThresholdPreset {
        name: "bcopy",
        env: &[
            "UCX_BUILTIN_SHORT_MAX_TX_SIZE=0",
            "UCX_BUILTIN_BCOPY_MAX_TX_SIZE=inf",
        ],
    },
    ThresholdPreset {
        name: "zcopy",
        env: &[
            "UCX_BUILTIN_SHORT_MAX_TX_SIZE=0",
            "UCX_BUILTIN_BCOPY_MAX_TX_SIZE=0",
        ],
    },
];

pub const OSU_COLL_LIBS: &[LibraryVariant] = &[
    LibraryVariant {
        name: "ucx",
        coll: None,
        presets: UCX_THRESHOLDS,
    },
    LibraryVariant {
        name: "non_ucx",
        coll: Some("^ucx"),
        presets: &[],
    },
    LibraryVariant {
        name: "naive",
        coll: Some("^ucx,hcoll"),
        presets: &[],
    },
];

/// How the MPI job gets onto the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launcher {
    /// `mpirun -H host:slots,...`
    Mpirun,
    /// `srun --nodes=N --ntasks-per-node=P` inside an existing allocation
    Srun,
}

impl Launcher {
    /// Use srun when running inside a SLURM allocation
    pub fn detect() -> Self {
        match std::env::var_os("SLURM_JOB_ID") {
            Some(_) => Launcher::Srun,
            None => Launcher::Mpirun,
        }
    }
}

impl fmt::Display for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Launcher::Mpirun => f.pad("mpirun"),
            Launcher::Srun => f.pad("srun"),
        }
    }
}

pub fn mpi_path(base_path: &Path) -> PathBuf {
    base_path.join(MPIRUN_PATH)
}

pub fn find_library(name: &str) -> Option<&'static LibraryVariant> {
    OSU_COLL_LIBS.iter().find(|lib| lib.name == name)
}

pub fn find_test(collective: &str) -> Option<&'static BenchmarkSpec> {
    OSU_TESTS.iter().find(|test| test.collective() == collective)
}
