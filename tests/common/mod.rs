// Shared helpers for the integration tests
#![allow(dead_code)]
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use osu_harness::config::{MPIRUN_PATH, OSU_PATH, OSU_TESTS};

/// Lay out a fake install prefix. `mpirun` is a shell script printing an OSU style table.
pub fn fake_install(base: &Path) {
    let bin = base.join(MPIRUN_PATH);
    fs::create_dir_all(bin.parent().unwrap()).unwrap();
    let script = "#!/bin/sh\n\
        echo '# OSU MPI Latency Test'\n\
        echo '# Size       Avg Latency(us)   Min Latency(us)   Max Latency(us)  Iterations'\n\
        echo '4                       1.50              1.20              1.80        1000'\n\
        echo '1048576               512.25            500.00            530.75         100'\n";
    fs::write(&bin, script).unwrap();
    fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();

    let tests = base.join(OSU_PATH);
    fs::create_dir_all(&tests).unwrap();
    for test in OSU_TESTS {
        fs::write(tests.join(test.binary), "").unwrap();
    }
}

/// Write a captured result file the way the executor would
pub fn write_result(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), format!("mpirun -H a:1,b:1 osu_test -f\n\n{}", body)).unwrap();
}
