//! Expansion of the static tables into the full list of benchmark runs.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::ValueEnum;
use log::debug;

use crate::config::{Launcher, ThresholdPreset, OSU_COLL_LIBS, OSU_TESTS};
use crate::util::RunDescriptor;

/// Which ranks-per-node values get swept for every node count
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PpnPolicy {
    /// One rank per node and the full `ppn`
    Extremes,
    /// Only the given `ppn`
    Fixed,
    /// Powers of two up to `ppn`, `ppn` itself always included
    PowersOfTwo,
}

#[derive(Debug, Clone)]
pub struct MatrixConfig {
    pub hosts: Vec<String>,
    pub ppn: u32,
    pub ppn_policy: PpnPolicy,
    pub base_path: PathBuf,
    pub launcher: Launcher,
    pub transport: Option<String>,
    pub check_thresholds: bool,
}

/// Split a comma separated host list, rejecting blanks and duplicates
pub fn parse_host_list(host_list: &str) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut hosts = Vec::new();
    for host in host_list.split(',').map(str::trim) {
        if host.is_empty() {
            bail!("Empty host name in host list '{}'", host_list);
        }
        if !seen.insert(host) {
            bail!("Host '{}' appears more than once in the host list", host);
        }
        hosts.push(host.to_string());
    }
    Ok(hosts)
}

/// Powers of two starting at `start` that are below `total`, followed by `total` itself
fn powers_up_to(start: usize, total: usize) -> Vec<usize> {
    let mut counts = Vec::new();
    let mut count = start;
    while count < total {
        counts.push(count);
        count *= 2;
    }
    counts.push(total);
    counts
}

/// Node counts to sweep. Single-node runs are only used when there is nothing else.
pub fn node_counts(total: usize) -> Vec<usize> {
    if total <= 1 {
        return vec![total];
    }
    powers_up_to(2, total)
}

pub fn ppn_values(ppn: u32, policy: PpnPolicy) -> Vec<u32> {
    match policy {
        PpnPolicy::Fixed => vec![ppn],
        PpnPolicy::Extremes if ppn <= 1 => vec![ppn],
        PpnPolicy::Extremes => vec![1, ppn],
        PpnPolicy::PowersOfTwo => powers_up_to(1, ppn as usize)
            .into_iter()
            .map(|p| p as u32)
            .collect(),
    }
}

/// Annotate the first `node_count` hosts with their slot count (`a:4,b:4`)
pub fn partial_host_list(hosts: &[String], node_count: usize, ppn: u32) -> String {
    hosts
        .iter()
        .take(node_count)
        .map(|host| format!("{}:{}", host, ppn))
        .collect::<Vec<_>>()
        .join(",")
}

/// Build every run in execution order. No I/O happens here.
pub fn generate_runs(config: &MatrixConfig) -> Vec<RunDescriptor> {
    let mut runs = Vec::new();

    for node_count in node_counts(config.hosts.len()) {
        for ppn in ppn_values(config.ppn, config.ppn_policy) {
            let host_list = partial_host_list(&config.hosts, node_count, ppn);

            for test in OSU_TESTS {
                for library in OSU_COLL_LIBS {
                    let base = RunDescriptor {
                        test,
                        library,
                        preset: None,
                        node_count,
                        ppn,
                        host_list: host_list.clone(),
                        launcher: config.launcher,
                        base_path: config.base_path.clone(),
                        transport: config.transport.clone(),
                    };

                    let presets: &[ThresholdPreset] = if config.check_thresholds {
                        library.presets
                    } else {
                        &[]
                    };
                    runs.push(base.clone());
                    for preset in presets {
                        runs.push(RunDescriptor {
                            preset: Some(preset),
                            ..base.clone()
                        });
                    }
                }
            }
        }
    }

    debug!("Generated {} benchmark runs", runs.len());
    runs
}
