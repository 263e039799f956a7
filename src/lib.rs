//! Driver for the OSU collective micro-benchmarks.
//!
//! Generates every combination of node count, ranks per node, collective test and
//! collectives library, runs them one after the other with their output captured under
//! `<base>/results/`, and turns a directory of such outputs into a single CSV.

pub mod cli;
pub mod config;
pub mod matrix;
pub mod parse;
pub mod report;
pub mod util;
pub mod wrapper;
