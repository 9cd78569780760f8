//! Staleness and vulnerability audit for Python requirement manifests

pub mod audit;
pub mod config;
pub mod interrupt;
pub mod logging;
pub mod package;
pub mod parser;
pub mod version;
pub mod vuln;
