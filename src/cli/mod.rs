//! Command-line interface: argument parsing and configuration discovery.

pub mod args;
pub mod config;

pub use args::{Cli, Command};
pub use config::{ConfigDiscovery, FileConfig};
