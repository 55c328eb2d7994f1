//! Command-line argument model shared by the `bar-sync` binary.

pub mod commands;
pub mod params;
