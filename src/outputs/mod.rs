//! Files written by the `scrape` subcommand.
//!
//! - [`json`]: dated per-site JSON listings

pub mod json;
