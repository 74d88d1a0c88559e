//! Command-line boundary for the facematch identity registry.

pub mod cli;
pub mod commands;
pub mod config;
pub mod errors;
pub mod input;
pub mod output;
pub mod registry;
