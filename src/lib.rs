pub mod cache;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod indicators;
pub mod models;
pub mod processor;
pub mod providers;
pub mod utils;
