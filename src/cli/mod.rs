//! Command-line interface for formscrape.

mod commands;

pub use commands::{is_verbose, run};
