//! CLI command implementations for the billburner binary.

pub mod output;
pub mod run;
pub mod view;
