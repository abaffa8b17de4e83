//! Configuration module
//!
//! CLI argument definitions and runtime transfer configuration.

mod settings;

pub use settings::*;
