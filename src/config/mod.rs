//! Configuration module for Council-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every key is optional; an absent file yields `Config::default()`.
//!
//! # Example
//!
//! ```no_run
//! use council_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Request delay: {}ms", config.throttle.request_delay_ms);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{CollectionConfig, Config, OutputConfig, SourceConfig, ThrottleConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
