//! Core types, configuration, and utilities for the Roost identity engine.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_AUTHORITY_PUBLISHABLE_KEY, DEFAULT_AUTHORITY_URL, DEFAULT_LOG_LEVEL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
