pub mod cli;
pub mod config;
pub mod error;
pub mod import;
pub mod merge;
pub mod model;
pub mod provider;
pub mod rules;
pub mod store;
pub mod validation;

pub use error::{Result, TdmError};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
