//! Shared scaffolding for devsync: configuration, error taxonomy, logging and
//! runtime setup used by both the transport and core crates and by the CLI
//! binaries. Not intended for direct use outside this workspace.

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{DevProfile, ExecProfile, MappingEntry, OutputConfig, RuntimeConfig, TracingConfig};
pub use error::ConfigError;
