//! Configuration management for the docqa retrieval engine
//!
//! Supports loading configuration from:
//! - TOML files (config/default.toml, config/{env}.toml)
//! - Environment variables (DOCQA_ prefix, `__` separator)
//!
//! All tunables ship with working defaults so an empty config directory
//! still yields a usable engine.

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, DiversityConfig, ExpansionConfig, FusionStrategyKind, LlmSettings,
    QdrantSettings, RerankerConfig, RetrievalConfig, RuntimeEnvironment, ScoringConfig, Settings,
    SparseSettings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
