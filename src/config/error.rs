//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    // ─────────────────────────────────────────────────────────────────────────
    // Value validation errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Handler URL is not an absolute http(s) URL.
    #[error("invalid URL for '{field}': '{url}': {message}")]
    InvalidUrl {
        field: &'static str,
        url: String,
        message: String,
    },

    /// Listen address is not `host:port`.
    #[error("invalid listen address '{addr}': {message}")]
    InvalidListenAddr { addr: String, message: String },

    /// Handler path must start with '/'.
    #[error("invalid handler path for '{field}': '{path}' must start with '/'")]
    InvalidPath { field: &'static str, path: String },

    /// A duration or limit that must be positive is zero.
    #[error("'{field}' must be greater than zero")]
    ZeroValue { field: &'static str },

    // ─────────────────────────────────────────────────────────────────────────
    // Environment errors
    // ─────────────────────────────────────────────────────────────────────────
    /// An override variable is set but cannot be parsed.
    #[error("environment variable '{var}' has invalid value '{value}': {message}")]
    InvalidEnvVar {
        var: &'static str,
        value: String,
        message: String,
    },

    /// `${VAR}` referenced in the config file is not set and has no default.
    #[error("environment variable '{var}' not set (referenced in configuration file)")]
    MissingEnvVar { var: String },

    // ─────────────────────────────────────────────────────────────────────────
    // I/O and parsing errors
    // ─────────────────────────────────────────────────────────────────────────
    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    ParseError(#[from] serde_saphyr::Error),

    /// I/O error reading config file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Explicitly requested config file does not exist.
    #[error("configuration file not found: {path}")]
    ConfigFileNotFound { path: PathBuf },

    /// Empty configuration file.
    #[error("configuration file is empty")]
    EmptyConfigFile,
}
