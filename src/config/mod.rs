//! Hub configuration.
//!
//! ## Module Organization
//!
//! - `schema` - YAML file schema and the resolved [`HubConfig`]
//! - `loader` - File discovery, `${VAR}` substitution, validation
//! - `error` - Configuration errors
//! - `duration_format` - humantime durations in YAML

pub mod duration_format;
pub mod error;
pub mod loader;
pub mod schema;

pub use error::ConfigError;
pub use loader::{find_config_file, load, load_config_file, substitute_env_vars, validate};
pub use schema::{ConfigFile, HandlerSection, HandlersSection, HubConfig};
