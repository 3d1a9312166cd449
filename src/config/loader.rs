//! Configuration loading and validation.
//!
//! Loading flow: locate file, read, substitute `${VAR}` references, parse
//! YAML, merge over defaults, apply `MESSAGEHUB_*` overrides, validate.

use regex::Regex;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use super::error::ConfigError;
use super::schema::{ConfigFile, HubConfig};

/// Configuration file search paths (in priority order, after `--config`).
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(path) = std::env::var("MESSAGEHUB_CONFIG") {
        paths.push(PathBuf::from(path));
    }
    paths.push(PathBuf::from("/etc/messagehub/config.yaml"));
    paths.push(PathBuf::from("./messagehub.yaml"));

    paths
}

/// Find the config file to load.
///
/// An explicit path must exist. Otherwise the first existing default path
/// wins, and `Ok(None)` means run on defaults alone.
///
/// # Errors
///
/// Returns `ConfigError::ConfigFileNotFound` if `explicit_path` is given
/// but does not exist.
pub fn find_config_file(explicit_path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit_path {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(ConfigError::ConfigFileNotFound {
            path: path.to_path_buf(),
        });
    }

    Ok(default_config_paths().into_iter().find(|p| p.exists()))
}

/// Read and parse a config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is empty, references an
/// unset environment variable without a default, or is not valid YAML for
/// [`ConfigFile`].
pub fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path)?;

    if contents.trim().is_empty() {
        return Err(ConfigError::EmptyConfigFile);
    }

    let contents = substitute_env_vars(&contents)?;
    let file: ConfigFile = serde_saphyr::from_str(&contents)?;
    Ok(file)
}

/// Resolve the complete hub configuration.
///
/// Precedence, lowest to highest: built-in defaults, config file,
/// `MESSAGEHUB_*` environment variables.
///
/// # Errors
///
/// Returns the first loading or validation error.
pub fn load(explicit_path: Option<&Path>) -> Result<HubConfig, ConfigError> {
    let mut config = HubConfig::default();

    if let Some(path) = find_config_file(explicit_path)? {
        tracing::info!(path = %path.display(), "Loading configuration file");
        config = config.merge_file(load_config_file(&path)?);
    } else {
        tracing::info!("No configuration file found, using defaults");
    }

    let config = config.apply_env_overrides()?;
    validate(&config)?;
    Ok(config)
}

// ─────────────────────────────────────────────────────────────────────────────
// Environment Variable Substitution
// ─────────────────────────────────────────────────────────────────────────────

// SAFETY: .expect() on LazyLock with a compile-time literal regex pattern.
#[allow(clippy::expect_used)]
static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid regex")
});

/// Substitute environment variables in config file text.
///
/// # Syntax
/// - `${VAR}` - Required, fail if not set
/// - `${VAR:-default}` - Optional with default
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` for the first required variable
/// that is not set.
pub fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut missing = None;

    let result = ENV_VAR_PATTERN.replace_all(content, |cap: &regex::Captures<'_>| {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => value,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                None => {
                    missing.get_or_insert_with(|| var_name.to_string());
                    String::new()
                }
            },
        }
    });

    match missing {
        Some(var) => Err(ConfigError::MissingEnvVar { var }),
        None => Ok(result.into_owned()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Validate a resolved configuration.
///
/// # Errors
///
/// Returns the first violated rule.
pub fn validate(config: &HubConfig) -> Result<(), ConfigError> {
    config
        .listen_addr
        .parse::<SocketAddr>()
        .map_err(|e| ConfigError::InvalidListenAddr {
            addr: config.listen_addr.clone(),
            message: e.to_string(),
        })?;

    validate_url("order_service_url", &config.order_service_url)?;
    validate_url("payment_service_url", &config.payment_service_url)?;
    validate_path("order_path", &config.order_path)?;
    validate_path("payment_path", &config.payment_path)?;

    let positive = [
        ("handler_timeout", config.handler_timeout.is_zero()),
        ("connect_timeout", config.connect_timeout.is_zero()),
        ("max_response_bytes", config.max_response_bytes == 0),
        ("max_body_bytes", config.max_body_bytes == 0),
        ("max_concurrent_requests", config.max_concurrent_requests == 0),
        ("batch_concurrency", config.batch_concurrency == 0),
    ];
    if let Some((field, _)) = positive.into_iter().find(|(_, zero)| *zero) {
        return Err(ConfigError::ZeroValue { field });
    }

    Ok(())
}

fn validate_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
        field,
        url: url.to_string(),
        message: e.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            field,
            url: url.to_string(),
            message: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    if parsed.host_str().is_none() {
        return Err(ConfigError::InvalidUrl {
            field,
            url: url.to_string(),
            message: "missing host".to_string(),
        });
    }
    Ok(())
}

fn validate_path(field: &'static str, path: &str) -> Result<(), ConfigError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(ConfigError::InvalidPath {
            field,
            path: path.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use std::time::Duration;

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let original = std::env::var(key).ok();
            // SAFETY: tests touching the environment are #[serial].
            unsafe { std::env::set_var(key, value) };
            Self { key, original }
        }

        fn remove(key: &'static str) -> Self {
            let original = std::env::var(key).ok();
            // SAFETY: tests touching the environment are #[serial].
            unsafe { std::env::remove_var(key) };
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            // SAFETY: tests touching the environment are #[serial].
            unsafe {
                match &self.original {
                    Some(v) => std::env::set_var(self.key, v),
                    None => std::env::remove_var(self.key),
                }
            }
        }
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_substitute_env_vars() {
        let _set = EnvVarGuard::set("MH_TEST_ORDER_HOST", "orders.internal");
        let _unset = EnvVarGuard::remove("MH_TEST_UNSET");

        let out = substitute_env_vars(
            "url: http://${MH_TEST_ORDER_HOST}:8081\nother: ${MH_TEST_UNSET:-fallback}",
        )
        .unwrap();
        assert_eq!(out, "url: http://orders.internal:8081\nother: fallback");
    }

    #[test]
    #[serial]
    fn test_substitute_missing_required_var() {
        let _unset = EnvVarGuard::remove("MH_TEST_REQUIRED");
        let err = substitute_env_vars("url: ${MH_TEST_REQUIRED}").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar { var } if var == "MH_TEST_REQUIRED"));
    }

    #[test]
    #[serial]
    fn test_load_file_then_env_precedence() {
        let _timeout = EnvVarGuard::set("MESSAGEHUB_HANDLER_TIMEOUT_MS", "750");
        let _order = EnvVarGuard::remove("MESSAGEHUB_ORDER_SERVICE_URL");
        let _payment = EnvVarGuard::remove("MESSAGEHUB_PAYMENT_SERVICE_URL");
        let _listen = EnvVarGuard::remove("MESSAGEHUB_LISTEN");

        let file = write_config(
            r#"
listen: 127.0.0.1:9000
handlers:
  order:
    url: http://orders:8081
handler_timeout: 5s
batch_concurrency: 2
"#,
        );

        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.order_service_url, "http://orders:8081");
        assert_eq!(config.payment_service_url, "http://localhost:8082");
        assert_eq!(config.handler_timeout, Duration::from_millis(750));
        assert_eq!(config.batch_concurrency, 2);
    }

    #[test]
    #[serial]
    fn test_invalid_env_number() {
        let _v = EnvVarGuard::set("MESSAGEHUB_BATCH_CONCURRENCY", "lots");
        let err = HubConfig::default().apply_env_overrides().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnvVar {
                var: "MESSAGEHUB_BATCH_CONCURRENCY",
                ..
            }
        ));
    }

    #[test]
    fn test_explicit_missing_file() {
        let err = find_config_file(Some(Path::new("/nonexistent/messagehub.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigFileNotFound { .. }));
    }

    #[test]
    fn test_empty_file_rejected() {
        let file = write_config("   \n");
        assert!(matches!(
            load_config_file(file.path()),
            Err(ConfigError::EmptyConfigFile)
        ));
    }

    #[test]
    fn test_validate_defaults() {
        validate(&HubConfig::default()).unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = HubConfig::default();
        config.order_service_url = "ftp://orders".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidUrl {
                field: "order_service_url",
                ..
            })
        ));

        let mut config = HubConfig::default();
        config.payment_path = "payments".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidPath { .. })
        ));

        let mut config = HubConfig::default();
        config.listen_addr = "localhost".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidListenAddr { .. })
        ));

        let mut config = HubConfig::default();
        config.handler_timeout = Duration::ZERO;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::ZeroValue {
                field: "handler_timeout"
            })
        ));
    }
}
