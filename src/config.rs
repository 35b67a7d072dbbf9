use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{DEFAULT_API_BASE, DEFAULT_MEDIA_BASE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
///
/// Command-line flags are layered on top by the binary; see `main.rs`.
#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub output_dir: PathBuf,

    // Remote endpoints
    pub api_base: String,
    pub media_base: String,
    pub http_timeout: Duration,

    // Conversion
    pub convert_media: bool,
    pub remove_original: bool,
    pub converter_dir: Option<PathBuf>,
    pub converter_name: String,
    pub convert_timeout: Option<Duration>,

    // Media workers
    pub parallel: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Storage
            output_dir: PathBuf::from(env_or_default("ARCHIVE_OUTPUT_DIR", "archives")),

            // Remote endpoints
            api_base: env_or_default("ARCHIVE_API_BASE", DEFAULT_API_BASE),
            media_base: env_or_default("ARCHIVE_MEDIA_BASE", DEFAULT_MEDIA_BASE),
            http_timeout: Duration::from_secs(parse_env_u64("ARCHIVE_HTTP_TIMEOUT_SECS", 60)?),

            // Conversion
            convert_media: parse_env_bool("ARCHIVE_CONVERT", true)?,
            remove_original: parse_env_bool("ARCHIVE_REMOVE_ORIGINAL", false)?,
            converter_dir: optional_env("ARCHIVE_CONVERTER_DIR").map(PathBuf::from),
            converter_name: env_or_default("ARCHIVE_CONVERTER_NAME", "ffmpeg"),
            convert_timeout: parse_optional_env_u64("ARCHIVE_CONVERT_TIMEOUT_SECS")?
                .map(Duration::from_secs),

            // Media workers
            parallel: parse_env_usize("ARCHIVE_PARALLEL", 1)?,
        })
    }

    /// Configuration with built-in defaults, independent of the environment.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            output_dir: PathBuf::from("archives"),
            api_base: DEFAULT_API_BASE.to_string(),
            media_base: DEFAULT_MEDIA_BASE.to_string(),
            http_timeout: Duration::from_secs(10),
            convert_media: false,
            remove_original: false,
            converter_dir: None,
            converter_name: "ffmpeg".to_string(),
            convert_timeout: None,
            parallel: 1,
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallel == 0 {
            return Err(ConfigError::InvalidValue {
                name: "ARCHIVE_PARALLEL".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        for (name, value) in [
            ("ARCHIVE_API_BASE", &self.api_base),
            ("ARCHIVE_MEDIA_BASE", &self.media_base),
        ] {
            if let Err(e) = url::Url::parse(value) {
                return Err(ConfigError::InvalidValue {
                    name: name.to_string(),
                    message: format!("not a valid URL ({e}): '{value}'"),
                });
            }
        }
        if self.converter_name.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "ARCHIVE_CONVERTER_NAME".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    Ok(parse_optional_env_u64(name)?.unwrap_or(default))
}

fn parse_optional_env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => {
            val.parse().map(Some).map_err(|e| ConfigError::ParseInt {
                name: name.to_string(),
                source: e,
            })
        }
        _ => Ok(None),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => parse_bool(name, &val),
        _ => Ok(default),
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::ParseBool {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "ARCHIVE_OUTPUT_DIR",
        "ARCHIVE_API_BASE",
        "ARCHIVE_MEDIA_BASE",
        "ARCHIVE_HTTP_TIMEOUT_SECS",
        "ARCHIVE_CONVERT",
        "ARCHIVE_REMOVE_ORIGINAL",
        "ARCHIVE_CONVERTER_DIR",
        "ARCHIVE_CONVERTER_NAME",
        "ARCHIVE_CONVERT_TIMEOUT_SECS",
        "ARCHIVE_PARALLEL",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("X", "yes").unwrap());
        assert!(parse_bool("X", "ON").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = Config::from_env().unwrap();
        assert_eq!(config.output_dir, PathBuf::from("archives"));
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.media_base, DEFAULT_MEDIA_BASE);
        assert!(config.convert_media);
        assert!(!config.remove_original);
        assert_eq!(config.parallel, 1);
        assert!(config.convert_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("ARCHIVE_PARALLEL", "4");
        std::env::set_var("ARCHIVE_CONVERT", "off");
        std::env::set_var("ARCHIVE_CONVERT_TIMEOUT_SECS", "300");
        std::env::set_var("ARCHIVE_CONVERTER_DIR", "/opt/bin");
        let config = Config::from_env().unwrap();
        clear_env();

        assert_eq!(config.parallel, 4);
        assert!(!config.convert_media);
        assert_eq!(config.convert_timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.converter_dir, Some(PathBuf::from("/opt/bin")));
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        clear_env();
        std::env::set_var("ARCHIVE_PARALLEL", "many");
        let result = Config::from_env();
        clear_env();
        assert!(matches!(result, Err(ConfigError::ParseInt { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_parallel() {
        let config = Config {
            parallel: 0,
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let config = Config {
            api_base: "not a url".to_string(),
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());
    }
}
