//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse a TOML file without semantic validation.
///
/// Used when command-line overrides are applied before validating.
pub fn read_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("caching-proxy-{}-{}.toml", name, std::process::id()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_valid_file() {
        let path = write_temp("valid", "[listener]\norigin = \"http://127.0.0.1:3000\"\n");
        let config = load_config(&path).unwrap();
        assert_eq!(config.listener.origin, "http://127.0.0.1:3000");
        fs::remove_file(path).unwrap_or_default();
    }

    #[test]
    fn test_validation_errors_reported() {
        let path = write_temp("invalid", "[cache]\ndefault_ttl_secs = 0\n");
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("cache.default_ttl_secs"));

        // Parsing alone still succeeds
        assert_eq!(read_config(&path).unwrap().cache.default_ttl_secs, 0);
        fs::remove_file(path).unwrap_or_default();
    }

    #[test]
    fn test_parse_and_io_errors() {
        let path = write_temp("broken", "[listener\n");
        assert!(matches!(read_config(&path), Err(ConfigError::Parse(_))));
        fs::remove_file(path).unwrap_or_default();

        let missing = Path::new("/definitely/not/here.toml");
        assert!(matches!(read_config(missing), Err(ConfigError::Io(_))));
    }
}
