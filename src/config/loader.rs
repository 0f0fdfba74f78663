//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Name used when no `--config` is given.
pub const DEFAULT_CONFIG_NAME: &str = "config";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration `{name}` not found (tried {})", display_paths(.tried))]
    NotFound { name: String, tried: Vec<PathBuf> },
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {}", display_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Map a configuration source name to an existing file.
///
/// The name is taken as a path first; if nothing exists there, `<name>.toml`
/// is tried.
pub fn resolve_source(name: &str) -> Result<PathBuf, ConfigError> {
    let direct = PathBuf::from(name);
    if direct.is_file() {
        return Ok(direct);
    }

    let with_ext = PathBuf::from(format!("{}.toml", name));
    if with_ext.is_file() {
        return Ok(with_ext);
    }

    Err(ConfigError::NotFound {
        name: name.to_string(),
        tried: vec![direct, with_ext],
    })
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: AppConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

/// Resolve a named source and load it.
pub fn load_config_named(name: &str) -> Result<AppConfig, ConfigError> {
    let path = resolve_source(name)?;
    load_config(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_source_lists_candidates() {
        let err = load_config_named("/definitely/not/here/app").unwrap_err();
        match err {
            ConfigError::NotFound { tried, .. } => {
                assert_eq!(tried.len(), 2);
                assert!(tried[1].to_string_lossy().ends_with("app.toml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn name_without_extension_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.toml");
        fs::write(&path, "[server]\nport = 9001\n").unwrap();

        let name = dir.path().join("service");
        let config = load_config_named(name.to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 9001);
    }

    #[test]
    fn parse_error_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn validation_failure_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timezone = \"nowhere\"").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
    }
}
