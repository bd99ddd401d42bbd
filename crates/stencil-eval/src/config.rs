//! Handler configuration.
//!
//! ```toml
//! template_dir = "templates"
//! cache_dir = "var/cache/templates"
//! limit_method_calls = true
//! max_include_depth = 64
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for a [`Handler`](crate::Handler). Every field is optional in
/// TOML and falls back to [`HandlerConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandlerConfig {
    /// Directory template paths are resolved against.
    pub template_dir: PathBuf,
    /// Directory for compiled units; `None` keeps units in memory only.
    pub cache_dir: Option<PathBuf>,
    /// Enforce the method whitelist.
    pub limit_method_calls: bool,
    /// Maximum number of templates executing at once (the page plus its
    /// nested includes).
    pub max_include_depth: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from("."),
            cache_dir: None,
            limit_method_calls: true,
            max_include_depth: 64,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {origin}: {source}")]
    Parse {
        origin: String,
        source: toml::de::Error,
    },
}

impl HandlerConfig {
    pub fn new(template_dir: impl Into<PathBuf>) -> Self {
        Self {
            template_dir: template_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, "inline configuration")
    }

    /// Load a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })
    }

    pub fn with_template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.template_dir = dir.into();
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_limit_method_calls(mut self, limit: bool) -> Self {
        self.limit_method_calls = limit;
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = HandlerConfig::default();
        assert_eq!(config.template_dir, PathBuf::from("."));
        assert!(config.cache_dir.is_none());
        assert!(config.limit_method_calls);
        assert_eq!(config.max_include_depth, 64);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = HandlerConfig::from_toml_str(
            r#"
            template_dir = "views"
            cache_dir = "cache"
            "#,
        )
        .unwrap();
        assert_eq!(config.template_dir, PathBuf::from("views"));
        assert_eq!(config.cache_dir, Some(PathBuf::from("cache")));
        assert!(config.limit_method_calls);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = HandlerConfig::from_toml_str("limit_methods = false").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stencil.toml");
        std::fs::write(&path, "limit_method_calls = false\nmax_include_depth = 8\n").unwrap();
        let config = HandlerConfig::load(&path).unwrap();
        assert!(!config.limit_method_calls);
        assert_eq!(config.max_include_depth, 8);

        let missing = HandlerConfig::load(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn builders() {
        let config = HandlerConfig::new("t")
            .with_cache_dir("c")
            .with_limit_method_calls(false)
            .with_max_include_depth(3);
        assert_eq!(config.template_dir, PathBuf::from("t"));
        assert_eq!(config.cache_dir, Some(PathBuf::from("c")));
        assert!(!config.limit_method_calls);
        assert_eq!(config.max_include_depth, 3);
    }
}
