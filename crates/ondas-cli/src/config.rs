//! Optional TOML configuration.
//!
//! Loaded from `<config dir>/ondas/config.toml` when present; every
//! field has a sensible default and command-line flags always win.

use std::path::PathBuf;

use ondas_io::PathResolver;
use serde::Deserialize;

/// User configuration for the CLI.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Directories searched for soundfiles after the working directory.
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Format name used when neither a flag nor an extension decides.
    #[serde(default)]
    pub default_format: Option<String>,

    /// Streaming FIFO size in bytes.
    #[serde(default)]
    pub stream_bufsize: Option<usize>,
}

impl Config {
    /// Path of the config file, when a config directory exists.
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ondas").join("config.toml"))
    }

    /// Load the config file, falling back to defaults when it is missing
    /// or malformed.
    pub fn load() -> Config {
        let Some(path) = Config::path() else {
            return Config::default();
        };
        let Ok(text) = std::fs::read_to_string(&path) else {
            return Config::default();
        };
        match toml::from_str(&text) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config");
                Config::default()
            }
        }
    }

    /// A path resolver rooted at the working directory with the
    /// configured search path behind it.
    pub fn resolver(&self) -> anyhow::Result<PathResolver> {
        let base = std::env::current_dir()?;
        Ok(PathResolver::with_search_paths(
            base,
            self.search_paths.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_documented_fields() {
        let config: Config = toml::from_str(
            r#"
            search_paths = ["/tmp/sounds", "/srv/audio"]
            default_format = "aiff"
            stream_bufsize = 524288
            "#,
        )
        .unwrap();
        assert_eq!(config.search_paths.len(), 2);
        assert_eq!(config.default_format.as_deref(), Some("aiff"));
        assert_eq!(config.stream_bufsize, Some(524288));
    }

    #[test]
    fn empty_config_is_fine() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.search_paths.is_empty());
        assert!(config.default_format.is_none());
    }
}
