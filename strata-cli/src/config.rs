//! Project configuration file (`strata.toml`).
//!
//! Command-line flags always win over the config file; the config file
//! exists so day-to-day invocations are just `strata update`.
//!
//! ```toml
//! changelog_file = "db/changelog.toml"
//! url = "postgres://localhost:5432/app"
//! username = "app"
//! contexts = ["dev"]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::CliResult;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "strata.toml";

/// Project-level defaults for connection and changelog settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrataConfig {
    /// Path to the root changelog file.
    #[serde(default)]
    pub changelog_file: Option<PathBuf>,
    /// Database connection URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Database username.
    #[serde(default)]
    pub username: Option<String>,
    /// Database password. Prefer STRATA_PASSWORD over storing it here.
    #[serde(default)]
    pub password: Option<String>,
    /// Default contexts.
    #[serde(default)]
    pub contexts: Vec<String>,
    /// Default labels.
    #[serde(default)]
    pub labels: Vec<String>,
}

impl StrataConfig {
    /// Load `strata.toml` from the working directory, or defaults if the
    /// file does not exist.
    pub async fn load() -> CliResult<Self> {
        Self::load_from(Path::new(CONFIG_FILE)).await
    }

    /// Load a config file from a specific path.
    pub async fn load_from(path: &Path) -> CliResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let config = StrataConfig::load_from(Path::new("/nonexistent/strata.toml"))
            .await
            .unwrap();
        assert!(config.url.is_none());
        assert!(config.contexts.is_empty());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        tokio::fs::write(
            &path,
            "changelog_file = \"db/changelog.toml\"\nurl = \"postgres://localhost/app\"\ncontexts = [\"dev\"]\n",
        )
        .await
        .unwrap();

        let config = StrataConfig::load_from(&path).await.unwrap();
        assert_eq!(
            config.changelog_file,
            Some(PathBuf::from("db/changelog.toml"))
        );
        assert_eq!(config.url.as_deref(), Some("postgres://localhost/app"));
        assert_eq!(config.contexts, vec!["dev"]);
    }
}
