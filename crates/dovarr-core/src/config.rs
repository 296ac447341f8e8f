//! Process configuration from environment variables.
//!
//! Mount paths and integration endpoints come from the environment; runtime
//! policy (auto-process mode, backup behavior, scan cadence) lives in the
//! catalog settings table so operators can change it without a restart.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Connection details for one external media manager instance.
#[derive(Debug, Clone)]
pub struct ArrInstance {
    pub url: String,
    pub api_key: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the catalog database and exports.
    pub config_dir: PathBuf,
    /// Scratch directory for conversion workspaces and probe samples.
    pub temp_dir: PathBuf,
    /// Movie library root.
    pub movies_dir: PathBuf,
    /// TV library root.
    pub tv_dir: PathBuf,
    /// Optional webhook endpoint for event notifications.
    pub webhook_url: Option<String>,
    /// Optional Radarr instance for recent-import polling.
    pub radarr: Option<ArrInstance>,
    /// Optional Sonarr instance for recent-import polling.
    pub sonarr: Option<ArrInstance>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("/config"),
            temp_dir: PathBuf::from("/temp"),
            movies_dir: PathBuf::from("/movies"),
            tv_dir: PathBuf::from("/tv"),
            webhook_url: None,
            radarr: None,
            sonarr: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup (testable seam).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();

        let path_or = |key: &str, default: PathBuf| {
            lookup(key).map(PathBuf::from).unwrap_or(default)
        };

        let arr = |url_key: &str, key_key: &str| match (lookup(url_key), lookup(key_key)) {
            (Some(url), Some(api_key)) if !url.is_empty() && !api_key.is_empty() => {
                Some(ArrInstance {
                    url: url.trim_end_matches('/').to_string(),
                    api_key,
                })
            }
            _ => None,
        };

        Self {
            config_dir: path_or("CONFIG_DIR", defaults.config_dir),
            temp_dir: path_or("TEMP_DIR", defaults.temp_dir),
            movies_dir: path_or("MOVIES_DIR", defaults.movies_dir),
            tv_dir: path_or("TV_DIR", defaults.tv_dir),
            webhook_url: lookup("WEBHOOK_URL").filter(|s| !s.is_empty()),
            radarr: arr("RADARR_URL", "RADARR_API_KEY"),
            sonarr: arr("SONARR_URL", "SONARR_API_KEY"),
        }
    }

    /// Path to the SQLite catalog database.
    pub fn database_path(&self) -> PathBuf {
        self.config_dir.join("dovarr.db")
    }

    /// Validate the configuration.
    ///
    /// Missing config/temp mounts are fatal (the catalog and scratch space
    /// must land on real volumes); missing media roots only warn, since the
    /// scheduler skips unmounted roots per scan.
    pub fn validate(&self) -> Result<Vec<String>> {
        for (name, path) in [("CONFIG_DIR", &self.config_dir), ("TEMP_DIR", &self.temp_dir)] {
            if !path.exists() {
                return Err(Error::Validation(format!(
                    "{name} path does not exist: {}",
                    path.display()
                )));
            }
        }

        let mut warnings = Vec::new();
        for (name, path) in [("MOVIES_DIR", &self.movies_dir), ("TV_DIR", &self.tv_dir)] {
            if !path.exists() {
                warnings.push(format!(
                    "{name} ({}) is not mounted; it will be skipped during scans",
                    path.display()
                ));
            }
        }

        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn defaults_when_env_empty() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.config_dir, PathBuf::from("/config"));
        assert_eq!(config.temp_dir, PathBuf::from("/temp"));
        assert_eq!(config.movies_dir, PathBuf::from("/movies"));
        assert_eq!(config.tv_dir, PathBuf::from("/tv"));
        assert!(config.webhook_url.is_none());
        assert!(config.radarr.is_none());
    }

    #[test]
    fn env_overrides() {
        let map = HashMap::from([
            ("CONFIG_DIR", "/data/config"),
            ("WEBHOOK_URL", "https://example.test/hook"),
            ("RADARR_URL", "http://radarr:7878/"),
            ("RADARR_API_KEY", "abc123"),
        ]);
        let config = Config::from_lookup(lookup(&map));
        assert_eq!(config.config_dir, PathBuf::from("/data/config"));
        assert_eq!(config.webhook_url.as_deref(), Some("https://example.test/hook"));
        let radarr = config.radarr.expect("radarr configured");
        assert_eq!(radarr.url, "http://radarr:7878");
        assert_eq!(radarr.api_key, "abc123");
    }

    #[test]
    fn arr_requires_both_url_and_key() {
        let map = HashMap::from([("SONARR_URL", "http://sonarr:8989")]);
        let config = Config::from_lookup(lookup(&map));
        assert!(config.sonarr.is_none());
    }

    #[test]
    fn database_path_under_config_dir() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.database_path(), PathBuf::from("/config/dovarr.db"));
    }
}
