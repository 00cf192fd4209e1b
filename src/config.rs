use std::path::{Path, PathBuf};

use color_eyre::Result;
use color_eyre::eyre::{Context, eyre};
use serde::{Deserialize, Serialize};

use crate::services::listens::sync::DEFAULT_PAGE_SIZE;

const DEFAULT_CONFIG: &str = r#"# Where listens are stored
database = "~/.local/share/listen-sync/listens.db"

# Create an app at https://developer.spotify.com/dashboard and add the redirect URI.
# SPOTIFY_CLIENT_ID, SPOTIFY_CLIENT_SECRET and SPOTIFY_REDIRECT_URI are used when
# this section is missing.
[spotify]
client_id = ""
client_secret = ""
redirect_uri = "http://127.0.0.1:8888/callback"

[sync]
# Recently played items requested per run (Spotify allows at most 50)
page_size = 50
"#;

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    spotify: Option<SpotifyConfig>,
    #[serde(default)]
    sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&contents)
            .context(format!("Failed to parse config file: {}", path.display()))
    }

    fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Default config file location
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("listen-sync").join("config.toml"))
    }

    /// Load config from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path().ok_or(eyre!("No config directory found"))?;

        Self::from_file(&config_path)
    }

    /// Write the commented default config, unless a config file already exists
    pub fn create_default() -> Result<PathBuf> {
        let config_path = Self::config_path().ok_or(eyre!("No config directory found"))?;
        Self::write_default(&config_path)?;
        Ok(config_path)
    }

    fn write_default(path: &Path) -> Result<()> {
        if path.exists() {
            tracing::info!("Config file already exists at {}", path.display());
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context(format!(
                "Failed to create config directory: {}",
                parent.display()
            ))?;
        }
        std::fs::write(path, DEFAULT_CONFIG)
            .context(format!("Failed to write config file: {}", path.display()))
    }

    /// Expand ~ to home directory
    fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Get expanded database path
    pub fn database_path(&self) -> PathBuf {
        match self.database {
            Some(ref database) => Self::expand_path(database),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("listen-sync")
                .join("listens.db"),
        }
    }

    /// Spotify app credentials, from the config file or the environment
    pub fn spotify_config(&self) -> Result<SpotifyConfig> {
        let spotify = match self.spotify {
            Some(ref spotify) => spotify.clone(),
            None => SpotifyConfig {
                client_id: std::env::var("SPOTIFY_CLIENT_ID").unwrap_or_default(),
                client_secret: std::env::var("SPOTIFY_CLIENT_SECRET").unwrap_or_default(),
                redirect_uri: std::env::var("SPOTIFY_REDIRECT_URI")
                    .unwrap_or_else(|_| "http://127.0.0.1:8888/callback".to_string()),
            },
        };

        if spotify.client_id.is_empty() || spotify.client_secret.is_empty() {
            return Err(eyre!(
                "Spotify client id and secret are required, set them in the [spotify] config section"
            ));
        }
        Ok(spotify)
    }

    /// Recently played page size, within what Spotify accepts
    pub fn page_size(&self) -> u32 {
        self.sync.page_size.clamp(1, DEFAULT_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = Config::from_toml(DEFAULT_CONFIG).unwrap();

        assert_eq!(config.page_size(), 50);
        assert!(config.database_path().ends_with("listen-sync/listens.db"));
        // Shipped with empty credentials on purpose
        assert!(config.spotify_config().is_err());
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
            database = "/var/lib/listens.db"

            [spotify]
            client_id = "id"
            client_secret = "secret"
            redirect_uri = "http://localhost:9000/cb"

            [sync]
            page_size = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path(), PathBuf::from("/var/lib/listens.db"));
        assert_eq!(config.page_size(), 50);
        assert_eq!(
            config.spotify_config().unwrap(),
            SpotifyConfig {
                client_id: "id".into(),
                client_secret: "secret".into(),
                redirect_uri: "http://localhost:9000/cb".into(),
            }
        );
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();

        assert_eq!(config.page_size(), DEFAULT_PAGE_SIZE);
        assert!(config.database_path().ends_with("listen-sync/listens.db"));
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(Config::expand_path("~/music/db"), home.join("music/db"));
        }
        assert_eq!(Config::expand_path("/abs/db"), PathBuf::from("/abs/db"));
    }

    #[test]
    fn test_from_file_and_write_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert!(Config::from_file(&path).is_err());

        Config::write_default(&path).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.page_size(), 50);

        // An existing file is left alone
        std::fs::write(&path, "[sync]\npage_size = 10\n").unwrap();
        Config::write_default(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap().page_size(), 10);
    }
}
