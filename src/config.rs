use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = ".gatorconfig.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Connection string for the SQLite store
    #[serde(default = "default_db_url")]
    pub db_url: String,
    /// Name of the user commands act on behalf of
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user_name: Option<String>,
    /// Upper bound on a single feed request, in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_db_url() -> String {
    "sqlite:gator.db?mode=rwc".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: default_db_url(),
            current_user_name: None,
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl Config {
    /// Location of the config file: `$GATOR_CONFIG`, else `~/.gatorconfig.toml`.
    pub fn default_path() -> anyhow::Result<PathBuf> {
        if let Ok(path) = std::env::var("GATOR_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        let home = std::env::var("HOME")
            .map_err(|_| anyhow::anyhow!("HOME environment variable not set"))?;
        Ok(PathBuf::from(home).join(CONFIG_FILE_NAME))
    }

    /// Load the config at `path`. A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `DATABASE_URL` wins over the file so one-off runs can point elsewhere.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.db_url.clone())
    }

    pub fn set_user<P: AsRef<Path>>(&mut self, name: &str, path: P) -> anyhow::Result<()> {
        self.current_user_name = Some(name.to_string());
        self.save(path)
    }
}
