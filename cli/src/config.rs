// Configuration management for the peercall server
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/peercall/config.json
// - Linux: ~/.config/peercall/config.json
// - Windows: %APPDATA%\peercall\config.json
//
// Environment variables (and a `.env` file) override the file:
// PORT, JWT_SECRET, PEERCALL_STORAGE_PATH, PEERCALL_UPLOAD_DIR

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port for the HTTP + WebSocket server
    pub listen_port: u16,

    /// Address to bind
    pub bind_address: String,

    /// Database directory (defaults to the data dir)
    pub storage_path: Option<String>,

    /// Directory for uploaded profile images (defaults to the data dir)
    pub upload_dir: Option<String>,

    /// HS256 signing secret for session tokens
    pub jwt_secret: Option<String>,

    /// Account settings
    pub auth: AuthConfig,

    /// Signaling relay settings
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// bcrypt work factor
    pub bcrypt_cost: u32,

    /// Session token lifetime in seconds
    pub token_ttl_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Maximum concurrent signaling connections (0 = unlimited)
    pub max_connections: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: 5000,
            bind_address: "0.0.0.0".to_string(),
            storage_path: None,
            upload_dir: None,
            jwt_secret: None,
            auth: AuthConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: peercall_core::account::credentials::DEFAULT_COST,
            token_ttl_secs: peercall_core::account::token::DEFAULT_TOKEN_TTL_SECS,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { max_connections: 0 }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("peercall");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the data directory path (cross-platform)
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to determine data directory")?
            .join("peercall");

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        Ok(data_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default file (creating it if missing), then
    /// apply environment overrides
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::load_from(&Self::config_file()?)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load config from `path`, or create a default file there
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Override fields from environment variables
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.listen_port = port.parse().context("Invalid PORT")?;
        }
        if let Some(secret) = lookup("JWT_SECRET") {
            self.jwt_secret = Some(secret);
        }
        if let Some(path) = lookup("PEERCALL_STORAGE_PATH") {
            self.storage_path = Some(path);
        }
        if let Some(dir) = lookup("PEERCALL_UPLOAD_DIR") {
            self.upload_dir = Some(dir);
        }
        Ok(())
    }

    /// Resolved database directory
    pub fn storage_dir(&self) -> Result<PathBuf> {
        match &self.storage_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(Self::data_dir()?.join("db")),
        }
    }

    /// Resolved upload directory
    pub fn uploads_dir(&self) -> Result<PathBuf> {
        match &self.upload_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Ok(Self::data_dir()?.join("uploads")),
        }
    }

    /// Signing secret, required to serve logins
    pub fn require_jwt_secret(&self) -> Result<&str> {
        self.jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .context("JWT secret not configured (set JWT_SECRET or `peercall config set jwt_secret <value>`)")
    }

    /// Set a config value in the default file.
    ///
    /// Only the file's own contents are rewritten; environment overrides
    /// never reach disk.
    pub fn set(key: &str, value: &str) -> Result<()> {
        Self::set_in_file(&Self::config_file()?, key, value)
    }

    /// Set a config value in the file at `path`
    pub fn set_in_file(path: &Path, key: &str, value: &str) -> Result<()> {
        let mut stored = Self::load_from(path)?;
        stored.apply(key, value)?;
        stored.save_to(path)
    }

    /// Set a config value in memory
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "listen_port" => {
                self.listen_port = value.parse().context("Invalid port number")?;
            }
            "bind_address" => {
                self.bind_address = value.to_string();
            }
            "storage_path" => {
                self.storage_path = non_empty(value);
            }
            "upload_dir" => {
                self.upload_dir = non_empty(value);
            }
            "jwt_secret" => {
                self.jwt_secret = non_empty(value);
            }
            "bcrypt_cost" => {
                let cost: u32 = value.parse().context("Invalid number")?;
                if !(4..=31).contains(&cost) {
                    anyhow::bail!("bcrypt_cost must be between 4 and 31");
                }
                self.auth.bcrypt_cost = cost;
            }
            "token_ttl_secs" => {
                self.auth.token_ttl_secs = value.parse().context("Invalid number")?;
            }
            "max_connections" => {
                self.relay.max_connections = value.parse().context("Invalid number")?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "listen_port" => Some(self.listen_port.to_string()),
            "bind_address" => Some(self.bind_address.clone()),
            "storage_path" => self.storage_path.clone(),
            "upload_dir" => self.upload_dir.clone(),
            "jwt_secret" => self.jwt_secret.as_ref().map(|_| "(set)".to_string()),
            "bcrypt_cost" => Some(self.auth.bcrypt_cost.to_string()),
            "token_ttl_secs" => Some(self.auth.token_ttl_secs.to_string()),
            "max_connections" => Some(self.relay.max_connections.to_string()),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            ("listen_port".to_string(), self.listen_port.to_string()),
            ("bind_address".to_string(), self.bind_address.clone()),
            (
                "storage_path".to_string(),
                self.storage_path.clone().unwrap_or_else(|| "(auto)".to_string()),
            ),
            (
                "upload_dir".to_string(),
                self.upload_dir.clone().unwrap_or_else(|| "(auto)".to_string()),
            ),
            (
                "jwt_secret".to_string(),
                if self.jwt_secret.is_some() { "(set)" } else { "(unset)" }.to_string(),
            ),
            ("bcrypt_cost".to_string(), self.auth.bcrypt_cost.to_string()),
            ("token_ttl_secs".to_string(), format!("{}s", self.auth.token_ttl_secs)),
            (
                "max_connections".to_string(),
                match self.relay.max_connections {
                    0 => "unlimited".to_string(),
                    n => n.to_string(),
                },
            ),
        ]
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listen_port, 5000);
        assert_eq!(config.auth.bcrypt_cost, 10);
        assert_eq!(config.relay.max_connections, 0);
        assert!(config.jwt_secret.is_none());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.listen_port, 5000);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"listen_port": 7000}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.listen_port, 7000);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.auth.bcrypt_cost, 10);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "8080"),
            ("JWT_SECRET", "s3cret"),
            ("PEERCALL_UPLOAD_DIR", "/tmp/uploads"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.listen_port, 8080);
        assert_eq!(config.require_jwt_secret().unwrap(), "s3cret");
        assert_eq!(config.uploads_dir().unwrap(), PathBuf::from("/tmp/uploads"));
        assert!(config.storage_path.is_none());
    }

    #[test]
    fn test_invalid_port_env() {
        let mut config = Config::default();
        assert!(config
            .apply_env(|key| (key == "PORT").then(|| "abc".to_string()))
            .is_err());
    }

    #[test]
    fn test_set_does_not_persist_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        // Effective view of a process running with overrides in its environment
        let mut effective = Config::load_from(&path).unwrap();
        effective
            .apply_env(|key| match key {
                "JWT_SECRET" => Some("from-env-secret".to_string()),
                "PORT" => Some("9999".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(effective.listen_port, 9999);

        Config::set_in_file(&path, "bind_address", "127.0.0.1").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("from-env-secret"));

        let stored = Config::load_from(&path).unwrap();
        assert_eq!(stored.bind_address, "127.0.0.1");
        assert_eq!(stored.listen_port, 5000);
        assert!(stored.jwt_secret.is_none());
    }

    #[test]
    fn test_set_in_file_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        Config::set_in_file(&path, "jwt_secret", "file-secret").unwrap();
        Config::set_in_file(&path, "max_connections", "3").unwrap();

        let stored = Config::load_from(&path).unwrap();
        assert_eq!(stored.jwt_secret.as_deref(), Some("file-secret"));
        assert_eq!(stored.relay.max_connections, 3);
        assert!(Config::set_in_file(&path, "nope", "1").is_err());
    }

    #[test]
    fn test_apply_and_get() {
        let mut config = Config::default();
        config.apply("max_connections", "100").unwrap();
        config.apply("jwt_secret", "abc").unwrap();

        assert_eq!(config.get("max_connections"), Some("100".to_string()));
        assert_eq!(config.get("jwt_secret"), Some("(set)".to_string()));
        assert!(config.apply("bcrypt_cost", "2").is_err());
        assert!(config.apply("nope", "1").is_err());
    }

    #[test]
    fn test_missing_secret() {
        let mut config = Config::default();
        assert!(config.require_jwt_secret().is_err());
        config.jwt_secret = Some(String::new());
        assert!(config.require_jwt_secret().is_err());
    }
}
