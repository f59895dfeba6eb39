use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub mailer: MailerConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/salus.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Public origin the site is served from. Used to resolve post-login
    /// redirect targets and to build password-reset links.
    pub public_base_url: String,

    /// Whether to set the Secure flag on session cookies.
    /// Default: true for production safety. Set to false for local development without HTTPS.
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5480,
            cors_allowed_origins: vec![
                "http://localhost:5480".to_string(),
                "http://127.0.0.1:5480".to_string(),
            ],
            public_base_url: "http://localhost:5480".to_string(),
            secure_cookies: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret for the session token and the embedded access token.
    /// Required: there is no built-in default. Usually supplied via the
    /// SALUS_SESSION_SECRET environment variable rather than the config file.
    #[serde(skip_serializing)]
    pub session_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailerConfig {
    /// When disabled, outbound mail is logged instead of sent.
    pub enabled: bool,

    /// HTTP mail-relay endpoint that accepts a JSON message payload.
    pub endpoint: String,

    #[serde(skip_serializing)]
    pub api_key: String,

    pub from_address: String,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key: String::new(),
            from_address: "no-reply@salud.municipio.gob".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            mailer: MailerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::load_first_found()?;
        config.apply_env_overrides();

        Ok(config)
    }

    fn load_first_found() -> Result<Self> {
        for path in Self::config_paths() {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(&path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Secrets come from the environment in preference to the config file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("SALUS_SESSION_SECRET") {
            self.auth.session_secret = secret;
        }
        if let Ok(key) = std::env::var("SALUS_MAILER_API_KEY") {
            self.mailer.api_key = key;
        }
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("salus").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".salus").join("config.toml"));
        }

        paths
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.session_secret.trim().is_empty() {
            anyhow::bail!(
                "Session secret is required: set SALUS_SESSION_SECRET or [auth].session_secret"
            );
        }

        if self.mailer.enabled && self.mailer.endpoint.is_empty() {
            anyhow::bail!("Mailer endpoint cannot be empty when the mailer is enabled");
        }

        url::Url::parse(&self.server.public_base_url)
            .with_context(|| format!("Invalid public_base_url: {}", self.server.public_base_url))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_session_secret() {
        let config = Config::default();
        assert!(config.auth.session_secret.is_empty());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_config_with_secret() {
        let mut config = Config::default();
        config.auth.session_secret = "test-secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_enabled_mailer_without_endpoint() {
        let mut config = Config::default();
        config.auth.session_secret = "test-secret".to_string();
        config.mailer.enabled = true;
        assert!(config.validate().is_err());
    }
}
