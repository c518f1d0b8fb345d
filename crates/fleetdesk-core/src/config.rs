use crate::error::{DeskError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Development-only signing secret. `Config::validate` warns when it is in use.
pub const DEFAULT_JWT_SECRET: &str = "fleetdesk-dev-secret-change-me";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("fleetdesk.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Access token lifetime. Reported to clients as `expires_in` seconds.
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: i64,
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

fn default_jwt_secret() -> String {
    DEFAULT_JWT_SECRET.to_string()
}

fn default_ttl_minutes() -> i64 {
    60
}

fn default_issuer() -> String {
    "fleetdesk".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            ttl_minutes: default_ttl_minutes(),
            issuer: default_issuer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_geocode_url")]
    pub base_url: String,
    /// Nominatim's usage policy requires an identifying agent.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_geocode_timeout")]
    pub timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_geocode_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_user_agent() -> String {
    concat!("fleetdesk/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_geocode_timeout() -> u64 {
    5000
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_geocode_url(),
            user_agent: default_user_agent(),
            timeout_ms: default_geocode_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub service_account_path: Option<PathBuf>,
    /// Overrides the OAuth2 token endpoint from the service account file.
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub send_base_url: Option<String>,
}

impl PushConfig {
    pub fn is_configured(&self) -> bool {
        self.project_id.is_some() && self.service_account_path.is_some()
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    #[serde(default)]
    pub push: PushConfig,
}

impl Config {
    /// Load from a YAML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.auth.jwt_secret == DEFAULT_JWT_SECRET {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "auth.jwt_secret is the development default; set FLEETDESK_JWT_SECRET"
                    .to_string(),
            });
        }
        if self.auth.jwt_secret.len() < 16 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "auth.jwt_secret must be at least 16 characters".to_string(),
            });
        }
        if self.auth.ttl_minutes <= 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "auth.ttl_minutes must be positive".to_string(),
            });
        }
        if self.push.project_id.is_some() != self.push.service_account_path.is_some() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "push needs both project_id and service_account_path; notifications disabled"
                    .to_string(),
            });
        }

        warnings
    }

    /// Fail on any `Error`-level warning.
    pub fn ensure_valid(&self) -> Result<()> {
        let errors: Vec<String> = self
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DeskError::Config(errors.join("; ")))
        }
    }
}
