use anyhow::Context;
use fleetdesk_core::config::Config;
use fleetdesk_core::db::Store;
use std::path::{Path, PathBuf};

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub db: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub jwt_secret: Option<String>,
}

/// Load the config file (defaults when it does not exist), then apply
/// flag and environment overrides.
///
/// Priority:
/// 1. `--db` / `--port` / ... flags and their `FLEETDESK_*` env vars
/// 2. The YAML file named by `--config` / `FLEETDESK_CONFIG`
/// 3. Built-in defaults
pub fn load(path: &Path, overrides: &Overrides) -> anyhow::Result<Config> {
    let mut config = Config::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    if let Some(db) = &overrides.db {
        config.database.path = db.clone();
    }
    if let Some(host) = &overrides.host {
        config.server.host = host.clone();
    }
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
    if let Some(secret) = &overrides.jwt_secret {
        config.auth.jwt_secret = secret.clone();
    }
    Ok(config)
}

/// Open the database named in `config`, creating it and its schema if needed.
pub fn open_store(config: &Config) -> anyhow::Result<Store> {
    let path = &config.database.path;
    Store::open(path).with_context(|| format!("failed to open database {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load(&dir.path().join("absent.yaml"), &Overrides::default()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, PathBuf::from("fleetdesk.db"));
    }

    #[test]
    fn flags_override_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fleetdesk.yaml");
        std::fs::write(&path, "server:\n  port: 9000\ndatabase:\n  path: from-file.db\n").unwrap();

        let config = load(&path, &Overrides::default()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.path, PathBuf::from("from-file.db"));

        let overrides = Overrides {
            db: Some(dir.path().join("flag.db")),
            port: Some(9100),
            jwt_secret: Some("flag-secret-0123456789".into()),
            ..Overrides::default()
        };
        let config = load(&path, &overrides).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.database.path, dir.path().join("flag.db"));
        assert_eq!(config.auth.jwt_secret, "flag-secret-0123456789");
    }

    #[test]
    fn broken_yaml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fleetdesk.yaml");
        std::fs::write(&path, "server: [unclosed").unwrap();
        let err = load(&path, &Overrides::default()).unwrap_err();
        assert!(format!("{err:#}").contains("failed to load config"));
    }
}
