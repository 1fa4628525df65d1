use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// HS256 signing secret for session tokens. Override in production.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
}

fn default_jwt_secret() -> String {
    "dev-secret-change-me".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Bound on per-account lock acquisition. On expiry the operation fails
    /// retryable instead of hanging.
    pub lock_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub sqlite_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            sqlite_url: "sqlite:bank.db".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        serde_yaml::from_str(&content).expect("Failed to parse config yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_parses_with_defaults() {
        let yaml = r#"
log_level: info
log_dir: ./logs
log_file: minibank.log
use_json: false
rotation: daily
gateway:
  host: 127.0.0.1
  port: 8080
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.ledger.lock_timeout_ms, 3_000);
        assert!(matches!(config.storage.backend, StorageBackend::Memory));
    }

    #[test]
    fn storage_section_overrides() {
        let yaml = r#"
log_level: info
log_dir: ./logs
log_file: minibank.log
use_json: true
rotation: hourly
gateway:
  host: 0.0.0.0
  port: 9000
ledger:
  lock_timeout_ms: 250
storage:
  backend: sqlite
  sqlite_url: "sqlite:data/bank.db"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config.storage.backend, StorageBackend::Sqlite));
        assert_eq!(config.ledger.lock_timeout_ms, 250);
    }
}
