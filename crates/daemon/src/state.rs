use std::collections::BTreeMap;
use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use common::quota::DEFAULT_CEILING;
use common::sandbox::SandboxLimits;

pub const APP_NAME: &str = "stratus";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "db.sqlite";
pub const CLOUD_DIR_NAME: &str = "cloud";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port for the API server (HTTP + upload WebSocket)
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Sandbox root, if not the `cloud/` directory next to the config
    #[serde(default)]
    pub cloud_path: Option<PathBuf>,
    #[serde(default)]
    pub limits: Limits,
    /// Credential to account id table for the static token verifier
    #[serde(default)]
    pub access_tokens: BTreeMap<String, String>,
}

fn default_api_port() -> u16 {
    5010
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            cloud_path: None,
            limits: Limits::default(),
            access_tokens: BTreeMap::new(),
        }
    }
}

/// Per-account and per-path limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_path_length: usize,
    pub max_indir_length: usize,
    pub max_program_length: usize,
    /// Quota ceiling per account, in bytes
    pub max_cloud_capacity: u64,
    /// Idle period after which an upload session closes
    pub sleep_timeout_ms: u64,
    /// Requests an account may make before being refused
    pub request_limit: u64,
}

impl Default for Limits {
    fn default() -> Self {
        let sandbox = SandboxLimits::default();
        Self {
            max_path_length: sandbox.max_path_length,
            max_indir_length: sandbox.max_indir_length,
            max_program_length: sandbox.max_program_length,
            max_cloud_capacity: DEFAULT_CEILING,
            sleep_timeout_ms: 60_000,
            request_limit: 500,
        }
    }
}

impl Limits {
    pub fn sandbox(&self) -> SandboxLimits {
        SandboxLimits {
            max_path_length: self.max_path_length,
            max_indir_length: self.max_indir_length,
            max_program_length: self.max_program_length,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the stratus directory (~/.stratus)
    pub stratus_dir: PathBuf,
    /// Path to the SQLite database
    pub db_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the stratus directory path (custom or default ~/.stratus)
    pub fn stratus_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new stratus state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let stratus_dir = Self::stratus_dir(custom_path)?;

        if stratus_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&stratus_dir)?;

        let config = config.unwrap_or_default();
        let config_path = stratus_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        // Create empty database (just touch the file, it will be migrated by the service)
        let db_path = stratus_dir.join(DB_FILE_NAME);
        fs::write(&db_path, "")?;

        let state = Self {
            stratus_dir,
            db_path,
            config_path,
            config,
        };
        fs::create_dir_all(state.cloud_path())?;

        Ok(state)
    }

    /// Load existing state from the stratus directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let stratus_dir = Self::stratus_dir(custom_path)?;

        if !stratus_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let db_path = stratus_dir.join(DB_FILE_NAME);
        let config_path = stratus_dir.join(CONFIG_FILE_NAME);

        if !db_path.exists() {
            return Err(StateError::MissingFile(DB_FILE_NAME.to_string()));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            stratus_dir,
            db_path,
            config_path,
            config,
        })
    }

    /// The sandbox root, honoring `cloud_path` when set
    pub fn cloud_path(&self) -> PathBuf {
        self.config
            .cloud_path
            .clone()
            .unwrap_or_else(|| self.stratus_dir.join(CLOUD_DIR_NAME))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("stratus directory not initialized. Run 'stratus init' first")]
    NotInitialized,

    #[error("stratus directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("state");

        let mut config = AppConfig::default();
        config
            .access_tokens
            .insert("secret".to_string(), "u1".to_string());
        let created = AppState::init(Some(dir.clone()), Some(config.clone())).unwrap();
        assert!(created.db_path.exists());
        assert!(created.cloud_path().is_dir());

        let loaded = AppState::load(Some(dir.clone())).unwrap();
        assert_eq!(loaded.config, config);
        assert_eq!(loaded.cloud_path(), dir.join(CLOUD_DIR_NAME));

        assert!(matches!(
            AppState::init(Some(dir), None),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_uninitialized() {
        let temp = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(temp.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_partial_config_gets_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            api_port = 7000

            [limits]
            max_cloud_capacity = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.api_port, 7000);
        assert_eq!(config.limits.max_cloud_capacity, 1000);
        assert_eq!(config.limits.request_limit, 500);
        assert_eq!(config.limits.sandbox(), SandboxLimits::default());
    }
}
