use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::state::Limits;

#[derive(Debug, Clone)]
pub struct Config {
    // http server configuration
    /// Port for the API HTTP server (HTTP routes + upload WebSocket)
    pub api_port: u16,

    // storage configuration
    /// Sandbox root holding one directory per account,
    ///  created if it does not exist
    pub cloud_path: PathBuf,
    /// Path and size limits, quota ceiling, idle timeout
    pub limits: Limits,
    /// Whether to rescan the sandbox and overwrite quota rows at startup
    pub reconcile_on_start: bool,

    // data store configuration
    /// a path to a sqlite database, if not set then an
    ///  in-memory database will be used
    pub sqlite_path: Option<PathBuf>,

    // auth configuration
    /// Credential to account id table
    pub access_tokens: BTreeMap<String, String>,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}
