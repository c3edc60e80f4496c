use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Args;

use stratus_daemon::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Port for the API server
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Sandbox root (defaults to `cloud/` inside the config directory)
    #[arg(long)]
    pub cloud_path: Option<PathBuf>,

    /// Grant a credential to an account, as CREDENTIAL=ACCOUNT. Repeatable.
    #[arg(long = "access-token", value_parser = parse_access_token)]
    pub access_tokens: Vec<(String, String)>,
}

fn parse_access_token(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((credential, account)) if !credential.is_empty() && !account.is_empty() => {
            Ok((credential.to_string(), account.to_string()))
        }
        _ => Err(format!("expected CREDENTIAL=ACCOUNT, got '{}'", value)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig::default();
        if let Some(port) = self.api_port {
            config.api_port = port;
        }
        config.cloud_path = self.cloud_path.clone();
        config.access_tokens = self
            .access_tokens
            .iter()
            .cloned()
            .collect::<BTreeMap<_, _>>();

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        Ok(format!(
            "Initialized stratus directory at {}\n  config: {}\n  database: {}\n  cloud: {}\n  accounts: {}",
            state.stratus_dir.display(),
            state.config_path.display(),
            state.db_path.display(),
            state.cloud_path().display(),
            state.config.access_tokens.len(),
        ))
    }
}
