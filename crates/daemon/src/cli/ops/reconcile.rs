use std::fmt::Write;

use clap::Args;
use url::Url;

use common::quota::QuotaLedger;
use stratus_daemon::database::{Database, DatabaseSetupError};
use stratus_daemon::state::{AppState, StateError};

/// Rebuild every account's usage from the bytes on disk
#[derive(Args, Debug, Clone)]
pub struct Reconcile;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
    #[error("invalid database path: {0}")]
    InvalidDatabaseUrl(String),
    #[error("database error: {0}")]
    Database(#[from] DatabaseSetupError),
    #[error("scan failed: {0}")]
    Scan(#[from] std::io::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Reconcile {
    type Error = ReconcileError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let url = Url::parse(&format!("sqlite://{}", state.db_path.display()))
            .map_err(|e| ReconcileError::InvalidDatabaseUrl(e.to_string()))?;
        let database = Database::connect(&url).await?;

        let ledger = QuotaLedger::new(database, state.config.limits.max_cloud_capacity);
        let totals = ledger.reconcile(&state.cloud_path()).await?;

        let mut output = format!("Reconciled {} account(s)", totals.len());
        for (account, bytes) in totals {
            let _ = write!(output, "\n  {}: {} bytes", account, bytes);
        }
        Ok(output)
    }
}
