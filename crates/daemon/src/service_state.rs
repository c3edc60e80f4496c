use std::sync::Arc;
use std::time::Duration;

use url::Url;

use common::auth::{AccessTokenVerifier, RequestLedger, StaticTokenVerifier};
use common::links::PublicLinkIndex;
use common::quota::QuotaLedger;
use common::sandbox::PathSandbox;
use common::upload::SessionContext;

use super::database::{Database, DatabaseRequestLedger, DatabaseSetupError};
use super::service_config::Config;

/// Main service state - one store handle shared by every component
#[derive(Clone)]
pub struct State {
    database: Database,
    sandbox: Arc<PathSandbox>,
    quota: QuotaLedger<Database>,
    links: PublicLinkIndex<Database>,
    verifier: Arc<dyn AccessTokenVerifier>,
    requests: Arc<dyn RequestLedger>,
    idle_timeout: Duration,
}

impl State {
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        // 1. Setup database
        let sqlite_database_url = match config.sqlite_path {
            Some(ref path) => {
                // check that the path exists
                if !path.exists() {
                    return Err(StateSetupError::DatabasePathDoesNotExist);
                }
                // parse the path into a URL
                Url::parse(&format!("sqlite://{}", path.display()))
                    .map_err(|_| StateSetupError::InvalidDatabaseUrl)
            }
            // otherwise just set up an in-memory database
            None => Url::parse("sqlite::memory:").map_err(|_| StateSetupError::InvalidDatabaseUrl),
        }?;
        tracing::info!("Database URL: {:?}", sqlite_database_url);
        let database = Database::connect(&sqlite_database_url).await?;

        // 2. Setup sandbox root
        tokio::fs::create_dir_all(&config.cloud_path)
            .await
            .map_err(StateSetupError::CloudRoot)?;
        let sandbox = Arc::new(PathSandbox::new(
            config.cloud_path.clone(),
            config.limits.sandbox(),
        ));

        Ok(Self::new(
            database.clone(),
            sandbox,
            StaticTokenVerifier::from_iter(config.access_tokens.clone()),
            DatabaseRequestLedger::new(database, config.limits.request_limit),
            config.limits.max_cloud_capacity,
            Duration::from_millis(config.limits.sleep_timeout_ms),
        ))
    }

    /// Assemble state from already-built parts
    pub fn new(
        database: Database,
        sandbox: Arc<PathSandbox>,
        verifier: impl AccessTokenVerifier,
        requests: impl RequestLedger,
        ceiling: u64,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            quota: QuotaLedger::new(database.clone(), ceiling),
            links: PublicLinkIndex::new(database.clone(), sandbox.clone()),
            database,
            sandbox,
            verifier: Arc::new(verifier),
            requests: Arc::new(requests),
            idle_timeout,
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    pub fn quota(&self) -> &QuotaLedger<Database> {
        &self.quota
    }

    pub fn links(&self) -> &PublicLinkIndex<Database> {
        &self.links
    }

    pub fn verifier(&self) -> &dyn AccessTokenVerifier {
        self.verifier.as_ref()
    }

    pub fn requests(&self) -> &dyn RequestLedger {
        self.requests.as_ref()
    }

    /// Everything a new upload session needs
    pub fn session_context(&self) -> SessionContext<Database> {
        SessionContext {
            sandbox: self.sandbox.clone(),
            quota: self.quota.clone(),
            links: self.links.clone(),
            verifier: self.verifier.clone(),
            requests: self.requests.clone(),
            idle_timeout: self.idle_timeout,
        }
    }
}

impl AsRef<Database> for State {
    fn as_ref(&self) -> &Database {
        self.database()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("Database path does not exist")]
    DatabasePathDoesNotExist,
    #[error("Database setup error")]
    DatabaseSetupError(#[from] DatabaseSetupError),
    #[error("Invalid database URL")]
    InvalidDatabaseUrl,
    #[error("unable to create sandbox root: {0}")]
    CloudRoot(std::io::Error),
}
