pub mod utils;

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::http_server;
use crate::{ServiceConfig, ServiceState};

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const LOG_FILE_PREFIX: &str = "stratus.log";

/// Running service tasks plus the switch that stops them
pub struct ShutdownHandle {
    signal_watch: JoinHandle<()>,
    tasks: Vec<JoinHandle<()>>,
    trigger: watch::Sender<()>,
}

impl ShutdownHandle {
    /// Wait for a signal or [`ShutdownHandle::shutdown`], then give the
    ///  service tasks a bounded time to drain.
    pub async fn wait(self) {
        let _ = self.signal_watch.await;

        if timeout(FINAL_SHUTDOWN_TIMEOUT, join_all(self.tasks))
            .await
            .is_err()
        {
            tracing::error!(
                timeout_secs = FINAL_SHUTDOWN_TIMEOUT.as_secs(),
                "service tasks did not stop in time"
            );
            std::process::exit(4);
        }
    }

    pub fn shutdown(&self) {
        let _ = self.trigger.send(());
    }
}

fn log_filter(level: tracing::Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Compact stdout logging, plus a daily rolling file when `log_dir` is
///  set. The returned guards flush the writers and must outlive the
///  service.
fn init_logging(config: &ServiceConfig) -> Vec<tracing_appender::non_blocking::WorkerGuard> {
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(io::stdout());
    let mut guards = vec![stdout_guard];

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(log_filter(config.log_level));

    let file_layer = config.log_dir.as_ref().map(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!("warning: cannot create log directory {log_dir:?}: {e}");
        }
        let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
        let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
        guards.push(file_guard);

        tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(log_filter(config.log_level))
    });

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();

    utils::register_panic_logger();
    utils::report_build_info();

    guards
}

/// Overwrite every quota row with what is actually on disk. Returns the
///  total bytes across accounts.
pub async fn reconcile_quota(state: &ServiceState) -> io::Result<u64> {
    let totals = state.quota().reconcile(state.sandbox().root()).await?;
    let bytes: u64 = totals.iter().map(|(_, bytes)| bytes).sum();
    tracing::info!(accounts = totals.len(), bytes, "quota ledger matches disk");
    Ok(bytes)
}

/// Build state, heal quota drift left by the last run, exit on failure.
async fn prepare_state(config: &ServiceConfig) -> ServiceState {
    let state = match ServiceState::from_config(config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "error creating server state");
            std::process::exit(3);
        }
    };

    if config.reconcile_on_start {
        if let Err(e) = reconcile_quota(&state).await {
            tracing::error!(root = ?state.sandbox().root(), error = %e, "startup quota reconciliation failed");
            std::process::exit(3);
        }
    } else {
        tracing::warn!("skipping startup reconciliation, quota rows may have drifted");
    }

    state
}

/// Prepare state and spawn the API server.
///
/// Dropping the returned handle does not stop the service.
pub async fn start_service(config: &ServiceConfig) -> (ServiceState, ShutdownHandle) {
    let (signal_watch, trigger, shutdown_rx) = utils::graceful_shutdown_blocker();
    let state = prepare_state(config).await;

    let api_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.api_port));
    let api_state = state.clone();
    let api_task = tokio::spawn(async move {
        let api_config = http_server::Config::new(api_addr);
        if let Err(e) = http_server::run_api(api_config, api_state, shutdown_rx).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    tracing::info!(
        port = config.api_port,
        cloud = ?config.cloud_path,
        ceiling = config.limits.max_cloud_capacity,
        "serving API and uploads"
    );

    let handle = ShutdownHandle {
        signal_watch,
        tasks: vec![api_task],
        trigger,
    };
    (state, handle)
}

/// Run the service until a shutdown signal. Used by `stratus daemon`.
pub async fn spawn_service(config: &ServiceConfig) {
    let _guards = init_logging(config);
    let (_, handle) = start_service(config).await;
    handle.wait().await;
}
