use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::account::AccountId;
use crate::store::{MetadataStore, StoreError};

/// Default per-account ceiling, 10 GiB
pub const DEFAULT_CEILING: u64 = 10 * 1024 * 1024 * 1024;

/// Bytes consumed per account.
///
/// The ledger is a soft quota: admission is advisory and concurrent
///  uploads may overshoot by at most one declared upload size each.
///  [`QuotaLedger::reconcile`] heals any drift from the filesystem.
///
/// Store failures never reach callers of the infallible accessors.
///  Reads degrade to 0 and writes are dropped, both with a warning.
#[derive(Debug, Clone)]
pub struct QuotaLedger<S: MetadataStore> {
    store: S,
    ceiling: u64,
}

impl<S: MetadataStore> QuotaLedger<S> {
    pub fn new(store: S, ceiling: u64) -> Self {
        Self { store, ceiling }
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn try_capacity(&self, account: &AccountId) -> Result<u64, StoreError<S::Error>> {
        let capacity = self.store.capacity(account).await?.unwrap_or(0);
        Ok(capacity.max(0) as u64)
    }

    pub async fn capacity(&self, account: &AccountId) -> u64 {
        match self.try_capacity(account).await {
            Ok(capacity) => capacity,
            Err(e) => {
                tracing::warn!(account = %account, error = %e, "failed to read capacity, assuming 0");
                0
            }
        }
    }

    pub async fn set_capacity(&self, account: &AccountId, bytes: u64) {
        let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        if let Err(e) = self.store.set_capacity(account, bytes).await {
            tracing::warn!(account = %account, bytes, error = %e, "failed to set capacity");
        }
    }

    pub async fn change_capacity(&self, account: &AccountId, delta: i64) {
        if delta == 0 {
            return;
        }
        if let Err(e) = self.store.add_capacity(account, delta).await {
            tracing::warn!(account = %account, delta, error = %e, "failed to change capacity");
        }
    }

    /// Whether `bytes` more would still fit under the ceiling
    pub async fn admits(&self, account: &AccountId, bytes: u64) -> bool {
        self.admits_replacing(account, bytes, 0).await
    }

    /// Like [`QuotaLedger::admits`], for bytes that will replace `released`
    ///  bytes already charged to the account
    pub async fn admits_replacing(&self, account: &AccountId, bytes: u64, released: u64) -> bool {
        self.capacity(account)
            .await
            .saturating_sub(released)
            .checked_add(bytes)
            .is_some_and(|total| total <= self.ceiling)
    }

    /// Recompute every account's capacity from the bytes on disk and
    ///  overwrite the persisted values.
    ///
    /// Each directory directly under `root` is an account. Accounts that
    ///  still have a row but no directory are reset to 0. Returns the
    ///  totals that were written.
    pub async fn reconcile(&self, root: &Path) -> io::Result<Vec<(AccountId, u64)>> {
        let root = root.to_path_buf();
        let mut totals = tokio::task::spawn_blocking(move || scan_accounts(&root))
            .await
            .map_err(io::Error::other)??;

        match self.store.capacity_accounts().await {
            Ok(accounts) => {
                for account in accounts {
                    if !totals.iter().any(|(scanned, _)| *scanned == account) {
                        totals.push((account, 0));
                    }
                }
                totals.sort();
            }
            Err(e) => tracing::warn!(error = %e, "failed to list quota rows, keeping stale ones"),
        }

        for (account, bytes) in &totals {
            self.set_capacity(account, *bytes).await;
            tracing::debug!(account = %account, bytes, "reconciled capacity");
        }
        tracing::info!(accounts = totals.len(), "quota reconciliation complete");
        Ok(totals)
    }
}

fn scan_accounts(root: &Path) -> io::Result<Vec<(AccountId, u64)>> {
    let mut totals = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!(path = ?entry.path(), "skipping non utf-8 account directory");
            continue;
        };
        totals.push((AccountId::from(name), disk_usage(&entry.path())));
    }
    totals.sort();
    Ok(totals)
}

/// Total size of the regular files at or below `path`. Symlinks are not
///  followed; unreadable entries are skipped.
pub fn disk_usage(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// [`disk_usage`] off the async runtime
pub async fn tree_size(path: PathBuf) -> io::Result<u64> {
    tokio::task::spawn_blocking(move || disk_usage(&path))
        .await
        .map_err(io::Error::other)
}
