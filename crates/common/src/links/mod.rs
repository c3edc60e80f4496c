use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::sandbox::{is_under, normalize, PathSandbox};
use crate::store::{MetadataStore, StoreError};

pub const TOKEN_LENGTH: usize = 21;

const TOKEN_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

// a collision at 126 bits of entropy means something is wrong with the rng
const MAX_TOKEN_ATTEMPTS: usize = 3;

/// A shared path, addressed by an opaque token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicLink {
    pub token: String,
    pub account: AccountId,
    /// Normalized absolute path, ending in a single `/`
    pub path: String,
}

impl PublicLink {
    pub fn target(&self) -> PathBuf {
        PathBuf::from(self.path.trim_end_matches('/'))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LinkError<T> {
    #[error("path is outside the account tree")]
    OutsideAccount,
    #[error("failed to allocate a unique link token")]
    TokenExhausted,
    #[error(transparent)]
    Store(#[from] StoreError<T>),
}

/// Generate a fresh URL-safe link token
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LENGTH)
        .map(|_| TOKEN_ALPHABET[rng.random_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Token to path index for shared links.
///
/// Deletes and renames of a path cascade to every link at or below it.
#[derive(Debug, Clone)]
pub struct PublicLinkIndex<S: MetadataStore> {
    store: S,
    sandbox: Arc<PathSandbox>,
}

impl<S: MetadataStore> PublicLinkIndex<S> {
    pub fn new(store: S, sandbox: Arc<PathSandbox>) -> Self {
        Self { store, sandbox }
    }

    /// Share `path`, which must sit inside `account`'s tree.
    pub async fn create(
        &self,
        account: &AccountId,
        path: &Path,
    ) -> Result<String, LinkError<S::Error>> {
        let path = path.to_str().ok_or(LinkError::OutsideAccount)?;
        let account_root = self.sandbox.account_root(account);
        let account_root = account_root.to_str().ok_or(LinkError::OutsideAccount)?;
        let normalized = normalize(path);
        if !is_under(&normalized, account_root)
            || normalized
                .split('/')
                .any(|segment| segment == "." || segment == "..")
        {
            return Err(LinkError::OutsideAccount);
        }

        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let link = PublicLink {
                token: generate_token(),
                account: account.clone(),
                path: normalized.clone(),
            };
            match self.store.insert_link(&link).await {
                Ok(()) => {
                    tracing::debug!(account = %account, token = %link.token, "created public link");
                    return Ok(link.token);
                }
                Err(StoreError::DuplicateToken(token)) => {
                    tracing::warn!(token = %token, "link token collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LinkError::TokenExhausted)
    }

    pub async fn resolve_link(&self, token: &str) -> Option<PublicLink> {
        match self.store.link(token).await {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(error = %e, "failed to look up public link");
                None
            }
        }
    }

    pub async fn resolve(&self, token: &str) -> Option<PathBuf> {
        self.resolve_link(token).await.map(|link| link.target())
    }

    /// Remove one of `account`'s links. Links owned by others are left
    ///  alone and reported as not deleted.
    pub async fn delete_by_token(&self, account: &AccountId, token: &str) -> bool {
        match self.store.delete_link(account, token).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!(account = %account, error = %e, "failed to delete public link");
                false
            }
        }
    }

    /// Drop every link at or below `path`
    pub async fn delete_by_path_prefix(&self, path: &Path) -> u64 {
        let prefix = normalize(&path.to_string_lossy());
        match self.store.delete_links_under(&prefix).await {
            Ok(deleted) => {
                if deleted > 0 {
                    tracing::debug!(prefix = %prefix, deleted, "cascaded link deletion");
                }
                deleted
            }
            Err(e) => {
                tracing::warn!(prefix = %prefix, error = %e, "failed to cascade link deletion");
                0
            }
        }
    }

    /// Point every link at or below `old` at the same place below `new`
    pub async fn rename_path_prefix(&self, old: &Path, new: &Path) -> u64 {
        let old = normalize(&old.to_string_lossy());
        let new = normalize(&new.to_string_lossy());
        match self.store.rename_links_under(&old, &new).await {
            Ok(renamed) => renamed,
            Err(e) => {
                tracing::warn!(old = %old, new = %new, error = %e, "failed to rename public links");
                0
            }
        }
    }
}
