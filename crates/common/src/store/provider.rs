use std::fmt::{Debug, Display};

use async_trait::async_trait;

use crate::account::AccountId;
use crate::links::PublicLink;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError<T> {
    /// Error raised by the backing store itself
    #[error("unhandled metadata store error: {0}")]
    Provider(#[from] T),
    /// A link row with this token already exists
    #[error("duplicate link token: {0}")]
    DuplicateToken(String),
}

/// Row storage underneath the quota ledger, the public link index and
///  account registration.
///
/// Implementations must make [`MetadataStore::add_capacity`] a single
///  atomic add at the storage layer; concurrent upload sessions rely on
///  it instead of doing their own read-modify-write.
#[async_trait]
pub trait MetadataStore: Send + Sync + Debug + Clone + 'static {
    type Error: Display + Debug + Send + Sync;

    /// Persisted capacity for an account, `None` if no row exists yet.
    ///  The value may dip below zero while concurrent writers race.
    async fn capacity(&self, account: &AccountId) -> Result<Option<i64>, StoreError<Self::Error>>;

    /// Upsert the capacity row to an absolute value
    async fn set_capacity(&self, account: &AccountId, bytes: i64)
        -> Result<(), StoreError<Self::Error>>;

    /// Atomically add `delta` (possibly negative), creating the row at
    ///  `delta` if it does not exist
    async fn add_capacity(&self, account: &AccountId, delta: i64)
        -> Result<(), StoreError<Self::Error>>;

    /// Every account that has a capacity row
    async fn capacity_accounts(&self) -> Result<Vec<AccountId>, StoreError<Self::Error>>;

    /// Insert a new link row
    ///
    /// Should fail with `StoreError::DuplicateToken` if the token is
    ///  already taken.
    async fn insert_link(&self, link: &PublicLink) -> Result<(), StoreError<Self::Error>>;

    async fn link(&self, token: &str) -> Result<Option<PublicLink>, StoreError<Self::Error>>;

    /// Delete a link owned by `account`. Returns whether a row was removed.
    async fn delete_link(
        &self,
        account: &AccountId,
        token: &str,
    ) -> Result<bool, StoreError<Self::Error>>;

    /// Delete every link whose stored path starts with `prefix`.
    ///  Both sides are normalized paths.
    async fn delete_links_under(&self, prefix: &str) -> Result<u64, StoreError<Self::Error>>;

    /// Replace the leading `old_prefix` of every matching stored path
    ///  with `new_prefix`
    async fn rename_links_under(
        &self,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<u64, StoreError<Self::Error>>;

    /// Record a registration. Returns `false` if the account was already
    ///  registered.
    async fn register(&self, account: &AccountId) -> Result<bool, StoreError<Self::Error>>;

    async fn is_registered(&self, account: &AccountId) -> Result<bool, StoreError<Self::Error>>;
}
