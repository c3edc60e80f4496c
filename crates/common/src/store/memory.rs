use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::provider::{MetadataStore, StoreError};
use crate::account::AccountId;
use crate::links::PublicLink;

/// In-memory metadata store
///
/// Each call takes the lock once, so `add_capacity` is atomic with
///  respect to every other call on the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataStore {
    inner: Arc<Mutex<MemoryMetadataStoreInner>>,
    offline: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct MemoryMetadataStoreInner {
    capacities: HashMap<AccountId, i64>,
    links: HashMap<String, PublicLink>,
    registered: HashSet<AccountId>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryMetadataStoreError {
    #[error("memory store is offline")]
    Offline,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail until switched back. Lets callers
    ///  exercise their store-failure paths.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError<MemoryMetadataStoreError>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Provider(MemoryMetadataStoreError::Offline));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    type Error = MemoryMetadataStoreError;

    async fn capacity(&self, account: &AccountId) -> Result<Option<i64>, StoreError<Self::Error>> {
        self.check()?;
        Ok(self.inner.lock().capacities.get(account).copied())
    }

    async fn set_capacity(
        &self,
        account: &AccountId,
        bytes: i64,
    ) -> Result<(), StoreError<Self::Error>> {
        self.check()?;
        self.inner.lock().capacities.insert(account.clone(), bytes);
        Ok(())
    }

    async fn add_capacity(
        &self,
        account: &AccountId,
        delta: i64,
    ) -> Result<(), StoreError<Self::Error>> {
        self.check()?;
        let mut inner = self.inner.lock();
        let capacity = inner.capacities.entry(account.clone()).or_insert(0);
        *capacity = capacity.saturating_add(delta);
        Ok(())
    }

    async fn capacity_accounts(&self) -> Result<Vec<AccountId>, StoreError<Self::Error>> {
        self.check()?;
        Ok(self.inner.lock().capacities.keys().cloned().collect())
    }

    async fn insert_link(&self, link: &PublicLink) -> Result<(), StoreError<Self::Error>> {
        self.check()?;
        let mut inner = self.inner.lock();
        if inner.links.contains_key(&link.token) {
            return Err(StoreError::DuplicateToken(link.token.clone()));
        }
        inner.links.insert(link.token.clone(), link.clone());
        Ok(())
    }

    async fn link(&self, token: &str) -> Result<Option<PublicLink>, StoreError<Self::Error>> {
        self.check()?;
        Ok(self.inner.lock().links.get(token).cloned())
    }

    async fn delete_link(
        &self,
        account: &AccountId,
        token: &str,
    ) -> Result<bool, StoreError<Self::Error>> {
        self.check()?;
        let mut inner = self.inner.lock();
        match inner.links.get(token) {
            Some(link) if &link.account == account => {
                inner.links.remove(token);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_links_under(&self, prefix: &str) -> Result<u64, StoreError<Self::Error>> {
        self.check()?;
        let mut inner = self.inner.lock();
        let before = inner.links.len();
        inner.links.retain(|_, link| !link.path.starts_with(prefix));
        Ok((before - inner.links.len()) as u64)
    }

    async fn rename_links_under(
        &self,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<u64, StoreError<Self::Error>> {
        self.check()?;
        let mut inner = self.inner.lock();
        let mut renamed = 0;
        for link in inner.links.values_mut() {
            if let Some(rest) = link.path.strip_prefix(old_prefix) {
                link.path = format!("{}{}", new_prefix, rest);
                renamed += 1;
            }
        }
        Ok(renamed)
    }

    async fn register(&self, account: &AccountId) -> Result<bool, StoreError<Self::Error>> {
        self.check()?;
        Ok(self.inner.lock().registered.insert(account.clone()))
    }

    async fn is_registered(&self, account: &AccountId) -> Result<bool, StoreError<Self::Error>> {
        self.check()?;
        Ok(self.inner.lock().registered.contains(account))
    }
}
