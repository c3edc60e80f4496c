use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::account::AccountId;

/// Turns a client credential into the account it was issued for
#[async_trait]
pub trait AccessTokenVerifier: Send + Sync + 'static {
    async fn verify(&self, credential: &str) -> Option<AccountId>;
}

/// Per-account request counter
#[async_trait]
pub trait RequestLedger: Send + Sync + 'static {
    /// Charge `cost` units to `account` and report whether the account
    ///  was under its limit before the charge. The charge is applied
    ///  even when admission is refused. Store failures refuse.
    async fn admit(&self, account: &AccountId, cost: u64) -> bool;
}

/// Verifier backed by a fixed credential table
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: Arc<HashMap<String, AccountId>>,
}

impl StaticTokenVerifier {
    pub fn new(tokens: HashMap<String, AccountId>) -> Self {
        Self {
            tokens: Arc::new(tokens),
        }
    }
}

impl<K: Into<String>, V: Into<AccountId>> FromIterator<(K, V)> for StaticTokenVerifier {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(credential, account)| (credential.into(), account.into()))
                .collect(),
        )
    }
}

#[async_trait]
impl AccessTokenVerifier for StaticTokenVerifier {
    async fn verify(&self, credential: &str) -> Option<AccountId> {
        self.tokens.get(credential).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct MemoryRequestLedger {
    limit: u64,
    requests: Arc<Mutex<HashMap<AccountId, u64>>>,
}

impl MemoryRequestLedger {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            requests: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn requests(&self, account: &AccountId) -> u64 {
        self.requests.lock().get(account).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RequestLedger for MemoryRequestLedger {
    async fn admit(&self, account: &AccountId, cost: u64) -> bool {
        let mut requests = self.requests.lock();
        let charged = requests.entry(account.clone()).or_insert(0);
        let before = *charged;
        *charged = charged.saturating_add(cost);
        before < self.limit
    }
}
