use async_trait::async_trait;

use common::account::AccountId;
use common::auth::RequestLedger;

use crate::database::Database;

/// Request counter persisted in the `request_ledger` table
#[derive(Debug, Clone)]
pub struct DatabaseRequestLedger {
    db: Database,
    limit: u64,
}

impl DatabaseRequestLedger {
    pub fn new(db: Database, limit: u64) -> Self {
        Self { db, limit }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Requests charged so far
    pub async fn requests(&self, account: &AccountId) -> Result<u64, sqlx::Error> {
        let requests = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT requests
            FROM request_ledger
            WHERE account_id = ?
            "#,
        )
        .bind(account.as_str())
        .fetch_optional(&*self.db)
        .await?;

        Ok(requests.unwrap_or(0).max(0) as u64)
    }

    async fn charge(&self, account: &AccountId, cost: u64) -> Result<u64, sqlx::Error> {
        let cost = i64::try_from(cost).unwrap_or(i64::MAX);
        let after = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO request_ledger (account_id, requests)
            VALUES (?, ?)
            ON CONFLICT(account_id) DO UPDATE SET
                requests = requests + excluded.requests
            RETURNING requests
            "#,
        )
        .bind(account.as_str())
        .bind(cost)
        .fetch_one(&*self.db)
        .await?;

        Ok(after.saturating_sub(cost).max(0) as u64)
    }
}

#[async_trait]
impl RequestLedger for DatabaseRequestLedger {
    async fn admit(&self, account: &AccountId, cost: u64) -> bool {
        match self.charge(account, cost).await {
            Ok(before) => before < self.limit,
            Err(e) => {
                tracing::warn!(account = %account, error = %e, "failed to charge request ledger");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admits_until_limit() {
        let db = Database::in_memory().await.unwrap();
        let ledger = DatabaseRequestLedger::new(db, 3);
        let u1 = AccountId::from("u1");

        for _ in 0..3 {
            assert!(ledger.admit(&u1, 1).await);
        }
        assert!(!ledger.admit(&u1, 1).await);
        assert_eq!(ledger.requests(&u1).await.unwrap(), 4);

        // counters are per account
        assert!(ledger.admit(&AccountId::from("u2"), 1).await);
    }

    #[tokio::test]
    async fn test_closed_pool_denies() {
        let db = Database::in_memory().await.unwrap();
        let ledger = DatabaseRequestLedger::new(db.clone(), 3);
        db.close().await;

        assert!(!ledger.admit(&AccountId::from("u1"), 1).await);
    }
}
