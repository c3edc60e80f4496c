use async_trait::async_trait;

use common::account::AccountId;
use common::links::PublicLink;
use common::store::{MetadataStore, StoreError};

use crate::database::Database;

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[async_trait]
impl MetadataStore for Database {
    type Error = sqlx::Error;

    async fn capacity(&self, account: &AccountId) -> Result<Option<i64>, StoreError<Self::Error>> {
        let capacity = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT capacity
            FROM quota
            WHERE account_id = ?
            "#,
        )
        .bind(account.as_str())
        .fetch_optional(&**self)
        .await?;

        Ok(capacity)
    }

    async fn set_capacity(
        &self,
        account: &AccountId,
        bytes: i64,
    ) -> Result<(), StoreError<Self::Error>> {
        sqlx::query(
            r#"
            INSERT INTO quota (account_id, capacity)
            VALUES (?, ?)
            ON CONFLICT(account_id) DO UPDATE SET
                capacity = excluded.capacity
            "#,
        )
        .bind(account.as_str())
        .bind(bytes)
        .execute(&**self)
        .await?;

        Ok(())
    }

    async fn add_capacity(
        &self,
        account: &AccountId,
        delta: i64,
    ) -> Result<(), StoreError<Self::Error>> {
        sqlx::query(
            r#"
            INSERT INTO quota (account_id, capacity)
            VALUES (?, ?)
            ON CONFLICT(account_id) DO UPDATE SET
                capacity = capacity + excluded.capacity
            "#,
        )
        .bind(account.as_str())
        .bind(delta)
        .execute(&**self)
        .await?;

        Ok(())
    }

    async fn capacity_accounts(&self) -> Result<Vec<AccountId>, StoreError<Self::Error>> {
        let accounts = sqlx::query_scalar::<_, String>(
            r#"
            SELECT account_id
            FROM quota
            ORDER BY account_id
            "#,
        )
        .fetch_all(&**self)
        .await?;

        Ok(accounts.into_iter().map(AccountId::from).collect())
    }

    async fn insert_link(&self, link: &PublicLink) -> Result<(), StoreError<Self::Error>> {
        let result = sqlx::query(
            r#"
            INSERT INTO public_links (token, account_id, path)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&link.token)
        .bind(link.account.as_str())
        .bind(&link.path)
        .execute(&**self)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateToken(link.token.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn link(&self, token: &str) -> Result<Option<PublicLink>, StoreError<Self::Error>> {
        let row = sqlx::query_as::<_, (String, String, String)>(
            r#"
            SELECT token, account_id, path
            FROM public_links
            WHERE token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&**self)
        .await?;

        Ok(row.map(|(token, account, path)| PublicLink {
            token,
            account: AccountId::from(account),
            path,
        }))
    }

    async fn delete_link(
        &self,
        account: &AccountId,
        token: &str,
    ) -> Result<bool, StoreError<Self::Error>> {
        let result = sqlx::query(
            r#"
            DELETE FROM public_links
            WHERE token = ? AND account_id = ?
            "#,
        )
        .bind(token)
        .bind(account.as_str())
        .execute(&**self)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_links_under(&self, prefix: &str) -> Result<u64, StoreError<Self::Error>> {
        // substr instead of LIKE so `%` and `_` in paths match literally
        let result = sqlx::query(
            r#"
            DELETE FROM public_links
            WHERE substr(path, 1, length(?1)) = ?1
            "#,
        )
        .bind(prefix)
        .execute(&**self)
        .await?;

        Ok(result.rows_affected())
    }

    async fn rename_links_under(
        &self,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<u64, StoreError<Self::Error>> {
        let result = sqlx::query(
            r#"
            UPDATE public_links
            SET path = ?2 || substr(path, length(?1) + 1)
            WHERE substr(path, 1, length(?1)) = ?1
            "#,
        )
        .bind(old_prefix)
        .bind(new_prefix)
        .execute(&**self)
        .await?;

        Ok(result.rows_affected())
    }

    async fn register(&self, account: &AccountId) -> Result<bool, StoreError<Self::Error>> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (account_id, created_at)
            VALUES (?, ?)
            ON CONFLICT(account_id) DO NOTHING
            "#,
        )
        .bind(account.as_str())
        .bind(now)
        .execute(&**self)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn is_registered(&self, account: &AccountId) -> Result<bool, StoreError<Self::Error>> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM accounts
            WHERE account_id = ?
            "#,
        )
        .bind(account.as_str())
        .fetch_one(&**self)
        .await?;

        Ok(count > 0)
    }
}
