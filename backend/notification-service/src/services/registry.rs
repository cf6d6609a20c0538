use async_trait::async_trait;
use push_delivery::{RegistryError, RegistryUpdater, Replacement};
use resilience::{registry_config, with_retry, RetryConfig, RetryError};
use sqlx::PgPool;
use tracing::{debug, info};

/// Device registry backed by the `push_tokens` table
#[derive(Clone)]
pub struct PgRegistryUpdater {
    db: PgPool,
    retry: RetryConfig,
}

impl PgRegistryUpdater {
    pub fn new(db: PgPool) -> Self {
        let retry = registry_config().retry.unwrap_or_default();
        Self { db, retry }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn invalidate_tokens(&self, tokens: &[String]) -> Result<u64, sqlx::Error> {
        let query = r#"
            UPDATE push_tokens
            SET is_valid = FALSE, updated_at = NOW()
            WHERE token = ANY($1) AND is_valid = TRUE
        "#;

        let result = sqlx::query(query).bind(tokens).execute(&self.db).await?;
        Ok(result.rows_affected())
    }

    /// Rewrite `old` to `new` unless `new` is already registered, in which
    /// case the stale row is invalidated instead
    async fn replace_token(&self, pair: &Replacement) -> Result<u64, sqlx::Error> {
        let mut tx = self.db.begin().await?;

        let rewritten = sqlx::query(
            r#"
            UPDATE push_tokens
            SET token = $2, is_valid = TRUE, updated_at = NOW()
            WHERE token = $1
              AND NOT EXISTS (SELECT 1 FROM push_tokens WHERE token = $2)
            "#,
        )
        .bind(&pair.old)
        .bind(&pair.new)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let touched = if rewritten > 0 {
            rewritten
        } else {
            sqlx::query(
                r#"
                UPDATE push_tokens
                SET is_valid = FALSE, updated_at = NOW()
                WHERE token = $1 AND is_valid = TRUE
                "#,
            )
            .bind(&pair.old)
            .execute(&mut *tx)
            .await?
            .rows_affected()
        };

        tx.commit().await?;
        Ok(touched)
    }

    async fn replace_all(&self, pairs: &[Replacement]) -> Result<u64, sqlx::Error> {
        let mut touched = 0;
        for pair in pairs {
            touched += self.replace_token(pair).await?;
        }
        Ok(touched)
    }
}

#[async_trait]
impl RegistryUpdater for PgRegistryUpdater {
    async fn remove(&self, ids: &[String]) -> Result<u64, RegistryError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let removed = with_retry(self.retry.clone(), move || self.invalidate_tokens(ids))
            .await
            .map_err(registry_error)?;

        info!(requested = ids.len(), removed, "Invalidated dead push tokens");
        Ok(removed)
    }

    async fn replace(&self, pairs: &[Replacement]) -> Result<u64, RegistryError> {
        if pairs.is_empty() {
            return Ok(0);
        }

        let replaced = with_retry(self.retry.clone(), move || self.replace_all(pairs))
            .await
            .map_err(registry_error)?;

        debug!(requested = pairs.len(), replaced, "Applied canonical token replacements");
        Ok(replaced)
    }
}

fn registry_error(err: RetryError<sqlx::Error>) -> RegistryError {
    let RetryError::MaxRetriesExceeded { last_error, .. } = err;
    match last_error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RegistryError::Unavailable(last_error.to_string())
        }
        other => RegistryError::UpdateFailed(other.to_string()),
    }
}
