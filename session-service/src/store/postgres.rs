//! PostgreSQL credential store.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::{CredentialStore, RotateOutcome};
use crate::models::RefreshCredential;

/// Upper bound on bulk revocation passes while rotations keep committing.
const MAX_BULK_REVOKE_PASSES: usize = 16;

/// PostgreSQL-backed credential store.
///
/// Rotation relies on row locking under READ COMMITTED: a concurrent
/// `UPDATE ... WHERE revoked_at IS NULL` on the same row waits for the first
/// transaction and then re-evaluates its predicate, so only one of them
/// matches.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_secret_hash(
        &self,
        secret_hash: &str,
    ) -> Result<Option<RefreshCredential>, anyhow::Error> {
        sqlx::query_as::<_, RefreshCredential>(
            "SELECT * FROM refresh_credentials WHERE secret_hash = $1",
        )
        .bind(secret_hash)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up refresh credential by secret")
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshCredential>, anyhow::Error> {
        sqlx::query_as::<_, RefreshCredential>("SELECT * FROM refresh_credentials WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up refresh credential by id")
    }

    async fn find_active_by_subject(
        &self,
        subject_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshCredential>, anyhow::Error> {
        sqlx::query_as::<_, RefreshCredential>(
            r#"
            SELECT * FROM refresh_credentials
            WHERE subject_id = $1 AND revoked_at IS NULL AND expires_at >= $2
            ORDER BY created_at
            "#,
        )
        .bind(subject_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list active refresh credentials")
    }

    async fn insert(&self, credential: &RefreshCredential) -> Result<(), anyhow::Error> {
        insert_credential(&self.pool, credential).await
    }

    async fn rotate(
        &self,
        predecessor_id: Uuid,
        successor: &RefreshCredential,
        revoked_at: DateTime<Utc>,
        revoked_from_address: &str,
    ) -> Result<RotateOutcome, anyhow::Error> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin rotation transaction")?;

        insert_credential(&mut *tx, successor).await?;

        let result = sqlx::query(
            r#"
            UPDATE refresh_credentials
            SET revoked_at = $2, revoked_from_address = $3, successor_id = $4
            WHERE id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(predecessor_id)
        .bind(revoked_at)
        .bind(revoked_from_address)
        .bind(successor.id)
        .execute(&mut *tx)
        .await
        .context("Failed to revoke rotated refresh credential")?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .context("Failed to roll back rotation")?;
            return Ok(RotateOutcome::AlreadyRevoked);
        }

        tx.commit().await.context("Failed to commit rotation")?;
        Ok(RotateOutcome::Rotated)
    }

    async fn revoke_if_active(
        &self,
        id: Uuid,
        revoked_at: DateTime<Utc>,
        revoked_from_address: &str,
    ) -> Result<bool, anyhow::Error> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_credentials
            SET revoked_at = $2, revoked_from_address = $3
            WHERE id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(id)
        .bind(revoked_at)
        .bind(revoked_from_address)
        .execute(&self.pool)
        .await
        .context("Failed to revoke refresh credential")?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_subject(
        &self,
        subject_id: &str,
        revoked_at: DateTime<Utc>,
        revoked_from_address: &str,
    ) -> Result<u64, anyhow::Error> {
        let mut revoked = 0;

        // An UPDATE cannot see a successor inserted by a rotation that commits
        // while the UPDATE waits on the predecessor's row lock. Repeat until a
        // fresh snapshot shows nothing unrevoked; an in-flight rotation keeps
        // its predecessor visibly unrevoked until it commits.
        for _ in 0..MAX_BULK_REVOKE_PASSES {
            let result = sqlx::query(
                r#"
                UPDATE refresh_credentials
                SET revoked_at = $2, revoked_from_address = $3
                WHERE subject_id = $1 AND revoked_at IS NULL
                "#,
            )
            .bind(subject_id)
            .bind(revoked_at)
            .bind(revoked_from_address)
            .execute(&self.pool)
            .await
            .context("Failed to revoke subject refresh credentials")?;
            revoked += result.rows_affected();

            let remaining: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM refresh_credentials
                    WHERE subject_id = $1 AND revoked_at IS NULL
                )
                "#,
            )
            .bind(subject_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check for unrevoked refresh credentials")?;

            if !remaining {
                return Ok(revoked);
            }
        }

        anyhow::bail!(
            "Refresh credentials of {} kept appearing during bulk revocation",
            subject_id
        )
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, anyhow::Error> {
        // Start from tails past the cutoff and follow predecessors back, so a
        // chain is only ever deleted whole. Every node of such a chain expired
        // no later than its tail.
        let result = sqlx::query(
            r#"
            WITH RECURSIVE doomed AS (
                SELECT id FROM refresh_credentials
                WHERE successor_id IS NULL AND expires_at < $1
                UNION ALL
                SELECT c.id FROM refresh_credentials c
                JOIN doomed d ON c.successor_id = d.id
            )
            DELETE FROM refresh_credentials WHERE id IN (SELECT id FROM doomed)
            "#,
        )
        .bind(before)
        .execute(&self.pool)
        .await
        .context("Failed to purge expired refresh credentials")?;

        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }
}

async fn insert_credential<'e, E>(executor: E, credential: &RefreshCredential) -> Result<(), anyhow::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO refresh_credentials
            (id, secret_hash, subject_id, created_at, expires_at, created_from_address,
             revoked_at, revoked_from_address, successor_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(credential.id)
    .bind(&credential.secret_hash)
    .bind(&credential.subject_id)
    .bind(credential.created_at)
    .bind(credential.expires_at)
    .bind(&credential.created_from_address)
    .bind(credential.revoked_at)
    .bind(&credential.revoked_from_address)
    .bind(credential.successor_id)
    .execute(executor)
    .await
    .context("Failed to insert refresh credential")?;
    Ok(())
}
