//! Connection pool and schema for the refresh credential store.

use crate::config::DatabaseConfig;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Create the pool backing `PgCredentialStore`.
///
/// Every rotation holds one connection for its whole transaction, so
/// `max_connections` bounds concurrent refreshes.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Connecting to credential database"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.url)
        .await?;

    tracing::info!("Connected to credential database");

    Ok(pool)
}

/// Apply the `refresh_credentials` schema.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Credential schema up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL
    async fn test_migrations_create_chain_schema() -> Result<(), anyhow::Error> {
        let config = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/session_test".to_string()),
            max_connections: 2,
            min_connections: 1,
        };
        let pool = create_pool(&config).await?;
        run_migrations(&pool).await?;

        let indexes: Vec<String> = sqlx::query_scalar(
            "SELECT indexname::text FROM pg_indexes WHERE tablename = 'refresh_credentials'",
        )
        .fetch_all(&pool)
        .await?;
        for expected in [
            "refresh_credentials_secret_hash_idx",
            "refresh_credentials_successor_id_idx",
            "refresh_credentials_subject_id_idx",
        ] {
            assert!(indexes.iter().any(|i| i == expected), "missing index {}", expected);
        }

        // A successor on an unrevoked node would be a second live head.
        let forked = sqlx::query(
            r#"
            INSERT INTO refresh_credentials
                (id, secret_hash, subject_id, created_at, expires_at, created_from_address,
                 successor_id)
            VALUES (gen_random_uuid(), md5(random()::text), 'user_schema', now(), now(), '10.0.0.1',
                    gen_random_uuid())
            "#,
        )
        .execute(&pool)
        .await;
        assert!(forked.is_err());
        Ok(())
    }
}
