//! Postgres-backed document store
//!
//! Every collection shares one `documents` table keyed by a `collection`
//! column, with the document itself in a JSONB `body`. Lookups use JSONB
//! containment (`body @> filter`), which the GIN index on `body` serves.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use tracing::{debug, info};

use super::{filter_fields, DocumentStore, InsertOutcome, StoreError};
use crate::config::DatabaseConfig;

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Open a pool; fails if no connection comes up within the timeout
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.url)
            .await?;

        info!(component = "store", "Database connection pool established");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!(component = "store", "Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn insert_batch(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<InsertOutcome, StoreError> {
        let submitted = documents.len();
        if submitted == 0 {
            return Ok(InsertOutcome::default());
        }

        let bodies: Vec<Json<Value>> = documents.into_iter().map(Json).collect();

        // Conflicts only arise on the processed-ledger unique index; those
        // rows are dropped and show up as accepted < submitted.
        let result = sqlx::query(
            r#"
            INSERT INTO documents (collection, body)
            SELECT $1, body FROM UNNEST($2::jsonb[]) AS batch(body)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(collection)
        .bind(bodies)
        .execute(&self.pool)
        .await?;

        let accepted = usize::try_from(result.rows_affected()).unwrap_or(usize::MAX);
        debug!(component = "store", collection, submitted, accepted, "Batch inserted");

        Ok(InsertOutcome {
            submitted,
            accepted,
        })
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Value,
    ) -> Result<Option<Value>, StoreError> {
        filter_fields(filter)?;

        let body: Option<Json<Value>> = sqlx::query_scalar(
            r#"
            SELECT body FROM documents
            WHERE collection = $1 AND body @> $2
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(collection)
        .bind(Json(filter))
        .fetch_optional(&self.pool)
        .await?;

        Ok(body.map(|Json(value)| value))
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        info!(component = "store", "Database connection pool closed");
        Ok(())
    }
}
