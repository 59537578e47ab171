//! Database layer for the model repository
//!
//! Provides:
//! - SeaORM entity models
//! - Repository pattern for data access
//! - Connection management and schema bootstrap
//! - Filter / ordering helpers

pub mod models;
pub mod query;
mod repository;

pub use repository::{
    ClassificationValues, LookupRow, MethodKey, MethodPatch, MetricValues, ModelPatch, NewModel,
    NewMethod, RegressionValues, Repository,
};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use models::*;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(&config.url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        info!(backend = ?conn.get_database_backend(), "Database connection established");

        Ok(Self { conn })
    }

    /// Private in-memory SQLite database with the schema already created.
    ///
    /// Pinned to one connection; each pooled connection would otherwise
    /// see its own empty database.
    pub async fn sqlite_memory() -> Result<Self> {
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);

        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let pool = Self { conn };
        pool.create_schema().await?;
        Ok(pool)
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;

        Ok(())
    }

    /// Create missing tables from the entity definitions.
    ///
    /// Referenced tables come first so foreign keys resolve.
    pub async fn create_schema(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        let schema = Schema::new(backend);

        let mut statements = vec![
            schema.create_table_from_entity(UserEntity),
            schema.create_table_from_entity(MethodEntity),
            schema.create_table_from_entity(PropertyEntity),
            schema.create_table_from_entity(DescriptorEntity),
            schema.create_table_from_entity(ModelsetEntity),
            schema.create_table_from_entity(ModelEntity),
            schema.create_table_from_entity(ArtifactEntity),
            schema.create_table_from_entity(RegressionMetricEntity),
            schema.create_table_from_entity(ClassificationMetricEntity),
        ];

        for stmt in statements.iter_mut() {
            stmt.if_not_exists();
            self.conn.execute(backend.build(&*stmt)).await?;
        }

        info!(tables = statements.len(), "Schema ready");
        Ok(())
    }
}
