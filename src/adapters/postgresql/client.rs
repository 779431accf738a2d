//! PostgreSQL client implementation
//!
//! This module provides the pooled client the PostgreSQL adapter runs on.

use crate::config::DatabaseConfig;
use crate::domain::{ClinistarError, Result};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio_postgres::config::SslMode;
use tokio_postgres::{NoTls, Row};

/// PostgreSQL client for Clinistar
///
/// Owns the connection pool. Every statement runs with the configured
/// statement timeout.
pub struct PostgreSQLClient {
    /// Connection pool
    pool: Pool,

    statement_timeout_seconds: u64,
    lock_timeout_seconds: u64,

    /// Connection string with credentials masked, for logs
    safe_connection_string: String,
}

impl PostgreSQLClient {
    /// Create a new PostgreSQL client
    ///
    /// The pool connects lazily; use [`test_connection`](Self::test_connection)
    /// to check the server is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string is invalid or the pool
    /// cannot be built.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let secret = config.connection_string.expose_secret();

        let mut pg_config: tokio_postgres::Config = secret.as_ref().parse().map_err(|e| {
            ClinistarError::Configuration(format!("Invalid PostgreSQL connection string: {e}"))
        })?;
        pg_config.ssl_mode(match config.ssl_mode.as_str() {
            "disable" => SslMode::Disable,
            _ => SslMode::Prefer,
        });
        pg_config.connect_timeout(Duration::from_secs(config.connection_timeout_seconds));

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        let timeout = Duration::from_secs(config.connection_timeout_seconds);
        let pool = Pool::builder(manager)
            .max_size(config.max_connections)
            .wait_timeout(Some(timeout))
            .create_timeout(Some(timeout))
            .recycle_timeout(Some(timeout))
            .runtime(deadpool_postgres::Runtime::Tokio1)
            .build()
            .map_err(|e| ClinistarError::Database(format!("Failed to create connection pool: {e}")))?;

        let client = Self {
            pool,
            statement_timeout_seconds: config.statement_timeout_seconds,
            lock_timeout_seconds: config.lock_timeout_seconds,
            safe_connection_string: secret.redacted(),
        };

        tracing::debug!(
            connection = %client.safe_connection_string,
            max_connections = config.max_connections,
            "PostgreSQL pool created"
        );

        Ok(client)
    }

    /// Test the connection to PostgreSQL
    ///
    /// Attempts to get a connection from the pool and execute a simple query.
    pub async fn test_connection(&self) -> Result<()> {
        let client = self.get_connection().await?;

        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| ClinistarError::Database(format!("Connection test failed: {e}")))?;

        tracing::info!(connection = %self.safe_connection_string, "PostgreSQL connection test successful");
        Ok(())
    }

    /// Create staging, warehouse and run log tables if they don't exist
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn ensure_schema(&self) -> Result<()> {
        let client = self.get_connection().await?;

        let migration_sql = include_str!("../../../migrations/001_initial_schema.sql");

        client
            .batch_execute(migration_sql)
            .await
            .map_err(|e| ClinistarError::Database(format!("Failed to execute migration: {e}")))?;

        tracing::info!("PostgreSQL schema initialized successfully");
        Ok(())
    }

    /// Get a connection from the pool
    ///
    /// # Errors
    ///
    /// Returns an error if a connection cannot be obtained.
    pub async fn get_connection(&self) -> Result<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            ClinistarError::Database(format!("Failed to get connection from pool: {e}"))
        })
    }

    /// Execute a query and return rows
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn query(
        &self,
        query: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Vec<Row>> {
        let client = self.get_connection().await?;
        self.set_statement_timeout(&client).await?;

        client
            .query(query, params)
            .await
            .map_err(|e| ClinistarError::Database(format!("Query failed: {e}")))
    }

    /// Execute a statement and return the number of affected rows
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub async fn execute(
        &self,
        statement: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<u64> {
        let client = self.get_connection().await?;
        self.set_statement_timeout(&client).await?;

        client
            .execute(statement, params)
            .await
            .map_err(|e| ClinistarError::Database(format!("Statement execution failed: {e}")))
    }

    async fn set_statement_timeout(&self, client: &deadpool_postgres::Object) -> Result<()> {
        client
            .batch_execute(&format!("SET statement_timeout = {}", self.statement_timeout_ms()))
            .await
            .map_err(|e| {
                ClinistarError::Database(format!("Failed to set statement timeout: {e}"))
            })
    }

    pub fn statement_timeout_ms(&self) -> u64 {
        self.statement_timeout_seconds * 1000
    }

    pub fn lock_timeout_ms(&self) -> u64 {
        self.lock_timeout_seconds * 1000
    }

    /// Get the connection string (without password)
    pub fn connection_string_safe(&self) -> &str {
        &self.safe_connection_string
    }

    /// Get the pool statistics
    pub fn pool_status(&self) -> deadpool_postgres::Status {
        self.pool.status()
    }
}
