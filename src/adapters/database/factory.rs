//! Store factory
//!
//! Builds the store handles a command runs with from configuration.

use crate::adapters::database::traits::{RunLogStore, StagingSource, WarehouseStore};
use crate::adapters::postgresql::adapter::PostgreSQLAdapter;
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::config::DatabaseConfig;
use crate::domain::Result;
use std::sync::Arc;

/// Trait-object handles to the stores a build runs against
#[derive(Clone)]
pub struct StoreHandles {
    pub staging: Arc<dyn StagingSource + Send + Sync>,
    pub run_log: Arc<dyn RunLogStore + Send + Sync>,
    pub warehouse: Arc<dyn WarehouseStore + Send + Sync>,
}

impl StoreHandles {
    /// Handles that all point at one store implementing every trait
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: StagingSource + RunLogStore + WarehouseStore + Send + Sync + 'static,
    {
        Self {
            staging: store.clone(),
            run_log: store.clone(),
            warehouse: store,
        }
    }
}

/// Connect to PostgreSQL and return handles sharing one connection pool
///
/// # Errors
///
/// Returns an error if the pool cannot be created or the server does not
/// answer a test query.
pub async fn create_stores(config: &DatabaseConfig) -> Result<StoreHandles> {
    let client = Arc::new(PostgreSQLClient::new(config).await?);
    tracing::info!(database = %client.connection_string_safe(), "Creating PostgreSQL stores");

    client.test_connection().await?;

    let status = client.pool_status();
    tracing::debug!(
        max_size = status.max_size,
        size = status.size,
        available = status.available,
        "Connection pool ready"
    );

    Ok(StoreHandles::shared(Arc::new(PostgreSQLAdapter::new_with_arc(client))))
}
