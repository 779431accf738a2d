//! Staging loader

use crate::adapters::database::traits::StagingSource;
use crate::config::StagingSourceMode;
use crate::core::staging::decode::decode_table;
use crate::core::staging::tables::StagingTable;
use crate::domain::records::{EntityKind, StagedBatch};
use crate::domain::Result;
use std::sync::Arc;

/// Reads and decodes the staging tables of a source mode
pub struct StagingLoader {
    source: Arc<dyn StagingSource + Send + Sync>,
}

impl StagingLoader {
    pub fn new(source: Arc<dyn StagingSource + Send + Sync>) -> Self {
        Self { source }
    }

    /// Loads every table of `mode` into one batch
    ///
    /// Tables are read in catalog order (CSV before FHIR for `both`), so
    /// first-occurrence semantics follow that order.
    ///
    /// # Errors
    ///
    /// Returns an error if a table cannot be read or a row cannot be decoded.
    pub async fn load(&self, mode: StagingSourceMode) -> Result<StagedBatch> {
        let mut batch = StagedBatch::default();

        for table in StagingTable::for_mode(mode) {
            let rows = self.source.read_table(table).await?;
            tracing::debug!(table = %table, rows = rows.len(), "Read staging table");
            batch.extend(decode_table(table, &rows)?);
        }

        tracing::info!(
            source = %mode,
            records = batch.len(),
            departments = batch.count(EntityKind::Department),
            providers = batch.count(EntityKind::Provider),
            patients = batch.count(EntityKind::Patient),
            encounters = batch.count(EntityKind::Encounter),
            charges = batch.count(EntityKind::Charge),
            labs = batch.count(EntityKind::Lab),
            "Staging loaded"
        );

        Ok(batch)
    }
}
