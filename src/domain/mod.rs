//! Domain models and types for Clinistar.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed natural keys** ([`PatientId`], [`EncounterId`], ...)
//! - **Staged records** decoded into a fixed schema per entity kind ([`StagedRecord`])
//! - **Warehouse rows** for the star schema ([`WarehouseDelta`])
//! - **Error types** ([`ClinistarError`], [`BuildAborted`], [`TransactionFailure`])
//! - **Result type alias** ([`Result`])
//!
//! # Type Safety
//!
//! Natural keys are newtypes, so a provider id can't be passed where a
//! department id is expected:
//!
//! ```rust
//! use clinistar::domain::{DepartmentId, ProviderId};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = ProviderId::new("PRV0001")?;
//! let department = DepartmentId::new("ICU")?;
//!
//! // This won't compile:
//! // let wrong: DepartmentId = provider;
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod ids;
pub mod money;
pub mod records;
pub mod result;
pub mod warehouse;

// Re-export commonly used types for convenience
pub use errors::{BuildAborted, BuildStage, ClinistarError, TransactionFailure};
pub use ids::{DepartmentId, EncounterId, PatientId, ProviderId, RunId};
pub use money::Amount;
pub use records::{
    ChargeRecord, DepartmentRecord, EncounterRecord, EntityKind, LabRecord, PatientRecord,
    ProviderRecord, SourceKind, StagedBatch, StagedPayload, StagedRecord,
};
pub use result::Result;
pub use warehouse::{
    DepartmentDim, EncounterFact, PatientDim, ProviderDim, TimeDay, WarehouseDelta,
    WarehouseTable,
};
