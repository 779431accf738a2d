//! Core business logic for Clinistar.
//!
//! # Modules
//!
//! - [`staging`] - Staging table catalog and decoding into typed records
//! - [`validation`] - Data-quality rule catalog and validator
//! - [`build`] - Warehouse builder (dimension and fact derivation)
//! - [`commit`] - Transaction coordinator
//! - [`runlog`] - Run log lifecycle
//! - [`verification`] - Fingerprints and post-commit read-back
//! - [`pipeline`] - Orchestration and build summary
//!
//! # Build Workflow
//!
//! 1. **Begin run**: insert a `running` entry in `etl_run_log`
//! 2. **Load staging**: read `stg_*` and/or `stg_fhir_*` rows and decode them
//! 3. **Validate**: run every rule; any fatal issue blocks the build
//! 4. **Build**: derive dimension and fact rows
//! 5. **Commit**: truncate and reload the warehouse in one transaction that
//!    also finalizes the run as `success`
//! 6. **Verify** (optional): read the warehouse back
//!
//! Any failure after step 1 finalizes the run as `failed`.
//!
//! # Example
//!
//! ```rust,no_run
//! use clinistar::adapters::database::create_stores;
//! use clinistar::config::load_config;
//! use clinistar::core::pipeline::{BuildPipeline, PipelineOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("clinistar.toml")?;
//! let stores = create_stores(&config.database).await?;
//!
//! let pipeline = BuildPipeline::new(
//!     stores.staging,
//!     stores.run_log,
//!     stores.warehouse,
//!     PipelineOptions::from_config(&config),
//! );
//! let summary = pipeline.run().await?;
//! println!("{}", summary.format_summary());
//! # Ok(())
//! # }
//! ```

pub mod build;
pub mod commit;
pub mod pipeline;
pub mod runlog;
pub mod staging;
pub mod validation;
pub mod verification;
