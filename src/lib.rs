// Clinistar - Healthcare Star-Schema Warehouse Builder
// Copyright (c) 2025 Clinistar Contributors
// Licensed under the MIT License

//! # Clinistar - Healthcare Star-Schema Warehouse Builder
//!
//! Clinistar turns staged healthcare records (patients, encounters, charges,
//! lab results) into a star-schema warehouse in PostgreSQL: one encounter
//! fact table with patient, provider, department and time dimensions.
//!
//! ## Overview
//!
//! - **Staging**: rows arrive in `stg_*` tables loaded from CSV, or from FHIR
//!   bundles through [`adapters::fhir`]
//! - **Validation**: a fixed rule catalog decides whether staging may be built
//! - **Build**: a pure derivation of the dimensions and facts
//! - **Commit**: the warehouse is replaced in a single transaction or not at all
//! - **Run log**: every attempt is recorded in `etl_run_log`
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Staging, validation, build, commit, run log and verification
//! - [`adapters`] - PostgreSQL, in-memory store and FHIR ingestion
//! - [`domain`] - Record, warehouse and error types
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clinistar::adapters::database::create_stores;
//! use clinistar::config::load_config;
//! use clinistar::core::pipeline::{BuildPipeline, PipelineOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("clinistar.toml")?;
//!     let stores = create_stores(&config.database).await?;
//!
//!     let pipeline = BuildPipeline::new(
//!         stores.staging,
//!         stores.run_log,
//!         stores.warehouse,
//!         PipelineOptions::from_config(&config),
//!     );
//!     let summary = pipeline.run().await?;
//!
//!     println!("{}", summary.format_summary());
//!     std::process::exit(summary.exit_code());
//! }
//! ```
//!
//! ## Testing Without a Database
//!
//! [`adapters::memory::MemoryStore`] implements every store trait:
//!
//! ```rust
//! use clinistar::adapters::database::StoreHandles;
//! use clinistar::adapters::memory::MemoryStore;
//! use clinistar::core::pipeline::{BuildPipeline, PipelineOptions};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let stores = StoreHandles::shared(Arc::new(MemoryStore::new()));
//! let pipeline = BuildPipeline::new(
//!     stores.staging,
//!     stores.run_log,
//!     stores.warehouse,
//!     PipelineOptions::default(),
//! );
//! let summary = pipeline.run().await?;
//! assert!(summary.is_successful());
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
