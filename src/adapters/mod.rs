//! External system integrations for Clinistar.
//!
//! - [`database`] - Store traits and the store factory
//! - [`postgresql`] - PostgreSQL implementation of every store trait
//! - [`memory`] - In-memory implementation for tests
//! - [`extracts`] - CSV extract parsing into staging rows
//! - [`fhir`] - FHIR bundle parsing into staging rows
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern**: the core only sees the traits
//! in [`database::traits`], and each component is handed its store
//! explicitly.
//!
//! ```rust,no_run
//! use clinistar::adapters::database::create_stores;
//! use clinistar::config::load_config;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("clinistar.toml")?;
//! let stores = create_stores(&config.database).await?;
//! let recent = stores.run_log.list_runs(5).await?;
//! println!("{} recent runs", recent.len());
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod extracts;
pub mod fhir;
pub mod memory;
pub mod postgresql;
