//! Admin configuration store - named feature flags with optional user allow-lists,
//! persisted in a partitioned table service.
//!
//! A flag's user-id list is unbounded, while a single table property is not, so
//! each configuration is stored as one primary record plus a variable number of
//! chunk records holding up to 100 user ids each.
//!
//! # Architecture
//!
//! The crate is organised leaves-first:
//! - `storage`: typed partition/row-keyed store over a `TableBackend`
//!   (DynamoDB in production, in-memory for local runs and tests)
//! - `repository`: maps `AdminConfig` onto records and chunks, plus a
//!   cache-aside wrapper
//! - `api`: API Gateway Lambda handler exposing the admin endpoints
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use admin_config::core::models::{AdminConfig, Allow};
//! use admin_config::repository::{AdminConfigRepo, AdminConfigRepository};
//! use admin_config::storage::{MemoryTableBackend, TableStorage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     admin_config::setup_logging();
//!
//!     let storage = TableStorage::new(Arc::new(MemoryTableBackend::new()), "dev");
//!     let repo = AdminConfigRepo::new(storage);
//!
//!     let beta = AdminConfig::new("beta-dashboard", Allow::AllOff)
//!         .with_description("Only listed users see the new dashboard")
//!         .with_user_ids(["U1", "U2"]);
//!     let stored = repo.insert(beta).await?;
//!
//!     if let Some(config) = repo.get("beta-dashboard").await? {
//!         println!("{} -> {:?}", stored.config_id, config.user_ids);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod core;
pub mod errors;
pub mod repository;
pub mod storage;

pub use errors::{AdminConfigError, StoreError};

/// Configure structured logging with JSON format for AWS Lambda environments.
///
/// This function sets up tracing-subscriber with a JSON formatter suitable for
/// `CloudWatch` Logs integration, filtered by `RUST_LOG` (default `info`). It
/// should be called once at the start of the Lambda process; later calls are
/// no-ops.
///
/// # Example
///
/// ```
/// // Initialize structured logging at the start of your Lambda handler
/// admin_config::setup_logging();
/// ```
pub fn setup_logging() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
