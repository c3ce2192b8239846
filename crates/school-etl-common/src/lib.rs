//! School ETL Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error kinds and logging setup for the school ETL workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the pipeline error kinds every stage reports
//! - **Logging**: `tracing` subscriber configuration shared by binaries and tests
//!
//! # Example
//!
//! ```no_run
//! use school_etl_common::{EtlError, Result};
//!
//! fn require_records(found: bool) -> Result<()> {
//!     if !found {
//!         return Err(EtlError::SchemaMismatch("dataSekolah".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{EtlError, Result};
