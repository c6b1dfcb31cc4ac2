//! # Tablesnap Testing
//!
//! In-memory collaborators for exercising backup collection without a
//! database engine.
//!
//! ## Components
//!
//! - **[`MemoryCatalog`]**: databases and tables that can be renamed or
//!   dropped from hooks that run in the middle of a scan
//! - **[`InProcessCoordination`]**: stage barriers shared by several
//!   collectors running as tasks of one runtime
//! - **[`init_test_tracing`]**: log output for failing tests
//!
//! ## Usage
//!
//! ```rust
//! use tablesnap_core::QualifiedTableName;
//! use tablesnap_testing::{CatalogEvent, MemoryCatalog};
//!
//! let catalog = MemoryCatalog::new();
//! catalog.create_database("db").unwrap();
//! catalog.create_table("db", "t1", "MergeTree").unwrap();
//!
//! // Rename the table the first time the scan lists the tables of `db`.
//! catalog.on_first(
//!     |event| matches!(event, CatalogEvent::ListTables { .. }),
//!     |catalog| {
//!         catalog
//!             .rename_table(
//!                 &QualifiedTableName::new("db", "t1"),
//!                 &QualifiedTableName::new("db", "t9"),
//!             )
//!             .unwrap();
//!     },
//! );
//! ```

/// Mutable in-memory catalog with scan hooks
pub mod catalog;
/// Multi-host stage barriers
pub mod coordination;

pub use catalog::{CatalogEvent, MemoryCatalog, MemoryDatabase, MemoryStorage, TEMPORARY_DATABASE};
pub use coordination::InProcessCoordination;

/// Send `tracing` output to the test harness.
///
/// Honors `RUST_LOG` and logs the tablesnap crates at `debug`. Safe to call from every test.
pub fn init_test_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let env_filter = match "tablesnap=debug".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .try_init();
}
