//! # neuronek-db
//!
//! A schema-driven relational query engine for the substance journal.
//!
//! Operations are plain descriptors (`where`, `select`/`include`, `orderBy`,
//! `cursor`/`take`/`skip`, `distinct`, write data, aggregates) executed by a
//! [`Client`] against any [`Backend`]. The engine validates, plans, loads
//! relations in batches and assembles nested JSON results; the backend only
//! evaluates predicates and stores rows.
//!
//! ## Quick Start
//!
//! ```rust
//! use neuronek_db::prelude::*;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> neuronek_db::Result<()> {
//! let client = Client::new(MemoryBackend::new(), journal::registry()?);
//!
//! client
//!     .model("Substance")
//!     .json("create", &json!({ "data": { "name": "Caffeine" } }))
//!     .await?;
//! client
//!     .model("RouteOfAdministration")
//!     .json("create", &json!({
//!         "data": { "name": "oral", "substance": { "connect": { "name": "Caffeine" } } }
//!     }))
//!     .await?;
//!
//! let substance = client
//!     .model("Substance")
//!     .json("findUnique", &json!({
//!         "where": { "name": "Caffeine" },
//!         "include": { "routes_of_administration": true }
//!     }))
//!     .await?;
//! assert_eq!(substance.get("routes_of_administration").unwrap()[0]["name"], "oral");
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! | Feature   | Default | Effect |
//! |-----------|---------|--------|
//! | `tracing` | yes     | emit fetch, write and transaction events through `tracing` |

pub mod client;
pub mod config;
pub mod journal;
pub mod memory;
pub mod transaction;

// =============================================================================
// Root-level exports
// =============================================================================

pub use client::{Client, ModelDelegate, Runner};
pub use config::{ClientConfig, ConfigError};
pub use memory::{MemoryBackend, MemoryTransaction};
pub use transaction::{BatchOperation, Transaction};

pub use neuronek_db_core::{ErrorKind, Payload, QueryError, Result};

/// Engine internals: descriptors, filters, planner and backend contract
pub mod core {
    pub use neuronek_db_core::*;
}

/// Schema definition types
pub mod types {
    pub use neuronek_db_types::*;
}

/// Prelude - import everything needed to define schemas and run queries
pub mod prelude {
    pub use crate::journal;
    pub use crate::{
        BatchOperation, Client, ClientConfig, MemoryBackend, ModelDelegate, Runner, Transaction,
    };
    pub use neuronek_db_core::{
        AggregateArgs, AggregateFn, AggregateSelection, Backend, Connection, CountArgs,
        CountSelection, CreateArgs, CreateManyArgs, Cursor, DeleteArgs, DeleteManyArgs, ErrorKind,
        Filter, FindManyArgs, FindUniqueArgs, GroupByArgs, IsolationLevel, NullsOrder, OrderBy,
        Operation, Payload, QueryError, QueryHook, Result, ScalarFilter, SchemaRegistry,
        Selection, SortOrder, TransactionOptions, UpdateArgs, UpdateManyArgs, UpsertArgs, Value,
        WriteData,
    };
    pub use neuronek_db_types::prelude::*;
}
