//! Query engine core for neuronek-db.
//!
//! This crate holds everything between a declarative descriptor and a
//! backend: the [`SchemaRegistry`], the filter compiler, the planner, the
//! relation loader, the mutation and aggregation executors and the result
//! assembler. Storage is reached through the [`Connection`] and [`Backend`]
//! traits only; the engine makes no assumption about how a backend stores
//! rows beyond evaluating a [`Predicate`] against them.
//!
//! The usual entry point is the `neuronek-db` crate, which wraps an
//! [`Executor`] in a client with implicit transactions.

pub mod aggregate;
pub mod args;
pub mod assemble;
pub mod backend;
pub mod error;
pub mod executor;
pub mod filter;
pub mod json;
pub mod order;
pub mod plan;
pub mod projection;
pub mod registry;
pub mod row;
mod tracing;
pub mod value;
pub mod window;

pub use args::*;
pub use assemble::Payload;
pub use backend::{
    Backend, Connection, FetchRequest, IsolationLevel, ReadView, TransactionHandle,
    TransactionOptions, WriteOp, WriteResult,
};
pub use error::{ErrorKind, QueryError, Result};
pub use executor::Executor;
pub use filter::{Filter, Predicate, RelationFilter, RowSource, ScalarFilter};
pub use order::{NullsOrder, OrderBy, SortOrder};
pub use plan::QueryLimits;
pub use registry::{InboundRelation, QueryHook, SchemaRegistry, SchemaRegistryBuilder, UniqueKey};
pub use row::Row;
pub use value::Value;
pub use window::Cursor;

#[doc(hidden)]
pub use neuronek_db_types as types;
