//! Backend contract.
//!
//! A backend stores rows per model (and per join table) and answers two
//! requests: return the rows of a model satisfying a compiled [`Predicate`],
//! and apply a single [`WriteOp`]. Ordering, pagination, relation loading,
//! aggregation and constraint checks all happen in the engine, so a backend
//! only has to evaluate predicates and persist rows.

use core::future::Future;
use core::time::Duration;

use neuronek_db_types::JoinTableDef;

use crate::error::Result;
use crate::filter::Predicate;
use crate::row::Row;
use crate::value::Value;

// =============================================================================
// Requests
// =============================================================================

/// Which state of the store a fetch reads
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReadView {
    /// Everything written so far, including the open transaction's own writes
    #[default]
    Current,
    /// The store as it was when the open transaction began. Outside a
    /// transaction this is the same as [`ReadView::Current`].
    Snapshot,
}

/// A request for every row of `model` matching `predicate`
#[derive(Clone, Debug, PartialEq)]
pub struct FetchRequest {
    pub model: &'static str,
    pub predicate: Predicate,
    pub view: ReadView,
}

impl FetchRequest {
    pub fn new(model: &'static str, predicate: Predicate) -> Self {
        Self {
            model,
            predicate,
            view: ReadView::Current,
        }
    }

    #[must_use]
    pub fn view(self, view: ReadView) -> Self {
        Self { view, ..self }
    }
}

/// A single row-level write
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    /// Store a new row; the engine has already applied defaults and checks
    Insert { model: &'static str, row: Row },
    /// Overwrite the listed fields of the row whose id is `id`
    Update {
        model: &'static str,
        id_field: &'static str,
        id: Value,
        patch: Row,
    },
    /// Remove every row matching `predicate`
    Delete {
        model: &'static str,
        predicate: Predicate,
    },
    /// Add a join row `(source, target)`; existing links are kept once
    Link {
        join: JoinTableDef,
        source: Value,
        target: Value,
    },
    /// Remove join rows; `None` matches any value on that side
    Unlink {
        join: JoinTableDef,
        source: Option<Value>,
        target: Option<Value>,
    },
}

impl WriteOp {
    /// Model or join table name the operation touches
    pub const fn target(&self) -> &'static str {
        match self {
            Self::Insert { model, .. } | Self::Update { model, .. } | Self::Delete { model, .. } => {
                model
            }
            Self::Link { join, .. } | Self::Unlink { join, .. } => join.name,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Link { .. } => "link",
            Self::Unlink { .. } => "unlink",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteResult {
    /// Rows (or join rows) written
    pub affected: u64,
}

// =============================================================================
// Transactions
// =============================================================================

/// Transaction isolation level
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub enum IsolationLevel {
    /// READ UNCOMMITTED isolation level
    ReadUncommitted,
    /// READ COMMITTED isolation level
    ReadCommitted,
    /// REPEATABLE READ isolation level
    RepeatableRead,
    /// SERIALIZABLE isolation level
    #[default]
    Serializable,
}

impl core::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let level = match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        };
        write!(f, "{}", level)
    }
}

/// Options for an interactive transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Longest wait for the backend to start the transaction
    pub max_wait: Duration,
    /// Longest run time of the transaction callback
    pub timeout: Duration,
    pub isolation_level: IsolationLevel,
}

impl TransactionOptions {
    pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(2_000);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5_000);

    #[must_use]
    pub const fn max_wait(self, max_wait: Duration) -> Self {
        Self { max_wait, ..self }
    }

    #[must_use]
    pub const fn timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    #[must_use]
    pub const fn isolation_level(self, isolation_level: IsolationLevel) -> Self {
        Self {
            isolation_level,
            ..self
        }
    }
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_wait: Self::DEFAULT_MAX_WAIT,
            timeout: Self::DEFAULT_TIMEOUT,
            isolation_level: IsolationLevel::default(),
        }
    }
}

// =============================================================================
// Traits
// =============================================================================

/// Anything that can serve fetches and writes: a backend or an open transaction
pub trait Connection: Send + Sync {
    /// Rows of `request.model` matching `request.predicate` in `request.view`.
    ///
    /// Rows must come back in a stable storage order: insertion order, with
    /// updates keeping a row in place. Reads without `orderBy` return rows
    /// in this order and paginate over it, so an implementation that
    /// reorders rows between calls breaks skip/take and cursors.
    fn fetch(&self, request: &FetchRequest) -> impl Future<Output = Result<Vec<Row>>> + Send;

    fn write(&self, op: &WriteOp) -> impl Future<Output = Result<WriteResult>> + Send;
}

/// A storage engine that can open transactions
pub trait Backend: Connection {
    type Transaction: TransactionHandle;

    /// Starts a transaction, waiting as long as the backend needs to grant it.
    ///
    /// The engine bounds this wait with [`TransactionOptions::max_wait`].
    fn begin_transaction(
        &self,
        options: TransactionOptions,
    ) -> impl Future<Output = Result<Self::Transaction>> + Send;
}

/// An open transaction; dropping it without committing discards its writes
pub trait TransactionHandle: Connection {
    fn commit(self) -> impl Future<Output = Result<()>> + Send;

    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolation_defaults_to_serializable() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::Serializable);
        assert_eq!(IsolationLevel::ReadCommitted.to_string(), "READ COMMITTED");
    }

    #[test]
    fn transaction_option_defaults() {
        let opts = TransactionOptions::default();
        assert_eq!(opts.max_wait, Duration::from_secs(2));
        assert_eq!(opts.timeout, Duration::from_secs(5));
        let opts = opts.timeout(Duration::from_millis(50));
        assert_eq!(opts.timeout, Duration::from_millis(50));
    }
}
