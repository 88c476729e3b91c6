//! Tracing utilities for query and transaction observability.
//!
//! Enable the `tracing` feature to emit events via the `tracing` crate.
//! These macros no-op when the feature is disabled, avoiding `#[cfg]` boilerplate
//! at every call site.

/// Emit a debug-level tracing event for a backend fetch.
///
/// ```ignore
/// trace_fetch!(request.model, request.predicate.len());
/// ```
#[macro_export]
macro_rules! trace_fetch {
    ($model:expr, $predicate_nodes:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(model = %$model, predicate = $predicate_nodes, "neuronek.fetch");
    };
}

/// Emit a debug-level tracing event for a backend write.
///
/// ```ignore
/// trace_write!(op.model(), op.name());
/// ```
#[macro_export]
macro_rules! trace_write {
    ($model:expr, $op:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(model = %$model, op = $op, "neuronek.write");
    };
}

/// Emit an info-level tracing event for transaction lifecycle (begin, commit, rollback, timeout).
///
/// ```ignore
/// trace_tx!("begin", "interactive");
/// trace_tx!("timeout", mode);
/// ```
#[macro_export]
macro_rules! trace_tx {
    ($event:literal, $mode:expr) => {
        #[cfg(feature = "tracing")]
        tracing::info!(event = $event, mode = $mode, "neuronek.transaction");
        #[cfg(not(feature = "tracing"))]
        let _ = &$mode;
    };
}
