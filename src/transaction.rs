//! Batch and interactive transactions.
//!
//! A transaction owns one backend session from `begin` to `commit` or
//! `rollback`. `max_wait` bounds how long the backend may take to grant the
//! session, `timeout` bounds the callback; a callback that errs or runs out
//! of time is rolled back and its error surfaced.

use neuronek_db_core::{
    Backend, Executor, Operation, Payload, QueryError, QueryLimits, ReadView, Result,
    SchemaRegistry, TransactionHandle, TransactionOptions,
};

use crate::client::{Client, ModelDelegate, Runner};

/// One operation of a [`Client::batch`]
#[derive(Clone, Debug, PartialEq)]
pub struct BatchOperation {
    pub model: String,
    pub operation: Operation,
}

impl BatchOperation {
    pub fn new(model: impl Into<String>, operation: Operation) -> Self {
        Self {
            model: model.into(),
            operation,
        }
    }
}

/// An open transaction, handed to the callback of [`Client::transaction`]
pub struct Transaction<'c, T> {
    handle: T,
    registry: &'c SchemaRegistry,
    limits: QueryLimits,
}

impl<T> core::fmt::Debug for Transaction<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Transaction")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl<'c, T: TransactionHandle> Transaction<'c, T> {
    pub(crate) fn new(handle: T, registry: &'c SchemaRegistry, limits: QueryLimits) -> Self {
        Self {
            handle,
            registry,
            limits,
        }
    }

    /// An executor bound to this transaction's session
    pub fn executor(&self) -> Executor<'_, T> {
        Executor::new(&self.handle, self.registry).with_limits(self.limits)
    }

    /// Runs `operation` inside this transaction
    pub async fn execute(&self, model: &str, operation: &Operation) -> Result<Payload> {
        self.executor().execute(model, operation).await
    }

    /// The operations of `model` inside this transaction
    pub fn model(&self, model: &'static str) -> ModelDelegate<'_, Self> {
        ModelDelegate::new(self, model)
    }
}

impl<T: TransactionHandle> Runner for Transaction<'_, T> {
    fn registry(&self) -> &SchemaRegistry {
        self.registry
    }

    async fn run(&self, model: &str, operation: &Operation) -> Result<Payload> {
        self.execute(model, operation).await
    }
}

impl<B: Backend> Client<B> {
    /// Runs `f` inside an interactive transaction.
    ///
    /// Commits when `f` returns `Ok`; rolls back when it returns `Err` or
    /// exceeds `options.timeout`.
    ///
    /// ```no_run
    /// # use neuronek_db::prelude::*;
    /// # async fn demo(client: Client<MemoryBackend>) -> neuronek_db::Result<()> {
    /// let accounts = client
    ///     .transaction(TransactionOptions::default(), async |tx| {
    ///         tx.model("Account")
    ///             .create(CreateArgs::new(WriteData::new().set("username", "neo").set("password", "x")))
    ///             .await?;
    ///         tx.model("Account").count(CountArgs::default()).await
    ///     })
    ///     .await?;
    /// # Ok(()) }
    /// ```
    pub async fn transaction<F, R>(&self, options: TransactionOptions, f: F) -> Result<R>
    where
        F: AsyncFnOnce(&Transaction<'_, B::Transaction>) -> Result<R>,
    {
        self.run_transaction("interactive", options, f).await
    }

    /// Runs every operation in one transaction and returns their results in
    /// order. The first failure rolls back all of them.
    ///
    /// Operations are independent: each one reads the store as it was before
    /// the batch, so a query in the batch does not see rows written by an
    /// earlier operation and a `connect` cannot target them. Unique
    /// constraints are still checked against every write of the batch.
    pub async fn batch(&self, operations: Vec<BatchOperation>) -> Result<Vec<Payload>> {
        let options = self.config().transaction_options();
        self.run_transaction("batch", options, async |tx| {
            let executor = tx.executor().with_read_view(ReadView::Snapshot);
            let mut results = Vec::with_capacity(operations.len());
            for op in &operations {
                results.push(executor.execute(&op.model, &op.operation).await?);
            }
            Ok(results)
        })
        .await
    }

    pub(crate) async fn run_transaction<F, R>(
        &self,
        mode: &'static str,
        options: TransactionOptions,
        f: F,
    ) -> Result<R>
    where
        F: AsyncFnOnce(&Transaction<'_, B::Transaction>) -> Result<R>,
    {
        neuronek_db_core::trace_tx!("begin", mode);
        let handle = tokio::time::timeout(options.max_wait, self.backend().begin_transaction(options))
            .await
            .map_err(|_| {
                QueryError::TransactionAborted(format!(
                    "unable to start a transaction in the given time ({} ms)",
                    options.max_wait.as_millis()
                ))
            })??;

        let tx = Transaction::new(handle, self.registry(), self.config().query_limits());

        match tokio::time::timeout(options.timeout, f(&tx)).await {
            Ok(Ok(value)) => {
                neuronek_db_core::trace_tx!("commit", mode);
                tx.handle.commit().await?;
                Ok(value)
            }
            Ok(Err(e)) => {
                neuronek_db_core::trace_tx!("rollback", mode);
                tx.handle.rollback().await?;
                Err(e)
            }
            Err(_) => {
                neuronek_db_core::trace_tx!("timeout", mode);
                tx.handle.rollback().await?;
                Err(QueryError::TransactionAborted(format!(
                    "transaction exceeded its timeout ({} ms) and was rolled back",
                    options.timeout.as_millis()
                )))
            }
        }
    }
}
