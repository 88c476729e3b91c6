//! The query client and its per-model delegates.

use std::sync::Arc;

use neuronek_db_core::json::decode_operation;
use neuronek_db_core::{
    AggregateArgs, Backend, CountArgs, CreateArgs, CreateManyArgs, DeleteArgs, DeleteManyArgs,
    Executor, Filter, FindManyArgs, FindUniqueArgs, GroupByArgs, Operation, Payload, QueryError,
    Result, SchemaRegistry, UpdateArgs, UpdateManyArgs, UpsertArgs, Value,
};
use serde_json::Value as Json;

use crate::config::ClientConfig;

/// Something that runs operations: a [`Client`] or an open
/// [`Transaction`](crate::Transaction)
pub trait Runner {
    fn registry(&self) -> &SchemaRegistry;

    fn run(&self, model: &str, operation: &Operation) -> impl Future<Output = Result<Payload>>;
}

// =============================================================================
// Client
// =============================================================================

/// Entry point of the engine: a backend, a registry and a config.
///
/// Reads go straight to the backend. Every write runs in an implicit
/// transaction so that its constraint checks, referential actions and the
/// write itself commit together.
pub struct Client<B> {
    backend: B,
    registry: Arc<SchemaRegistry>,
    config: ClientConfig,
}

impl<B: Clone> Clone for Client<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
        }
    }
}

impl<B> core::fmt::Debug for Client<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> Client<B> {
    pub fn new(backend: B, registry: SchemaRegistry) -> Self {
        Self {
            backend,
            registry: Arc::new(registry),
            config: ClientConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(self, config: ClientConfig) -> Self {
        Self { config, ..self }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// An executor reading straight from the backend, outside any transaction
    pub fn executor(&self) -> Executor<'_, B> {
        Executor::new(&self.backend, &self.registry).with_limits(self.config.query_limits())
    }

    /// Runs one operation; writes get an implicit transaction
    pub async fn execute(&self, model: &str, operation: &Operation) -> Result<Payload> {
        if operation.is_write() {
            let options = self.config.transaction_options();
            self.run_transaction("implicit", options, async |tx| {
                tx.execute(model, operation).await
            })
            .await
        } else {
            self.executor().execute(model, operation).await
        }
    }

    /// Decodes a JSON descriptor for `action` (e.g. `findMany`) and runs it
    pub async fn execute_json(&self, model: &str, action: &str, args: &Json) -> Result<Payload> {
        let operation = decode_operation(&self.registry, model, action, args)?;
        self.execute(model, &operation).await
    }

    /// The operations of `model`
    pub fn model(&self, model: &'static str) -> ModelDelegate<'_, Self> {
        ModelDelegate::new(self, model)
    }
}

impl<B: Backend> Runner for Client<B> {
    fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    async fn run(&self, model: &str, operation: &Operation) -> Result<Payload> {
        self.execute(model, operation).await
    }
}

// =============================================================================
// Model delegate
// =============================================================================

/// Typed operations on one model, run by a client or a transaction
#[derive(Debug)]
pub struct ModelDelegate<'a, R> {
    runner: &'a R,
    model: &'static str,
}

impl<R> Clone for ModelDelegate<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for ModelDelegate<'_, R> {}

impl<'a, R: Runner> ModelDelegate<'a, R> {
    pub(crate) fn new(runner: &'a R, model: &'static str) -> Self {
        Self { runner, model }
    }

    pub fn name(&self) -> &'static str {
        self.model
    }

    async fn run(&self, operation: Operation) -> Result<Payload> {
        self.runner.run(self.model, &operation).await
    }

    pub async fn find_many(&self, args: FindManyArgs) -> Result<Vec<Payload>> {
        Ok(self.run(Operation::FindMany(args)).await?.into_list())
    }

    pub async fn find_first(&self, args: FindManyArgs) -> Result<Option<Payload>> {
        Ok(self.run(Operation::FindFirst(args)).await?.into_option())
    }

    pub async fn find_first_or_throw(&self, args: FindManyArgs) -> Result<Payload> {
        self.run(Operation::FindFirstOrThrow(args)).await
    }

    pub async fn find_unique(&self, args: FindUniqueArgs) -> Result<Option<Payload>> {
        Ok(self.run(Operation::FindUnique(args)).await?.into_option())
    }

    pub async fn find_unique_or_throw(&self, args: FindUniqueArgs) -> Result<Payload> {
        self.run(Operation::FindUniqueOrThrow(args)).await
    }

    pub async fn create(&self, args: CreateArgs) -> Result<Payload> {
        self.run(Operation::Create(args)).await
    }

    /// Returns `{ "count": n }`
    pub async fn create_many(&self, args: CreateManyArgs) -> Result<Payload> {
        self.run(Operation::CreateMany(args)).await
    }

    pub async fn update(&self, args: UpdateArgs) -> Result<Payload> {
        self.run(Operation::Update(args)).await
    }

    /// Returns `{ "count": n }`
    pub async fn update_many(&self, args: UpdateManyArgs) -> Result<Payload> {
        self.run(Operation::UpdateMany(args)).await
    }

    pub async fn upsert(&self, args: UpsertArgs) -> Result<Payload> {
        self.run(Operation::Upsert(args)).await
    }

    pub async fn delete(&self, args: DeleteArgs) -> Result<Payload> {
        self.run(Operation::Delete(args)).await
    }

    /// Returns `{ "count": n }`
    pub async fn delete_many(&self, args: DeleteManyArgs) -> Result<Payload> {
        self.run(Operation::DeleteMany(args)).await
    }

    /// A number, or an object of per-field counts when `select` is given
    pub async fn count(&self, args: CountArgs) -> Result<Payload> {
        self.run(Operation::Count(args)).await
    }

    pub async fn aggregate(&self, args: AggregateArgs) -> Result<Payload> {
        self.run(Operation::Aggregate(args)).await
    }

    /// One object per group
    pub async fn group_by(&self, args: GroupByArgs) -> Result<Vec<Payload>> {
        Ok(self.run(Operation::GroupBy(args)).await?.into_list())
    }

    /// Decodes a JSON descriptor for `action` and runs it on this model
    pub async fn json(&self, action: &str, args: &Json) -> Result<Payload> {
        let operation = decode_operation(self.runner.registry(), self.model, action, args)?;
        self.run(operation).await
    }

    /// A `findMany` descriptor on the target of `relation` selecting the rows
    /// related to the record `parent_id`.
    ///
    /// Run it on the target model's delegate. Nothing is fetched here.
    pub fn related(&self, parent_id: impl Into<Value>, relation: &str) -> Result<FindManyArgs> {
        let registry = self.runner.registry();
        let model = registry.queried_model(self.model)?.name;
        let def = registry.relation(model, relation)?;
        let target = registry.describe(def.target)?;

        let back = target
            .relations
            .iter()
            .find(|r| {
                r.target == model
                    && match (r.join, def.join) {
                        (Some(a), Some(b)) => a.name == b.name,
                        (None, None) => r.fields == def.references && r.references == def.fields,
                        _ => false,
                    }
            })
            .ok_or_else(|| {
                QueryError::Schema(format!(
                    "{model}.{relation} has no back-relation on {}",
                    target.name
                ))
            })?;

        let parent = Filter::equals(registry.id_field(model)?, parent_id);
        let filter = if back.is_to_many() {
            Filter::some(back.name, parent)
        } else {
            Filter::is(back.name, Some(parent))
        };
        Ok(FindManyArgs::new().filter(filter))
    }
}
