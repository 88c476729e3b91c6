//! Operation execution.
//!
//! An [`Executor`] binds a connection (a backend or an open transaction) to
//! a registry and runs descriptors against it. Every operation plans first,
//! so validation errors surface before the first backend call.
//!
//! Writes are split into several backend calls (constraint checks, the
//! write itself, referential actions, read-back). Run them on a transaction
//! handle to make them atomic; the client does this for every standalone
//! mutation.

mod guard;
mod loader;
mod mutation;

pub use loader::{Loaded, LoadedRelation};

use crate::args::{FindManyArgs, FindUniqueArgs, Operation};
use crate::assemble::{Payload, assemble};
use crate::backend::{Connection, FetchRequest, ReadView, WriteOp, WriteResult};
use crate::error::{QueryError, Result};
use crate::filter::Predicate;
use crate::order::sort_rows;
use crate::plan::{QueryLimits, QueryPlan, plan_find_many, unique_where};
use crate::registry::SchemaRegistry;
use crate::row::Row;

pub struct Executor<'a, C> {
    pub(crate) conn: &'a C,
    pub(crate) registry: &'a SchemaRegistry,
    pub(crate) limits: QueryLimits,
    pub(crate) view: ReadView,
}

impl<C> Clone for Executor<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Executor<'_, C> {}

impl<C> core::fmt::Debug for Executor<'_, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Executor")
            .field("registry", self.registry)
            .field("limits", &self.limits)
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

impl<'a, C: Connection> Executor<'a, C> {
    pub fn new(conn: &'a C, registry: &'a SchemaRegistry) -> Self {
        Self {
            conn,
            registry,
            limits: QueryLimits::default(),
            view: ReadView::Current,
        }
    }

    #[must_use]
    pub fn with_limits(self, limits: QueryLimits) -> Self {
        Self { limits, ..self }
    }

    /// Sets the state that reads and write lookups see.
    ///
    /// With [`ReadView::Snapshot`], queries and the rows a write targets come
    /// from the state at the start of the transaction. Constraint checks and
    /// the read-back of a written record always see the live state, so
    /// writes made earlier in the same transaction still conflict.
    #[must_use]
    pub fn with_read_view(self, view: ReadView) -> Self {
        Self { view, ..self }
    }

    pub fn registry(&self) -> &'a SchemaRegistry {
        self.registry
    }

    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    // =========================================================================
    // Backend access
    // =========================================================================

    /// Fetches through the registry hooks
    pub(crate) async fn fetch(&self, model: &'static str, predicate: Predicate) -> Result<Vec<Row>> {
        self.fetch_in(self.view, model, predicate).await
    }

    /// Fetches the live state whatever view the executor reads
    pub(crate) async fn fetch_live(&self, model: &'static str, predicate: Predicate) -> Result<Vec<Row>> {
        self.fetch_in(ReadView::Current, model, predicate).await
    }

    /// This executor reading the live state
    pub(crate) fn live(&self) -> Self {
        self.with_read_view(ReadView::Current)
    }

    async fn fetch_in(
        &self,
        view: ReadView,
        model: &'static str,
        predicate: Predicate,
    ) -> Result<Vec<Row>> {
        let mut request = FetchRequest::new(model, predicate).view(view);
        for hook in self.registry.hooks() {
            hook.before_fetch(model, &mut request);
        }
        crate::trace_fetch!(request.model, request.predicate.node_count());
        self.conn.fetch(&request).await
    }

    pub(crate) async fn write(&self, op: WriteOp) -> Result<WriteResult> {
        crate::trace_write!(op.target(), op.kind());
        self.conn.write(&op).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Filtered, ordered and windowed root rows of `plan`
    pub(crate) async fn read_rows(&self, plan: &QueryPlan) -> Result<Vec<Row>> {
        let mut rows = self.fetch(plan.model, plan.filter.predicate.clone()).await?;
        sort_rows(&mut rows, &plan.order);
        Ok(plan.window.apply(rows))
    }

    /// Loads relations for `rows` and assembles one payload per row
    pub(crate) async fn materialize(&self, plan: &QueryPlan, rows: Vec<Row>) -> Result<Vec<Payload>> {
        let loaded = self.load(rows, &plan.projection).await?;
        Ok(loaded
            .into_iter()
            .map(|node| {
                let mut record = assemble(&plan.projection, node);
                for hook in self.registry.hooks() {
                    hook.after_assemble(plan.model, &mut record);
                }
                Payload::from(record)
            })
            .collect())
    }

    pub(crate) async fn run_plan(&self, plan: &QueryPlan) -> Result<Vec<Payload>> {
        let rows = self.read_rows(plan).await?;
        self.materialize(plan, rows).await
    }

    pub async fn find_many(&self, model: &str, args: &FindManyArgs) -> Result<Vec<Payload>> {
        let plan = plan_find_many(self.registry, &self.limits, model, args)?;
        self.run_plan(&plan).await
    }

    pub async fn find_first(&self, model: &str, args: &FindManyArgs) -> Result<Option<Payload>> {
        let mut plan = plan_find_many(self.registry, &self.limits, model, args)?;
        plan.window.take = Some(match plan.window.take {
            Some(take) if take < 0 => -1,
            _ => 1,
        });
        Ok(self.run_plan(&plan).await?.into_iter().next())
    }

    pub async fn find_first_or_throw(&self, model: &str, args: &FindManyArgs) -> Result<Payload> {
        self.find_first(model, args)
            .await?
            .ok_or_else(|| self.not_found(model))
    }

    pub async fn find_unique(&self, model: &str, args: &FindUniqueArgs) -> Result<Option<Payload>> {
        unique_where(self.registry, model, &args.filter)?;
        let args = FindManyArgs {
            filter: args.filter.clone(),
            select: args.select.clone(),
            include: args.include.clone(),
            ..FindManyArgs::default()
        };
        self.find_first(model, &args).await
    }

    pub async fn find_unique_or_throw(&self, model: &str, args: &FindUniqueArgs) -> Result<Payload> {
        self.find_unique(model, args)
            .await?
            .ok_or_else(|| self.not_found(model))
    }

    fn not_found(&self, model: &str) -> QueryError {
        let name = self.registry.describe(model).map_or(model, |d| d.name);
        QueryError::not_found(name)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Runs any operation, shaping its result as one payload
    pub async fn execute(&self, model: &str, operation: &Operation) -> Result<Payload> {
        self.registry.queried_model(model)?;
        match operation {
            Operation::FindMany(args) => Ok(Payload::list(self.find_many(model, args).await?)),
            Operation::FindFirst(args) => Ok(Payload::optional(self.find_first(model, args).await?)),
            Operation::FindFirstOrThrow(args) => self.find_first_or_throw(model, args).await,
            Operation::FindUnique(args) => {
                Ok(Payload::optional(self.find_unique(model, args).await?))
            }
            Operation::FindUniqueOrThrow(args) => self.find_unique_or_throw(model, args).await,
            Operation::Create(args) => self.create(model, args).await,
            Operation::CreateMany(args) => self.create_many(model, args).await,
            Operation::Update(args) => self.update(model, args).await,
            Operation::UpdateMany(args) => self.update_many(model, args).await,
            Operation::Upsert(args) => self.upsert(model, args).await,
            Operation::Delete(args) => self.delete(model, args).await,
            Operation::DeleteMany(args) => self.delete_many(model, args).await,
            Operation::Count(args) => self.count(model, args).await,
            Operation::Aggregate(args) => self.aggregate(model, args).await,
            Operation::GroupBy(args) => self.group_by(model, args).await,
        }
    }
}
