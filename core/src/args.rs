//! Operation descriptors.
//!
//! Each descriptor is an immutable value built up front and executed by a
//! single call. Validation happens at execution time, before any I/O.

use crate::filter::Filter;
use crate::order::OrderBy;
use crate::value::Value;
use crate::window::Cursor;

// =============================================================================
// Projection
// =============================================================================

/// One entry of a `select` or `include` object
#[derive(Clone, Debug, PartialEq)]
pub enum SelectionEntry {
    /// `field: true|false`, or `relation: true`
    Flag(bool),
    /// `relation: { where, orderBy, ..., select | include }`
    Nested(Box<FindManyArgs>),
    /// `_count: { select: { relation: ... } }`
    Count(CountSelection),
}

/// The contents of a `select` or `include` object, in request order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    pub entries: Vec<(String, SelectionEntry)>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.entries.push((name.into(), SelectionEntry::Flag(true)));
        self
    }

    #[must_use]
    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.entries.push((name.into(), SelectionEntry::Flag(false)));
        self
    }

    #[must_use]
    pub fn nested(mut self, relation: impl Into<String>, args: FindManyArgs) -> Self {
        self.entries
            .push((relation.into(), SelectionEntry::Nested(Box::new(args))));
        self
    }

    #[must_use]
    pub fn count(mut self, counts: CountSelection) -> Self {
        self.entries
            .push(("_count".to_owned(), SelectionEntry::Count(counts)));
        self
    }
}

/// Relation counts requested through `_count`
#[derive(Clone, Debug, PartialEq)]
pub enum CountSelection {
    /// `_count: true`: every to-many relation, unfiltered
    All,
    /// `_count: { select: { relation: true | { where } } }`
    Relations(Vec<(String, Filter)>),
}

// =============================================================================
// Reads
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindManyArgs {
    pub filter: Filter,
    pub order_by: Vec<OrderBy>,
    pub cursor: Option<Cursor>,
    pub take: Option<i64>,
    pub skip: Option<u64>,
    pub distinct: Vec<String>,
    pub select: Option<Selection>,
    pub include: Option<Selection>,
}

impl FindManyArgs {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(self, filter: Filter) -> Self {
        Self { filter, ..self }
    }

    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    #[must_use]
    pub fn cursor(self, cursor: Cursor) -> Self {
        Self {
            cursor: Some(cursor),
            ..self
        }
    }

    #[must_use]
    pub fn take(self, take: i64) -> Self {
        Self {
            take: Some(take),
            ..self
        }
    }

    #[must_use]
    pub fn skip(self, skip: u64) -> Self {
        Self {
            skip: Some(skip),
            ..self
        }
    }

    #[must_use]
    pub fn distinct(mut self, field: impl Into<String>) -> Self {
        self.distinct.push(field.into());
        self
    }

    #[must_use]
    pub fn select(self, select: Selection) -> Self {
        Self {
            select: Some(select),
            ..self
        }
    }

    #[must_use]
    pub fn include(self, include: Selection) -> Self {
        Self {
            include: Some(include),
            ..self
        }
    }
}

/// `findUnique`: `filter` must pin a unique key with equality
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindUniqueArgs {
    pub filter: Filter,
    pub select: Option<Selection>,
    pub include: Option<Selection>,
}

impl FindUniqueArgs {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn select(self, select: Selection) -> Self {
        Self {
            select: Some(select),
            ..self
        }
    }

    #[must_use]
    pub fn include(self, include: Selection) -> Self {
        Self {
            include: Some(include),
            ..self
        }
    }
}

// =============================================================================
// Write data
// =============================================================================

/// Scalar assignment or numeric update operator
#[derive(Clone, Debug, PartialEq)]
pub enum FieldWrite {
    Set(Value),
    Increment(Value),
    Decrement(Value),
    Multiply(Value),
    Divide(Value),
}

impl FieldWrite {
    pub const fn operator(&self) -> &'static str {
        match self {
            Self::Set(_) => "set",
            Self::Increment(_) => "increment",
            Self::Decrement(_) => "decrement",
            Self::Multiply(_) => "multiply",
            Self::Divide(_) => "divide",
        }
    }

    pub const fn operand(&self) -> &Value {
        match self {
            Self::Set(v)
            | Self::Increment(v)
            | Self::Decrement(v)
            | Self::Multiply(v)
            | Self::Divide(v) => v,
        }
    }
}

/// Relation write addressed by unique selectors
#[derive(Clone, Debug, PartialEq)]
pub enum RelationWrite {
    Connect(Vec<Filter>),
    /// `None` is `disconnect: true` on a to-one relation
    Disconnect(Option<Vec<Filter>>),
    /// Replace every link of a to-many relation
    Set(Vec<Filter>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum DataEntry {
    Scalar(FieldWrite),
    Relation(Vec<RelationWrite>),
}

/// `data` of a create or update, in request order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteData {
    pub entries: Vec<(String, DataEntry)>,
}

impl WriteData {
    pub fn new() -> Self {
        Self::default()
    }

    fn scalar(mut self, field: impl Into<String>, write: FieldWrite) -> Self {
        self.entries.push((field.into(), DataEntry::Scalar(write)));
        self
    }

    fn relation(mut self, relation: impl Into<String>, write: RelationWrite) -> Self {
        let relation = relation.into();
        match self.entries.iter_mut().find(|(name, _)| *name == relation) {
            Some((_, DataEntry::Relation(writes))) => writes.push(write),
            _ => self.entries.push((relation, DataEntry::Relation(vec![write]))),
        }
        self
    }

    #[must_use]
    pub fn set(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.scalar(field, FieldWrite::Set(value.into()))
    }

    #[must_use]
    pub fn increment(self, field: impl Into<String>, by: impl Into<Value>) -> Self {
        self.scalar(field, FieldWrite::Increment(by.into()))
    }

    #[must_use]
    pub fn decrement(self, field: impl Into<String>, by: impl Into<Value>) -> Self {
        self.scalar(field, FieldWrite::Decrement(by.into()))
    }

    #[must_use]
    pub fn multiply(self, field: impl Into<String>, by: impl Into<Value>) -> Self {
        self.scalar(field, FieldWrite::Multiply(by.into()))
    }

    #[must_use]
    pub fn divide(self, field: impl Into<String>, by: impl Into<Value>) -> Self {
        self.scalar(field, FieldWrite::Divide(by.into()))
    }

    #[must_use]
    pub fn connect(self, relation: impl Into<String>, target: Filter) -> Self {
        self.relation(relation, RelationWrite::Connect(vec![target]))
    }

    #[must_use]
    pub fn disconnect(self, relation: impl Into<String>, targets: Vec<Filter>) -> Self {
        self.relation(relation, RelationWrite::Disconnect(Some(targets)))
    }

    /// `disconnect: true` on a to-one relation
    #[must_use]
    pub fn disconnect_one(self, relation: impl Into<String>) -> Self {
        self.relation(relation, RelationWrite::Disconnect(None))
    }

    #[must_use]
    pub fn set_relation(self, relation: impl Into<String>, targets: Vec<Filter>) -> Self {
        self.relation(relation, RelationWrite::Set(targets))
    }

    pub fn has_relation_writes(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, e)| matches!(e, DataEntry::Relation(_)))
    }
}

// =============================================================================
// Writes
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateArgs {
    pub data: WriteData,
    pub select: Option<Selection>,
    pub include: Option<Selection>,
}

impl CreateArgs {
    pub fn new(data: WriteData) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn select(self, select: Selection) -> Self {
        Self {
            select: Some(select),
            ..self
        }
    }

    #[must_use]
    pub fn include(self, include: Selection) -> Self {
        Self {
            include: Some(include),
            ..self
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateManyArgs {
    /// Scalar-only rows
    pub data: Vec<WriteData>,
    /// Silently drop rows that would violate a unique constraint
    pub skip_duplicates: bool,
}

/// `update`: `filter` must pin a unique key with equality
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateArgs {
    pub filter: Filter,
    pub data: WriteData,
    pub select: Option<Selection>,
    pub include: Option<Selection>,
}

impl UpdateArgs {
    pub fn new(filter: Filter, data: WriteData) -> Self {
        Self {
            filter,
            data,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn include(self, include: Selection) -> Self {
        Self {
            include: Some(include),
            ..self
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateManyArgs {
    pub filter: Filter,
    /// Scalar-only changes
    pub data: WriteData,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpsertArgs {
    pub filter: Filter,
    pub create: WriteData,
    pub update: WriteData,
    pub select: Option<Selection>,
    pub include: Option<Selection>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteArgs {
    pub filter: Filter,
    pub select: Option<Selection>,
    pub include: Option<Selection>,
}

impl DeleteArgs {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteManyArgs {
    pub filter: Filter,
}

// =============================================================================
// Aggregates
// =============================================================================

/// Aggregate function
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    Count,
    Min,
    Max,
    Avg,
    Sum,
}

impl AggregateFn {
    pub const ALL: [AggregateFn; 5] = [Self::Count, Self::Min, Self::Max, Self::Avg, Self::Sum];

    /// Output key, e.g. `_avg`
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Count => "_count",
            Self::Min => "_min",
            Self::Max => "_max",
            Self::Avg => "_avg",
            Self::Sum => "_sum",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

/// Requested aggregate sub-objects; `_count` also accepts `_all`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregateSelection {
    pub count: Vec<String>,
    pub min: Vec<String>,
    pub max: Vec<String>,
    pub avg: Vec<String>,
    pub sum: Vec<String>,
}

impl AggregateSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(&self, func: AggregateFn) -> &[String] {
        match func {
            AggregateFn::Count => &self.count,
            AggregateFn::Min => &self.min,
            AggregateFn::Max => &self.max,
            AggregateFn::Avg => &self.avg,
            AggregateFn::Sum => &self.sum,
        }
    }

    pub fn fields_mut(&mut self, func: AggregateFn) -> &mut Vec<String> {
        match func {
            AggregateFn::Count => &mut self.count,
            AggregateFn::Min => &mut self.min,
            AggregateFn::Max => &mut self.max,
            AggregateFn::Avg => &mut self.avg,
            AggregateFn::Sum => &mut self.sum,
        }
    }

    #[must_use]
    pub fn with(mut self, func: AggregateFn, field: impl Into<String>) -> Self {
        self.fields_mut(func).push(field.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        AggregateFn::ALL.iter().all(|f| self.fields(*f).is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CountArgs {
    pub filter: Filter,
    pub order_by: Vec<OrderBy>,
    pub cursor: Option<Cursor>,
    pub take: Option<i64>,
    pub skip: Option<u64>,
    /// Per-field non-null counts; `_all` counts rows
    pub select: Option<Vec<String>>,
}

impl CountArgs {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregateArgs {
    pub filter: Filter,
    pub order_by: Vec<OrderBy>,
    pub cursor: Option<Cursor>,
    pub take: Option<i64>,
    pub skip: Option<u64>,
    pub aggregates: AggregateSelection,
}

/// A `having` tree
#[derive(Clone, Debug, PartialEq)]
pub enum Having {
    And(Vec<Having>),
    Or(Vec<Having>),
    Not(Vec<Having>),
    /// Condition on a bare field, which must be a `by` field
    Field {
        field: String,
        condition: crate::filter::ScalarFilter,
    },
    /// Condition on a per-group aggregate
    Aggregate {
        func: AggregateFn,
        field: String,
        condition: crate::filter::ScalarFilter,
    },
}

/// A `groupBy` ordering key
#[derive(Clone, Debug, PartialEq)]
pub enum GroupOrderBy {
    Field(OrderBy),
    Aggregate {
        func: AggregateFn,
        /// Field name, or `_all` under `_count`
        order: OrderBy,
    },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupByArgs {
    pub by: Vec<String>,
    pub filter: Filter,
    pub having: Option<Having>,
    pub order_by: Vec<GroupOrderBy>,
    pub take: Option<i64>,
    pub skip: Option<u64>,
    pub aggregates: AggregateSelection,
}

impl GroupByArgs {
    pub fn new<I, S>(by: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            by: by.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

// =============================================================================
// Operation
// =============================================================================

/// Any single model operation, as carried by batches and the JSON decoder
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    FindMany(FindManyArgs),
    FindFirst(FindManyArgs),
    FindFirstOrThrow(FindManyArgs),
    FindUnique(FindUniqueArgs),
    FindUniqueOrThrow(FindUniqueArgs),
    Create(CreateArgs),
    CreateMany(CreateManyArgs),
    Update(UpdateArgs),
    UpdateMany(UpdateManyArgs),
    Upsert(UpsertArgs),
    Delete(DeleteArgs),
    DeleteMany(DeleteManyArgs),
    Count(CountArgs),
    Aggregate(AggregateArgs),
    GroupBy(GroupByArgs),
}

impl Operation {
    /// The client-facing action name, e.g. `findMany`
    pub const fn action(&self) -> &'static str {
        match self {
            Self::FindMany(_) => "findMany",
            Self::FindFirst(_) => "findFirst",
            Self::FindFirstOrThrow(_) => "findFirstOrThrow",
            Self::FindUnique(_) => "findUnique",
            Self::FindUniqueOrThrow(_) => "findUniqueOrThrow",
            Self::Create(_) => "create",
            Self::CreateMany(_) => "createMany",
            Self::Update(_) => "update",
            Self::UpdateMany(_) => "updateMany",
            Self::Upsert(_) => "upsert",
            Self::Delete(_) => "delete",
            Self::DeleteMany(_) => "deleteMany",
            Self::Count(_) => "count",
            Self::Aggregate(_) => "aggregate",
            Self::GroupBy(_) => "groupBy",
        }
    }

    pub const fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Create(_)
                | Self::CreateMany(_)
                | Self::Update(_)
                | Self::UpdateMany(_)
                | Self::Upsert(_)
                | Self::Delete(_)
                | Self::DeleteMany(_)
        )
    }
}
