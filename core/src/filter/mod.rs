//! Declarative `where` trees and their compiled form.
//!
//! The pipeline: a caller builds a [`Filter`] (directly or through the JSON
//! decoder), [`compile_filter`] validates it against the registry and
//! resolves names into a [`Predicate`], and the backend evaluates the
//! predicate with [`Predicate::eval`] over its rows.
//!
//! ```ignore
//! use neuronek_db_core::filter::{Filter, ScalarFilter};
//!
//! // Subjects heavier than 70 with at least one estimated ingestion
//! let filter = Filter::and([
//!     Filter::field("weight", ScalarFilter::new().gt(70.0)),
//!     Filter::some("ingestions", Filter::equals("isEstimatedDosage", true)),
//! ]);
//! ```

mod compile;
mod predicate;

pub use compile::{CompiledFilter, compile_filter, compile_scalar};
pub use predicate::{CompareOp, Predicate, Quantifier, RelationLink, RowSource, TextOp};

use crate::value::Value;

// =============================================================================
// Scalar conditions
// =============================================================================

/// One operator applied to a scalar field
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarOp {
    Equals(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    /// Negation of a nested condition; `not: value` is `not: { equals: value }`
    Not(Box<ScalarFilter>),
}

/// The operators applied to one field, all of which must hold
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScalarFilter {
    pub ops: Vec<ScalarOp>,
}

impl ScalarFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, op: ScalarOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn equals(self, value: impl Into<Value>) -> Self {
        self.push(ScalarOp::Equals(value.into()))
    }

    pub fn is_in<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push(ScalarOp::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn not_in<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push(ScalarOp::NotIn(values.into_iter().map(Into::into).collect()))
    }

    pub fn lt(self, value: impl Into<Value>) -> Self {
        self.push(ScalarOp::Lt(value.into()))
    }

    pub fn lte(self, value: impl Into<Value>) -> Self {
        self.push(ScalarOp::Lte(value.into()))
    }

    pub fn gt(self, value: impl Into<Value>) -> Self {
        self.push(ScalarOp::Gt(value.into()))
    }

    pub fn gte(self, value: impl Into<Value>) -> Self {
        self.push(ScalarOp::Gte(value.into()))
    }

    pub fn contains(self, needle: impl Into<String>) -> Self {
        self.push(ScalarOp::Contains(needle.into()))
    }

    pub fn starts_with(self, prefix: impl Into<String>) -> Self {
        self.push(ScalarOp::StartsWith(prefix.into()))
    }

    pub fn ends_with(self, suffix: impl Into<String>) -> Self {
        self.push(ScalarOp::EndsWith(suffix.into()))
    }

    pub fn not(self, inner: ScalarFilter) -> Self {
        self.push(ScalarOp::Not(Box::new(inner)))
    }
}

// =============================================================================
// Relation conditions
// =============================================================================

/// Existence tests over a relation
#[derive(Clone, Debug, PartialEq)]
pub enum RelationFilter {
    /// To-many: at least one related row matches
    Some(Box<Filter>),
    /// To-many: every related row matches (true when there are none)
    Every(Box<Filter>),
    /// To-many: no related row matches
    None(Box<Filter>),
    /// To-one: the related row exists and matches; `None` tests for absence
    Is(Option<Box<Filter>>),
    /// To-one: no matching related row; `None` tests for presence
    IsNot(Option<Box<Filter>>),
}

// =============================================================================
// Where tree
// =============================================================================

/// A `where` tree over one model
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// All sub-trees hold; the empty conjunction matches every row
    And(Vec<Filter>),
    /// At least one sub-tree holds; the empty disjunction matches nothing
    Or(Vec<Filter>),
    /// No sub-tree holds
    Not(Vec<Filter>),
    Field {
        field: String,
        condition: ScalarFilter,
    },
    Relation {
        relation: String,
        condition: RelationFilter,
    },
}

impl Default for Filter {
    fn default() -> Self {
        Self::all()
    }
}

impl Filter {
    /// The empty `where`
    pub const fn all() -> Self {
        Self::And(Vec::new())
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Or(filters.into_iter().collect())
    }

    pub fn not(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Not(filters.into_iter().collect())
    }

    pub fn field(field: impl Into<String>, condition: ScalarFilter) -> Self {
        Self::Field {
            field: field.into(),
            condition,
        }
    }

    /// Shorthand for `{ field: { equals: value } }`
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, ScalarFilter::new().equals(value))
    }

    pub fn relation(relation: impl Into<String>, condition: RelationFilter) -> Self {
        Self::Relation {
            relation: relation.into(),
            condition,
        }
    }

    pub fn some(relation: impl Into<String>, filter: Filter) -> Self {
        Self::relation(relation, RelationFilter::Some(Box::new(filter)))
    }

    pub fn every(relation: impl Into<String>, filter: Filter) -> Self {
        Self::relation(relation, RelationFilter::Every(Box::new(filter)))
    }

    pub fn none(relation: impl Into<String>, filter: Filter) -> Self {
        Self::relation(relation, RelationFilter::None(Box::new(filter)))
    }

    pub fn is(relation: impl Into<String>, filter: Option<Filter>) -> Self {
        Self::relation(relation, RelationFilter::Is(filter.map(Box::new)))
    }

    pub fn is_not(relation: impl Into<String>, filter: Option<Filter>) -> Self {
        Self::relation(relation, RelationFilter::IsNot(filter.map(Box::new)))
    }

    /// True for the empty `where`
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::And(list) if list.iter().all(Filter::is_empty))
    }

    /// Adds `other` as an additional conjunct
    pub fn and_also(self, other: Filter) -> Self {
        match self {
            Self::And(mut list) => {
                list.push(other);
                Self::And(list)
            }
            this => Self::And(vec![this, other]),
        }
    }

    /// Top-level `equals` fields that are combined by AND, used to decide
    /// whether a `where` addresses a unique key
    pub fn equality_fields(&self) -> Vec<(&str, &Value)> {
        let mut out = Vec::new();
        self.collect_equalities(&mut out);
        out
    }

    fn collect_equalities<'a>(&'a self, out: &mut Vec<(&'a str, &'a Value)>) {
        match self {
            Self::And(list) => list.iter().for_each(|f| f.collect_equalities(out)),
            Self::Field { field, condition } => {
                for op in &condition.ops {
                    if let ScalarOp::Equals(v) = op {
                        out.push((field.as_str(), v));
                    }
                }
            }
            _ => {}
        }
    }
}
