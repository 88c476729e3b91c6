//! Compiled predicates and their row-level evaluation.

use core::cmp::Ordering;

use neuronek_db_types::{JoinTableDef, RelationDef};

use crate::row::{Row, key_is_null};
use crate::value::Value;

/// Comparison against a single operand
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    /// Equality; against `Null` this is an `IS NULL` test
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
        }
    }
}

/// Case-sensitive substring tests
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextOp {
    Contains,
    StartsWith,
    EndsWith,
}

/// How a relation filter quantifies over related rows
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quantifier {
    Some,
    Every,
    None,
}

/// The key path from a row to its related rows
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelationLink {
    /// Target model
    pub target: &'static str,
    /// Key fields on the source row
    pub fields: &'static [&'static str],
    /// Matching key fields on the target rows
    pub references: &'static [&'static str],
    /// Join table for many-to-many links
    pub join: Option<JoinTableDef>,
}

impl RelationLink {
    pub const fn of(def: &RelationDef) -> Self {
        Self {
            target: def.target,
            fields: def.fields,
            references: def.references,
            join: def.join,
        }
    }

    /// Keys on the target model that rows related to `row` carry
    pub fn target_keys(&self, row: &Row, source: &dyn RowSource) -> Vec<Vec<Value>> {
        let key = row.key(self.fields);
        if key_is_null(&key) {
            return Vec::new();
        }
        match &self.join {
            Some(join) => source
                .scan(join.name)
                .filter(|j| *j.get(join.source_column) == key[0])
                .map(|j| vec![j.get(join.target_column).clone()])
                .collect(),
            None => vec![key],
        }
    }

    /// The rows of [`RelationLink::target`] related to `row`
    pub fn related<'s>(&self, row: &Row, source: &'s dyn RowSource) -> Vec<&'s Row> {
        let keys = self.target_keys(row, source);
        if keys.is_empty() {
            return Vec::new();
        }
        source
            .scan(self.target)
            .filter(|candidate| {
                let candidate_key = candidate.key(self.references);
                keys.iter().any(|k| *k == candidate_key)
            })
            .collect()
    }
}

/// Read access to stored rows, as needed to evaluate semi-joins.
///
/// Join tables are scanned under their own name.
pub trait RowSource {
    fn scan<'a>(&'a self, model: &str) -> Box<dyn Iterator<Item = &'a Row> + 'a>;
}

/// A validated, name-resolved predicate over one model's rows
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Const(bool),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    In {
        field: String,
        values: Vec<Value>,
    },
    Text {
        field: String,
        op: TextOp,
        needle: String,
    },
    /// Existence test over related rows; never multiplies the source row
    Related {
        link: RelationLink,
        quantifier: Quantifier,
        filter: Box<Predicate>,
    },
}

impl Default for Predicate {
    fn default() -> Self {
        Self::Const(true)
    }
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::eq(field, Value::Null)
    }

    /// Conjunction with constant folding
    pub fn and(parts: Vec<Predicate>) -> Self {
        let mut kept = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Self::Const(true) => {}
                Self::Const(false) => return Self::Const(false),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Self::Const(true),
            1 => kept.pop().unwrap_or_default(),
            _ => Self::And(kept),
        }
    }

    /// Disjunction with constant folding
    pub fn or(parts: Vec<Predicate>) -> Self {
        let mut kept = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Self::Const(false) => {}
                Self::Const(true) => return Self::Const(true),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Self::Const(false),
            1 => kept.pop().unwrap_or(Self::Const(false)),
            _ => Self::Or(kept),
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Self::Const(b) => Self::Const(!b),
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Rows whose composite key over `fields` is one of `keys`.
    ///
    /// Null keys are dropped; an empty key set matches nothing.
    pub fn key_in(fields: &[&str], keys: impl IntoIterator<Item = Vec<Value>>) -> Self {
        let keys: Vec<Vec<Value>> = keys.into_iter().filter(|k| !key_is_null(k)).collect();
        if let [field] = fields {
            return Self::In {
                field: (*field).to_owned(),
                values: keys.into_iter().filter_map(|mut k| k.pop()).collect(),
            };
        }
        Self::or(
            keys.into_iter()
                .map(|key| {
                    Self::and(
                        fields
                            .iter()
                            .zip(key)
                            .map(|(f, v)| Self::eq(*f, v))
                            .collect(),
                    )
                })
                .collect(),
        )
    }

    /// Number of nodes, reported in fetch traces
    pub fn node_count(&self) -> usize {
        match self {
            Self::And(parts) | Self::Or(parts) => 1 + parts.iter().map(Self::node_count).sum::<usize>(),
            Self::Not(inner) => 1 + inner.node_count(),
            Self::Related { filter, .. } => 1 + filter.node_count(),
            _ => 1,
        }
    }

    /// Evaluates the predicate against `row`; relation tests read from `source`.
    ///
    /// A row matches only when the predicate is definitely true, so a
    /// negated comparison on a null field never matches.
    pub fn eval(&self, row: &Row, source: &dyn RowSource) -> bool {
        self.truth(row, source) == Some(true)
    }

    /// Three-valued evaluation: `None` is unknown, as when a null field is
    /// compared against a value. `Not` keeps unknown unknown.
    pub fn truth(&self, row: &Row, source: &dyn RowSource) -> Option<bool> {
        match self {
            Self::Const(b) => Some(*b),
            Self::And(parts) => {
                let mut unknown = false;
                for part in parts {
                    match part.truth(row, source) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                (!unknown).then_some(true)
            }
            Self::Or(parts) => {
                let mut unknown = false;
                for part in parts {
                    match part.truth(row, source) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                (!unknown).then_some(false)
            }
            Self::Not(inner) => inner.truth(row, source).map(|b| !b),
            Self::Compare { field, op, value } => {
                let actual = row.get(field);
                if value.is_null() {
                    return Some(*op == CompareOp::Eq && actual.is_null());
                }
                actual.compare(value).map(|ord| op.holds(ord))
            }
            Self::In { field, values } => {
                let actual = row.get(field);
                if actual.is_null() {
                    // a null entry in the list is an `IS NULL` test
                    return values.iter().any(Value::is_null).then_some(true);
                }
                Some(values.iter().any(|v| actual.compare(v) == Some(Ordering::Equal)))
            }
            Self::Text { field, op, needle } => {
                let text = row.get(field).as_str()?;
                Some(match op {
                    TextOp::Contains => text.contains(needle.as_str()),
                    TextOp::StartsWith => text.starts_with(needle.as_str()),
                    TextOp::EndsWith => text.ends_with(needle.as_str()),
                })
            }
            Self::Related {
                link,
                quantifier,
                filter,
            } => {
                let mut related = link.related(row, source).into_iter();
                Some(match quantifier {
                    Quantifier::Some => related.any(|r| filter.eval(r, source)),
                    Quantifier::Every => related.all(|r| filter.eval(r, source)),
                    Quantifier::None => !related.any(|r| filter.eval(r, source)),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;

    #[derive(Default)]
    struct Tables(HashMap<&'static str, Vec<Row>>);

    impl RowSource for Tables {
        fn scan<'a>(&'a self, model: &str) -> Box<dyn Iterator<Item = &'a Row> + 'a> {
            match self.0.get(model) {
                Some(rows) => Box::new(rows.iter()),
                None => Box::new(core::iter::empty()),
            }
        }
    }

    const POSTS: RelationLink = RelationLink {
        target: "Post",
        fields: &["id"],
        references: &["author_id"],
        join: None,
    };

    fn tables() -> Tables {
        let mut t = Tables::default();
        t.0.insert(
            "Post",
            vec![
                Row::new().with("id", "p1").with("author_id", "u1").with("likes", 3),
                Row::new().with("id", "p2").with("author_id", "u1").with("likes", 10),
                Row::new().with("id", "p3").with("author_id", "u2").with("likes", 1),
            ],
        );
        t
    }

    #[test]
    fn range_comparisons_never_match_null() {
        let t = Tables::default();
        let row = Row::new().with("weight", Value::Null);
        let gt = Predicate::Compare {
            field: "weight".into(),
            op: CompareOp::Gt,
            value: Value::Float(1.0),
        };
        assert!(!gt.eval(&row, &t));
        assert!(!gt.clone().negate().negate().eval(&row, &t));
        assert!(Predicate::is_null("weight").eval(&row, &t));
    }

    #[test]
    fn negation_keeps_unknown_unknown() {
        let t = Tables::default();
        let row = Row::new().with("weight", Value::Null).with("name", "x");
        let heavy = Predicate::Compare {
            field: "weight".into(),
            op: CompareOp::Gt,
            value: Value::Float(80.0),
        };
        assert_eq!(heavy.truth(&row, &t), None);
        assert_eq!(heavy.clone().negate().truth(&row, &t), None);
        assert!(!heavy.clone().negate().eval(&row, &t));

        // unknown OR true is true, unknown AND false is false
        let named = Predicate::eq("name", "x");
        assert!(Predicate::or(vec![heavy.clone(), named.clone()]).eval(&row, &t));
        assert!(
            Predicate::and(vec![heavy.clone(), named.clone().negate()])
                .negate()
                .eval(&row, &t)
        );
        assert!(!Predicate::and(vec![heavy, named]).negate().eval(&row, &t));
    }

    #[test]
    fn constant_folding() {
        assert_eq!(Predicate::and(vec![]), Predicate::Const(true));
        assert_eq!(Predicate::or(vec![]), Predicate::Const(false));
        assert_eq!(
            Predicate::and(vec![Predicate::Const(true), Predicate::eq("a", 1)]),
            Predicate::eq("a", 1)
        );
    }

    #[test]
    fn semi_join_quantifiers() {
        let t = tables();
        let u1 = Row::new().with("id", "u1");
        let u3 = Row::new().with("id", "u3");
        let popular = Predicate::Compare {
            field: "likes".into(),
            op: CompareOp::Gte,
            value: Value::Int(5),
        };
        let related = |quantifier| Predicate::Related {
            link: POSTS,
            quantifier,
            filter: Box::new(popular.clone()),
        };

        assert!(related(Quantifier::Some).eval(&u1, &t));
        assert!(!related(Quantifier::Every).eval(&u1, &t));
        assert!(!related(Quantifier::None).eval(&u1, &t));

        // a row without related rows satisfies `every` and `none` vacuously
        assert!(related(Quantifier::Every).eval(&u3, &t));
        assert!(related(Quantifier::None).eval(&u3, &t));
        assert!(!related(Quantifier::Some).eval(&u3, &t));
    }

    #[test]
    fn key_in_drops_null_keys() {
        let p = Predicate::key_in(&["id"], [vec![Value::from("a")], vec![Value::Null]]);
        assert_eq!(
            p,
            Predicate::In {
                field: "id".into(),
                values: vec![Value::from("a")]
            }
        );
        assert_eq!(Predicate::key_in(&["a", "b"], []), Predicate::Const(false));
    }
}
