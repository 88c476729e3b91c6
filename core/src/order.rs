//! `orderBy` specifications and the row comparator.
//!
//! Nulls sort as the lowest value unless a [`NullsOrder`] is given: first in
//! ascending order, last in descending order.

use core::cmp::Ordering;

use crate::error::Result;
use crate::registry::SchemaRegistry;
use crate::row::Row;
use crate::value::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NullsOrder {
    First,
    Last,
}

/// One `orderBy` key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
    pub nulls: Option<NullsOrder>,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
            nulls: None,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
            nulls: None,
        }
    }

    #[must_use]
    pub fn nulls(self, nulls: NullsOrder) -> Self {
        Self {
            nulls: Some(nulls),
            ..self
        }
    }

    fn nulls_placement(&self) -> NullsOrder {
        self.nulls.unwrap_or(match self.order {
            SortOrder::Asc => NullsOrder::First,
            SortOrder::Desc => NullsOrder::Last,
        })
    }

    /// Compares two values under this key
    pub fn compare_values(&self, a: &Value, b: &Value) -> Ordering {
        let null_first = self.nulls_placement() == NullsOrder::First;
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if null_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if null_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = a.compare(b).unwrap_or(Ordering::Equal);
                match self.order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            }
        }
    }
}

/// Validates `order` against `model` and makes it total.
///
/// A non-empty ordering gets the id field appended ascending unless it is
/// already a key. An empty ordering stays empty and rows keep storage order.
pub fn resolve_order(
    registry: &SchemaRegistry,
    model: &str,
    order: &[OrderBy],
) -> Result<Vec<OrderBy>> {
    for key in order {
        registry.field(model, &key.field)?;
    }
    let mut resolved = order.to_vec();
    if !resolved.is_empty() {
        let id = registry.id_field(model)?;
        if !resolved.iter().any(|k| k.field == id) {
            resolved.push(OrderBy::asc(id));
        }
    }
    Ok(resolved)
}

pub fn compare_rows(a: &Row, b: &Row, order: &[OrderBy]) -> Ordering {
    order
        .iter()
        .map(|key| key.compare_values(a.get(&key.field), b.get(&key.field)))
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Stable sort; rows equal under `order` keep their relative order
pub fn sort_rows(rows: &mut [Row], order: &[OrderBy]) {
    if !order.is_empty() {
        rows.sort_by(|a, b| compare_rows(a, b, order));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Row> {
        vec![
            Row::new().with("id", "a").with("weight", 80.0),
            Row::new().with("id", "b").with("weight", Value::Null),
            Row::new().with("id", "c").with("weight", 60.0),
            Row::new().with("id", "d").with("weight", 80.0),
        ]
    }

    fn ids(rows: &[Row]) -> Vec<&str> {
        rows.iter().filter_map(|r| r.get("id").as_str()).collect()
    }

    #[test]
    fn nulls_are_lowest_by_default() {
        let mut r = rows();
        sort_rows(&mut r, &[OrderBy::asc("weight"), OrderBy::asc("id")]);
        assert_eq!(ids(&r), ["b", "c", "a", "d"]);

        sort_rows(&mut r, &[OrderBy::desc("weight"), OrderBy::asc("id")]);
        assert_eq!(ids(&r), ["a", "d", "c", "b"]);
    }

    #[test]
    fn explicit_nulls_placement() {
        let mut r = rows();
        sort_rows(
            &mut r,
            &[OrderBy::asc("weight").nulls(NullsOrder::Last), OrderBy::asc("id")],
        );
        assert_eq!(ids(&r), ["c", "a", "d", "b"]);
    }

    #[test]
    fn empty_order_keeps_storage_order() {
        let mut r = rows();
        sort_rows(&mut r, &[]);
        assert_eq!(ids(&r), ["a", "b", "c", "d"]);
    }
}
