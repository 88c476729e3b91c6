//! Cursor, skip, signed take and distinct over an ordered row set.
//!
//! Rows arrive filtered and ordered. `distinct` keeps the first row of each
//! combination of the listed fields, then the window is sliced:
//!
//! - without a cursor, a positive `take` counts forward from the start after
//!   skipping `skip` rows, a negative `take` counts backward from the end;
//! - with a cursor, the slice is anchored at the cursor row (inclusive) and
//!   `skip` moves away from it in the direction of `take`; a cursor that
//!   matches no row yields nothing.
//!
//! A backward slice is returned in the active order, not reversed.

use hashbrown::HashSet;

use crate::row::Row;
use crate::value::Value;

/// A unique key locating the cursor row, as field/value pairs
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cursor(pub Vec<(String, Value)>);

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((field.into(), value.into()));
        self
    }

    fn matches(&self, row: &Row) -> bool {
        self.0.iter().all(|(field, value)| row.get(field) == value)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Window {
    pub cursor: Option<Cursor>,
    pub skip: Option<u64>,
    pub take: Option<i64>,
    pub distinct: Vec<String>,
}

impl Window {
    /// True when the window passes every row through
    pub fn is_unbounded(&self) -> bool {
        self.cursor.is_none() && self.skip.is_none() && self.take.is_none() && self.distinct.is_empty()
    }

    pub fn apply(&self, rows: Vec<Row>) -> Vec<Row> {
        let rows = if self.distinct.is_empty() {
            rows
        } else {
            self.dedupe(rows)
        };

        let skip = usize::try_from(self.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let take = self.take.map(|t| usize::try_from(t.unsigned_abs()).unwrap_or(usize::MAX));
        let backward = self.take.is_some_and(|t| t < 0);

        let (start, end) = match (&self.cursor, backward) {
            (None, false) => {
                let start = skip.min(rows.len());
                (start, take.map_or(rows.len(), |t| start.saturating_add(t).min(rows.len())))
            }
            (None, true) => {
                let end = rows.len().saturating_sub(skip);
                (take.map_or(0, |t| end.saturating_sub(t)), end)
            }
            (Some(cursor), false) => {
                let Some(at) = rows.iter().position(|r| cursor.matches(r)) else {
                    return Vec::new();
                };
                let start = at.saturating_add(skip).min(rows.len());
                (start, take.map_or(rows.len(), |t| start.saturating_add(t).min(rows.len())))
            }
            (Some(cursor), true) => {
                let Some(at) = rows.iter().position(|r| cursor.matches(r)) else {
                    return Vec::new();
                };
                let end = (at + 1).saturating_sub(skip);
                (take.map_or(0, |t| end.saturating_sub(t)), end)
            }
        };

        rows.into_iter().skip(start).take(end.saturating_sub(start)).collect()
    }

    fn dedupe(&self, rows: Vec<Row>) -> Vec<Row> {
        let fields: Vec<&str> = self.distinct.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        rows.into_iter()
            .filter(|row| seen.insert(row.key(&fields)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: i64) -> Vec<Row> {
        (1..=n).map(|i| Row::new().with("id", i).with("group", i % 2)).collect()
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter().filter_map(|r| r.get("id").as_i64()).collect()
    }

    fn window(cursor: Option<i64>, skip: Option<u64>, take: Option<i64>) -> Window {
        Window {
            cursor: cursor.map(|c| Cursor::new().field("id", c)),
            skip,
            take,
            distinct: Vec::new(),
        }
    }

    #[test]
    fn skip_and_take_forward() {
        assert_eq!(ids(&window(None, Some(1), Some(2)).apply(rows(5))), [2, 3]);
        assert_eq!(ids(&window(None, Some(4), None).apply(rows(5))), [5]);
        assert_eq!(ids(&window(None, Some(9), Some(2)).apply(rows(5))), Vec::<i64>::new());
        assert_eq!(ids(&window(None, None, Some(0)).apply(rows(5))), Vec::<i64>::new());
    }

    #[test]
    fn negative_take_counts_from_the_end() {
        assert_eq!(ids(&window(None, None, Some(-2)).apply(rows(5))), [4, 5]);
        assert_eq!(ids(&window(None, Some(1), Some(-2)).apply(rows(5))), [3, 4]);
    }

    #[test]
    fn cursor_is_inclusive_unless_skipped() {
        assert_eq!(ids(&window(Some(3), None, Some(2)).apply(rows(5))), [3, 4]);
        assert_eq!(ids(&window(Some(3), Some(1), Some(2)).apply(rows(5))), [4, 5]);
        assert_eq!(ids(&window(Some(3), None, Some(-2)).apply(rows(5))), [2, 3]);
        assert_eq!(ids(&window(Some(3), Some(1), Some(-5)).apply(rows(5))), [1, 2]);
    }

    #[test]
    fn missing_cursor_yields_nothing() {
        assert!(window(Some(42), None, Some(2)).apply(rows(5)).is_empty());
    }

    #[test]
    fn distinct_applies_before_the_window() {
        let w = Window {
            distinct: vec!["group".into()],
            take: Some(5),
            ..Window::default()
        };
        assert_eq!(ids(&w.apply(rows(5))), [1, 2]);
    }

    #[test]
    fn same_window_same_rows() {
        let w = window(Some(2), Some(1), Some(2));
        assert_eq!(ids(&w.apply(rows(6))), ids(&w.apply(rows(6))));
    }
}
