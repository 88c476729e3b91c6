//! Backend rows.

use compact_str::CompactString;
use hashbrown::HashMap;

use crate::value::Value;

/// One stored record: field name to value.
///
/// Missing fields read as `Null`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Row {
    values: HashMap<CompactString, Value>,
}

static NULL: Value = Value::Null;

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&NULL)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn set(&mut self, field: impl AsRef<str>, value: impl Into<Value>) {
        self.values
            .insert(CompactString::new(field.as_ref()), value.into());
    }

    /// Builder-style [`Row::set`]
    pub fn with(mut self, field: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// The values of `fields`, in order, as a composite key
    pub fn key(&self, fields: &[&str]) -> Vec<Value> {
        fields.iter().map(|f| self.get(f).clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copies every field of `patch` over this row
    pub fn merge(&mut self, patch: &Row) {
        for (k, v) in patch.iter() {
            self.values.insert(CompactString::new(k), v.clone());
        }
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (CompactString::new(k.as_ref()), v.into()))
                .collect(),
        }
    }
}

/// A key tuple is null when any component is null; such keys never match.
pub fn key_is_null(key: &[Value]) -> bool {
    key.iter().any(Value::is_null)
}
