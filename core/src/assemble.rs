//! Result assembly.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as Json};

use crate::error::{QueryError, Result};
use crate::executor::{Loaded, LoadedRelation};
use crate::projection::{COUNT_KEY, ProjectionTree};

/// One operation result as JSON.
///
/// Records are objects whose keys follow the projection: scalars in schema
/// order, then relations in request order, then `_count`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Payload(Json);

impl Payload {
    pub fn list(items: Vec<Payload>) -> Self {
        Self(Json::Array(items.into_iter().map(|p| p.0).collect()))
    }

    pub fn optional(item: Option<Payload>) -> Self {
        item.unwrap_or_default()
    }

    /// `{ "count": n }`, the result of bulk writes
    pub fn batch_count(count: u64) -> Self {
        let mut map = Map::new();
        map.insert("count".to_owned(), Json::from(count));
        Self(Json::Object(map))
    }

    pub fn as_json(&self) -> &Json {
        &self.0
    }

    pub fn into_json(self) -> Json {
        self.0
    }

    /// Splits a list payload into its items; any other payload is one item
    pub fn into_list(self) -> Vec<Payload> {
        match self.0 {
            Json::Array(items) => items.into_iter().map(Self).collect(),
            other => vec![Self(other)],
        }
    }

    /// `None` for a `null` payload
    pub fn into_option(self) -> Option<Payload> {
        (!self.is_null()).then_some(self)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    pub fn get(&self, key: &str) -> Option<&Json> {
        self.0.get(key)
    }

    /// The number of a plain count, or the `count` of a bulk write
    pub fn as_u64(&self) -> Option<u64> {
        self.0
            .as_u64()
            .or_else(|| self.0.get("count").and_then(Json::as_u64))
    }

    /// Converts into a caller type
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.0)
            .map_err(|e| QueryError::validation(format!("Payload does not match target type: {e}")))
    }
}

impl From<Json> for Payload {
    fn from(value: Json) -> Self {
        Self(value)
    }
}

impl From<Payload> for Json {
    fn from(payload: Payload) -> Self {
        payload.0
    }
}

impl core::fmt::Display for Payload {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Builds the JSON record of one loaded row
pub fn assemble(tree: &ProjectionTree, node: Loaded) -> Json {
    let mut record = Map::new();
    for field in &tree.scalars {
        record.insert((*field).to_owned(), node.row.get(field).to_json());
    }
    for (step, relation) in tree.relations.iter().zip(node.relations) {
        let value = match relation {
            LoadedRelation::One(None) => Json::Null,
            LoadedRelation::One(Some(child)) => assemble(&step.plan.projection, *child),
            LoadedRelation::Many(children) => Json::Array(
                children
                    .into_iter()
                    .map(|child| assemble(&step.plan.projection, child))
                    .collect(),
            ),
        };
        record.insert(step.relation.name.to_owned(), value);
    }
    if !tree.counts.is_empty() {
        let counts: Map<String, Json> = tree
            .counts
            .iter()
            .zip(node.counts)
            .map(|(step, n)| (step.relation.name.to_owned(), Json::from(n)))
            .collect();
        record.insert(COUNT_KEY.to_owned(), Json::Object(counts));
    }
    Json::Object(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Account {
        id: String,
        username: String,
    }

    #[test]
    fn payload_deserializes_into_caller_types() {
        let payload = Payload::from(serde_json::json!({ "id": "a1", "username": "neo" }));
        let account: Account = payload.deserialize().unwrap();
        assert_eq!(
            account,
            Account {
                id: "a1".into(),
                username: "neo".into()
            }
        );

        let err = Payload::from(serde_json::json!(null))
            .deserialize::<Account>()
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn counts_read_from_numbers_and_bulk_results() {
        assert_eq!(Payload::from(serde_json::json!(3)).as_u64(), Some(3));
        assert_eq!(Payload::batch_count(2).as_u64(), Some(2));
        assert!(Payload::optional(None).is_null());
    }
}
