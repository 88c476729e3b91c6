//! Schema registry.
//!
//! The registry is the read-only metadata provider the engine plans
//! against. It is built once from const [`ModelDef`]s, validated, and then
//! shared behind an `Arc`. Hooks registered at build time observe every
//! fetch and every assembled payload.

use std::sync::Arc;

use hashbrown::HashMap;
use neuronek_db_types::{FieldDef, ModelDef, RelationDef};

use crate::backend::FetchRequest;
use crate::error::{QueryError, Result};

/// Extension point run around every query.
///
/// Both methods default to no-ops.
pub trait QueryHook: Send + Sync {
    /// Called before a fetch reaches the backend; may tighten the request
    fn before_fetch(&self, _model: &str, _request: &mut FetchRequest) {}

    /// Called on each root record after assembly
    fn after_assemble(&self, _model: &str, _record: &mut serde_json::Value) {}
}

/// A uniqueness constraint as enforced on writes and accepted by `where` selectors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniqueKey {
    /// Constraint name; single-field keys are named after the field
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

/// An owning relation on another model that points at a given model
#[derive(Clone, Copy, Debug)]
pub struct InboundRelation {
    pub model: &'static str,
    pub relation: &'static RelationDef,
}

pub struct SchemaRegistry {
    models: HashMap<&'static str, &'static ModelDef>,
    order: Vec<&'static str>,
    inbound: HashMap<&'static str, Vec<InboundRelation>>,
    hooks: Vec<Arc<dyn QueryHook>>,
}

impl core::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("models", &self.order)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// Returns the metadata of `model`, or `SchemaError` when unknown
    pub fn describe(&self, model: &str) -> Result<&'static ModelDef> {
        self.models
            .get(model)
            .copied()
            .ok_or_else(|| QueryError::Schema(format!("Unknown model `{model}`")))
    }

    /// Like [`SchemaRegistry::describe`], for a model named by a query
    /// descriptor: an unknown name there is a caller error, not a schema one
    pub fn queried_model(&self, model: &str) -> Result<&'static ModelDef> {
        self.describe(model).map_err(|_| {
            QueryError::validation(format!(
                "Unknown model `{model}`. Available models: {}",
                self.order.join(", ")
            ))
        })
    }

    /// Model names in registration order
    pub fn model_names(&self) -> &[&'static str] {
        &self.order
    }

    pub fn field(&self, model: &str, field: &str) -> Result<&'static FieldDef> {
        let def = self.describe(model)?;
        def.field(field).ok_or_else(|| {
            QueryError::validation(format!("Unknown field `{field}` on model {model}"))
        })
    }

    pub fn relation(&self, model: &str, relation: &str) -> Result<&'static RelationDef> {
        let def = self.describe(model)?;
        def.relation(relation).ok_or_else(|| {
            QueryError::validation(format!("Unknown relation `{relation}` on model {model}"))
        })
    }

    /// The identifier field name of `model`
    pub fn id_field(&self, model: &str) -> Result<&'static str> {
        let def = self.describe(model)?;
        def.id_field()
            .map(|f| f.name)
            .ok_or_else(|| QueryError::Schema(format!("Model {model} has no id field")))
    }

    /// All uniqueness constraints of `model`: id first, then single-field, then compound
    pub fn unique_keys(&self, model: &str) -> Result<Vec<UniqueKey>> {
        let def = self.describe(model)?;
        let mut keys = Vec::new();
        for field in def.fields.iter().filter(|f| f.is_id) {
            keys.push(UniqueKey {
                name: field.name,
                fields: core::slice::from_ref(&field.name),
            });
        }
        for field in def.fields.iter().filter(|f| f.unique && !f.is_id) {
            keys.push(UniqueKey {
                name: field.name,
                fields: core::slice::from_ref(&field.name),
            });
        }
        for unique in def.uniques {
            keys.push(UniqueKey {
                name: unique.name,
                fields: unique.fields,
            });
        }
        Ok(keys)
    }

    /// Owning relations on other models whose target is `model`
    pub fn inbound(&self, model: &str) -> &[InboundRelation] {
        self.inbound.get(model).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn hooks(&self) -> &[Arc<dyn QueryHook>] {
        &self.hooks
    }
}

#[derive(Default)]
pub struct SchemaRegistryBuilder {
    models: Vec<&'static ModelDef>,
    hooks: Vec<Arc<dyn QueryHook>>,
}

impl SchemaRegistryBuilder {
    pub fn model(mut self, def: &'static ModelDef) -> Self {
        self.models.push(def);
        self
    }

    pub fn models(mut self, defs: impl IntoIterator<Item = &'static ModelDef>) -> Self {
        self.models.extend(defs);
        self
    }

    pub fn hook(mut self, hook: impl QueryHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Validates the definitions and freezes the registry
    pub fn build(self) -> Result<SchemaRegistry> {
        let mut models = HashMap::new();
        let mut order = Vec::new();
        for def in &self.models {
            if models.insert(def.name, *def).is_some() {
                return Err(QueryError::Schema(format!(
                    "Model `{}` registered twice",
                    def.name
                )));
            }
            order.push(def.name);
        }

        let mut inbound: HashMap<&'static str, Vec<InboundRelation>> = HashMap::new();
        for def in &self.models {
            validate_model(def, &models)?;
            for relation in def.relations.iter().filter(|r| r.owning) {
                inbound
                    .entry(relation.target)
                    .or_default()
                    .push(InboundRelation {
                        model: def.name,
                        relation,
                    });
            }
        }

        Ok(SchemaRegistry {
            models,
            order,
            inbound,
            hooks: self.hooks,
        })
    }
}

fn validate_model(def: &ModelDef, models: &HashMap<&'static str, &'static ModelDef>) -> Result<()> {
    let schema_err = |msg: String| Err(QueryError::Schema(format!("{}: {msg}", def.name)));

    if def.fields.iter().filter(|f| f.is_id).count() != 1 {
        return schema_err("exactly one id field is required".into());
    }
    for (i, field) in def.fields.iter().enumerate() {
        if def.fields[..i].iter().any(|f| f.name == field.name)
            || def.relations.iter().any(|r| r.name == field.name)
        {
            return schema_err(format!("duplicate field name `{}`", field.name));
        }
    }
    for unique in def.uniques {
        if unique.fields.is_empty() {
            return schema_err(format!("unique `{}` has no fields", unique.name));
        }
        if let Some(missing) = unique.fields.iter().find(|f| def.field(f).is_none()) {
            return schema_err(format!(
                "unique `{}` names unknown field `{missing}`",
                unique.name
            ));
        }
    }
    for relation in def.relations {
        let Some(target) = models.get(relation.target) else {
            return schema_err(format!(
                "relation `{}` targets unknown model `{}`",
                relation.name, relation.target
            ));
        };
        if relation.fields.len() != relation.references.len() || relation.fields.is_empty() {
            return schema_err(format!(
                "relation `{}` needs matching fields and references",
                relation.name
            ));
        }
        if let Some(missing) = relation.fields.iter().find(|f| def.field(f).is_none()) {
            return schema_err(format!(
                "relation `{}` names unknown local field `{missing}`",
                relation.name
            ));
        }
        if let Some(missing) = relation.references.iter().find(|f| target.field(f).is_none()) {
            return schema_err(format!(
                "relation `{}` references unknown field `{missing}` on {}",
                relation.name, relation.target
            ));
        }
        if relation.owning && (relation.is_to_many() || relation.is_many_to_many()) {
            return schema_err(format!(
                "relation `{}` cannot own a foreign key and be to-many",
                relation.name
            ));
        }
        if relation.required && !relation.owning {
            return schema_err(format!(
                "relation `{}` is required but not the owning side",
                relation.name
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuronek_db_types::{FieldDef, RelationDef, UniqueDef};

    const PARENT_FIELDS: &[FieldDef] = &[
        FieldDef::string("id").id(),
        FieldDef::string("name").unique(),
    ];
    const PARENT_RELATIONS: &[RelationDef] = &[RelationDef::to_many("children", "Child")
        .fields(&["id"])
        .references(&["parent_id"])];
    static PARENT: ModelDef = ModelDef::new("Parent")
        .fields(PARENT_FIELDS)
        .relations(PARENT_RELATIONS);

    const CHILD_FIELDS: &[FieldDef] = &[
        FieldDef::string("id").id(),
        FieldDef::string("label"),
        FieldDef::string("parent_id").optional(),
    ];
    const CHILD_RELATIONS: &[RelationDef] = &[RelationDef::to_one("parent", "Parent")
        .fields(&["parent_id"])
        .references(&["id"])
        .owning()];
    const CHILD_UNIQUES: &[UniqueDef] = &[UniqueDef::new("label_parent_id", &["label", "parent_id"])];
    static CHILD: ModelDef = ModelDef::new("Child")
        .fields(CHILD_FIELDS)
        .relations(CHILD_RELATIONS)
        .uniques(CHILD_UNIQUES);

    const BROKEN_FIELDS: &[FieldDef] = &[FieldDef::string("id").id()];
    const BROKEN_RELATIONS: &[RelationDef] = &[RelationDef::to_one("ghost", "Ghost")
        .fields(&["id"])
        .references(&["id"])];
    static BROKEN: ModelDef = ModelDef::new("Broken")
        .fields(BROKEN_FIELDS)
        .relations(BROKEN_RELATIONS);

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .model(&PARENT)
            .model(&CHILD)
            .build()
            .unwrap()
    }

    #[test]
    fn describe_unknown_model_is_schema_error() {
        let err = registry().describe("Nope").unwrap_err();
        assert!(matches!(err, QueryError::Schema(_)));

        let err = registry().queried_model("Nope").unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
        assert!(err.to_string().contains("Parent, Child"));
    }

    #[test]
    fn unique_keys_lists_id_single_and_compound() {
        let keys = registry().unique_keys("Child").unwrap();
        let names: Vec<_> = keys.iter().map(|k| k.name).collect();
        assert_eq!(names, ["id", "label_parent_id"]);

        let keys = registry().unique_keys("Parent").unwrap();
        let names: Vec<_> = keys.iter().map(|k| k.name).collect();
        assert_eq!(names, ["id", "name"]);
    }

    #[test]
    fn inbound_tracks_owning_relations() {
        let registry = registry();
        let inbound = registry.inbound("Parent");
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].model, "Child");
        assert_eq!(inbound[0].relation.name, "parent");
        assert!(registry.inbound("Child").is_empty());
    }

    #[test]
    fn build_rejects_unknown_relation_target() {
        let err = SchemaRegistry::builder().model(&BROKEN).build().unwrap_err();
        assert!(err.to_string().contains("unknown model `Ghost`"));
    }
}
