//! `select` / `include` resolution.
//!
//! A descriptor carries at most one of `select` and `include`. The resolver
//! turns either into a [`ProjectionTree`]: the scalar fields to emit in
//! schema order, the relations to load (each with its own plan) in request
//! order, and the relation counts to report under `_count`.

use neuronek_db_types::RelationDef;

use crate::args::{CountSelection, Selection, SelectionEntry};
use crate::error::{QueryError, Result};
use crate::filter::{CompiledFilter, compile_filter};
use crate::plan::{QueryLimits, QueryPlan, plan_relation};
use crate::registry::SchemaRegistry;

pub const COUNT_KEY: &str = "_count";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProjectionTree {
    pub scalars: Vec<&'static str>,
    pub relations: Vec<RelationStep>,
    pub counts: Vec<CountStep>,
}

impl ProjectionTree {
    /// True when loading needs no further fetches
    pub fn is_flat(&self) -> bool {
        self.relations.is_empty() && self.counts.is_empty()
    }
}

/// One relation to load for every parent row
#[derive(Clone, Debug, PartialEq)]
pub struct RelationStep {
    pub relation: &'static RelationDef,
    pub plan: QueryPlan,
}

/// One relation to count for every parent row
#[derive(Clone, Debug, PartialEq)]
pub struct CountStep {
    pub relation: &'static RelationDef,
    pub filter: CompiledFilter,
}

/// Fails when both `select` and `include` are present
pub fn check_exclusive(select: Option<&Selection>, include: Option<&Selection>) -> Result<()> {
    if select.is_some() && include.is_some() {
        return Err(QueryError::validation(
            "Please either use `include` or `select`, but not both at the same time",
        ));
    }
    Ok(())
}

pub fn resolve_projection(
    registry: &SchemaRegistry,
    limits: &QueryLimits,
    model: &str,
    select: Option<&Selection>,
    include: Option<&Selection>,
) -> Result<ProjectionTree> {
    check_exclusive(select, include)?;
    let def = registry.describe(model)?;

    let mut tree = ProjectionTree::default();
    let (entries, all_scalars) = match (select, include) {
        (Some(select), _) => (select.entries.as_slice(), false),
        (None, Some(include)) => (include.entries.as_slice(), true),
        (None, None) => (&[][..], true),
    };

    for (name, entry) in entries {
        if name == COUNT_KEY {
            resolve_counts(registry, model, entry, &mut tree)?;
            continue;
        }
        if let Some(field) = def.field(name) {
            if all_scalars {
                return Err(QueryError::validation(format!(
                    "Invalid scalar field `{name}` for include on {model}; use select"
                )));
            }
            match entry {
                SelectionEntry::Flag(_) => {}
                _ => {
                    return Err(QueryError::validation(format!(
                        "Scalar field `{}` on {model} only accepts true or false",
                        field.name
                    )));
                }
            }
            continue;
        }
        let relation = registry.relation(model, name)?;
        let args = match entry {
            SelectionEntry::Flag(false) => continue,
            SelectionEntry::Flag(true) => None,
            SelectionEntry::Nested(args) => Some(args.as_ref()),
            SelectionEntry::Count(_) => {
                return Err(QueryError::validation(format!(
                    "Relation `{name}` on {model} cannot take a count selection"
                )));
            }
        };
        tree.relations.push(RelationStep {
            relation,
            plan: plan_relation(registry, limits, model, relation, args)?,
        });
    }

    tree.scalars = def
        .fields
        .iter()
        .filter(|f| {
            all_scalars
                || entries
                    .iter()
                    .any(|(name, e)| name == f.name && *e == SelectionEntry::Flag(true))
        })
        .map(|f| f.name)
        .collect();
    Ok(tree)
}

fn resolve_counts(
    registry: &SchemaRegistry,
    model: &str,
    entry: &SelectionEntry,
    tree: &mut ProjectionTree,
) -> Result<()> {
    let def = registry.describe(model)?;
    match entry {
        SelectionEntry::Flag(false) => {}
        SelectionEntry::Flag(true) | SelectionEntry::Count(CountSelection::All) => {
            for relation in def.relations.iter().filter(|r| r.is_to_many()) {
                tree.counts.push(CountStep {
                    relation,
                    filter: CompiledFilter::default(),
                });
            }
        }
        SelectionEntry::Count(CountSelection::Relations(list)) => {
            for (name, filter) in list {
                let relation = registry.relation(model, name)?;
                if !relation.is_to_many() {
                    return Err(QueryError::validation(format!(
                        "`_count` only accepts to-many relations, `{name}` on {model} is to-one"
                    )));
                }
                tree.counts.push(CountStep {
                    relation,
                    filter: compile_filter(registry, relation.target, filter)?,
                });
            }
        }
        SelectionEntry::Nested(_) => {
            return Err(QueryError::validation(
                "`_count` expects true or `{ select: { relation: ... } }`",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::FindManyArgs;
    use crate::filter::Filter;
    use neuronek_db_types::{FieldDef, ModelDef, RelationDef};

    const USER_FIELDS: &[FieldDef] = &[
        FieldDef::string("id").id(),
        FieldDef::string("name"),
        FieldDef::int("age").optional(),
    ];
    const USER_RELATIONS: &[RelationDef] = &[RelationDef::to_many("posts", "Post")
        .fields(&["id"])
        .references(&["author_id"])];
    static USER: ModelDef = ModelDef::new("User")
        .fields(USER_FIELDS)
        .relations(USER_RELATIONS);

    const POST_FIELDS: &[FieldDef] = &[
        FieldDef::string("id").id(),
        FieldDef::string("title"),
        FieldDef::string("author_id").optional(),
    ];
    const POST_RELATIONS: &[RelationDef] = &[RelationDef::to_one("author", "User")
        .fields(&["author_id"])
        .references(&["id"])
        .owning()];
    static POST: ModelDef = ModelDef::new("Post")
        .fields(POST_FIELDS)
        .relations(POST_RELATIONS);

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .models([&USER, &POST])
            .build()
            .unwrap()
    }

    fn resolve(
        model: &str,
        select: Option<Selection>,
        include: Option<Selection>,
    ) -> Result<ProjectionTree> {
        resolve_projection(
            &registry(),
            &QueryLimits::default(),
            model,
            select.as_ref(),
            include.as_ref(),
        )
    }

    #[test]
    fn select_and_include_are_exclusive() {
        let err = resolve(
            "User",
            Some(Selection::new().field("name")),
            Some(Selection::new().field("posts")),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn default_projection_is_every_scalar() {
        let tree = resolve("User", None, None).unwrap();
        assert_eq!(tree.scalars, ["id", "name", "age"]);
        assert!(tree.is_flat());
    }

    #[test]
    fn select_keeps_schema_order_and_omits_the_rest() {
        let tree = resolve(
            "User",
            Some(Selection::new().field("age").field("id").exclude("name")),
            None,
        )
        .unwrap();
        assert_eq!(tree.scalars, ["id", "age"]);
    }

    #[test]
    fn include_adds_relations_on_top_of_scalars() {
        let tree = resolve("User", None, Some(Selection::new().field("posts"))).unwrap();
        assert_eq!(tree.scalars.len(), 3);
        assert_eq!(tree.relations.len(), 1);
        assert_eq!(tree.relations[0].relation.name, "posts");
        assert_eq!(tree.relations[0].plan.model, "Post");
    }

    #[test]
    fn include_rejects_scalars() {
        let err = resolve("User", None, Some(Selection::new().field("name"))).unwrap_err();
        assert!(err.to_string().contains("use select"));
    }

    #[test]
    fn to_one_relations_reject_pagination() {
        let err = resolve(
            "Post",
            None,
            Some(Selection::new().nested("author", FindManyArgs::new().take(1))),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn counts_resolve_to_many_relations() {
        let tree = resolve(
            "User",
            None,
            Some(Selection::new().count(CountSelection::Relations(vec![(
                "posts".into(),
                Filter::equals("title", "hi"),
            )]))),
        )
        .unwrap();
        assert_eq!(tree.counts.len(), 1);

        let err = resolve(
            "Post",
            None,
            Some(Selection::new().count(CountSelection::Relations(vec![(
                "author".into(),
                Filter::all(),
            )]))),
        )
        .unwrap_err();
        assert!(err.to_string().contains("to-one"));
    }
}
