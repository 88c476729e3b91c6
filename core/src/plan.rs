//! Query planning.
//!
//! A [`QueryPlan`] is a fully validated read: compiled filter, total
//! ordering, window and projection, with one nested plan per relation to
//! load. Planning performs every check that can fail, so execution only
//! fails on backend errors.

use neuronek_db_types::RelationDef;

use crate::args::FindManyArgs;
use crate::error::{QueryError, Result};
use crate::filter::{CompiledFilter, Filter, compile_filter};
use crate::order::{OrderBy, resolve_order};
use crate::projection::{ProjectionTree, resolve_projection};
use crate::registry::{SchemaRegistry, UniqueKey};
use crate::window::{Cursor, Window};

/// Engine-wide bounds on descriptors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryLimits {
    /// Largest accepted `|take|`
    pub max_take: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueryPlan {
    pub model: &'static str,
    pub filter: CompiledFilter,
    pub order: Vec<OrderBy>,
    pub window: Window,
    pub projection: ProjectionTree,
}

impl QueryPlan {
    /// Depth of the deepest relation step
    pub fn depth(&self) -> usize {
        self.projection
            .relations
            .iter()
            .map(|r| 1 + r.plan.depth())
            .max()
            .unwrap_or(0)
    }
}

pub fn plan_find_many(
    registry: &SchemaRegistry,
    limits: &QueryLimits,
    model: &str,
    args: &FindManyArgs,
) -> Result<QueryPlan> {
    let model = registry.describe(model)?.name;
    let projection = resolve_projection(
        registry,
        limits,
        model,
        args.select.as_ref(),
        args.include.as_ref(),
    )?;
    Ok(QueryPlan {
        model,
        filter: compile_filter(registry, model, &args.filter)?,
        order: resolve_order(registry, model, &args.order_by)?,
        window: plan_window(
            registry,
            limits,
            model,
            args.cursor.as_ref(),
            args.take,
            args.skip,
            &args.distinct,
        )?,
        projection,
    })
}

/// Plans the load of `relation` from `model`; `None` means `relation: true`
pub fn plan_relation(
    registry: &SchemaRegistry,
    limits: &QueryLimits,
    model: &str,
    relation: &'static RelationDef,
    args: Option<&FindManyArgs>,
) -> Result<QueryPlan> {
    let default_args = FindManyArgs::default();
    let args = args.unwrap_or(&default_args);
    if !relation.is_to_many() {
        let paginated = !args.order_by.is_empty()
            || args.cursor.is_some()
            || args.take.is_some()
            || args.skip.is_some()
            || !args.distinct.is_empty();
        if paginated {
            return Err(QueryError::validation(format!(
                "To-one relation `{}` on {model} does not accept orderBy, cursor, take, skip or distinct",
                relation.name
            )));
        }
    }
    plan_find_many(registry, limits, relation.target, args)
}

/// Validates pagination arguments into a [`Window`]
pub fn plan_window(
    registry: &SchemaRegistry,
    limits: &QueryLimits,
    model: &str,
    cursor: Option<&Cursor>,
    take: Option<i64>,
    skip: Option<u64>,
    distinct: &[String],
) -> Result<Window> {
    if let (Some(take), Some(max)) = (take, limits.max_take) {
        if take.unsigned_abs() > max {
            return Err(QueryError::validation(format!(
                "take of {take} exceeds the configured maximum of {max}"
            )));
        }
    }
    for field in distinct {
        registry.field(model, field)?;
    }
    let cursor = cursor
        .map(|c| resolve_cursor(registry, model, c))
        .transpose()?;
    Ok(Window {
        cursor,
        skip,
        take,
        distinct: distinct.to_vec(),
    })
}

fn resolve_cursor(registry: &SchemaRegistry, model: &str, cursor: &Cursor) -> Result<Cursor> {
    let mut resolved = Cursor::new();
    for (field, value) in &cursor.0 {
        let def = registry.field(model, field)?;
        resolved = resolved.field(def.name, value.clone().coerce(def.ty, false, def.name)?);
    }
    let fields: Vec<&str> = resolved.0.iter().map(|(f, _)| f.as_str()).collect();
    let addresses_key = registry
        .unique_keys(model)?
        .iter()
        .any(|key| key.fields.iter().all(|f| fields.contains(f)));
    if !addresses_key {
        return Err(QueryError::validation(format!(
            "cursor on {model} must address a unique key"
        )));
    }
    Ok(resolved)
}

/// Checks that `filter` pins a unique key of `model` with non-null equality.
///
/// Extra conditions next to the key are allowed and still filter the row.
pub fn unique_where(registry: &SchemaRegistry, model: &str, filter: &Filter) -> Result<UniqueKey> {
    let equalities = filter.equality_fields();
    let pinned = |field: &str| {
        equalities
            .iter()
            .any(|(name, value)| *name == field && !value.is_null())
    };
    registry
        .unique_keys(model)?
        .into_iter()
        .find(|key| key.fields.iter().all(|&f| pinned(f)))
        .ok_or_else(|| {
            let keys: Vec<String> = registry
                .unique_keys(model)
                .unwrap_or_default()
                .iter()
                .map(|k| k.fields.join(" + "))
                .collect();
            QueryError::validation(format!(
                "Argument `where` of type {model}WhereUniqueInput needs at least one of: {}",
                keys.join(", ")
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Selection;
    use neuronek_db_types::{FieldDef, ModelDef, RelationDef, UniqueDef};

    const ROUTE_FIELDS: &[FieldDef] = &[
        FieldDef::string("id").id(),
        FieldDef::string("name"),
        FieldDef::string("substanceName").optional(),
    ];
    const ROUTE_UNIQUES: &[UniqueDef] = &[UniqueDef::new("name_substanceName", &["name", "substanceName"])];
    const ROUTE_RELATIONS: &[RelationDef] = &[RelationDef::to_many("dosage", "Dose")
        .fields(&["id"])
        .references(&["route_id"])];
    static ROUTE: ModelDef = ModelDef::new("Route")
        .fields(ROUTE_FIELDS)
        .relations(ROUTE_RELATIONS)
        .uniques(ROUTE_UNIQUES);

    const DOSE_FIELDS: &[FieldDef] = &[
        FieldDef::string("id").id(),
        FieldDef::float("amount"),
        FieldDef::string("route_id").optional(),
    ];
    static DOSE: ModelDef = ModelDef::new("Dose").fields(DOSE_FIELDS);

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .models([&ROUTE, &DOSE])
            .build()
            .unwrap()
    }

    #[test]
    fn ordering_gets_id_tiebreaker() {
        let args = FindManyArgs::new().order_by(OrderBy::desc("name"));
        let plan = plan_find_many(&registry(), &QueryLimits::default(), "Route", &args).unwrap();
        assert_eq!(plan.order, [OrderBy::desc("name"), OrderBy::asc("id")]);

        let plan =
            plan_find_many(&registry(), &QueryLimits::default(), "Route", &FindManyArgs::new())
                .unwrap();
        assert!(plan.order.is_empty());
    }

    #[test]
    fn nested_plans_follow_relations() {
        let args = FindManyArgs::new().include(Selection::new().nested(
            "dosage",
            FindManyArgs::new().order_by(OrderBy::asc("amount")).take(2),
        ));
        let plan = plan_find_many(&registry(), &QueryLimits::default(), "Route", &args).unwrap();
        assert_eq!(plan.depth(), 1);
        let dosage = &plan.projection.relations[0].plan;
        assert_eq!(dosage.model, "Dose");
        assert_eq!(dosage.window.take, Some(2));
    }

    #[test]
    fn take_is_bounded_by_limits() {
        let limits = QueryLimits { max_take: Some(10) };
        let err = plan_find_many(&registry(), &limits, "Route", &FindManyArgs::new().take(-11))
            .unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn cursor_must_address_unique_key() {
        let args = FindManyArgs::new().cursor(Cursor::new().field("name", "oral"));
        let err = plan_find_many(&registry(), &QueryLimits::default(), "Route", &args).unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));

        let args = FindManyArgs::new().cursor(
            Cursor::new()
                .field("name", "oral")
                .field("substanceName", "X"),
        );
        assert!(plan_find_many(&registry(), &QueryLimits::default(), "Route", &args).is_ok());
    }

    #[test]
    fn unique_where_accepts_compound_keys() {
        let registry = registry();
        let filter = Filter::and([
            Filter::equals("name", "oral"),
            Filter::equals("substanceName", "X"),
        ]);
        let key = unique_where(&registry, "Route", &filter).unwrap();
        assert_eq!(key.name, "name_substanceName");

        let err = unique_where(&registry, "Route", &Filter::equals("name", "oral")).unwrap_err();
        assert!(err.to_string().contains("WhereUniqueInput"));
    }
}
