//! JSON descriptor decoding.
//!
//! Turns descriptor objects shaped like the client API (`where`, `orderBy`,
//! `select`, `data`, ...) into typed args. Decoding is schema-aware: a key
//! inside `where` or `data` is resolved as a field, a relation or a
//! compound unique selector of the model at hand. Decoding only checks
//! shapes and names; type checks on values happen when the operation is
//! planned.
//!
//! ```ignore
//! let op = decode_operation(&registry, "Subject", "findMany", &json!({
//!     "where": { "weight": { "gt": 70 } },
//!     "orderBy": { "lastName": "asc" },
//!     "take": 10,
//! }))?;
//! ```

use serde_json::{Map, Value as Json};

use crate::args::{
    AggregateArgs, AggregateFn, AggregateSelection, CountArgs, CountSelection, CreateArgs,
    CreateManyArgs, DataEntry, DeleteArgs, DeleteManyArgs, FieldWrite, FindManyArgs,
    FindUniqueArgs, GroupByArgs, GroupOrderBy, Having, Operation, RelationWrite, Selection,
    SelectionEntry, UpdateArgs, UpdateManyArgs, UpsertArgs, WriteData,
};
use crate::error::{QueryError, Result};
use crate::filter::{Filter, RelationFilter, ScalarFilter, ScalarOp};
use crate::order::{NullsOrder, OrderBy, SortOrder};
use crate::projection::COUNT_KEY;
use crate::registry::SchemaRegistry;
use crate::value::Value;
use crate::window::Cursor;

/// Decodes `args` for `action` (`findMany`, `create`, `groupBy`, ...) on `model`
pub fn decode_operation(
    registry: &SchemaRegistry,
    model: &str,
    action: &str,
    args: &Json,
) -> Result<Operation> {
    let d = Decoder { registry };
    registry.queried_model(model)?;
    Ok(match action {
        "findMany" => Operation::FindMany(d.find_many(model, args, action)?),
        "findFirst" => Operation::FindFirst(d.find_many(model, args, action)?),
        "findFirstOrThrow" => Operation::FindFirstOrThrow(d.find_many(model, args, action)?),
        "findUnique" => Operation::FindUnique(d.find_unique(model, args, action)?),
        "findUniqueOrThrow" => Operation::FindUniqueOrThrow(d.find_unique(model, args, action)?),
        "create" => Operation::Create(d.create(model, args)?),
        "createMany" => Operation::CreateMany(d.create_many(model, args)?),
        "update" => Operation::Update(d.update(model, args)?),
        "updateMany" => Operation::UpdateMany(d.update_many(model, args)?),
        "upsert" => Operation::Upsert(d.upsert(model, args)?),
        "delete" => Operation::Delete(d.delete(model, args)?),
        "deleteMany" => Operation::DeleteMany(d.delete_many(model, args)?),
        "count" => Operation::Count(d.count(model, args)?),
        "aggregate" => Operation::Aggregate(d.aggregate(model, args)?),
        "groupBy" => Operation::GroupBy(d.group_by(model, args)?),
        other => {
            return Err(QueryError::validation(format!("Unknown operation `{other}`")));
        }
    })
}

/// Decodes a `where` object on `model`
pub fn decode_filter(registry: &SchemaRegistry, model: &str, json: &Json) -> Result<Filter> {
    Decoder { registry }.filter(model, json)
}

/// Decodes a `data` object on `model`
pub fn decode_data(registry: &SchemaRegistry, model: &str, json: &Json) -> Result<WriteData> {
    Decoder { registry }.data(model, json)
}

pub fn decode_find_many(registry: &SchemaRegistry, model: &str, json: &Json) -> Result<FindManyArgs> {
    Decoder { registry }.find_many(model, json, "findMany")
}

struct Decoder<'r> {
    registry: &'r SchemaRegistry,
}

// =============================================================================
// Shape helpers
// =============================================================================

fn object<'j>(json: &'j Json, what: &str) -> Result<&'j Map<String, Json>> {
    json.as_object()
        .ok_or_else(|| QueryError::validation(format!("`{what}` must be an object")))
}

/// The args object of an operation; a missing or `null` args value is empty
fn args_object<'j>(json: &'j Json, action: &str, allowed: &[&str]) -> Result<Map<String, Json>> {
    let map = match json {
        Json::Null => return Ok(Map::new()),
        Json::Object(map) => map,
        _ => {
            return Err(QueryError::validation(format!(
                "Arguments of `{action}` must be an object"
            )));
        }
    };
    if let Some(key) = map.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(QueryError::validation(format!(
            "Unknown argument `{key}` for `{action}`. Available options: {}",
            allowed.join(", ")
        )));
    }
    Ok(map.clone())
}

/// A value that may be given alone or as an array
fn one_or_many(json: &Json) -> &[Json] {
    match json {
        Json::Array(items) => items,
        other => core::slice::from_ref(other),
    }
}

fn flag(json: &Json, what: &str) -> Result<bool> {
    json.as_bool()
        .ok_or_else(|| QueryError::validation(format!("`{what}` must be a boolean")))
}

fn string<'j>(json: &'j Json, what: &str) -> Result<&'j str> {
    json.as_str()
        .ok_or_else(|| QueryError::validation(format!("`{what}` must be a string")))
}

fn strings(json: &Json, what: &str) -> Result<Vec<String>> {
    one_or_many(json)
        .iter()
        .map(|item| string(item, what).map(str::to_owned))
        .collect()
}

fn take(json: &Json) -> Result<i64> {
    json.as_i64()
        .ok_or_else(|| QueryError::validation("`take` must be an integer".to_owned()))
}

fn skip(json: &Json) -> Result<u64> {
    json.as_u64()
        .ok_or_else(|| QueryError::validation("`skip` must be a non-negative integer".to_owned()))
}

fn values(json: &Json, op: &str) -> Result<Vec<Value>> {
    json.as_array()
        .ok_or_else(|| QueryError::validation(format!("`{op}` expects a list")))?
        .iter()
        .map(Value::from_json)
        .collect()
}

fn text(json: &Json, op: &str) -> Result<String> {
    json.as_str()
        .map(str::to_owned)
        .ok_or_else(|| QueryError::validation(format!("`{op}` expects a string")))
}

// =============================================================================
// Operations
// =============================================================================

const FIND_MANY_ARGS: &[&str] = &[
    "where", "orderBy", "cursor", "take", "skip", "distinct", "select", "include",
];
const FIND_UNIQUE_ARGS: &[&str] = &["where", "select", "include"];
const CREATE_ARGS: &[&str] = &["data", "select", "include"];
const UPDATE_ARGS: &[&str] = &["where", "data", "select", "include"];
const UPSERT_ARGS: &[&str] = &["where", "create", "update", "select", "include"];
const WINDOW_ARGS: &[&str] = &["where", "orderBy", "cursor", "take", "skip"];

impl Decoder<'_> {
    fn find_many(&self, model: &str, json: &Json, action: &str) -> Result<FindManyArgs> {
        let map = args_object(json, action, FIND_MANY_ARGS)?;
        self.find_many_from(model, &map)
    }

    fn find_many_from(&self, model: &str, map: &Map<String, Json>) -> Result<FindManyArgs> {
        let mut args = FindManyArgs::new();
        for (key, value) in map {
            match key.as_str() {
                "where" => args.filter = self.filter(model, value)?,
                "orderBy" => args.order_by = self.order_by(model, value)?,
                "cursor" => args.cursor = Some(self.cursor(model, value)?),
                "take" => args.take = Some(take(value)?),
                "skip" => args.skip = Some(skip(value)?),
                "distinct" => args.distinct = strings(value, "distinct")?,
                "select" => args.select = Some(self.selection(model, value, "select")?),
                "include" => args.include = Some(self.selection(model, value, "include")?),
                other => {
                    return Err(QueryError::validation(format!(
                        "Unknown argument `{other}` for relation arguments on {model}"
                    )));
                }
            }
        }
        Ok(args)
    }

    fn find_unique(&self, model: &str, json: &Json, action: &str) -> Result<FindUniqueArgs> {
        let map = args_object(json, action, FIND_UNIQUE_ARGS)?;
        Ok(FindUniqueArgs {
            filter: self.required_where(model, &map, action)?,
            select: self.optional_selection(model, &map, "select")?,
            include: self.optional_selection(model, &map, "include")?,
        })
    }

    fn create(&self, model: &str, json: &Json) -> Result<CreateArgs> {
        let map = args_object(json, "create", CREATE_ARGS)?;
        Ok(CreateArgs {
            data: self.required_data(model, &map, "data", "create")?,
            select: self.optional_selection(model, &map, "select")?,
            include: self.optional_selection(model, &map, "include")?,
        })
    }

    fn create_many(&self, model: &str, json: &Json) -> Result<CreateManyArgs> {
        let map = args_object(json, "createMany", &["data", "skipDuplicates"])?;
        let data = map
            .get("data")
            .ok_or_else(|| QueryError::validation("Argument `data` is missing for `createMany`".to_owned()))?;
        Ok(CreateManyArgs {
            data: one_or_many(data)
                .iter()
                .map(|row| self.data(model, row))
                .collect::<Result<_>>()?,
            skip_duplicates: map
                .get("skipDuplicates")
                .map(|v| flag(v, "skipDuplicates"))
                .transpose()?
                .unwrap_or(false),
        })
    }

    fn update(&self, model: &str, json: &Json) -> Result<UpdateArgs> {
        let map = args_object(json, "update", UPDATE_ARGS)?;
        Ok(UpdateArgs {
            filter: self.required_where(model, &map, "update")?,
            data: self.required_data(model, &map, "data", "update")?,
            select: self.optional_selection(model, &map, "select")?,
            include: self.optional_selection(model, &map, "include")?,
        })
    }

    fn update_many(&self, model: &str, json: &Json) -> Result<UpdateManyArgs> {
        let map = args_object(json, "updateMany", &["where", "data"])?;
        Ok(UpdateManyArgs {
            filter: self.optional_where(model, &map)?,
            data: self.required_data(model, &map, "data", "updateMany")?,
        })
    }

    fn upsert(&self, model: &str, json: &Json) -> Result<UpsertArgs> {
        let map = args_object(json, "upsert", UPSERT_ARGS)?;
        Ok(UpsertArgs {
            filter: self.required_where(model, &map, "upsert")?,
            create: self.required_data(model, &map, "create", "upsert")?,
            update: self.required_data(model, &map, "update", "upsert")?,
            select: self.optional_selection(model, &map, "select")?,
            include: self.optional_selection(model, &map, "include")?,
        })
    }

    fn delete(&self, model: &str, json: &Json) -> Result<DeleteArgs> {
        let map = args_object(json, "delete", FIND_UNIQUE_ARGS)?;
        Ok(DeleteArgs {
            filter: self.required_where(model, &map, "delete")?,
            select: self.optional_selection(model, &map, "select")?,
            include: self.optional_selection(model, &map, "include")?,
        })
    }

    fn delete_many(&self, model: &str, json: &Json) -> Result<DeleteManyArgs> {
        let map = args_object(json, "deleteMany", &["where"])?;
        Ok(DeleteManyArgs {
            filter: self.optional_where(model, &map)?,
        })
    }

    fn count(&self, model: &str, json: &Json) -> Result<CountArgs> {
        let allowed: Vec<&str> = WINDOW_ARGS.iter().copied().chain(["select"]).collect();
        let map = args_object(json, "count", &allowed)?;
        let mut args = CountArgs::new(self.optional_where(model, &map)?);
        self.window_args(model, &map, &mut args.order_by, &mut args.cursor, &mut args.take, &mut args.skip)?;
        if let Some(select) = map.get("select") {
            args.select = Some(match select {
                Json::Bool(true) => vec!["_all".to_owned()],
                other => enabled_keys(object(other, "select")?, "select")?,
            });
        }
        Ok(args)
    }

    fn aggregate(&self, model: &str, json: &Json) -> Result<AggregateArgs> {
        let allowed: Vec<&str> = WINDOW_ARGS
            .iter()
            .copied()
            .chain(AggregateFn::ALL.iter().map(AggregateFn::key))
            .collect();
        let map = args_object(json, "aggregate", &allowed)?;
        let mut args = AggregateArgs {
            filter: self.optional_where(model, &map)?,
            aggregates: aggregate_selection(&map)?,
            ..AggregateArgs::default()
        };
        self.window_args(model, &map, &mut args.order_by, &mut args.cursor, &mut args.take, &mut args.skip)?;
        Ok(args)
    }

    fn group_by(&self, model: &str, json: &Json) -> Result<GroupByArgs> {
        let allowed: Vec<&str> = ["by", "where", "having", "orderBy", "take", "skip"]
            .into_iter()
            .chain(AggregateFn::ALL.iter().map(AggregateFn::key))
            .collect();
        let map = args_object(json, "groupBy", &allowed)?;
        let by = map
            .get("by")
            .map(|v| strings(v, "by"))
            .transpose()?
            .ok_or_else(|| QueryError::validation("Argument `by` is missing for `groupBy`".to_owned()))?;
        Ok(GroupByArgs {
            by,
            filter: self.optional_where(model, &map)?,
            having: map.get("having").map(|h| self.having(h)).transpose()?,
            order_by: map
                .get("orderBy")
                .map(|o| self.group_order_by(o))
                .transpose()?
                .unwrap_or_default(),
            take: map.get("take").map(take).transpose()?,
            skip: map.get("skip").map(skip).transpose()?,
            aggregates: aggregate_selection(&map)?,
        })
    }

    // -------------------------------------------------------------------------
    // Shared argument pieces
    // -------------------------------------------------------------------------

    fn optional_where(&self, model: &str, map: &Map<String, Json>) -> Result<Filter> {
        map.get("where")
            .map(|w| self.filter(model, w))
            .transpose()
            .map(Option::unwrap_or_default)
    }

    fn required_where(&self, model: &str, map: &Map<String, Json>, action: &str) -> Result<Filter> {
        let filter = map.get("where").ok_or_else(|| {
            QueryError::validation(format!("Argument `where` is missing for `{action}`"))
        })?;
        self.filter(model, filter)
    }

    fn required_data(
        &self,
        model: &str,
        map: &Map<String, Json>,
        key: &str,
        action: &str,
    ) -> Result<WriteData> {
        let data = map.get(key).ok_or_else(|| {
            QueryError::validation(format!("Argument `{key}` is missing for `{action}`"))
        })?;
        self.data(model, data)
    }

    fn optional_selection(
        &self,
        model: &str,
        map: &Map<String, Json>,
        key: &str,
    ) -> Result<Option<Selection>> {
        map.get(key).map(|s| self.selection(model, s, key)).transpose()
    }

    fn window_args(
        &self,
        model: &str,
        map: &Map<String, Json>,
        order_by: &mut Vec<OrderBy>,
        cursor: &mut Option<Cursor>,
        take_out: &mut Option<i64>,
        skip_out: &mut Option<u64>,
    ) -> Result<()> {
        if let Some(o) = map.get("orderBy") {
            *order_by = self.order_by(model, o)?;
        }
        *cursor = map.get("cursor").map(|c| self.cursor(model, c)).transpose()?;
        *take_out = map.get("take").map(take).transpose()?;
        *skip_out = map.get("skip").map(skip).transpose()?;
        Ok(())
    }

    // =========================================================================
    // where
    // =========================================================================

    fn filter(&self, model: &str, json: &Json) -> Result<Filter> {
        let map = object(json, "where")?;
        let mut parts = Vec::with_capacity(map.len());
        for (key, value) in map {
            parts.push(self.filter_entry(model, key, value)?);
        }
        Ok(match parts.len() {
            1 => parts.remove(0),
            _ => Filter::And(parts),
        })
    }

    fn filter_list(&self, model: &str, json: &Json) -> Result<Vec<Filter>> {
        one_or_many(json)
            .iter()
            .map(|item| self.filter(model, item))
            .collect()
    }

    fn filter_entry(&self, model: &str, key: &str, value: &Json) -> Result<Filter> {
        match key {
            "AND" => return Ok(Filter::And(self.filter_list(model, value)?)),
            "OR" => return Ok(Filter::Or(self.filter_list(model, value)?)),
            "NOT" => return Ok(Filter::Not(self.filter_list(model, value)?)),
            _ => {}
        }
        let def = self.registry.describe(model)?;
        if def.field(key).is_some() {
            return Ok(Filter::field(key, scalar_filter(value)?));
        }
        if let Some(relation) = def.relation(key) {
            return self.relation_filter(relation.target, relation.is_to_many(), key, value);
        }
        if let Some(unique) = def.uniques.iter().find(|u| u.name == key) {
            let selector = object(value, key)?;
            let parts = unique
                .fields
                .iter()
                .map(|field| {
                    let v = selector.get(*field).ok_or_else(|| {
                        QueryError::validation(format!("`{key}` is missing field `{field}`"))
                    })?;
                    Ok(Filter::equals(*field, Value::from_json(v)?))
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(Filter::And(parts));
        }
        Err(QueryError::validation(format!(
            "Unknown argument `{key}` in `where` of {model}"
        )))
    }

    fn relation_filter(&self, target: &str, to_many: bool, key: &str, value: &Json) -> Result<Filter> {
        if !to_many && value.is_null() {
            return Ok(Filter::relation(key, RelationFilter::Is(None)));
        }
        let map = object(value, key)?;
        let quantified = |name: &str| matches!(name, "some" | "every" | "none" | "is" | "isNot");
        if !to_many && !map.keys().all(|k| quantified(k)) {
            // `relation: { ...where }` is `relation: { is: { ...where } }`
            let nested = self.filter(target, value)?;
            return Ok(Filter::relation(key, RelationFilter::Is(Some(Box::new(nested)))));
        }
        let mut parts = Vec::with_capacity(map.len());
        for (quantifier, nested) in map {
            let boxed = |json: &Json| self.filter(target, json).map(Box::new);
            let condition = match quantifier.as_str() {
                "some" => RelationFilter::Some(boxed(nested)?),
                "every" => RelationFilter::Every(boxed(nested)?),
                "none" => RelationFilter::None(boxed(nested)?),
                "is" if nested.is_null() => RelationFilter::Is(None),
                "is" => RelationFilter::Is(Some(boxed(nested)?)),
                "isNot" if nested.is_null() => RelationFilter::IsNot(None),
                "isNot" => RelationFilter::IsNot(Some(boxed(nested)?)),
                other => {
                    return Err(QueryError::validation(format!(
                        "Unknown relation filter `{other}` on `{key}`"
                    )));
                }
            };
            parts.push(Filter::relation(key, condition));
        }
        Ok(match parts.len() {
            1 => parts.remove(0),
            _ => Filter::And(parts),
        })
    }

    // =========================================================================
    // orderBy and cursor
    // =========================================================================

    fn order_by(&self, model: &str, json: &Json) -> Result<Vec<OrderBy>> {
        let def = self.registry.describe(model)?;
        let mut out = Vec::new();
        for item in one_or_many(json) {
            for (field, spec) in object(item, "orderBy")? {
                if def.relation(field).is_some() {
                    return Err(QueryError::validation(format!(
                        "Ordering by relation `{field}` is not supported"
                    )));
                }
                out.push(order_key(field, spec)?);
            }
        }
        Ok(out)
    }

    fn cursor(&self, model: &str, json: &Json) -> Result<Cursor> {
        let def = self.registry.describe(model)?;
        let mut cursor = Cursor::new();
        for (key, value) in object(json, "cursor")? {
            match def.uniques.iter().find(|u| u.name == key) {
                Some(unique) => {
                    let selector = object(value, key)?;
                    for field in unique.fields {
                        let v = selector.get(*field).ok_or_else(|| {
                            QueryError::validation(format!("`{key}` is missing field `{field}`"))
                        })?;
                        cursor = cursor.field(*field, Value::from_json(v)?);
                    }
                }
                None => cursor = cursor.field(key.as_str(), Value::from_json(value)?),
            }
        }
        Ok(cursor)
    }

    // =========================================================================
    // select / include
    // =========================================================================

    fn selection(&self, model: &str, json: &Json, what: &str) -> Result<Selection> {
        let def = self.registry.describe(model)?;
        let mut selection = Selection::new();
        for (key, value) in object(json, what)? {
            let entry = if key == COUNT_KEY {
                SelectionEntry::Count(self.count_selection(model, value)?)
            } else if let Some(relation) = def.relation(key) {
                match value {
                    Json::Bool(b) => SelectionEntry::Flag(*b),
                    other => {
                        let map = object(other, key)?;
                        SelectionEntry::Nested(Box::new(self.find_many_from(relation.target, map)?))
                    }
                }
            } else {
                SelectionEntry::Flag(flag(value, key)?)
            };
            selection.entries.push((key.clone(), entry));
        }
        Ok(selection)
    }

    fn count_selection(&self, model: &str, json: &Json) -> Result<CountSelection> {
        if let Json::Bool(true) = json {
            return Ok(CountSelection::All);
        }
        let map = object(json, COUNT_KEY)?;
        let select = map
            .get("select")
            .ok_or_else(|| QueryError::validation("`_count` expects `true` or `{ select }`".to_owned()))?;
        let def = self.registry.describe(model)?;
        let mut relations = Vec::new();
        for (relation, spec) in object(select, "_count.select")? {
            let filter = match spec {
                Json::Bool(true) => Filter::all(),
                Json::Bool(false) => continue,
                other => {
                    let target = def.relation(relation).map_or(model, |r| r.target);
                    let spec = object(other, relation)?;
                    match spec.get("where") {
                        Some(w) => self.filter(target, w)?,
                        None => Filter::all(),
                    }
                }
            };
            relations.push((relation.clone(), filter));
        }
        Ok(CountSelection::Relations(relations))
    }

    // =========================================================================
    // data
    // =========================================================================

    fn data(&self, model: &str, json: &Json) -> Result<WriteData> {
        let def = self.registry.describe(model)?;
        let mut data = WriteData::new();
        for (key, value) in object(json, "data")? {
            let entry = if def.field(key).is_some() {
                DataEntry::Scalar(field_write(key, value)?)
            } else if let Some(relation) = def.relation(key) {
                DataEntry::Relation(self.relation_writes(relation.target, key, value)?)
            } else {
                return Err(QueryError::validation(format!(
                    "Unknown argument `{key}` in `data` of {model}"
                )));
            };
            data.entries.push((key.clone(), entry));
        }
        Ok(data)
    }

    fn relation_writes(&self, target: &str, key: &str, json: &Json) -> Result<Vec<RelationWrite>> {
        let mut writes = Vec::new();
        for (op, value) in object(json, key)? {
            let selectors = |json: &Json| self.filter_list(target, json);
            writes.push(match op.as_str() {
                "connect" => RelationWrite::Connect(selectors(value)?),
                "disconnect" => match value {
                    Json::Bool(true) => RelationWrite::Disconnect(None),
                    Json::Bool(false) => continue,
                    other => RelationWrite::Disconnect(Some(selectors(other)?)),
                },
                "set" => RelationWrite::Set(selectors(value)?),
                "create" | "createMany" | "connectOrCreate" | "update" | "upsert" | "delete" => {
                    return Err(QueryError::validation(format!(
                        "Nested `{op}` on `{key}` is not supported; use `connect`, `disconnect` or `set`"
                    )));
                }
                other => {
                    return Err(QueryError::validation(format!(
                        "Unknown relation write `{other}` on `{key}`"
                    )));
                }
            });
        }
        Ok(writes)
    }

    // =========================================================================
    // groupBy
    // =========================================================================

    fn having(&self, json: &Json) -> Result<Having> {
        let map = object(json, "having")?;
        let mut parts = Vec::new();
        for (key, value) in map {
            let list = |json: &Json| {
                one_or_many(json)
                    .iter()
                    .map(|h| self.having(h))
                    .collect::<Result<Vec<_>>>()
            };
            match key.as_str() {
                "AND" => parts.push(Having::And(list(value)?)),
                "OR" => parts.push(Having::Or(list(value)?)),
                "NOT" => parts.push(Having::Not(list(value)?)),
                field => parts.extend(having_field(field, value)?),
            }
        }
        Ok(match parts.len() {
            1 => parts.remove(0),
            _ => Having::And(parts),
        })
    }

    fn group_order_by(&self, json: &Json) -> Result<Vec<GroupOrderBy>> {
        let mut out = Vec::new();
        for item in one_or_many(json) {
            for (key, spec) in object(item, "orderBy")? {
                match AggregateFn::from_key(key) {
                    Some(func) => {
                        for (field, spec) in object(spec, key)? {
                            out.push(GroupOrderBy::Aggregate {
                                func,
                                order: order_key(field, spec)?,
                            });
                        }
                    }
                    None => out.push(GroupOrderBy::Field(order_key(key, spec)?)),
                }
            }
        }
        Ok(out)
    }
}

// =============================================================================
// Context-free pieces
// =============================================================================

/// `value` or `{ equals, in, notIn, lt, lte, gt, gte, contains, startsWith, endsWith, not }`
fn scalar_filter(json: &Json) -> Result<ScalarFilter> {
    let Json::Object(map) = json else {
        return Ok(ScalarFilter::new().equals(Value::from_json(json)?));
    };
    let mut filter = ScalarFilter::new();
    for (op, value) in map {
        filter.ops.push(scalar_op(op, value)?);
    }
    Ok(filter)
}

fn scalar_op(op: &str, value: &Json) -> Result<ScalarOp> {
    Ok(match op {
        "equals" => ScalarOp::Equals(Value::from_json(value)?),
        "in" => ScalarOp::In(values(value, op)?),
        "notIn" => ScalarOp::NotIn(values(value, op)?),
        "lt" => ScalarOp::Lt(Value::from_json(value)?),
        "lte" => ScalarOp::Lte(Value::from_json(value)?),
        "gt" => ScalarOp::Gt(Value::from_json(value)?),
        "gte" => ScalarOp::Gte(Value::from_json(value)?),
        "contains" => ScalarOp::Contains(text(value, op)?),
        "startsWith" => ScalarOp::StartsWith(text(value, op)?),
        "endsWith" => ScalarOp::EndsWith(text(value, op)?),
        "not" => ScalarOp::Not(Box::new(scalar_filter(value)?)),
        other => {
            return Err(QueryError::validation(format!(
                "Unknown filter operator `{other}`"
            )));
        }
    })
}

/// `"asc"`, `"desc"` or `{ sort, nulls }`
fn order_key(field: &str, spec: &Json) -> Result<OrderBy> {
    let sort_order = |s: &str| match s {
        "asc" => Ok(SortOrder::Asc),
        "desc" => Ok(SortOrder::Desc),
        other => Err(QueryError::validation(format!(
            "Invalid sort order `{other}` for `{field}`, expected `asc` or `desc`"
        ))),
    };
    match spec {
        Json::String(s) => Ok(OrderBy {
            field: field.to_owned(),
            order: sort_order(s)?,
            nulls: None,
        }),
        Json::Object(map) => {
            let sort = map
                .get("sort")
                .map(|s| string(s, "sort"))
                .transpose()?
                .ok_or_else(|| QueryError::validation(format!("`{field}` is missing `sort`")))?;
            let nulls = match map.get("nulls").map(|n| string(n, "nulls")).transpose()? {
                None => None,
                Some("first") => Some(NullsOrder::First),
                Some("last") => Some(NullsOrder::Last),
                Some(other) => {
                    return Err(QueryError::validation(format!(
                        "Invalid nulls placement `{other}`, expected `first` or `last`"
                    )));
                }
            };
            Ok(OrderBy {
                field: field.to_owned(),
                order: sort_order(sort)?,
                nulls,
            })
        }
        _ => Err(QueryError::validation(format!(
            "Invalid orderBy value for `{field}`"
        ))),
    }
}

/// `value` or `{ set | increment | decrement | multiply | divide: value }`
fn field_write(field: &str, json: &Json) -> Result<FieldWrite> {
    let Json::Object(map) = json else {
        return Ok(FieldWrite::Set(Value::from_json(json)?));
    };
    let mut entries = map.iter();
    let (Some((op, value)), None) = (entries.next(), entries.next()) else {
        return Err(QueryError::validation(format!(
            "`{field}` expects exactly one update operator"
        )));
    };
    let value = Value::from_json(value)?;
    Ok(match op.as_str() {
        "set" => FieldWrite::Set(value),
        "increment" => FieldWrite::Increment(value),
        "decrement" => FieldWrite::Decrement(value),
        "multiply" => FieldWrite::Multiply(value),
        "divide" => FieldWrite::Divide(value),
        other => {
            return Err(QueryError::validation(format!(
                "Unknown update operator `{other}` on `{field}`"
            )));
        }
    })
}

/// Keys set to `true`
fn enabled_keys(map: &Map<String, Json>, what: &str) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    for (key, value) in map {
        if flag(value, what)? {
            keys.push(key.clone());
        }
    }
    Ok(keys)
}

/// `_count`, `_min`, `_max`, `_avg` and `_sum` keys of an args object
fn aggregate_selection(map: &Map<String, Json>) -> Result<AggregateSelection> {
    let mut selection = AggregateSelection::new();
    for func in AggregateFn::ALL {
        let Some(value) = map.get(func.key()) else {
            continue;
        };
        let fields = match (func, value) {
            (AggregateFn::Count, Json::Bool(true)) => vec!["_all".to_owned()],
            (_, other) => enabled_keys(object(other, func.key())?, func.key())?,
        };
        selection.fields_mut(func).extend(fields);
    }
    Ok(selection)
}

/// One `having` field entry: scalar operators on the field, aggregate
/// conditions under `_avg`, `_count`, ...
fn having_field(field: &str, json: &Json) -> Result<Vec<Having>> {
    let Json::Object(map) = json else {
        return Ok(vec![Having::Field {
            field: field.to_owned(),
            condition: ScalarFilter::new().equals(Value::from_json(json)?),
        }]);
    };
    let mut out = Vec::new();
    let mut plain = ScalarFilter::new();
    for (key, value) in map {
        match AggregateFn::from_key(key) {
            Some(func) => out.push(Having::Aggregate {
                func,
                field: field.to_owned(),
                condition: scalar_filter(value)?,
            }),
            None => plain.ops.push(scalar_op(key, value)?),
        }
    }
    if !plain.ops.is_empty() {
        out.insert(
            0,
            Having::Field {
                field: field.to_owned(),
                condition: plain,
            },
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuronek_db_types::prelude::*;
    use serde_json::json;

    const ROUTE_FIELDS: &[FieldDef] = &[
        FieldDef::string("id").id().default_uuid(),
        FieldDef::string("name"),
        FieldDef::string("substanceName").optional(),
        FieldDef::float("bioavailability").optional(),
    ];
    const ROUTE_RELATIONS: &[RelationDef] = &[RelationDef::to_one("substance", "Substance")
        .fields(&["substanceName"])
        .references(&["name"])
        .owning()];
    const ROUTE_UNIQUES: &[UniqueDef] =
        &[UniqueDef::new("name_substanceName", &["name", "substanceName"])];
    static ROUTE: ModelDef = ModelDef::new("RouteOfAdministration")
        .fields(ROUTE_FIELDS)
        .relations(ROUTE_RELATIONS)
        .uniques(ROUTE_UNIQUES);

    const SUBSTANCE_FIELDS: &[FieldDef] = &[
        FieldDef::string("id").id().default_uuid(),
        FieldDef::string("name").unique(),
    ];
    const SUBSTANCE_RELATIONS: &[RelationDef] =
        &[RelationDef::to_many("routes_of_administration", "RouteOfAdministration")
            .fields(&["name"])
            .references(&["substanceName"])];
    static SUBSTANCE: ModelDef = ModelDef::new("Substance")
        .fields(SUBSTANCE_FIELDS)
        .relations(SUBSTANCE_RELATIONS);

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .models([&SUBSTANCE, &ROUTE])
            .build()
            .unwrap()
    }

    #[test]
    fn where_shorthand_and_operators() {
        let registry = registry();
        let filter = decode_filter(
            &registry,
            "RouteOfAdministration",
            &json!({ "name": "oral", "bioavailability": { "gte": 0.5, "not": null } }),
        )
        .unwrap();
        assert_eq!(
            filter,
            Filter::and([
                Filter::equals("name", "oral"),
                Filter::field(
                    "bioavailability",
                    ScalarFilter::new()
                        .gte(0.5)
                        .not(ScalarFilter::new().equals(Value::Null)),
                ),
            ])
        );
    }

    #[test]
    fn compound_unique_selector_is_flattened() {
        let registry = registry();
        let filter = decode_filter(
            &registry,
            "RouteOfAdministration",
            &json!({ "name_substanceName": { "name": "oral", "substanceName": "Caffeine" } }),
        )
        .unwrap();
        assert_eq!(
            filter.equality_fields(),
            vec![
                ("name", &Value::from("oral")),
                ("substanceName", &Value::from("Caffeine"))
            ]
        );
    }

    #[test]
    fn relation_filters_by_cardinality() {
        let registry = registry();
        let filter = decode_filter(
            &registry,
            "Substance",
            &json!({ "routes_of_administration": { "some": { "name": "oral" } } }),
        )
        .unwrap();
        assert!(matches!(
            filter,
            Filter::Relation {
                condition: RelationFilter::Some(_),
                ..
            }
        ));

        let filter = decode_filter(&registry, "RouteOfAdministration", &json!({ "substance": null }))
            .unwrap();
        assert_eq!(filter, Filter::relation("substance", RelationFilter::Is(None)));
    }

    #[test]
    fn find_many_arguments() {
        let registry = registry();
        let op = decode_operation(
            &registry,
            "Substance",
            "findMany",
            &json!({
                "orderBy": [{ "name": "desc" }],
                "take": -2,
                "skip": 1,
                "include": { "routes_of_administration": { "take": 1 }, "_count": true },
            }),
        )
        .unwrap();
        let Operation::FindMany(args) = op else {
            panic!("expected findMany");
        };
        assert_eq!(args.order_by, vec![OrderBy::desc("name")]);
        assert_eq!(args.take, Some(-2));
        assert_eq!(args.skip, Some(1));
        let include = args.include.unwrap();
        assert_eq!(include.entries.len(), 2);
        assert_eq!(
            include.entries[1],
            ("_count".to_owned(), SelectionEntry::Count(CountSelection::All))
        );
    }

    #[test]
    fn update_data_with_operators_and_relations() {
        let registry = registry();
        let data = decode_data(
            &registry,
            "RouteOfAdministration",
            &json!({
                "bioavailability": { "multiply": 2 },
                "substance": { "connect": { "name": "Caffeine" } },
            }),
        )
        .unwrap();
        assert_eq!(
            data,
            WriteData::new()
                .multiply("bioavailability", 2i64)
                .connect("substance", Filter::equals("name", "Caffeine"))
        );
    }

    #[test]
    fn group_by_with_having_and_aggregate_order() {
        let registry = registry();
        let op = decode_operation(
            &registry,
            "RouteOfAdministration",
            "groupBy",
            &json!({
                "by": ["substanceName"],
                "_avg": { "bioavailability": true },
                "having": { "bioavailability": { "_avg": { "gt": 0.5 } } },
                "orderBy": { "_count": { "name": "desc" } },
            }),
        )
        .unwrap();
        let Operation::GroupBy(args) = op else {
            panic!("expected groupBy");
        };
        assert_eq!(args.by, vec!["substanceName".to_owned()]);
        assert_eq!(args.aggregates.avg, vec!["bioavailability".to_owned()]);
        assert!(matches!(
            args.having,
            Some(Having::Aggregate {
                func: AggregateFn::Avg,
                ..
            })
        ));
        assert_eq!(
            args.order_by,
            vec![GroupOrderBy::Aggregate {
                func: AggregateFn::Count,
                order: OrderBy::desc("name"),
            }]
        );
    }

    #[test]
    fn decode_errors() {
        let registry = registry();
        let err = |action: &str, args: Json| {
            decode_operation(&registry, "Substance", action, &args)
                .unwrap_err()
                .to_string()
        };
        assert!(err("findMany", json!({ "limit": 1 })).contains("Unknown argument `limit`"));
        assert!(err("findMany", json!({ "where": { "nope": 1 } })).contains("`nope`"));
        assert!(err("findMany", json!({ "skip": -1 })).contains("non-negative"));
        assert!(err("findMany", json!({ "orderBy": { "name": "up" } })).contains("Invalid sort order"));
        assert!(err("update", json!({ "data": {} })).contains("`where` is missing"));
        assert!(err("frobnicate", json!({})).contains("Unknown operation"));
        assert!(
            err(
                "create",
                json!({ "data": { "routes_of_administration": { "create": {} } } })
            )
            .contains("not supported")
        );
    }
}
