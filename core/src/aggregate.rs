//! `count`, `aggregate` and `groupBy`.
//!
//! Aggregates are computed in the engine over the filtered, ordered and
//! windowed row set. `groupBy` partitions rows by the `by` fields in
//! first-seen order and evaluates `having` against one synthetic row per
//! group, whose aggregate columns are named `_fn.field` (`_count._all`
//! for the row count).

use hashbrown::HashMap;
use neuronek_db_types::{FieldDef, ScalarType};
use serde_json::{Map, Value as Json};

use crate::args::{
    AggregateArgs, AggregateFn, AggregateSelection, CountArgs, GroupByArgs, GroupOrderBy, Having,
};
use crate::assemble::Payload;
use crate::backend::Connection;
use crate::error::{QueryError, Result};
use crate::executor::Executor;
use crate::filter::{Filter, Predicate, RowSource, compile_filter, compile_scalar};
use crate::order::{OrderBy, resolve_order, sort_rows};
use crate::plan::plan_window;
use crate::registry::SchemaRegistry;
use crate::row::Row;
use crate::value::Value;
use crate::window::Cursor;

/// The `_all` pseudo field of `_count`
pub const ALL_KEY: &str = "_all";

/// One aggregate over one field, or over rows for `_count._all`
#[derive(Clone, Copy, Debug, PartialEq)]
struct Measure {
    func: AggregateFn,
    field: Option<&'static FieldDef>,
}

impl Measure {
    fn resolve(registry: &SchemaRegistry, model: &str, func: AggregateFn, field: &str) -> Result<Self> {
        if field == ALL_KEY {
            if func != AggregateFn::Count {
                return Err(QueryError::validation(format!(
                    "`{ALL_KEY}` is only available under `_count`"
                )));
            }
            return Ok(Self { func, field: None });
        }
        let def = registry.field(model, field)?;
        let supported = match func {
            AggregateFn::Count => true,
            AggregateFn::Min | AggregateFn::Max => def.ty.is_orderable(),
            AggregateFn::Avg | AggregateFn::Sum => def.ty.is_numeric(),
        };
        if !supported {
            return Err(QueryError::validation(format!(
                "`{}` is not available for field `{field}` of type {}",
                func.key(),
                def.ty
            )));
        }
        Ok(Self {
            func,
            field: Some(def),
        })
    }

    fn name(&self) -> &'static str {
        self.field.map_or(ALL_KEY, |f| f.name)
    }

    /// Column name on a group row
    fn column(&self) -> String {
        format!("{}.{}", self.func.key(), self.name())
    }

    /// Result type and nullability, as seen by `having`
    fn output_type(&self) -> (ScalarType, bool) {
        match (self.func, self.field) {
            (AggregateFn::Count, _) | (_, None) => (ScalarType::Int, false),
            (AggregateFn::Avg, Some(_)) => (ScalarType::Float, true),
            (_, Some(field)) => (field.ty, true),
        }
    }

    fn compute(&self, rows: &[&Row]) -> Value {
        let Some(field) = self.field else {
            return Value::Int(rows.len() as i64);
        };
        let values = rows
            .iter()
            .map(|r| r.get(field.name))
            .filter(|v| !v.is_null());
        match self.func {
            AggregateFn::Count => Value::Int(values.count() as i64),
            AggregateFn::Min => values
                .min_by(|a, b| a.compare(b).unwrap_or(core::cmp::Ordering::Equal))
                .cloned()
                .unwrap_or_default(),
            AggregateFn::Max => values
                .max_by(|a, b| a.compare(b).unwrap_or(core::cmp::Ordering::Equal))
                .cloned()
                .unwrap_or_default(),
            AggregateFn::Avg => {
                let numbers: Vec<f64> = values.filter_map(Value::as_f64).collect();
                if numbers.is_empty() {
                    Value::Null
                } else {
                    Value::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
            AggregateFn::Sum => sum(values, field.ty),
        }
    }
}

fn sum<'v>(values: impl Iterator<Item = &'v Value>, ty: ScalarType) -> Value {
    let values: Vec<&Value> = values.collect();
    if values.is_empty() {
        return Value::Null;
    }
    if ty == ScalarType::Int {
        let total = values
            .iter()
            .try_fold(0i64, |acc, v| v.as_i64().and_then(|i| acc.checked_add(i)));
        if let Some(total) = total {
            return Value::Int(total);
        }
    }
    Value::Float(values.iter().filter_map(|v| v.as_f64()).sum())
}

/// Resolves every requested aggregate, in function then request order
fn resolve_selection(
    registry: &SchemaRegistry,
    model: &str,
    selection: &AggregateSelection,
) -> Result<Vec<Measure>> {
    let mut measures = Vec::new();
    for func in AggregateFn::ALL {
        for field in selection.fields(func) {
            let measure = Measure::resolve(registry, model, func, field)?;
            if !measures.contains(&measure) {
                measures.push(measure);
            }
        }
    }
    Ok(measures)
}

/// `{ "_count": { .. }, "_avg": { .. } }` for the selected measures
fn aggregate_objects(measures: &[Measure], value_of: impl Fn(&Measure) -> Value) -> Map<String, Json> {
    let mut out = Map::new();
    for func in AggregateFn::ALL {
        let fields: Map<String, Json> = measures
            .iter()
            .filter(|m| m.func == func)
            .map(|m| (m.name().to_owned(), value_of(m).to_json()))
            .collect();
        if !fields.is_empty() {
            out.insert(func.key().to_owned(), Json::Object(fields));
        }
    }
    out
}

/// Group rows never reference other models
struct NoRelations;

impl RowSource for NoRelations {
    fn scan<'a>(&'a self, _model: &str) -> Box<dyn Iterator<Item = &'a Row> + 'a> {
        Box::new(core::iter::empty())
    }
}

impl<C: Connection> Executor<'_, C> {
    pub async fn count(&self, model: &str, args: &CountArgs) -> Result<Payload> {
        let model = self.registry.describe(model)?.name;
        let measures = args
            .select
            .as_deref()
            .map(|fields| {
                fields
                    .iter()
                    .map(|f| Measure::resolve(self.registry, model, AggregateFn::Count, f))
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;
        let rows = self
            .windowed_rows(model, &args.filter, &args.order_by, args.cursor.as_ref(), args.take, args.skip)
            .await?;

        let Some(measures) = measures else {
            return Ok(Payload::from(Json::from(rows.len() as u64)));
        };
        let rows: Vec<&Row> = rows.iter().collect();
        let counts: Map<String, Json> = measures
            .iter()
            .map(|m| (m.name().to_owned(), m.compute(&rows).to_json()))
            .collect();
        Ok(Payload::from(Json::Object(counts)))
    }

    pub async fn aggregate(&self, model: &str, args: &AggregateArgs) -> Result<Payload> {
        let model = self.registry.describe(model)?.name;
        let measures = resolve_selection(self.registry, model, &args.aggregates)?;
        let rows = self
            .windowed_rows(model, &args.filter, &args.order_by, args.cursor.as_ref(), args.take, args.skip)
            .await?;
        let rows: Vec<&Row> = rows.iter().collect();
        let out = aggregate_objects(&measures, |m| m.compute(&rows));
        Ok(Payload::from(Json::Object(out)))
    }

    pub async fn group_by(&self, model: &str, args: &GroupByArgs) -> Result<Payload> {
        let model = self.registry.describe(model)?.name;
        let by = self.resolve_by(model, &args.by)?;
        let selected = resolve_selection(self.registry, model, &args.aggregates)?;

        let mut measures = selected.clone();
        let having = args
            .having
            .as_ref()
            .map(|h| self.compile_having(model, &args.by, h, &mut measures))
            .transpose()?;
        let order = self.resolve_group_order(model, args, &mut measures)?;
        let window = plan_window(self.registry, &self.limits, model, None, args.take, args.skip, &[])?;
        let filter = compile_filter(self.registry, model, &args.filter)?;

        let rows = self.fetch(model, filter.predicate).await?;
        let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Value>, Vec<&Row>)> = Vec::new();
        for row in &rows {
            let key = row.key(&by);
            match index.get(&key) {
                Some(&i) => groups[i].1.push(row),
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key, vec![row]));
                }
            }
        }

        let mut group_rows: Vec<Row> = groups
            .into_iter()
            .map(|(key, members)| {
                let mut row: Row = by.iter().zip(key).map(|(f, v)| (*f, v)).collect();
                for measure in &measures {
                    row.set(measure.column(), measure.compute(&members));
                }
                row
            })
            .filter(|row| having.as_ref().is_none_or(|p| p.eval(row, &NoRelations)))
            .collect();
        sort_rows(&mut group_rows, &order);
        let group_rows = window.apply(group_rows);

        let records = group_rows
            .into_iter()
            .map(|row| {
                let mut record: Map<String, Json> = by
                    .iter()
                    .map(|f| ((*f).to_owned(), row.get(f).to_json()))
                    .collect();
                record.extend(aggregate_objects(&selected, |m| row.get(&m.column()).clone()));
                Payload::from(Json::Object(record))
            })
            .collect();
        Ok(Payload::list(records))
    }

    /// Rows of `model` after filter, ordering and window
    async fn windowed_rows(
        &self,
        model: &'static str,
        filter: &Filter,
        order_by: &[OrderBy],
        cursor: Option<&Cursor>,
        take: Option<i64>,
        skip: Option<u64>,
    ) -> Result<Vec<Row>> {
        let filter = compile_filter(self.registry, model, filter)?;
        let order = resolve_order(self.registry, model, order_by)?;
        let window = plan_window(self.registry, &self.limits, model, cursor, take, skip, &[])?;
        let mut rows = self.fetch(model, filter.predicate).await?;
        sort_rows(&mut rows, &order);
        Ok(window.apply(rows))
    }

    // =========================================================================
    // groupBy validation
    // =========================================================================

    fn resolve_by(&self, model: &str, by: &[String]) -> Result<Vec<&'static str>> {
        if by.is_empty() {
            return Err(QueryError::validation(format!(
                "groupBy on {model} needs at least one field in `by`"
            )));
        }
        by.iter()
            .map(|f| self.registry.field(model, f).map(|def| def.name))
            .collect()
    }

    /// Compiles `having` against group rows, registering the aggregates it reads
    fn compile_having(
        &self,
        model: &str,
        by: &[String],
        having: &Having,
        measures: &mut Vec<Measure>,
    ) -> Result<Predicate> {
        let list = |items: &[Having], measures: &mut Vec<Measure>| {
            items
                .iter()
                .map(|h| self.compile_having(model, by, h, measures))
                .collect::<Result<Vec<_>>>()
        };
        match having {
            Having::And(items) => Ok(Predicate::and(list(items, measures)?)),
            Having::Or(items) => Ok(Predicate::or(list(items, measures)?)),
            Having::Not(items) => Ok(Predicate::and(
                list(items, measures)?
                    .into_iter()
                    .map(Predicate::negate)
                    .collect(),
            )),
            Having::Field { field, condition } => {
                let def = self.registry.field(model, field)?;
                if !by.contains(field) {
                    return Err(QueryError::validation(format!(
                        "Every field used for `having` filters must either be an aggregation filter or be included in `by`. Missing fields: {field}"
                    )));
                }
                compile_scalar(def.name, def.ty, def.nullable, condition)
            }
            Having::Aggregate {
                func,
                field,
                condition,
            } => {
                let measure = Measure::resolve(self.registry, model, *func, field)?;
                if !measures.contains(&measure) {
                    measures.push(measure);
                }
                let (ty, nullable) = measure.output_type();
                compile_scalar(&measure.column(), ty, nullable, condition)
            }
        }
    }

    /// Group ordering as keys on group rows
    fn resolve_group_order(
        &self,
        model: &str,
        args: &GroupByArgs,
        measures: &mut Vec<Measure>,
    ) -> Result<Vec<OrderBy>> {
        if (args.take.is_some() || args.skip.is_some()) && args.order_by.is_empty() {
            return Err(QueryError::validation(format!(
                "groupBy on {model} needs an `orderBy` when `take` or `skip` is used"
            )));
        }
        args.order_by
            .iter()
            .map(|key| match key {
                GroupOrderBy::Field(order) => {
                    self.registry.field(model, &order.field)?;
                    if !args.by.contains(&order.field) {
                        return Err(QueryError::validation(format!(
                            "Every field in `orderBy` must be included in `by`. Missing fields: {}",
                            order.field
                        )));
                    }
                    Ok(order.clone())
                }
                GroupOrderBy::Aggregate { func, order } => {
                    let measure = Measure::resolve(self.registry, model, *func, &order.field)?;
                    if !measures.contains(&measure) {
                        measures.push(measure);
                    }
                    Ok(OrderBy {
                        field: measure.column(),
                        ..order.clone()
                    })
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEIGHT: FieldDef = FieldDef::float("weight").optional();
    const FROM: FieldDef = FieldDef::int("from").optional();
    const NAME: FieldDef = FieldDef::string("name");

    fn rows(field: &str, values: &[Value]) -> Vec<Row> {
        values
            .iter()
            .map(|v| Row::new().with(field, v.clone()))
            .collect()
    }

    #[test]
    fn empty_input_yields_null_except_count() {
        let none: Vec<&Row> = Vec::new();
        let measure = |func| Measure {
            func,
            field: Some(&WEIGHT),
        };
        assert_eq!(measure(AggregateFn::Count).compute(&none), Value::Int(0));
        for func in [AggregateFn::Min, AggregateFn::Max, AggregateFn::Avg, AggregateFn::Sum] {
            assert_eq!(measure(func).compute(&none), Value::Null);
        }
    }

    #[test]
    fn aggregates_skip_nulls() {
        let data = rows("weight", &[Value::Float(60.0), Value::Null, Value::Float(80.0)]);
        let refs: Vec<&Row> = data.iter().collect();
        let measure = |func| Measure {
            func,
            field: Some(&WEIGHT),
        };
        assert_eq!(measure(AggregateFn::Count).compute(&refs), Value::Int(2));
        assert_eq!(measure(AggregateFn::Avg).compute(&refs), Value::Float(70.0));
        assert_eq!(measure(AggregateFn::Min).compute(&refs), Value::Float(60.0));
        assert_eq!(measure(AggregateFn::Max).compute(&refs), Value::Float(80.0));
        let all = Measure {
            func: AggregateFn::Count,
            field: None,
        };
        assert_eq!(all.compute(&refs), Value::Int(3));
    }

    #[test]
    fn int_sum_stays_int_until_overflow() {
        let data = rows("from", &[Value::Int(30), Value::Int(90)]);
        let refs: Vec<&Row> = data.iter().collect();
        let measure = Measure {
            func: AggregateFn::Sum,
            field: Some(&FROM),
        };
        assert_eq!(measure.compute(&refs), Value::Int(120));

        let data = rows("from", &[Value::Int(i64::MAX), Value::Int(1)]);
        let refs: Vec<&Row> = data.iter().collect();
        assert!(matches!(measure.compute(&refs), Value::Float(_)));
    }

    #[test]
    fn min_over_strings() {
        let data = rows("name", &[Value::from("oral"), Value::from("insufflated")]);
        let refs: Vec<&Row> = data.iter().collect();
        let measure = Measure {
            func: AggregateFn::Min,
            field: Some(&NAME),
        };
        assert_eq!(measure.compute(&refs), Value::from("insufflated"));
    }

    #[test]
    fn output_objects_follow_function_order() {
        let measures = [
            Measure {
                func: AggregateFn::Avg,
                field: Some(&WEIGHT),
            },
            Measure {
                func: AggregateFn::Count,
                field: None,
            },
        ];
        let out = aggregate_objects(&measures, |m| match m.func {
            AggregateFn::Count => Value::Int(2),
            _ => Value::Float(1.5),
        });
        let keys: Vec<&String> = out.keys().collect();
        assert_eq!(keys, ["_count", "_avg"]);
        assert_eq!(out["_count"]["_all"], Json::from(2));
        assert_eq!(Measure::column(&measures[0]), "_avg.weight");
    }
}
