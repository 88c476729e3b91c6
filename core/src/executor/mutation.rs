//! Create, update, upsert and delete.
//!
//! Data is resolved and validated against the schema before any backend
//! call. Each written row then goes through the constraint guard, the
//! backend write and, for relation writes on the non-owning side, follow-up
//! writes to the related rows. Single-record operations read the record
//! back through the same pipeline as `findUnique`.

use chrono::Utc;
use neuronek_db_types::{DefaultValue, FieldDef, JoinTableDef, RelationDef};

use super::Executor;
use crate::args::{
    CreateArgs, CreateManyArgs, DataEntry, DeleteArgs, DeleteManyArgs, FieldWrite, FindManyArgs,
    RelationWrite, Selection, UpdateArgs, UpdateManyArgs, UpsertArgs, WriteData,
};
use crate::assemble::Payload;
use crate::backend::{Connection, WriteOp};
use crate::error::{QueryError, Result};
use crate::filter::{Filter, Predicate, compile_filter};
use crate::plan::{QueryPlan, plan_find_many, unique_where};
use crate::row::Row;
use crate::value::Value;

/// `data` checked against the schema, with operands coerced
struct ResolvedData<'d> {
    scalars: Vec<(&'static FieldDef, FieldWrite)>,
    relations: Vec<(&'static RelationDef, &'d [RelationWrite])>,
}

impl<C: Connection> Executor<'_, C> {
    // =========================================================================
    // Public operations
    // =========================================================================

    pub async fn create(&self, model: &str, args: &CreateArgs) -> Result<Payload> {
        let model = self.registry.describe(model)?.name;
        let mut plan = self.read_back_plan(model, args.select.as_ref(), args.include.as_ref())?;
        let data = self.resolve_data(model, &args.data, true)?;
        let row = self.insert_row(model, &data).await?;
        self.read_back(&mut plan, &row).await
    }

    pub async fn create_many(&self, model: &str, args: &CreateManyArgs) -> Result<Payload> {
        let model = self.registry.describe(model)?.name;
        let resolved = args
            .data
            .iter()
            .map(|data| {
                let resolved = self.resolve_data(model, data, true)?;
                if !resolved.relations.is_empty() {
                    return Err(QueryError::validation(format!(
                        "createMany on {model} only accepts scalar fields"
                    )));
                }
                Ok(resolved)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut count = 0;
        for data in &resolved {
            match self.insert_row(model, data).await {
                Ok(_) => count += 1,
                Err(QueryError::ConstraintViolation { .. }) if args.skip_duplicates => {}
                Err(e) => return Err(e),
            }
        }
        Ok(Payload::batch_count(count))
    }

    pub async fn update(&self, model: &str, args: &UpdateArgs) -> Result<Payload> {
        let model = self.registry.describe(model)?.name;
        let mut plan = self.read_back_plan(model, args.select.as_ref(), args.include.as_ref())?;
        unique_where(self.registry, model, &args.filter)?;
        let data = self.resolve_data(model, &args.data, false)?;
        let existing = self.find_one(model, &args.filter).await?;
        let existing = existing.ok_or_else(|| QueryError::not_found(model))?;
        let row = self.update_row(model, &existing, &data).await?;
        self.read_back(&mut plan, &row).await
    }

    pub async fn update_many(&self, model: &str, args: &UpdateManyArgs) -> Result<Payload> {
        let model = self.registry.describe(model)?.name;
        let data = self.resolve_data(model, &args.data, false)?;
        if !data.relations.is_empty() {
            return Err(QueryError::validation(format!(
                "updateMany on {model} only accepts scalar fields"
            )));
        }
        let filter = compile_filter(self.registry, model, &args.filter)?;
        let rows = self.fetch(model, filter.predicate).await?;
        for row in &rows {
            self.update_row(model, row, &data).await?;
        }
        Ok(Payload::batch_count(rows.len() as u64))
    }

    pub async fn upsert(&self, model: &str, args: &UpsertArgs) -> Result<Payload> {
        let model = self.registry.describe(model)?.name;
        let mut plan = self.read_back_plan(model, args.select.as_ref(), args.include.as_ref())?;
        unique_where(self.registry, model, &args.filter)?;
        let create = self.resolve_data(model, &args.create, true)?;
        let update = self.resolve_data(model, &args.update, false)?;

        let row = match self.find_one(model, &args.filter).await? {
            Some(existing) => self.update_row(model, &existing, &update).await?,
            None => self.insert_row(model, &create).await?,
        };
        self.read_back(&mut plan, &row).await
    }

    pub async fn delete(&self, model: &str, args: &DeleteArgs) -> Result<Payload> {
        let model = self.registry.describe(model)?.name;
        let mut plan = self.read_back_plan(model, args.select.as_ref(), args.include.as_ref())?;
        unique_where(self.registry, model, &args.filter)?;
        let existing = self.find_one(model, &args.filter).await?;
        let existing = existing.ok_or_else(|| QueryError::not_found(model))?;

        let payload = self.read_back(&mut plan, &existing).await?;
        self.apply_delete_actions(model, core::slice::from_ref(&existing))
            .await?;
        let id_field = self.registry.id_field(model)?;
        self.write(WriteOp::Delete {
            model,
            predicate: Predicate::eq(id_field, existing.get(id_field).clone()),
        })
        .await?;
        Ok(payload)
    }

    pub async fn delete_many(&self, model: &str, args: &DeleteManyArgs) -> Result<Payload> {
        let model = self.registry.describe(model)?.name;
        let filter = compile_filter(self.registry, model, &args.filter)?;
        let rows = self.fetch(model, filter.predicate).await?;
        if rows.is_empty() {
            return Ok(Payload::batch_count(0));
        }
        self.apply_delete_actions(model, &rows).await?;
        let id_field = self.registry.id_field(model)?;
        let ids = rows.iter().map(|r| vec![r.get(id_field).clone()]);
        self.write(WriteOp::Delete {
            model,
            predicate: Predicate::key_in(&[id_field], ids),
        })
        .await?;
        Ok(Payload::batch_count(rows.len() as u64))
    }

    // =========================================================================
    // Read-back
    // =========================================================================

    fn read_back_plan(
        &self,
        model: &'static str,
        select: Option<&Selection>,
        include: Option<&Selection>,
    ) -> Result<QueryPlan> {
        let args = FindManyArgs {
            select: select.cloned(),
            include: include.cloned(),
            ..FindManyArgs::default()
        };
        plan_find_many(self.registry, &self.limits, model, &args)
    }

    async fn read_back(&self, plan: &mut QueryPlan, row: &Row) -> Result<Payload> {
        let id_field = self.registry.id_field(plan.model)?;
        plan.filter.predicate = Predicate::eq(id_field, row.get(id_field).clone());
        self.live()
            .run_plan(plan)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| QueryError::not_found(plan.model))
    }

    /// The first row of `model` matching a unique selector
    async fn find_one(&self, model: &'static str, selector: &Filter) -> Result<Option<Row>> {
        let filter = compile_filter(self.registry, model, selector)?;
        Ok(self.fetch(model, filter.predicate).await?.into_iter().next())
    }

    // =========================================================================
    // Data resolution
    // =========================================================================

    fn resolve_data<'d>(
        &self,
        model: &'static str,
        data: &'d WriteData,
        creating: bool,
    ) -> Result<ResolvedData<'d>> {
        let mut resolved = ResolvedData {
            scalars: Vec::new(),
            relations: Vec::new(),
        };
        for (name, entry) in &data.entries {
            match entry {
                DataEntry::Scalar(write) => {
                    let field = self.registry.field(model, name)?;
                    resolved.scalars.push((field, resolve_field_write(field, write, creating)?));
                }
                DataEntry::Relation(writes) => {
                    let relation = self.registry.relation(model, name)?;
                    self.validate_relation_writes(model, relation, writes, creating)?;
                    resolved.relations.push((relation, writes.as_slice()));
                }
            }
        }
        Ok(resolved)
    }

    fn validate_relation_writes(
        &self,
        model: &str,
        relation: &'static RelationDef,
        writes: &[RelationWrite],
        creating: bool,
    ) -> Result<()> {
        let invalid = |what: &str| {
            Err(QueryError::validation(format!(
                "{what} on relation `{}` of {model}",
                relation.name
            )))
        };
        for write in writes {
            let selectors: &[Filter] = match write {
                RelationWrite::Connect(targets) => {
                    if !relation.is_to_many() && targets.len() != 1 {
                        return invalid("connect expects exactly one record");
                    }
                    targets.as_slice()
                }
                RelationWrite::Disconnect(_) if creating => {
                    return invalid("disconnect is not available when creating");
                }
                RelationWrite::Set(_) if creating => {
                    return invalid("set is not available when creating");
                }
                RelationWrite::Disconnect(_) if relation.required => {
                    return invalid("disconnect is not available for a required relation");
                }
                RelationWrite::Disconnect(None) if relation.is_to_many() => {
                    return invalid("disconnect expects a list of records");
                }
                RelationWrite::Disconnect(targets) => targets.as_deref().unwrap_or(&[]),
                RelationWrite::Set(_) if !relation.is_to_many() => {
                    return invalid("set is only available on to-many relations");
                }
                RelationWrite::Set(targets) => targets.as_slice(),
            };
            for selector in selectors {
                unique_where(self.registry, relation.target, selector)?;
            }
        }
        if !relation.owning && !relation.is_many_to_many() && self.inverse_owning(model, relation).is_none() {
            return Err(QueryError::Schema(format!(
                "relation `{}` of {model} has no owning side on {}",
                relation.name, relation.target
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Row writes
    // =========================================================================

    async fn insert_row(&self, model: &'static str, data: &ResolvedData<'_>) -> Result<Row> {
        let def = self.registry.describe(model)?;
        let mut row = Row::new();
        for (field, write) in &data.scalars {
            row.set(field.name, write.operand().clone());
        }
        self.apply_owning_writes(model, &mut row, &data.relations).await?;

        let missing: Vec<_> = def.fields.iter().filter(|f| !row.contains(f.name)).collect();
        for field in missing {
            match field.default {
                Some(default) => row.set(field.name, default_value(default)),
                None if field.nullable || self.is_foreign_key(model, field.name) => {
                    row.set(field.name, Value::Null)
                }
                None => {
                    return Err(QueryError::validation(format!(
                        "Argument `{}` is missing for {model}",
                        field.name
                    )));
                }
            }
        }

        self.check_relations(model, &row, None).await?;
        self.check_unique(model, &row, None, None).await?;
        self.write(WriteOp::Insert {
            model,
            row: row.clone(),
        })
        .await?;
        self.apply_inverse_writes(model, &row, &data.relations).await?;
        Ok(row)
    }

    async fn update_row(
        &self,
        model: &'static str,
        existing: &Row,
        data: &ResolvedData<'_>,
    ) -> Result<Row> {
        let mut patch = Row::new();
        for (field, write) in &data.scalars {
            let value = apply_field_write(existing.get(field.name), write, field)?;
            patch.set(field.name, value);
        }
        self.apply_owning_writes(model, &mut patch, &data.relations).await?;
        let row = if patch.iter().next().is_some() {
            self.patch_row(model, existing, patch).await?
        } else {
            existing.clone()
        };
        self.apply_inverse_writes(model, &row, &data.relations).await?;
        Ok(row)
    }

    /// Checks and writes `patch` over `existing`, returning the new row
    async fn patch_row(&self, model: &'static str, existing: &Row, patch: Row) -> Result<Row> {
        let id_field = self.registry.id_field(model)?;
        let mut after = existing.clone();
        after.merge(&patch);
        self.check_relations(model, &after, Some(&patch)).await?;
        self.check_unique(model, &after, Some(existing.get(id_field)), Some(&patch))
            .await?;
        self.write(WriteOp::Update {
            model,
            id_field,
            id: existing.get(id_field).clone(),
            patch,
        })
        .await?;
        self.cascade_key_update(model, existing, &after).await?;
        Ok(after)
    }

    fn is_foreign_key(&self, model: &str, field: &str) -> bool {
        self.registry.describe(model).is_ok_and(|def| {
            def.relations
                .iter()
                .any(|r| r.owning && r.fields.contains(&field))
        })
    }

    // =========================================================================
    // Relation writes
    // =========================================================================

    /// Writes owning-side relation changes into `row` as foreign key values
    async fn apply_owning_writes(
        &self,
        model: &'static str,
        row: &mut Row,
        relations: &[(&'static RelationDef, &[RelationWrite])],
    ) -> Result<()> {
        for &(relation, writes) in relations.iter().filter(|(r, _)| r.owning) {
            for write in writes {
                match write {
                    RelationWrite::Connect(targets) => {
                        for selector in targets {
                            let target = self.connect_target(relation, selector).await?;
                            for (field, reference) in relation.fields.iter().zip(relation.references) {
                                row.set(*field, target.get(reference).clone());
                            }
                        }
                    }
                    RelationWrite::Disconnect(targets) => {
                        let current = row.key(relation.fields);
                        let matches = match targets {
                            None => true,
                            Some(selectors) => {
                                let mut any = false;
                                for selector in selectors {
                                    if let Some(target) = self.find_one(relation.target, selector).await? {
                                        any |= target.key(relation.references) == current;
                                    }
                                }
                                any
                            }
                        };
                        if matches {
                            for field in relation.fields {
                                row.set(*field, Value::Null);
                            }
                        }
                    }
                    RelationWrite::Set(_) => {
                        return Err(QueryError::validation(format!(
                            "set is only available on to-many relations, not `{}` of {model}",
                            relation.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Applies non-owning relation changes by writing the related rows
    async fn apply_inverse_writes(
        &self,
        model: &'static str,
        row: &Row,
        relations: &[(&'static RelationDef, &[RelationWrite])],
    ) -> Result<()> {
        for &(relation, writes) in relations.iter().filter(|(r, _)| !r.owning) {
            for write in writes {
                if let Some(join) = relation.join {
                    self.write_links(row, relation, join, write).await?;
                } else {
                    self.write_inverse(model, row, relation, write).await?;
                }
            }
        }
        Ok(())
    }

    async fn write_links(
        &self,
        row: &Row,
        relation: &'static RelationDef,
        join: JoinTableDef,
        write: &RelationWrite,
    ) -> Result<()> {
        let source = row.get(relation.fields[0]).clone();
        let reference = relation.references[0];
        match write {
            RelationWrite::Connect(targets) => {
                for selector in targets {
                    let target = self.connect_target(relation, selector).await?;
                    self.link(join, &source, target.get(reference)).await?;
                }
            }
            RelationWrite::Disconnect(targets) => {
                for selector in targets.as_deref().unwrap_or(&[]) {
                    if let Some(target) = self.find_one(relation.target, selector).await? {
                        self.write(WriteOp::Unlink {
                            join,
                            source: Some(source.clone()),
                            target: Some(target.get(reference).clone()),
                        })
                        .await?;
                    }
                }
            }
            RelationWrite::Set(targets) => {
                let mut resolved = Vec::with_capacity(targets.len());
                for selector in targets {
                    resolved.push(self.connect_target(relation, selector).await?);
                }
                self.write(WriteOp::Unlink {
                    join,
                    source: Some(source.clone()),
                    target: None,
                })
                .await?;
                for target in &resolved {
                    self.link(join, &source, target.get(reference)).await?;
                }
            }
        }
        Ok(())
    }

    async fn link(
        &self,
        join: JoinTableDef,
        source: &Value,
        target: &Value,
    ) -> Result<()> {
        self.write(WriteOp::Link {
            join,
            source: source.clone(),
            target: target.clone(),
        })
        .await?;
        Ok(())
    }

    async fn write_inverse(
        &self,
        model: &'static str,
        row: &Row,
        relation: &'static RelationDef,
        write: &RelationWrite,
    ) -> Result<()> {
        let inverse = self.inverse_owning(model, relation).ok_or_else(|| {
            QueryError::Schema(format!(
                "relation `{}` of {model} has no owning side on {}",
                relation.name, relation.target
            ))
        })?;
        let key = row.key(relation.fields);
        let attach: Row = inverse
            .fields
            .iter()
            .zip(key.iter())
            .map(|(f, v)| (*f, v.clone()))
            .collect();
        let detach: Row = inverse.fields.iter().map(|f| (*f, Value::Null)).collect();
        let linked = |target: &Row| target.key(inverse.fields) == key;

        match write {
            RelationWrite::Connect(targets) => {
                for selector in targets {
                    let target = self.connect_target(relation, selector).await?;
                    if !linked(&target) {
                        self.patch_row(relation.target, &target, attach.clone()).await?;
                    }
                }
            }
            RelationWrite::Disconnect(targets) => {
                let current = match targets {
                    Some(selectors) => {
                        let mut rows = Vec::new();
                        for selector in selectors {
                            rows.extend(self.find_one(relation.target, selector).await?);
                        }
                        rows
                    }
                    None => self.find_by_key(relation.target, relation.references, key.clone())
                        .await?
                        .into_iter()
                        .collect(),
                };
                for target in current.iter().filter(|t| linked(t)) {
                    self.detach(model, relation, inverse, target, &detach).await?;
                }
            }
            RelationWrite::Set(targets) => {
                let mut wanted = Vec::with_capacity(targets.len());
                for selector in targets {
                    wanted.push(self.connect_target(relation, selector).await?);
                }
                let current = self
                    .fetch(
                        relation.target,
                        Predicate::key_in(inverse.fields, [key.clone()]),
                    )
                    .await?;
                let target_id = self.registry.id_field(relation.target)?;
                for target in &current {
                    let keep = wanted
                        .iter()
                        .any(|w| w.get(target_id) == target.get(target_id));
                    if !keep {
                        self.detach(model, relation, inverse, target, &detach).await?;
                    }
                }
                for target in &wanted {
                    if !linked(target) {
                        self.patch_row(relation.target, target, attach.clone()).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn detach(
        &self,
        model: &str,
        relation: &RelationDef,
        inverse: &RelationDef,
        target: &Row,
        detach: &Row,
    ) -> Result<()> {
        if inverse.required {
            return Err(QueryError::relation_integrity(
                relation.target,
                inverse.name,
                format!("cannot disconnect a required relation to {model}"),
            ));
        }
        self.patch_row(relation.target, target, detach.clone()).await?;
        Ok(())
    }

    /// The row a `connect` selector addresses, or `NotFound`
    async fn connect_target(&self, relation: &'static RelationDef, selector: &Filter) -> Result<Row> {
        self.find_one(relation.target, selector)
            .await?
            .ok_or_else(|| QueryError::not_found(relation.target))
    }
}

fn resolve_field_write(field: &FieldDef, write: &FieldWrite, creating: bool) -> Result<FieldWrite> {
    if let FieldWrite::Set(value) = write {
        return Ok(FieldWrite::Set(
            value.clone().coerce(field.ty, field.nullable, field.name)?,
        ));
    }
    if creating {
        return Err(QueryError::validation(format!(
            "`{}` on `{}` is only available when updating",
            write.operator(),
            field.name
        )));
    }
    if !field.ty.is_numeric() {
        return Err(QueryError::validation(format!(
            "`{}` requires a numeric field, `{}` is {}",
            write.operator(),
            field.name,
            field.ty
        )));
    }
    let operand = write.operand().clone().coerce(field.ty, false, field.name)?;
    if matches!(write, FieldWrite::Divide(_)) && operand.as_f64() == Some(0.0) {
        return Err(QueryError::validation(format!(
            "division by zero on `{}`",
            field.name
        )));
    }
    Ok(match write {
        FieldWrite::Increment(_) => FieldWrite::Increment(operand),
        FieldWrite::Decrement(_) => FieldWrite::Decrement(operand),
        FieldWrite::Multiply(_) => FieldWrite::Multiply(operand),
        FieldWrite::Divide(_) => FieldWrite::Divide(operand),
        FieldWrite::Set(_) => FieldWrite::Set(operand),
    })
}

/// The new value of a field after `write`; numeric operators keep `null` as is
fn apply_field_write(current: &Value, write: &FieldWrite, field: &FieldDef) -> Result<Value> {
    let operand = write.operand();
    if let FieldWrite::Set(value) = write {
        return Ok(value.clone());
    }
    match (current, operand) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => {
            let result = match write {
                FieldWrite::Increment(_) => a.checked_add(*b),
                FieldWrite::Decrement(_) => a.checked_sub(*b),
                FieldWrite::Multiply(_) => a.checked_mul(*b),
                FieldWrite::Divide(_) => a.checked_div(*b),
                FieldWrite::Set(_) => Some(*b),
            };
            result.map(Value::Int).ok_or_else(|| {
                QueryError::validation(format!("`{}` overflows Int on `{}`", write.operator(), field.name))
            })
        }
        (a, b) => {
            let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) else {
                return Err(QueryError::validation(format!(
                    "`{}` requires a numeric value on `{}`",
                    write.operator(),
                    field.name
                )));
            };
            Ok(Value::Float(match write {
                FieldWrite::Increment(_) => a + b,
                FieldWrite::Decrement(_) => a - b,
                FieldWrite::Multiply(_) => a * b,
                FieldWrite::Divide(_) => a / b,
                FieldWrite::Set(_) => b,
            }))
        }
    }
}

fn default_value(default: DefaultValue) -> Value {
    match default {
        DefaultValue::Uuid => Value::String(uuid::Uuid::new_v4().to_string()),
        DefaultValue::Now => Value::DateTime(Utc::now()),
        DefaultValue::Bool(b) => Value::Bool(b),
        DefaultValue::Int(i) => Value::Int(i),
        DefaultValue::Float(f) => Value::Float(f),
        DefaultValue::Str(s) => Value::from(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuronek_db_types::FieldDef;

    const WEIGHT: FieldDef = FieldDef::float("weight").optional();
    const FROM: FieldDef = FieldDef::int("from").optional();

    #[test]
    fn numeric_operators() {
        let inc = resolve_field_write(&FROM, &FieldWrite::Increment(Value::Int(5)), false).unwrap();
        assert_eq!(apply_field_write(&Value::Int(10), &inc, &FROM).unwrap(), Value::Int(15));

        let div = resolve_field_write(&FROM, &FieldWrite::Divide(Value::Int(4)), false).unwrap();
        assert_eq!(apply_field_write(&Value::Int(10), &div, &FROM).unwrap(), Value::Int(2));

        let mul = resolve_field_write(&WEIGHT, &FieldWrite::Multiply(Value::Int(2)), false).unwrap();
        assert_eq!(
            apply_field_write(&Value::Float(1.5), &mul, &WEIGHT).unwrap(),
            Value::Float(3.0)
        );
    }

    #[test]
    fn numeric_operators_keep_null() {
        let dec = resolve_field_write(&WEIGHT, &FieldWrite::Decrement(Value::Float(1.0)), false).unwrap();
        assert_eq!(apply_field_write(&Value::Null, &dec, &WEIGHT).unwrap(), Value::Null);
    }

    #[test]
    fn numeric_operators_are_update_only() {
        let err = resolve_field_write(&FROM, &FieldWrite::Increment(Value::Int(1)), true).unwrap_err();
        assert!(err.to_string().contains("only available when updating"));

        let err = resolve_field_write(&FROM, &FieldWrite::Divide(Value::Int(0)), false).unwrap_err();
        assert!(err.to_string().contains("division by zero"));

        let err = resolve_field_write(&FROM, &FieldWrite::Increment(Value::Float(0.5)), false)
            .unwrap_err();
        assert!(err.to_string().contains("expects Int"));
    }
}
