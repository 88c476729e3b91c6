//! Constraint enforcement around writes.
//!
//! Uniqueness and relation integrity are checked against the rows visible
//! to the executor's connection right before the write. Keys containing a
//! null never conflict.

use neuronek_db_types::{ReferentialAction, RelationDef};

use super::Executor;
use crate::backend::{Connection, WriteOp};
use crate::error::{QueryError, Result};
use crate::filter::Predicate;
use crate::row::{Row, key_is_null};
use crate::value::Value;

impl<C: Connection> Executor<'_, C> {
    /// Fails with `ConstraintViolation` when `row` would duplicate a unique key.
    ///
    /// `existing` is the id of the row being updated, which never conflicts
    /// with itself; `touched` limits the check to keys the write changes.
    pub(crate) async fn check_unique(
        &self,
        model: &'static str,
        row: &Row,
        existing: Option<&Value>,
        touched: Option<&Row>,
    ) -> Result<()> {
        let id_field = self.registry.id_field(model)?;
        for key in self.registry.unique_keys(model)? {
            if let Some(touched) = touched {
                if !key.fields.iter().any(|f| touched.contains(f)) {
                    continue;
                }
            }
            let values = row.key(key.fields);
            if key_is_null(&values) {
                continue;
            }
            let clash = self
                .fetch_live(model, Predicate::key_in(key.fields, [values]))
                .await?
                .into_iter()
                .any(|other| Some(other.get(id_field)) != existing);
            if clash {
                return Err(QueryError::ConstraintViolation {
                    model: model.to_owned(),
                    constraint: key.name.to_owned(),
                    fields: key.fields.join(", "),
                });
            }
        }
        Ok(())
    }

    /// Checks every owning relation of `row`: required keys are set and set
    /// keys point at an existing row
    pub(crate) async fn check_relations(
        &self,
        model: &'static str,
        row: &Row,
        touched: Option<&Row>,
    ) -> Result<()> {
        let def = self.registry.describe(model)?;
        for relation in def.relations.iter().filter(|r| r.owning) {
            if let Some(touched) = touched {
                if !relation.fields.iter().any(|f| touched.contains(f)) {
                    continue;
                }
            }
            let key = row.key(relation.fields);
            if key_is_null(&key) {
                if relation.required {
                    return Err(QueryError::relation_integrity(
                        model,
                        relation.name,
                        format!("required relation to {} is not connected", relation.target),
                    ));
                }
                continue;
            }
            if self.find_by_key(relation.target, relation.references, key).await?.is_none() {
                return Err(QueryError::relation_integrity(
                    model,
                    relation.name,
                    format!("no {} record matches {}", relation.target, relation.fields.join(", ")),
                ));
            }
        }
        Ok(())
    }

    /// The first row of `model` whose `fields` equal `key`
    pub(crate) async fn find_by_key(
        &self,
        model: &'static str,
        fields: &[&str],
        key: Vec<Value>,
    ) -> Result<Option<Row>> {
        if key_is_null(&key) {
            return Ok(None);
        }
        Ok(self
            .fetch_live(model, Predicate::key_in(fields, [key]))
            .await?
            .into_iter()
            .next())
    }

    /// The owning relation on `relation.target` that backs the non-owning `relation`
    pub(crate) fn inverse_owning(
        &self,
        model: &str,
        relation: &RelationDef,
    ) -> Option<&'static RelationDef> {
        self.registry
            .inbound(model)
            .iter()
            .find(|inbound| {
                inbound.model == relation.target
                    && inbound.relation.fields == relation.references
                    && inbound.relation.references == relation.fields
            })
            .map(|inbound| inbound.relation)
    }

    /// Applies referential actions for `rows` of `model` that are about to be
    /// deleted: restricted references fail, optional ones are cleared,
    /// cascading ones are deleted, and many-to-many links are removed
    pub(crate) async fn apply_delete_actions(&self, model: &'static str, rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let def = self.registry.describe(model)?;

        for inbound in self.registry.inbound(model) {
            let relation = inbound.relation;
            let keys: Vec<Vec<Value>> = rows.iter().map(|r| r.key(relation.references)).collect();
            let children = self
                .fetch_live(inbound.model, Predicate::key_in(relation.fields, keys))
                .await?;
            if children.is_empty() {
                continue;
            }
            match relation.on_delete {
                ReferentialAction::Restrict => {
                    return Err(QueryError::relation_integrity(
                        inbound.model,
                        relation.name,
                        format!(
                            "the change you are trying to make would violate the required relation between {} and {model}",
                            inbound.model
                        ),
                    ));
                }
                ReferentialAction::SetNull => {
                    let id_field = self.registry.id_field(inbound.model)?;
                    let patch: Row = relation.fields.iter().map(|f| (*f, Value::Null)).collect();
                    for child in &children {
                        self.write(WriteOp::Update {
                            model: inbound.model,
                            id_field,
                            id: child.get(id_field).clone(),
                            patch: patch.clone(),
                        })
                        .await?;
                    }
                }
                ReferentialAction::Cascade => {
                    Box::pin(self.apply_delete_actions(inbound.model, &children)).await?;
                    let id_field = self.registry.id_field(inbound.model)?;
                    let ids = children.iter().map(|c| vec![c.get(id_field).clone()]);
                    self.write(WriteOp::Delete {
                        model: inbound.model,
                        predicate: Predicate::key_in(&[id_field], ids),
                    })
                    .await?;
                }
            }
        }

        for relation in def.relations.iter().filter(|r| r.is_many_to_many()) {
            let Some(join) = relation.join else { continue };
            for row in rows {
                let source = row.get(relation.fields[0]).clone();
                self.write(WriteOp::Unlink {
                    join,
                    source: Some(source),
                    target: None,
                })
                .await?;
            }
        }
        Ok(())
    }

    /// Propagates a change of a referenced key to the rows pointing at it
    pub(crate) async fn cascade_key_update(
        &self,
        model: &'static str,
        before: &Row,
        after: &Row,
    ) -> Result<()> {
        for inbound in self.registry.inbound(model) {
            let relation = inbound.relation;
            let old_key = before.key(relation.references);
            let new_key = after.key(relation.references);
            if old_key == new_key || key_is_null(&old_key) {
                continue;
            }
            let id_field = self.registry.id_field(inbound.model)?;
            let children = self
                .fetch_live(inbound.model, Predicate::key_in(relation.fields, [old_key]))
                .await?;
            let patch: Row = relation
                .fields
                .iter()
                .zip(new_key.iter())
                .map(|(f, v)| (*f, v.clone()))
                .collect();
            for child in children {
                self.write(WriteOp::Update {
                    model: inbound.model,
                    id_field,
                    id: child.get(id_field).clone(),
                    patch: patch.clone(),
                })
                .await?;
            }
        }
        Ok(())
    }
}
