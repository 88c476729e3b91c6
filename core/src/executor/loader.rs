//! Batched relation loading.
//!
//! Each relation step issues one fetch for all parent rows at its depth
//! (two for many-to-many: the join rows, then the targets), groups the
//! result by parent key and applies the step's ordering and window per
//! parent. Sibling steps run concurrently; a child step starts once its
//! parents are known. Results are always reassembled in parent order.

use futures_util::future::{BoxFuture, FutureExt, try_join, try_join_all};
use hashbrown::{HashMap, HashSet};
use neuronek_db_types::RelationDef;

use super::Executor;
use crate::backend::Connection;
use crate::error::Result;
use crate::filter::Predicate;
use crate::order::sort_rows;
use crate::projection::{CountStep, ProjectionTree, RelationStep};
use crate::row::{Row, key_is_null};
use crate::value::Value;

/// A row with its loaded relations, aligned with a [`ProjectionTree`]
#[derive(Clone, Debug, PartialEq)]
pub struct Loaded {
    pub row: Row,
    /// One entry per [`ProjectionTree::relations`] step
    pub relations: Vec<LoadedRelation>,
    /// One entry per [`ProjectionTree::counts`] step
    pub counts: Vec<u64>,
}

impl Loaded {
    fn leaf(row: Row) -> Self {
        Self {
            row,
            relations: Vec::new(),
            counts: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LoadedRelation {
    One(Option<Box<Loaded>>),
    Many(Vec<Loaded>),
}

impl<C: Connection> Executor<'_, C> {
    /// Loads every relation and count of `tree` for `rows`
    pub(crate) fn load<'s>(
        &'s self,
        rows: Vec<Row>,
        tree: &'s ProjectionTree,
    ) -> BoxFuture<'s, Result<Vec<Loaded>>> {
        async move {
            if tree.is_flat() || rows.is_empty() {
                return Ok(rows.into_iter().map(Loaded::leaf).collect());
            }

            let relations = try_join_all(
                tree.relations
                    .iter()
                    .map(|step| self.load_relation(&rows, step)),
            );
            let counts = try_join_all(tree.counts.iter().map(|step| self.count_relation(&rows, step)));
            let (relations, counts) = try_join(relations, counts).await?;

            let mut per_step: Vec<_> = relations.into_iter().map(Vec::into_iter).collect();
            Ok(rows
                .into_iter()
                .enumerate()
                .map(|(i, row)| Loaded {
                    row,
                    relations: per_step.iter_mut().filter_map(Iterator::next).collect(),
                    counts: counts.iter().map(|c| c[i]).collect(),
                })
                .collect())
        }
        .boxed()
    }

    async fn load_relation(&self, parents: &[Row], step: &RelationStep) -> Result<Vec<LoadedRelation>> {
        let plan = &step.plan;
        let grouped = self
            .related_rows(parents, step.relation, &plan.filter.predicate)
            .await?;

        let mut sizes = Vec::with_capacity(grouped.len());
        let mut windowed = Vec::new();
        for mut rows in grouped {
            sort_rows(&mut rows, &plan.order);
            let rows = plan.window.apply(rows);
            sizes.push(rows.len());
            windowed.extend(rows);
        }

        let mut children = self.load(windowed, &plan.projection).await?.into_iter();
        Ok(sizes
            .into_iter()
            .map(|n| {
                let chunk: Vec<Loaded> = children.by_ref().take(n).collect();
                if step.relation.is_to_many() {
                    LoadedRelation::Many(chunk)
                } else {
                    LoadedRelation::One(chunk.into_iter().next().map(Box::new))
                }
            })
            .collect())
    }

    async fn count_relation(&self, parents: &[Row], step: &CountStep) -> Result<Vec<u64>> {
        let grouped = self
            .related_rows(parents, step.relation, &step.filter.predicate)
            .await?;
        Ok(grouped.iter().map(|rows| rows.len() as u64).collect())
    }

    /// Rows of `relation`'s target matching `predicate`, grouped per parent in
    /// parent order; each group keeps storage order
    pub(crate) async fn related_rows(
        &self,
        parents: &[Row],
        relation: &'static RelationDef,
        predicate: &Predicate,
    ) -> Result<Vec<Vec<Row>>> {
        let parent_keys: Vec<Vec<Value>> = parents.iter().map(|p| p.key(relation.fields)).collect();
        let mut distinct_keys: Vec<Vec<Value>> = Vec::new();
        let mut seen = HashSet::new();
        for key in &parent_keys {
            if !key_is_null(key) && seen.insert(key.clone()) {
                distinct_keys.push(key.clone());
            }
        }
        if distinct_keys.is_empty() {
            return Ok(vec![Vec::new(); parents.len()]);
        }

        let Some(join) = relation.join else {
            let rows = self
                .fetch(
                    relation.target,
                    Predicate::and(vec![
                        predicate.clone(),
                        Predicate::key_in(relation.references, distinct_keys),
                    ]),
                )
                .await?;
            let mut by_key: HashMap<Vec<Value>, Vec<Row>> = HashMap::new();
            for row in rows {
                by_key.entry(row.key(relation.references)).or_default().push(row);
            }
            return Ok(parent_keys
                .iter()
                .map(|key| by_key.get(key).cloned().unwrap_or_default())
                .collect());
        };

        let links = self
            .fetch(
                join.name,
                Predicate::key_in(&[join.source_column], distinct_keys),
            )
            .await?;
        let mut targets_of: HashMap<Value, HashSet<Value>> = HashMap::new();
        let mut all_targets = Vec::new();
        let mut seen_targets = HashSet::new();
        for link in &links {
            let target = link.get(join.target_column).clone();
            if seen_targets.insert(target.clone()) {
                all_targets.push(vec![target.clone()]);
            }
            targets_of
                .entry(link.get(join.source_column).clone())
                .or_default()
                .insert(target);
        }
        if all_targets.is_empty() {
            return Ok(vec![Vec::new(); parents.len()]);
        }

        let targets = self
            .fetch(
                relation.target,
                Predicate::and(vec![
                    predicate.clone(),
                    Predicate::key_in(relation.references, all_targets),
                ]),
            )
            .await?;
        Ok(parent_keys
            .iter()
            .map(|key| match targets_of.get(&key[0]) {
                Some(linked) => targets
                    .iter()
                    .filter(|t| linked.contains(t.get(relation.references[0])))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            })
            .collect())
    }
}
