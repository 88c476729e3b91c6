//! In-memory backend.
//!
//! Rows live in insertion order per model, join rows per join table. The
//! whole store sits behind one async mutex: plain calls lock it per
//! request, and a transaction holds the lock for its whole lifetime while
//! it works on a private copy that `commit` swaps in. Every transaction is
//! therefore serializable whatever isolation level was asked for. Snapshot
//! reads inside a transaction are served from the untouched store.

use std::sync::Arc;

use hashbrown::HashMap;
use neuronek_db_core::{
    Backend, Connection, FetchRequest, Predicate, ReadView, Result, Row, RowSource,
    TransactionHandle, TransactionOptions, Value, WriteOp, WriteResult,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Debug, Default)]
struct Store {
    tables: HashMap<&'static str, Vec<Row>>,
}

impl RowSource for Store {
    fn scan<'a>(&'a self, model: &str) -> Box<dyn Iterator<Item = &'a Row> + 'a> {
        match self.tables.get(model) {
            Some(rows) => Box::new(rows.iter()),
            None => Box::new(core::iter::empty()),
        }
    }
}

impl Store {
    fn fetch(&self, request: &FetchRequest) -> Vec<Row> {
        self.scan(request.model)
            .filter(|row| request.predicate.eval(row, self))
            .cloned()
            .collect()
    }

    fn matching(&self, model: &str, predicate: &Predicate) -> Vec<usize> {
        self.scan(model)
            .enumerate()
            .filter(|(_, row)| predicate.eval(row, self))
            .map(|(i, _)| i)
            .collect()
    }

    fn apply(&mut self, op: &WriteOp) -> WriteResult {
        let affected = match op {
            WriteOp::Insert { model, row } => {
                self.tables.entry(*model).or_default().push(row.clone());
                1
            }
            WriteOp::Update {
                model,
                id_field,
                id,
                patch,
            } => {
                let rows = self.tables.entry(*model).or_default();
                let mut n = 0;
                for row in rows.iter_mut().filter(|r| r.get(id_field) == id) {
                    row.merge(patch);
                    n += 1;
                }
                n
            }
            WriteOp::Delete { model, predicate } => {
                let doomed = self.matching(model, predicate);
                let rows = self.tables.entry(*model).or_default();
                let mut index = 0;
                rows.retain(|_| {
                    let keep = doomed.binary_search(&index).is_err();
                    index += 1;
                    keep
                });
                doomed.len() as u64
            }
            WriteOp::Link {
                join,
                source,
                target,
            } => {
                let rows = self.tables.entry(join.name).or_default();
                let exists = rows.iter().any(|r| {
                    r.get(join.source_column) == source && r.get(join.target_column) == target
                });
                if exists {
                    0
                } else {
                    rows.push(
                        Row::new()
                            .with(join.source_column, source.clone())
                            .with(join.target_column, target.clone()),
                    );
                    1
                }
            }
            WriteOp::Unlink {
                join,
                source,
                target,
            } => {
                let matches = |row: &Row, column: &str, value: &Option<Value>| {
                    value.as_ref().is_none_or(|v| row.get(column) == v)
                };
                let rows = self.tables.entry(join.name).or_default();
                let before = rows.len();
                rows.retain(|r| {
                    !(matches(r, join.source_column, source) && matches(r, join.target_column, target))
                });
                (before - rows.len()) as u64
            }
        };
        WriteResult { affected }
    }
}

/// Reference [`Backend`] keeping every row in memory
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    store: Arc<Mutex<Store>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows of `model` or of a join table
    pub async fn len(&self, table: &str) -> usize {
        self.store.lock().await.tables.get(table).map_or(0, Vec::len)
    }
}

impl Connection for MemoryBackend {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Row>> {
        Ok(self.store.lock().await.fetch(request))
    }

    async fn write(&self, op: &WriteOp) -> Result<WriteResult> {
        Ok(self.store.lock().await.apply(op))
    }
}

impl Backend for MemoryBackend {
    type Transaction = MemoryTransaction;

    async fn begin_transaction(&self, _options: TransactionOptions) -> Result<MemoryTransaction> {
        let base = Arc::clone(&self.store).lock_owned().await;
        let work = Mutex::new(Store::clone(&base));
        Ok(MemoryTransaction { base, work })
    }
}

/// An open transaction holding the store exclusively
#[derive(Debug)]
pub struct MemoryTransaction {
    base: OwnedMutexGuard<Store>,
    work: Mutex<Store>,
}

impl Connection for MemoryTransaction {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Row>> {
        Ok(match request.view {
            ReadView::Current => self.work.lock().await.fetch(request),
            ReadView::Snapshot => self.base.fetch(request),
        })
    }

    async fn write(&self, op: &WriteOp) -> Result<WriteResult> {
        Ok(self.work.lock().await.apply(op))
    }
}

impl TransactionHandle for MemoryTransaction {
    async fn commit(self) -> Result<()> {
        let Self { mut base, work } = self;
        *base = work.into_inner();
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuronek_db_types::JoinTableDef;

    const LINKS: JoinTableDef = JoinTableDef::new("_EffectToPhase", "A", "B");

    fn insert(model: &'static str, id: &str) -> WriteOp {
        WriteOp::Insert {
            model,
            row: Row::new().with("id", id),
        }
    }

    #[tokio::test]
    async fn rows_keep_insertion_order() {
        let backend = MemoryBackend::new();
        for id in ["c", "a", "b"] {
            backend.write(&insert("Effect", id)).await.unwrap();
        }
        let rows = backend
            .fetch(&FetchRequest::new("Effect", Predicate::default()))
            .await
            .unwrap();
        let ids: Vec<&Value> = rows.iter().map(|r| r.get("id")).collect();
        assert_eq!(ids, [&Value::from("c"), &Value::from("a"), &Value::from("b")]);

        // updates keep a row in place
        backend
            .write(&WriteOp::Update {
                model: "Effect",
                id_field: "id",
                id: Value::from("c"),
                patch: Row::new().with("name", "renamed"),
            })
            .await
            .unwrap();
        let rows = backend
            .fetch(&FetchRequest::new("Effect", Predicate::default()))
            .await
            .unwrap();
        assert_eq!(rows[0].get("id"), &Value::from("c"));
        assert_eq!(rows[0].get("name"), &Value::from("renamed"));
    }

    #[tokio::test]
    async fn links_are_deduplicated_and_unlinked() {
        let backend = MemoryBackend::new();
        let link = WriteOp::Link {
            join: LINKS,
            source: Value::from("e1"),
            target: Value::from("p1"),
        };
        assert_eq!(backend.write(&link).await.unwrap().affected, 1);
        assert_eq!(backend.write(&link).await.unwrap().affected, 0);

        let unlink = WriteOp::Unlink {
            join: LINKS,
            source: Some(Value::from("e1")),
            target: None,
        };
        assert_eq!(backend.write(&unlink).await.unwrap().affected, 1);
        assert_eq!(backend.len("_EffectToPhase").await, 0);
    }

    #[tokio::test]
    async fn rollback_discards_and_commit_publishes() {
        let backend = MemoryBackend::new();
        let tx = backend.begin_transaction(TransactionOptions::default()).await.unwrap();
        tx.write(&insert("Account", "a1")).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(backend.len("Account").await, 0);

        let tx = backend.begin_transaction(TransactionOptions::default()).await.unwrap();
        tx.write(&insert("Account", "a2")).await.unwrap();
        assert_eq!(
            tx.fetch(&FetchRequest::new("Account", Predicate::default()))
                .await
                .unwrap()
                .len(),
            1
        );
        tx.commit().await.unwrap();
        assert_eq!(backend.len("Account").await, 1);
    }

    #[tokio::test]
    async fn snapshot_reads_ignore_uncommitted_writes() {
        let backend = MemoryBackend::new();
        backend.write(&insert("Account", "a1")).await.unwrap();

        let tx = backend.begin_transaction(TransactionOptions::default()).await.unwrap();
        tx.write(&insert("Account", "a2")).await.unwrap();
        let all = FetchRequest::new("Account", Predicate::default());
        assert_eq!(tx.fetch(&all).await.unwrap().len(), 2);
        assert_eq!(tx.fetch(&all.clone().view(ReadView::Snapshot)).await.unwrap().len(), 1);
        tx.commit().await.unwrap();
        assert_eq!(backend.len("Account").await, 2);
    }

    #[tokio::test]
    async fn delete_removes_matching_rows() {
        let backend = MemoryBackend::new();
        for id in ["a", "b", "c"] {
            backend.write(&insert("Stash", id)).await.unwrap();
        }
        let deleted = backend
            .write(&WriteOp::Delete {
                model: "Stash",
                predicate: Predicate::key_in(&["id"], [vec![Value::from("a")], vec![Value::from("c")]]),
            })
            .await
            .unwrap();
        assert_eq!(deleted.affected, 2);
        assert_eq!(backend.len("Stash").await, 1);
    }
}
