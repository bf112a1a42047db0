//! # MemoryStore
//!
//! In-process `DocumentStore` with the full port contract: guarded
//! multi-document commits, a store-wide revision sequence, strictly
//! monotonic server timestamps, and live queries.
//!
//! Every mutation runs under one write lock, and watcher snapshots are
//! recomputed and published before that lock is released. That single
//! ordering point is what makes per-feed delivery totally ordered by commit
//! order and makes the `RevMatches`/`NotExists` guards race-free.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use domains::document::{DocKey, Document};
use domains::error::StoreError;
use domains::feed::{ChangeFeed, Snapshot};
use domains::fields::{FieldValue, Fields};
use domains::ports::{Direction, DocumentStore, Query, Txn, TxnGuard, TxnOp};

#[derive(Debug, Clone)]
struct StoredDoc {
    fields: Map<String, Value>,
    rev: u64,
}

struct Watcher {
    id: u64,
    query: Query,
    tx: watch::Sender<Snapshot>,
}

#[derive(Default)]
struct TableState {
    /// collection path -> document id -> document
    collections: HashMap<String, BTreeMap<String, StoredDoc>>,
    /// Store-wide commit sequence; every committed transaction bumps it.
    rev_seq: u64,
    last_ts_micros: i64,
    watchers: Vec<Watcher>,
    next_watcher_id: u64,
}

/// In-memory `DocumentStore` implementation.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<TableState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, TableState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("store state lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, TableState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("store state lock poisoned".into()))
    }

    /// Applies a transaction under the write lock: validates every guard
    /// (and every `Update` target) before mutating anything, then applies
    /// all ops at one new revision and republishes affected watchers.
    fn apply_commit(state: &mut TableState, txn: Txn) -> Result<(), StoreError> {
        for guard in &txn.guards {
            match guard {
                TxnGuard::Exists(key) => {
                    if doc_at(state, key).is_none() {
                        return Err(StoreError::TxnConflict(format!(
                            "expected {} to exist",
                            key.path()
                        )));
                    }
                }
                TxnGuard::NotExists(key) => {
                    if doc_at(state, key).is_some() {
                        return Err(StoreError::TxnConflict(format!(
                            "expected {} to not exist",
                            key.path()
                        )));
                    }
                }
                TxnGuard::RevMatches(key, rev) => match doc_at(state, key) {
                    Some(doc) if doc.rev == *rev => {}
                    Some(doc) => {
                        return Err(StoreError::TxnConflict(format!(
                            "{} is at rev {}, expected {rev}",
                            key.path(),
                            doc.rev
                        )));
                    }
                    None => {
                        return Err(StoreError::TxnConflict(format!(
                            "{} was deleted concurrently",
                            key.path()
                        )));
                    }
                },
            }
        }

        // Update targets are validated up front so a mid-transaction
        // NotFound can never leave a partial commit behind.
        for op in &txn.ops {
            if let TxnOp::Update { key, .. } = op {
                if doc_at(state, key).is_none() {
                    return Err(StoreError::NotFound(key.path()));
                }
            }
        }

        let now = next_server_ts(state);
        state.rev_seq += 1;
        let rev = state.rev_seq;

        for op in txn.ops {
            match op {
                TxnOp::Set { key, fields, merge } => {
                    let table = state.collections.entry(key.collection.clone()).or_default();
                    let base = if merge {
                        table
                            .get(&key.id)
                            .map(|doc| doc.fields.clone())
                            .unwrap_or_default()
                    } else {
                        Map::new()
                    };
                    let fields = resolve_fields(base, &fields, now);
                    table.insert(key.id, StoredDoc { fields, rev });
                }
                TxnOp::Update { key, fields } => {
                    let table = state.collections.entry(key.collection.clone()).or_default();
                    let base = table
                        .get(&key.id)
                        .map(|doc| doc.fields.clone())
                        .unwrap_or_default();
                    let fields = resolve_fields(base, &fields, now);
                    table.insert(key.id, StoredDoc { fields, rev });
                }
                TxnOp::Delete { key } => {
                    if let Some(table) = state.collections.get_mut(&key.collection) {
                        table.remove(&key.id);
                    }
                }
            }
        }

        notify_watchers(state);
        Ok(())
    }
}

fn doc_at<'a>(state: &'a TableState, key: &DocKey) -> Option<&'a StoredDoc> {
    state.collections.get(&key.collection)?.get(&key.id)
}

/// Strictly monotonic server clock: wall time, bumped by one microsecond
/// whenever two commits land within the same tick.
fn next_server_ts(state: &mut TableState) -> i64 {
    let now = Utc::now().timestamp_micros();
    state.last_ts_micros = if now > state.last_ts_micros {
        now
    } else {
        state.last_ts_micros + 1
    };
    state.last_ts_micros
}

fn resolve_fields(mut base: Map<String, Value>, fields: &Fields, now_micros: i64) -> Map<String, Value> {
    for (name, mutation) in fields.iter() {
        match mutation {
            FieldValue::Set(value) => {
                base.insert(name.clone(), value.clone());
            }
            FieldValue::Increment(delta) => {
                let current = base.get(name).and_then(Value::as_i64).unwrap_or(0);
                base.insert(name.clone(), Value::from(current + delta));
            }
            FieldValue::ServerTimestamp => {
                base.insert(name.clone(), Value::from(now_micros));
            }
        }
    }
    base
}

/// Republishes every registered watcher whose result set changed.
fn notify_watchers(state: &TableState) {
    for watcher in &state.watchers {
        let docs = run_query(state, &watcher.query);
        if watcher.tx.borrow().docs != docs {
            watcher.tx.send_replace(Snapshot {
                seq: state.rev_seq,
                docs,
            });
        }
    }
}

fn run_query(state: &TableState, query: &Query) -> Vec<Document> {
    let Some(table) = state.collections.get(&query.collection) else {
        return Vec::new();
    };
    let mut docs: Vec<Document> = table
        .iter()
        .filter(|(_, doc)| {
            query
                .filters
                .iter()
                .all(|filter| doc.fields.get(&filter.field) == Some(&filter.equals))
        })
        .map(|(id, doc)| Document {
            key: DocKey::new(&query.collection, id),
            rev: doc.rev,
            fields: doc.fields.clone(),
        })
        .collect();

    docs.sort_by(|a, b| {
        let ordering = cmp_values(
            a.fields.get(&query.order_by.field),
            b.fields.get(&query.order_by.field),
        );
        let ordering = match query.order_by.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        };
        ordering.then_with(|| a.key.id.cmp(&b.key.id))
    });
    docs
}

/// Total order over JSON values: null < bool < number < string < rest.
fn cmp_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, key: &DocKey) -> Result<Option<Document>, StoreError> {
        let state = self.read()?;
        Ok(doc_at(&state, key).map(|doc| Document {
            key: key.clone(),
            rev: doc.rev,
            fields: doc.fields.clone(),
        }))
    }

    async fn set(&self, key: &DocKey, fields: Fields, merge: bool) -> Result<(), StoreError> {
        let mut state = self.write()?;
        Self::apply_commit(&mut state, Txn::new().set(key.clone(), fields, merge))
    }

    async fn update(&self, key: &DocKey, fields: Fields) -> Result<(), StoreError> {
        let mut state = self.write()?;
        Self::apply_commit(&mut state, Txn::new().update(key.clone(), fields))
    }

    async fn delete(&self, key: &DocKey) -> Result<(), StoreError> {
        let mut state = self.write()?;
        Self::apply_commit(&mut state, Txn::new().delete(key.clone()))
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<DocKey, StoreError> {
        let key = DocKey::new(collection, Uuid::now_v7().to_string());
        let mut state = self.write()?;
        Self::apply_commit(&mut state, Txn::new().set(key.clone(), fields, false))?;
        Ok(key)
    }

    async fn commit(&self, txn: Txn) -> Result<(), StoreError> {
        let mut state = self.write()?;
        Self::apply_commit(&mut state, txn)
    }

    async fn query(&self, query: Query) -> Result<Vec<Document>, StoreError> {
        let state = self.read()?;
        Ok(run_query(&state, &query))
    }

    /// Registers the watcher under the state lock, so no commit can land
    /// between the initial snapshot and live delivery.
    async fn watch(&self, query: Query) -> Result<ChangeFeed, StoreError> {
        let mut state = self.write()?;
        let docs = run_query(&state, &query);
        let (tx, rx) = watch::channel(Snapshot {
            seq: state.rev_seq,
            docs,
        });
        let id = state.next_watcher_id;
        state.next_watcher_id += 1;
        state.watchers.push(Watcher { id, query, tx });

        let weak = Arc::downgrade(&self.state);
        Ok(ChangeFeed::new(rx, move || {
            if let Some(state) = weak.upgrade() {
                if let Ok(mut state) = state.write() {
                    state.watchers.retain(|watcher| watcher.id != id);
                    debug!(watcher = id, "released store watcher");
                }
            }
        }))
    }
}
