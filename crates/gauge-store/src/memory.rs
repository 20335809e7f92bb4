use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use gauge_types::Key;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::cursor::Cursor;
use crate::entity::Entity;
use crate::error::{StoreError, StoreResult};
use crate::query::Query;
use crate::traits::{QueryResults, Store, StoreTransaction};

/// In-memory store for tests, local demos, and embedding.
///
/// Cloning yields another handle to the same data. Transactions are
/// optimistic: every committed write bumps a per-key version, and a commit
/// fails with [`StoreError::Conflict`] if any key the transaction read has
/// a different version by then.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: RwLock<State>,
    faults: Mutex<Faults>,
}

#[derive(Default)]
struct State {
    entities: BTreeMap<Key, Stored>,
    clock: u64,
}

struct Stored {
    entity: Entity,
    version: u64,
}

#[derive(Default)]
struct Faults {
    failing_kinds: BTreeSet<String>,
    fail_next_commit: bool,
    /// Applied by the next write before its own mutations.
    interleaved: Vec<Entity>,
}

/// Resume position encoded in a [`Cursor`].
#[derive(Serialize, Deserialize)]
struct Position {
    values: Vec<Value>,
    key: Key,
}

impl Position {
    fn encode(&self) -> StoreResult<Cursor> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| StoreError::Serialization(format!("encoding cursor: {e}")))?;
        Cursor::new(bytes)
    }

    fn decode(cursor: &Cursor, query: &Query) -> StoreResult<Self> {
        let position: Position = serde_json::from_slice(cursor.as_bytes())
            .map_err(|e| StoreError::InvalidCursor(format!("malformed position: {e}")))?;
        if position.values.len() != query.order.len() {
            return Err(StoreError::InvalidCursor(
                "cursor was issued for a different query".into(),
            ));
        }
        Ok(position)
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".into())
}

impl State {
    fn version_of(&self, key: &Key) -> Option<u64> {
        self.entities.get(key).map(|s| s.version)
    }

    fn put(&mut self, entity: Entity) {
        self.clock += 1;
        let version = self.clock;
        self.entities
            .insert(entity.key.clone(), Stored { entity, version });
    }

    fn delete(&mut self, key: &Key) -> bool {
        self.entities.remove(key).is_some()
    }

    fn execute(&self, query: &Query) -> StoreResult<QueryResults> {
        let start = match &query.start {
            Some(cursor) => Some(Position::decode(cursor, query)?),
            None => None,
        };

        let mut matched: Vec<(Vec<Value>, &Entity)> = self
            .entities
            .values()
            .map(|stored| &stored.entity)
            .filter(|entity| query.matches(entity))
            .map(|entity| (query.sort_values(entity), entity))
            .collect();
        matched.sort_by(|a, b| {
            query.compare_positions((a.0.as_slice(), &a.1.key), (b.0.as_slice(), &b.1.key))
        });

        let remaining: Vec<(Vec<Value>, &Entity)> = match &start {
            Some(pos) => matched
                .into_iter()
                .filter(|(values, entity)| {
                    query.compare_positions(
                        (values.as_slice(), &entity.key),
                        (pos.values.as_slice(), &pos.key),
                    ) == Ordering::Greater
                })
                .collect(),
            None => matched,
        };

        let limit = query.limit.unwrap_or(usize::MAX);
        let more_results = remaining.len() > limit;
        let page: Vec<(Vec<Value>, &Entity)> = remaining.into_iter().take(limit).collect();

        let end_cursor = match page.last() {
            Some((values, entity)) => Some(
                Position {
                    values: values.clone(),
                    key: entity.key.clone(),
                }
                .encode()?,
            ),
            None => query.start.clone(),
        };

        let entities = page
            .into_iter()
            .map(|(_, entity)| {
                if query.keys_only {
                    entity.key_only()
                } else {
                    entity.clone()
                }
            })
            .collect();

        Ok(QueryResults {
            entities,
            end_cursor,
            more_results,
        })
    }
}

impl Shared {
    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| poisoned())
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| poisoned())
    }

    /// Fail if any of `keys` targets a kind configured to reject writes.
    fn check_write_faults<'a>(&self, keys: impl IntoIterator<Item = &'a Key>) -> StoreResult<()> {
        let faults = self.faults.lock().map_err(|_| poisoned())?;
        if faults.failing_kinds.is_empty() {
            return Ok(());
        }
        for key in keys {
            if faults.failing_kinds.contains(key.kind()) {
                debug!(key = %key, "injected write failure");
                return Err(StoreError::Unavailable(format!(
                    "writes to kind {} are failing",
                    key.kind()
                )));
            }
        }
        Ok(())
    }

    fn take_commit_fault(&self) -> StoreResult<bool> {
        let mut faults = self.faults.lock().map_err(|_| poisoned())?;
        Ok(std::mem::take(&mut faults.fail_next_commit))
    }

    /// Write lock for a mutation, with any interleaved writes already applied.
    fn write_for_mutation(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        let pending = {
            let mut faults = self.faults.lock().map_err(|_| poisoned())?;
            std::mem::take(&mut faults.interleaved)
        };
        let mut state = self.write()?;
        for entity in pending {
            debug!(key = %entity.key, "interleaved write applied");
            state.put(entity);
        }
        Ok(state)
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.shared.read().map(|s| s.entities.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is currently stored.
    pub fn contains(&self, key: &Key) -> bool {
        self.shared
            .read()
            .map(|s| s.entities.contains_key(key))
            .unwrap_or(false)
    }

    /// Make every write (direct or transactional) touching `kind` fail with
    /// [`StoreError::Unavailable`] until [`clear_faults`](Self::clear_faults).
    pub fn fail_writes_to_kind(&self, kind: impl Into<String>) {
        if let Ok(mut faults) = self.shared.faults.lock() {
            faults.failing_kinds.insert(kind.into());
        }
    }

    /// Make the next transaction commit fail with [`StoreError::Unavailable`].
    pub fn fail_next_commit(&self) {
        if let Ok(mut faults) = self.shared.faults.lock() {
            faults.fail_next_commit = true;
        }
    }

    /// Land `entity` as a committed write just before the next mutation
    /// (direct write or transaction commit) touches the store, as if a
    /// concurrent writer got there first.
    pub fn interleave_on_next_write(&self, entity: Entity) {
        if let Ok(mut faults) = self.shared.faults.lock() {
            faults.interleaved.push(entity);
        }
    }

    /// Remove every injected fault and pending interleaved write.
    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.shared.faults.lock() {
            *faults = Faults::default();
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, key: &Key) -> StoreResult<Option<Entity>> {
        let state = self.shared.read()?;
        Ok(state.entities.get(key).map(|s| s.entity.clone()))
    }

    async fn put(&self, entity: Entity) -> StoreResult<()> {
        self.shared.check_write_faults([&entity.key])?;
        self.shared.write_for_mutation()?.put(entity);
        Ok(())
    }

    async fn put_many(&self, entities: Vec<Entity>) -> StoreResult<()> {
        self.shared.check_write_faults(entities.iter().map(|e| &e.key))?;
        let mut state = self.shared.write_for_mutation()?;
        for entity in entities {
            state.put(entity);
        }
        Ok(())
    }

    async fn delete(&self, key: &Key) -> StoreResult<bool> {
        self.shared.check_write_faults([key])?;
        Ok(self.shared.write_for_mutation()?.delete(key))
    }

    async fn delete_many(&self, keys: &[Key]) -> StoreResult<usize> {
        self.shared.check_write_faults(keys)?;
        let mut state = self.shared.write_for_mutation()?;
        Ok(keys.iter().filter(|key| state.delete(key)).count())
    }

    async fn run_query(&self, query: &Query) -> StoreResult<QueryResults> {
        self.shared.read()?.execute(query)
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            reads: HashMap::new(),
            writes: BTreeMap::new(),
        }))
    }
}

/// Optimistic transaction over an [`InMemoryStore`].
struct MemoryTransaction {
    shared: Arc<Shared>,
    /// Version of each key at first read; `None` if it did not exist.
    reads: HashMap<Key, Option<u64>>,
    /// Staged writes; `None` stages a delete.
    writes: BTreeMap<Key, Option<Entity>>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, key: &Key) -> StoreResult<Option<Entity>> {
        let state = self.shared.read()?;
        let stored = state.entities.get(key);
        self.reads
            .entry(key.clone())
            .or_insert_with(|| stored.map(|s| s.version));
        Ok(stored.map(|s| s.entity.clone()))
    }

    fn put(&mut self, entity: Entity) -> StoreResult<()> {
        self.writes.insert(entity.key.clone(), Some(entity));
        Ok(())
    }

    fn delete(&mut self, key: Key) -> StoreResult<()> {
        self.writes.insert(key, None);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            shared,
            reads,
            writes,
        } = *self;

        if shared.take_commit_fault()? {
            debug!("injected commit failure");
            return Err(StoreError::Unavailable("commit failed".into()));
        }
        shared.check_write_faults(writes.keys())?;

        let mut state = shared.write_for_mutation()?;
        for (key, seen) in &reads {
            if state.version_of(key) != *seen {
                debug!(key = %key, "optimistic transaction conflict");
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                });
            }
        }
        let count = writes.len();
        for (key, write) in writes {
            match write {
                Some(entity) => state.put(entity),
                None => {
                    state.delete(&key);
                }
            }
        }
        debug!(reads = reads.len(), writes = count, "transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{paginate, PageRequest};
    use crate::entity::Properties;
    use crate::unit::UnitOfWork;
    use gauge_types::PaginationConfig;
    use proptest::prelude::*;
    use serde_json::json;

    fn key(name: &str) -> Key {
        Key::root(Some("test"), "Item", name).unwrap()
    }

    fn item(name: &str, props: Value) -> Entity {
        let Value::Object(map) = props else {
            panic!("props must be an object")
        };
        Entity::new(key(name), map)
    }

    // =========================================================================
    // Single-key operations
    // =========================================================================

    #[tokio::test]
    async fn put_get_delete() {
        let store = InMemoryStore::new();
        store.put(item("a", json!({"n": 1}))).await.unwrap();

        let got = store.get(&key("a")).await.unwrap().unwrap();
        assert_eq!(got.get("n"), Some(&json!(1)));
        assert!(store.get(&key("b")).await.unwrap().is_none());

        assert!(store.delete(&key("a")).await.unwrap());
        assert!(!store.delete(&key("a")).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn get_many_preserves_order() {
        let store = InMemoryStore::new();
        store
            .put_many(vec![item("a", json!({})), item("c", json!({}))])
            .await
            .unwrap();
        let got = store
            .get_many(&[key("c"), key("b"), key("a")])
            .await
            .unwrap();
        assert_eq!(got[0].as_ref().unwrap().key, key("c"));
        assert!(got[1].is_none());
        assert_eq!(got[2].as_ref().unwrap().key, key("a"));
    }

    #[tokio::test]
    async fn delete_many_counts_existing() {
        let store = InMemoryStore::new();
        store
            .put_many(vec![item("a", json!({})), item("b", json!({}))])
            .await
            .unwrap();
        let removed = store
            .delete_many(&[key("a"), key("b"), key("zzz")])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(store.is_empty());
    }

    // =========================================================================
    // Queries
    // =========================================================================

    #[tokio::test]
    async fn query_orders_by_property_then_key() {
        let store = InMemoryStore::new();
        store
            .put_many(vec![
                item("a", json!({"created": "2024-01-01"})),
                item("b", json!({"created": "2024-03-01"})),
                item("c", json!({"created": "2024-01-01"})),
                item("d", json!({})),
            ])
            .await
            .unwrap();

        let results = store
            .run_query(&Query::kind(Some("test"), "Item").order_desc("created"))
            .await
            .unwrap();
        let names: Vec<&str> = results.entities.iter().map(|e| e.key.name()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert!(!results.more_results);
    }

    #[tokio::test]
    async fn keys_only_query_drops_properties() {
        let store = InMemoryStore::new();
        store.put(item("a", json!({"n": 1}))).await.unwrap();
        let results = store
            .run_query(&Query::kind(Some("test"), "Item").keys_only())
            .await
            .unwrap();
        assert_eq!(results.entities.len(), 1);
        assert!(results.entities[0].properties.is_empty());
    }

    #[tokio::test]
    async fn more_results_is_exact() {
        let store = InMemoryStore::new();
        store
            .put_many(vec![item("a", json!({})), item("b", json!({}))])
            .await
            .unwrap();

        let q = Query::kind(Some("test"), "Item").limit(2);
        let results = store.run_query(&q).await.unwrap();
        assert_eq!(results.entities.len(), 2);
        assert!(!results.more_results);

        let results = store.run_query(&q.clone().limit(1)).await.unwrap();
        assert!(results.more_results);

        let rest = store
            .run_query(&q.start(results.end_cursor.unwrap()))
            .await
            .unwrap();
        assert_eq!(rest.entities[0].key, key("b"));
        assert!(!rest.more_results);
    }

    #[tokio::test]
    async fn cursor_from_other_query_rejected() {
        let store = InMemoryStore::new();
        store
            .put_many(vec![item("a", json!({"n": 1})), item("b", json!({"n": 2}))])
            .await
            .unwrap();
        let first = store
            .run_query(&Query::kind(Some("test"), "Item").order_asc("n").limit(1))
            .await
            .unwrap();
        let err = store
            .run_query(&Query::kind(Some("test"), "Item").start(first.end_cursor.unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidCursor(_)));
    }

    #[tokio::test]
    async fn descendant_sweep_spans_kinds() {
        let store = InMemoryStore::new();
        let run = key("run");
        store
            .put_many(vec![
                Entity::new(run.clone(), Properties::new()),
                Entity::new(run.child("Log", "1").unwrap(), Properties::new()),
                Entity::new(run.child("Part", "x").unwrap(), Properties::new()),
                Entity::new(key("other").child("Log", "1").unwrap(), Properties::new()),
            ])
            .await
            .unwrap();
        let results = store.run_query(&Query::descendants(&run)).await.unwrap();
        assert_eq!(results.entities.len(), 2);
    }

    #[tokio::test]
    async fn sweep_catches_descendants_written_mid_delete() {
        let store = InMemoryStore::new();
        let run = key("run");
        store
            .put_many(vec![
                Entity::new(run.clone(), Properties::new()),
                Entity::new(run.child("Log", "1").unwrap(), Properties::new()),
            ])
            .await
            .unwrap();

        let late = Entity::new(run.child("Log", "2").unwrap(), Properties::new());
        store.interleave_on_next_write(late);
        let removed = crate::cursor::sweep_descendants(&store, &run).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&run));
    }

    proptest! {
        #[test]
        fn paginated_walk_visits_every_match_once(
            ranks in proptest::collection::vec(0u8..5, 0..40),
            limit in 1usize..7,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let store = InMemoryStore::new();
                let entities = ranks
                    .iter()
                    .enumerate()
                    .map(|(i, rank)| item(&format!("e{i:03}"), json!({"rank": rank})))
                    .collect();
                store.put_many(entities).await.unwrap();

                let query = Query::kind(Some("test"), "Item").order_desc("rank");
                let full = store.run_query(&query).await.unwrap();
                let expected: Vec<Value> = full
                    .entities
                    .iter()
                    .map(|e| json!(e.key.name()))
                    .collect();

                let limits = PaginationConfig::default();
                let mut request = PageRequest::first(limit);
                let mut walked: Vec<Value> = Vec::new();
                loop {
                    let page: crate::cursor::Page<Value> =
                        paginate(&store, query.clone(), &request, &limits).await.unwrap();
                    assert!(page.entities.len() <= limit);
                    walked.extend(page.entities.iter().map(|e| e["id"].clone()));
                    match page.page_token {
                        Some(token) => request = request.next(token),
                        None => break,
                    }
                }
                assert_eq!(walked, expected);
                assert_eq!(walked.len(), ranks.len());
            });
        }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    #[tokio::test]
    async fn staged_writes_land_together_on_commit() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.put(item("a", json!({}))).unwrap();
        tx.put(item("b", json!({}))).unwrap();
        assert!(store.is_empty());
        tx.commit().await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = InMemoryStore::new();
        {
            let mut uow = UnitOfWork::begin(&store, "test").await.unwrap();
            uow.put(item("a", json!({}))).unwrap();
            assert_eq!(uow.staged(), 1);
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn concurrent_writer_causes_conflict() {
        let store = InMemoryStore::new();
        store.put(item("a", json!({"n": 0}))).await.unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.get(&key("a")).await.unwrap();
        second.get(&key("a")).await.unwrap();

        second.put(item("a", json!({"n": 2}))).unwrap();
        second.commit().await.unwrap();

        first.put(item("a", json!({"n": 1}))).unwrap();
        let err = first.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let stored = store.get(&key("a")).await.unwrap().unwrap();
        assert_eq!(stored.get("n"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn creation_race_conflicts() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.get(&key("a")).await.unwrap().is_none());
        store.put(item("a", json!({}))).await.unwrap();
        tx.put(item("a", json!({"mine": true}))).unwrap();
        assert!(matches!(
            tx.commit().await,
            Err(StoreError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn complete_returns_callers_error_and_rolls_back() {
        let store = InMemoryStore::new();
        let mut uow = UnitOfWork::begin(&store, "test").await.unwrap();
        uow.put(item("a", json!({}))).unwrap();
        let outcome: Result<(), StoreError> = Err(StoreError::Unavailable("boom".into()));
        let err = uow.complete(outcome).await.unwrap_err();
        assert_eq!(err.to_string(), "store unavailable: boom");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn scoped_unit_commits_on_ok() {
        let store = InMemoryStore::new();
        let staged = UnitOfWork::run(&store, "test", |uow| {
            Box::pin(async move {
                uow.put(item("a", json!({})))?;
                uow.put(item("b", json!({})))?;
                Ok::<usize, StoreError>(uow.staged())
            })
        })
        .await
        .unwrap();
        assert_eq!(staged, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn scoped_unit_rolls_back_on_err() {
        let store = InMemoryStore::new();
        let err = UnitOfWork::run(&store, "test", |uow| {
            Box::pin(async move {
                uow.put(item("a", json!({})))?;
                Err::<(), StoreError>(StoreError::Unavailable("boom".into()))
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.is_empty());
    }

    // =========================================================================
    // Fault injection
    // =========================================================================

    #[tokio::test]
    async fn failing_kind_blocks_whole_batch() {
        let store = InMemoryStore::new();
        store.fail_writes_to_kind("Log");
        let run = key("run");
        let err = store
            .put_many(vec![
                Entity::new(run.clone(), Properties::new()),
                Entity::new(run.child("Log", "1").unwrap(), Properties::new()),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.is_empty());

        store.clear_faults();
        store
            .put(Entity::new(run.child("Log", "1").unwrap(), Properties::new()))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn interleaved_write_lands_before_commit() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.get(&key("a")).await.unwrap().is_none());
        tx.put(item("a", json!({"mine": true}))).unwrap();

        store.interleave_on_next_write(item("a", json!({"theirs": true})));
        assert!(matches!(
            tx.commit().await,
            Err(StoreError::Conflict { .. })
        ));
        let stored = store.get(&key("a")).await.unwrap().unwrap();
        assert_eq!(stored.get("theirs"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn interleaved_write_is_one_shot() {
        let store = InMemoryStore::new();
        store.interleave_on_next_write(item("b", json!({})));
        store.put(item("a", json!({}))).await.unwrap();
        assert_eq!(store.len(), 2);

        store.delete(&key("b")).await.unwrap();
        store.put(item("c", json!({}))).await.unwrap();
        assert!(!store.contains(&key("b")));
    }

    #[tokio::test]
    async fn failed_commit_is_one_shot() {
        let store = InMemoryStore::new();
        store.fail_next_commit();

        let mut tx = store.begin().await.unwrap();
        tx.put(item("a", json!({}))).unwrap();
        assert!(tx.commit().await.is_err());
        assert!(store.is_empty());

        let mut tx = store.begin().await.unwrap();
        tx.put(item("a", json!({}))).unwrap();
        tx.commit().await.unwrap();
        assert!(store.contains(&key("a")));
    }
}
