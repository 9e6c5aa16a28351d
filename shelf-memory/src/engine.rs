//! In-memory storage engine implementation.
//!
//! [`MemoryEngine`] keeps collections, blobs and indexes in process memory
//! behind reader-writer locks. It implements the full
//! [`StorageEngine`] contract including atomic batches, change listeners and
//! full-text matching, which makes it the reference engine for tests and for
//! applications that need no persistence.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

use shelf_core::engine::{
    BatchOp, ListenerToken, Projection, QueryPlan, Row, RowObserver, StorageEngine,
};
use shelf_core::error::{StoreError, StoreResult};

use crate::evaluator;

type Collection = HashMap<String, Map<String, Value>>;

#[derive(Debug, Clone)]
struct FulltextIndex {
    collection: String,
    fields: Vec<String>,
}

struct Listener {
    collection: String,
    plan: QueryPlan,
    observer: RowObserver,
}

#[derive(Default)]
struct Inner {
    collections: RwLock<HashMap<String, Collection>>,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    fulltext: RwLock<HashMap<String, FulltextIndex>>,
    listeners: Mutex<HashMap<u64, Listener>>,
    next_token: AtomicU64,
}

/// A thread-safe, non-persistent storage engine.
///
/// Clones share the same underlying state, so an engine can be handed to
/// multiple databases or threads cheaply.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    inner: Arc<Inner>,
}

impl fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let collections = self.inner.collections.read();
        f.debug_struct("MemoryEngine")
            .field("collections", &collections.len())
            .field("documents", &collections.values().map(HashMap::len).sum::<usize>())
            .finish()
    }
}

impl MemoryEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    fn execute_plan(&self, collection: &str, plan: &QueryPlan) -> StoreResult<Vec<Row>> {
        let fulltext = self.inner.fulltext.read();
        let text_index = match &plan.text {
            Some(text) => {
                let index = fulltext.get(&text.index).ok_or_else(|| {
                    StoreError::Query(format!("no full-text index named {}", text.index))
                })?;
                Some((index, text.text.as_str()))
            }
            None => None,
        };
        let collections = self.inner.collections.read();
        let Some(documents) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut matched: Vec<(&String, &Map<String, Value>)> = Vec::new();
        for (id, fields) in documents {
            if let Some((index, query)) = text_index {
                if index.collection != collection
                    || !evaluator::text_matches(fields, &index.fields, query)
                {
                    continue;
                }
            }
            if let Some(filter) = &plan.filter {
                if !evaluator::matches(fields, filter) {
                    continue;
                }
            }
            matched.push((id, fields));
        }
        if !plan.sort.is_empty() {
            matched.sort_by(|a, b| evaluator::compare_terms(a.1, b.1, &plan.sort));
        }
        let mut rows: Vec<Row> =
            matched.into_iter().map(|(id, fields)| project(collection, plan, id, fields)).collect();
        if let Some(limit) = plan.limit {
            let skip = plan.skip.unwrap_or(0);
            rows = rows.into_iter().skip(skip).take(limit).collect();
        }
        Ok(rows)
    }

    /// Re-executes every listener plan over the touched collections, each on
    /// its own thread.
    fn notify(&self, touched: &HashSet<String>) {
        if touched.is_empty() {
            return;
        }
        let listeners = self.inner.listeners.lock();
        for listener in listeners.values() {
            if !touched.contains(&listener.collection) {
                continue;
            }
            let engine = self.clone();
            let collection = listener.collection.clone();
            let plan = listener.plan.clone();
            let observer = listener.observer.clone();
            tracing::trace!(collection = %collection, "scheduling live query re-execution");
            thread::spawn(move || observer(engine.execute_plan(&collection, &plan)));
        }
    }
}

fn project(collection: &str, plan: &QueryPlan, id: &str, fields: &Map<String, Value>) -> Row {
    match plan.projection {
        Projection::IdOnly => Row { id: Some(id.to_string()), columns: Map::new() },
        Projection::All => Row { id: None, columns: columns(collection, fields) },
        Projection::AllWithId => {
            Row { id: Some(id.to_string()), columns: columns(collection, fields) }
        }
    }
}

fn columns(collection: &str, fields: &Map<String, Value>) -> Map<String, Value> {
    let mut columns = Map::new();
    columns.insert(collection.to_string(), Value::Object(fields.clone()));
    columns
}

impl StorageEngine for MemoryEngine {
    fn save_document(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> StoreResult<()> {
        {
            let mut collections = self.inner.collections.write();
            collections.entry(collection.to_string()).or_default().insert(id.to_string(), fields);
        }
        self.notify(&HashSet::from([collection.to_string()]));
        Ok(())
    }

    fn get_document(&self, collection: &str, id: &str) -> StoreResult<Option<Map<String, Value>>> {
        let collections = self.inner.collections.read();
        Ok(collections.get(collection).and_then(|documents| documents.get(id)).cloned())
    }

    fn purge_document(&self, collection: &str, id: &str) -> StoreResult<()> {
        let removed = {
            let mut collections = self.inner.collections.write();
            collections
                .get_mut(collection)
                .and_then(|documents| documents.remove(id))
                .is_some()
        };
        if removed {
            self.notify(&HashSet::from([collection.to_string()]));
        }
        Ok(())
    }

    fn execute(&self, collection: &str, plan: &QueryPlan) -> StoreResult<Vec<Row>> {
        self.execute_plan(collection, plan)
    }

    fn apply_batch(&self, ops: Vec<BatchOp>) -> StoreResult<()> {
        let mut touched = HashSet::new();
        {
            // Both maps stay locked for the whole batch so readers never see
            // a partially applied state.
            let mut collections = self.inner.collections.write();
            let mut blobs = self.inner.blobs.write();
            for op in ops {
                match op {
                    BatchOp::SaveDocument { collection, id, fields } => {
                        collections.entry(collection.clone()).or_default().insert(id, fields);
                        touched.insert(collection);
                    }
                    BatchOp::PurgeDocument { collection, id } => {
                        if let Some(documents) = collections.get_mut(&collection) {
                            if documents.remove(&id).is_some() {
                                touched.insert(collection);
                            }
                        }
                    }
                    BatchOp::SaveBlob { id, bytes } => {
                        blobs.insert(id, bytes);
                    }
                    BatchOp::PurgeBlob { id } => {
                        blobs.remove(&id);
                    }
                }
            }
        }
        self.notify(&touched);
        Ok(())
    }

    fn register_listener(
        &self,
        collection: &str,
        plan: QueryPlan,
        observer: RowObserver,
    ) -> StoreResult<ListenerToken> {
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let listener = Listener { collection: collection.to_string(), plan, observer };
        self.inner.listeners.lock().insert(token, listener);
        Ok(ListenerToken(token))
    }

    fn remove_listener(&self, token: ListenerToken) -> StoreResult<()> {
        self.inner.listeners.lock().remove(&token.0);
        Ok(())
    }

    fn create_index(&self, _collection: &str, _field: &str) -> StoreResult<()> {
        // Lookups scan the collection; value indexes carry no information
        // this engine can use.
        Ok(())
    }

    fn create_fulltext_index(
        &self,
        collection: &str,
        name: &str,
        fields: &[String],
    ) -> StoreResult<()> {
        let index = FulltextIndex { collection: collection.to_string(), fields: fields.to_vec() };
        self.inner.fulltext.write().insert(name.to_string(), index);
        Ok(())
    }

    fn save_blob(&self, id: &str, bytes: Vec<u8>) -> StoreResult<()> {
        self.inner.blobs.write().insert(id.to_string(), bytes);
        Ok(())
    }

    fn get_blob(&self, id: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.inner.blobs.read().get(id).cloned())
    }

    fn delete_blob(&self, id: &str) -> StoreResult<()> {
        self.inner.blobs.write().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shelf_core::engine::TextMatch;
    use shelf_core::query::{asc, field};

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn plan(filter: Option<shelf_core::query::Expr>) -> QueryPlan {
        QueryPlan {
            projection: Projection::AllWithId,
            filter,
            text: None,
            sort: Vec::new(),
            limit: None,
            skip: None,
        }
    }

    #[test]
    fn save_and_execute_round_trip() {
        let engine = MemoryEngine::new();
        engine.save_document("users", "u1", fields(json!({ "name": "Alice" }))).unwrap();
        engine.save_document("users", "u2", fields(json!({ "name": "Bob" }))).unwrap();

        let rows = engine.execute("users", &plan(Some(field("name").eq("Alice")))).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id.as_deref(), Some("u1"));
        assert_eq!(rows[0].columns["users"]["name"], json!("Alice"));
    }

    #[test]
    fn sort_limit_and_skip_window_results() {
        let engine = MemoryEngine::new();
        for (id, age) in [("a", 10), ("b", 20), ("c", 30), ("d", 40)] {
            engine.save_document("users", id, fields(json!({ "age": age }))).unwrap();
        }
        let mut plan = plan(None);
        plan.sort = vec![asc("age")];
        plan.limit = Some(2);
        plan.skip = Some(1);

        let rows = engine.execute("users", &plan).unwrap();
        let ages: Vec<_> =
            rows.iter().map(|row| row.columns["users"]["age"].as_i64().unwrap()).collect();
        assert_eq!(ages, vec![20, 30]);
    }

    #[test]
    fn batches_apply_in_order() {
        let engine = MemoryEngine::new();
        engine
            .apply_batch(vec![
                BatchOp::SaveDocument {
                    collection: "users".into(),
                    id: "u1".into(),
                    fields: fields(json!({ "name": "Alice" })),
                },
                BatchOp::PurgeDocument { collection: "users".into(), id: "u1".into() },
                BatchOp::SaveDocument {
                    collection: "users".into(),
                    id: "u1".into(),
                    fields: fields(json!({ "name": "Amelie" })),
                },
            ])
            .unwrap();

        let rows = engine.execute("users", &plan(None)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].columns["users"]["name"], json!("Amelie"));
    }

    #[test]
    fn purging_an_absent_document_is_not_an_error() {
        let engine = MemoryEngine::new();
        engine.purge_document("users", "missing").unwrap();
    }

    #[test]
    fn text_queries_require_their_index() {
        let engine = MemoryEngine::new();
        engine.save_document("notes", "n1", fields(json!({ "body": "buy milk" }))).unwrap();

        let mut search = plan(None);
        search.text = Some(TextMatch { index: "notes-fts".into(), text: "milk".into() });
        assert!(matches!(engine.execute("notes", &search), Err(StoreError::Query(_))));

        engine.create_fulltext_index("notes", "notes-fts", &["body".to_string()]).unwrap();
        let rows = engine.execute("notes", &search).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn blobs_store_and_delete() {
        let engine = MemoryEngine::new();
        engine.save_blob("b1", vec![1, 2, 3]).unwrap();
        assert_eq!(engine.get_blob("b1").unwrap(), Some(vec![1, 2, 3]));
        engine.delete_blob("b1").unwrap();
        assert_eq!(engine.get_blob("b1").unwrap(), None);
        engine.delete_blob("b1").unwrap();
    }
}
