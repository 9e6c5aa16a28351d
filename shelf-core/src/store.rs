//! The typed, synchronous database facade.
//!
//! [`Database`] wraps a [`StorageEngine`] and a [`DatabaseConfig`] and exposes
//! the full typed surface: inserts, upserts, typed reads, deletions, atomic
//! replace operations, full-text search, indexes, attachments and live
//! queries. All methods block; the concurrency adapters in
//! [`crate::task`], [`crate::stream`] and [`crate::callback`] wrap this type
//! without adding semantics.
//!
//! # Namespacing
//!
//! With [`Namespacing::Isolated`] each entity type lives in its own
//! collection named after [`Entity::TYPE_NAME`]. With [`Namespacing::Shared`]
//! every type shares one default collection and queries are scoped by the
//! hidden type discriminator instead.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::engine::{BatchOp, Projection, QueryPlan, Row, StorageEngine, TextMatch};
use crate::entity::{self, BlobWrite, Entity, TYPE_FIELD};
use crate::error::{StoreError, StoreResult};
use crate::live::LiveQuery;
use crate::query::{Expr, QueryBuilder, QueryOption, QuerySpec, SortTerm, field};

/// How entity types map onto engine collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespacing {
    /// One collection per entity type, named after the type.
    Isolated,
    /// All types share a single default collection, distinguished by the
    /// hidden type discriminator field.
    Shared,
}

/// Configuration for opening a [`Database`].
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Logical database name; part of the shared collection's name.
    pub name: String,
    /// Collection layout strategy.
    pub namespacing: Namespacing,
}

impl DatabaseConfig {
    /// Creates a config with isolated per-type collections.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), namespacing: Namespacing::Isolated }
    }

    /// Creates a config where all types share one default collection.
    pub fn shared(name: impl Into<String>) -> Self {
        Self { name: name.into(), namespacing: Namespacing::Shared }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new("shelf")
    }
}

/// A typed, thread-safe handle over a storage engine.
///
/// Cloning is cheap and clones share the same underlying engine.
#[derive(Debug)]
pub struct Database<E: StorageEngine> {
    engine: Arc<E>,
    config: DatabaseConfig,
}

impl<E: StorageEngine> Clone for Database<E> {
    fn clone(&self) -> Self {
        Self { engine: self.engine.clone(), config: self.config.clone() }
    }
}

impl<E: StorageEngine> Database<E> {
    /// Opens a database over the given engine with the given configuration.
    ///
    /// In shared mode this eagerly indexes the type discriminator, since
    /// every query in that mode filters on it.
    pub fn open(config: DatabaseConfig, engine: E) -> StoreResult<Self> {
        let engine = Arc::new(engine);
        if config.namespacing == Namespacing::Shared {
            let collection = shared_collection(&config.name);
            engine
                .create_index(&collection, TYPE_FIELD)
                .map_err(|err| StoreError::Open(err.to_string()))?;
        }
        Ok(Self { engine, config })
    }

    /// Opens a database with the default configuration.
    pub fn new(engine: E) -> StoreResult<Self> {
        Self::open(DatabaseConfig::default(), engine)
    }

    /// The database configuration this handle was opened with.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Direct access to the underlying engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn collection<T: Entity>(&self) -> String {
        match self.config.namespacing {
            Namespacing::Isolated => T::TYPE_NAME.to_string(),
            Namespacing::Shared => shared_collection(&self.config.name),
        }
    }

    /// Compiles a spec into an engine plan, folding in the namespacing rules.
    fn compile<T: Entity>(&self, spec: &QuerySpec, projection: Projection) -> QueryPlan {
        let mut filter = spec.filter.clone();
        if self.config.namespacing == Namespacing::Shared {
            let discriminator = field(TYPE_FIELD).eq(T::TYPE_NAME);
            filter = Some(match filter {
                Some(declared) => discriminator.and(declared),
                None => discriminator,
            });
        }
        // A skip is only meaningful as part of a result window.
        let limit = spec.limit;
        let skip = if limit.is_some() { spec.skip } else { None };
        QueryPlan { projection, filter, text: None, sort: spec.sort.clone(), limit, skip }
    }

    fn run_query<T: Entity>(&self, plan: QueryPlan) -> StoreResult<Vec<T>> {
        let collection = self.collection::<T>();
        let rows = self.engine.execute(&collection, &plan)?;
        Ok(decode_rows(&collection, rows, self.engine.as_ref()))
    }

    /// Fetches every element of the given type.
    pub fn get<T: Entity>(&self) -> StoreResult<Vec<T>> {
        self.get_spec(&QuerySpec::new())
    }

    /// Fetches the elements matching a filter expression.
    pub fn get_where<T: Entity>(&self, filter: Expr) -> StoreResult<Vec<T>> {
        self.get_spec(&QuerySpec { filter: Some(filter), ..QuerySpec::default() })
    }

    /// Fetches the elements matching a filter, sorted.
    pub fn get_sorted<T: Entity>(
        &self,
        filter: Expr,
        sort: impl IntoIterator<Item = SortTerm>,
    ) -> StoreResult<Vec<T>> {
        let spec = QuerySpec {
            filter: Some(filter),
            sort: sort.into_iter().collect(),
            ..QuerySpec::default()
        };
        self.get_spec(&spec)
    }

    /// Fetches elements using a list of [`QueryOption`]s.
    pub fn get_with<T: Entity>(
        &self,
        options: impl IntoIterator<Item = QueryOption>,
    ) -> StoreResult<Vec<T>> {
        self.get_spec(&QuerySpec::from_options(options))
    }

    /// Fetches elements using a builder closure.
    ///
    /// ```ignore
    /// let adults: Vec<User> = db.get_using(|q| q.filter(field("age").gte(18)).limit(20))?;
    /// ```
    pub fn get_using<T: Entity>(
        &self,
        build: impl FnOnce(QueryBuilder) -> QueryBuilder,
    ) -> StoreResult<Vec<T>> {
        self.get_spec(&build(QuerySpec::builder()).build())
    }

    /// Fetches elements matching a full [`QuerySpec`].
    pub fn get_spec<T: Entity>(&self, spec: &QuerySpec) -> StoreResult<Vec<T>> {
        self.run_query(self.compile::<T>(spec, Projection::All))
    }

    /// Stores an element as a new document.
    ///
    /// Primary-keyed types use their deterministic identifier, so inserting
    /// an element whose key already exists replaces the stored document.
    /// Non-keyed types always get a fresh random identifier.
    pub fn insert<T: Entity>(&self, element: &T) -> StoreResult<()> {
        self.engine.apply_batch(self.insert_ops(element)?)
    }

    /// Stores several elements in one atomic batch.
    pub fn insert_many<T: Entity>(&self, elements: &[T]) -> StoreResult<()> {
        let mut ops = Vec::new();
        for element in elements {
            ops.extend(self.insert_ops(element)?);
        }
        self.engine.apply_batch(ops)
    }

    /// Inserts the element, or fully replaces the stored document with the
    /// same primary key. Non-keyed types fall back to a plain insert.
    pub fn upsert<T: Entity>(&self, element: &T) -> StoreResult<()> {
        self.engine.apply_batch(self.upsert_ops(element, false)?)
    }

    /// Inserts the element, or merges it over the stored document with the
    /// same primary key. Fields absent from the new encoding keep their
    /// previously stored values.
    pub fn upsert_merge<T: Entity>(&self, element: &T) -> StoreResult<()> {
        self.engine.apply_batch(self.upsert_ops(element, true)?)
    }

    /// Upserts several elements in one atomic batch.
    pub fn upsert_many<T: Entity>(&self, elements: &[T]) -> StoreResult<()> {
        let mut ops = Vec::new();
        for element in elements {
            ops.extend(self.upsert_ops(element, false)?);
        }
        self.engine.apply_batch(ops)
    }

    /// Merge-upserts several elements in one atomic batch.
    pub fn upsert_many_merge<T: Entity>(&self, elements: &[T]) -> StoreResult<()> {
        let mut ops = Vec::new();
        for element in elements {
            ops.extend(self.upsert_ops(element, true)?);
        }
        self.engine.apply_batch(ops)
    }

    fn insert_ops<T: Entity>(&self, element: &T) -> StoreResult<Vec<BatchOp>> {
        let id = entity::document_id(element).unwrap_or_else(|| Uuid::new_v4().to_string());
        self.save_ops(element, id)
    }

    fn upsert_ops<T: Entity>(&self, element: &T, merge: bool) -> StoreResult<Vec<BatchOp>> {
        let Some(id) = entity::document_id(element) else {
            return self.insert_ops(element);
        };
        if !merge {
            return self.save_ops(element, id);
        }
        let collection = self.collection::<T>();
        let (mut fields, blobs) = entity::encode(element, &id)?;
        if let Some(existing) = self.engine.get_document(&collection, &id)? {
            for (key, value) in existing {
                fields.entry(key).or_insert(value);
            }
        }
        let mut ops = stale_blob_purges::<T>(&id, &blobs);
        ops.extend(
            blobs.into_iter().map(|blob| BatchOp::SaveBlob { id: blob.id, bytes: blob.bytes }),
        );
        ops.push(BatchOp::SaveDocument { collection, id, fields });
        Ok(ops)
    }

    fn save_ops<T: Entity>(&self, element: &T, id: String) -> StoreResult<Vec<BatchOp>> {
        let (fields, blobs) = entity::encode(element, &id)?;
        let mut ops = stale_blob_purges::<T>(&id, &blobs);
        ops.extend(
            blobs.into_iter().map(|blob| BatchOp::SaveBlob { id: blob.id, bytes: blob.bytes }),
        );
        ops.push(BatchOp::SaveDocument { collection: self.collection::<T>(), id, fields });
        Ok(ops)
    }

    /// Removes every element of the given type.
    pub fn delete_all<T: Entity>(&self) -> StoreResult<()> {
        self.engine.apply_batch(self.purge_ops::<T>(None)?)
    }

    /// Removes the elements matching a filter expression.
    pub fn delete_where<T: Entity>(&self, filter: Expr) -> StoreResult<()> {
        self.engine.apply_batch(self.purge_ops::<T>(Some(filter))?)
    }

    /// Removes the stored document for a primary-keyed element.
    ///
    /// The stored document is only purged when its type discriminator matches
    /// `T`, so a colliding document of another type is left alone. Fails with
    /// [`StoreError::MissingPrimaryKey`] for non-keyed types.
    pub fn delete<T: Entity>(&self, element: &T) -> StoreResult<()> {
        self.engine.apply_batch(self.delete_element_ops(element)?)
    }

    /// Removes the stored documents for several primary-keyed elements in one
    /// atomic batch.
    pub fn delete_many<T: Entity>(&self, elements: &[T]) -> StoreResult<()> {
        let mut ops = Vec::new();
        for element in elements {
            ops.extend(self.delete_element_ops(element)?);
        }
        self.engine.apply_batch(ops)
    }

    fn delete_element_ops<T: Entity>(&self, element: &T) -> StoreResult<Vec<BatchOp>> {
        let id = entity::document_id(element)
            .ok_or(StoreError::MissingPrimaryKey(T::TYPE_NAME))?;
        let collection = self.collection::<T>();
        let stored = self.engine.get_document(&collection, &id)?;
        let matches = stored
            .as_ref()
            .and_then(|fields| fields.get(TYPE_FIELD))
            .and_then(Value::as_str)
            == Some(T::TYPE_NAME);
        if matches {
            Ok(purge_document_ops::<T>(&collection, id))
        } else {
            Ok(Vec::new())
        }
    }

    /// Collects purge operations for the documents matching a filter, without
    /// applying them.
    fn purge_ops<T: Entity>(&self, filter: Option<Expr>) -> StoreResult<Vec<BatchOp>> {
        let collection = self.collection::<T>();
        let spec = QuerySpec { filter, ..QuerySpec::default() };
        let plan = self.compile::<T>(&spec, Projection::IdOnly);
        let rows = self.engine.execute(&collection, &plan)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.id)
            .flat_map(|id| purge_document_ops::<T>(&collection, id))
            .collect())
    }

    /// Atomically removes every element of the type, then inserts the given
    /// elements. Observers of the collection never see the intermediate
    /// empty state.
    pub fn delete_all_and_insert<T: Entity>(&self, elements: &[T]) -> StoreResult<()> {
        let mut ops = self.purge_ops::<T>(None)?;
        for element in elements {
            ops.extend(self.insert_ops(element)?);
        }
        self.engine.apply_batch(ops)
    }

    /// Atomically removes every element of the type, then upserts the given
    /// elements.
    pub fn delete_all_and_upsert<T: Entity>(&self, elements: &[T]) -> StoreResult<()> {
        let mut ops = self.purge_ops::<T>(None)?;
        for element in elements {
            ops.extend(self.upsert_ops(element, false)?);
        }
        self.engine.apply_batch(ops)
    }

    /// Atomically removes the elements matching the filter, then inserts the
    /// given elements.
    pub fn delete_and_insert<T: Entity>(&self, filter: Expr, elements: &[T]) -> StoreResult<()> {
        let mut ops = self.purge_ops::<T>(Some(filter))?;
        for element in elements {
            ops.extend(self.insert_ops(element)?);
        }
        self.engine.apply_batch(ops)
    }

    /// Atomically removes the elements matching the filter, then upserts the
    /// given elements.
    pub fn delete_and_upsert<T: Entity>(&self, filter: Expr, elements: &[T]) -> StoreResult<()> {
        let mut ops = self.purge_ops::<T>(Some(filter))?;
        for element in elements {
            ops.extend(self.upsert_ops(element, false)?);
        }
        self.engine.apply_batch(ops)
    }

    /// Creates a full-text index over the given fields of the type.
    pub fn fulltext_index<T: Entity>(&self, fields: &[&str]) -> StoreResult<()> {
        let fields: Vec<String> = fields.iter().map(|name| (*name).to_string()).collect();
        self.engine
            .create_fulltext_index(&self.collection::<T>(), &fulltext_index_name::<T>(), &fields)
    }

    /// Finds elements matching the search text through the type's full-text
    /// index. Requires [`Database::fulltext_index`] to have been called.
    pub fn search<T: Entity>(&self, text: &str) -> StoreResult<Vec<T>> {
        self.search_spec(text, &QuerySpec::new())
    }

    /// Full-text search narrowed by additional [`QueryOption`]s.
    pub fn search_with<T: Entity>(
        &self,
        text: &str,
        options: impl IntoIterator<Item = QueryOption>,
    ) -> StoreResult<Vec<T>> {
        self.search_spec(text, &QuerySpec::from_options(options))
    }

    /// Full-text search narrowed by a full [`QuerySpec`].
    pub fn search_spec<T: Entity>(&self, text: &str, spec: &QuerySpec) -> StoreResult<Vec<T>> {
        let mut plan = self.compile::<T>(spec, Projection::All);
        plan.text =
            Some(TextMatch { index: fulltext_index_name::<T>(), text: text.to_string() });
        self.run_query(plan)
    }

    /// Creates a value index over a field of the type's collection.
    pub fn index<T: Entity>(&self, field: &str) -> StoreResult<()> {
        self.engine.create_index(&self.collection::<T>(), field)
    }

    /// Stores raw bytes under an identifier, outside any document.
    pub fn save_blob(&self, bytes: Vec<u8>, id: &str) -> StoreResult<()> {
        self.engine.save_blob(id, bytes)
    }

    /// Fetches raw bytes previously stored under an identifier.
    pub fn get_blob(&self, id: &str) -> StoreResult<Option<Vec<u8>>> {
        self.engine.get_blob(id)
    }

    /// Removes the bytes stored under an identifier, if any.
    pub fn delete_blob(&self, id: &str) -> StoreResult<()> {
        self.engine.delete_blob(id)
    }

    /// Observes every element of the type.
    ///
    /// The observer receives the full current result set immediately, then
    /// again after every mutation that may have changed it. The returned
    /// handle cancels the subscription when dropped.
    pub fn live<T: Entity>(
        &self,
        observer: impl Fn(Vec<T>) + Send + Sync + 'static,
    ) -> StoreResult<LiveQuery<E>> {
        self.live_spec(&QuerySpec::new(), observer)
    }

    /// Observes the elements matching a filter expression.
    pub fn live_where<T: Entity>(
        &self,
        filter: Expr,
        observer: impl Fn(Vec<T>) + Send + Sync + 'static,
    ) -> StoreResult<LiveQuery<E>> {
        self.live_spec(&QuerySpec { filter: Some(filter), ..QuerySpec::default() }, observer)
    }

    /// Observes elements using a list of [`QueryOption`]s.
    pub fn live_with<T: Entity>(
        &self,
        options: impl IntoIterator<Item = QueryOption>,
        observer: impl Fn(Vec<T>) + Send + Sync + 'static,
    ) -> StoreResult<LiveQuery<E>> {
        self.live_spec(&QuerySpec::from_options(options), observer)
    }

    /// Observes elements using a builder closure.
    pub fn live_using<T: Entity>(
        &self,
        build: impl FnOnce(QueryBuilder) -> QueryBuilder,
        observer: impl Fn(Vec<T>) + Send + Sync + 'static,
    ) -> StoreResult<LiveQuery<E>> {
        self.live_spec(&build(QuerySpec::builder()).build(), observer)
    }

    /// Observes elements matching a full [`QuerySpec`].
    ///
    /// Re-execution failures are logged and the delivery skipped; use
    /// [`Database::live_results`] to observe them instead.
    pub fn live_spec<T: Entity>(
        &self,
        spec: &QuerySpec,
        observer: impl Fn(Vec<T>) + Send + Sync + 'static,
    ) -> StoreResult<LiveQuery<E>> {
        self.live_results(spec, move |outcome: StoreResult<Vec<T>>| match outcome {
            Ok(elements) => observer(elements),
            Err(err) => {
                tracing::warn!(entity = T::TYPE_NAME, %err, "live query update failed, skipping delivery");
            }
        })
    }

    /// Observes elements matching a spec, including the errors that keep an
    /// update cycle from producing a result set.
    pub fn live_results<T: Entity>(
        &self,
        spec: &QuerySpec,
        observer: impl Fn(StoreResult<Vec<T>>) + Send + Sync + 'static,
    ) -> StoreResult<LiveQuery<E>> {
        let collection = self.collection::<T>();
        let plan = self.compile::<T>(spec, Projection::All);
        LiveQuery::subscribe(self.engine.clone(), collection, plan, observer)
    }

    /// Copies the type's documents out of the shared default collection into
    /// its isolated collection, optionally purging the originals.
    ///
    /// The copies and the purges apply in a single atomic batch, so observers
    /// never see the documents in both collections at once. Intended for
    /// databases previously opened in shared mode and reopened as isolated;
    /// it is a no-op when the shared collection holds no documents of the
    /// type.
    pub fn migrate_to_isolated<T: Entity>(&self, delete_after: bool) -> StoreResult<()> {
        let source = shared_collection(&self.config.name);
        let plan = QueryPlan {
            projection: Projection::AllWithId,
            filter: Some(field(TYPE_FIELD).eq(T::TYPE_NAME)),
            text: None,
            sort: Vec::new(),
            limit: None,
            skip: None,
        };
        let rows = self.engine.execute(&source, &plan)?;
        let ids: Vec<String> = rows.iter().filter_map(|row| row.id.clone()).collect();
        let elements: Vec<T> = decode_rows(&source, rows, self.engine.as_ref());
        let mut ops = Vec::new();
        if delete_after {
            for id in ids {
                ops.extend(purge_document_ops::<T>(&source, id));
            }
        }
        for element in &elements {
            ops.extend(self.insert_ops(element)?);
        }
        self.engine.apply_batch(ops)
    }
}

fn shared_collection(name: &str) -> String {
    format!("default-{name}")
}

/// Purge operations for one document plus the blobs stored under it.
///
/// Purging an absent blob is not an error, so this unconditionally covers
/// every declared blob field.
fn purge_document_ops<T: Entity>(collection: &str, id: String) -> Vec<BatchOp> {
    let mut ops: Vec<BatchOp> = T::BLOB_FIELDS
        .iter()
        .map(|name| BatchOp::PurgeBlob { id: format!("{id}/{name}") })
        .collect();
    ops.push(BatchOp::PurgeDocument { collection: collection.to_string(), id });
    ops
}

/// Purge operations for the declared blob fields a save did not write.
///
/// A blob field that encoded to null would otherwise leave the bytes of an
/// earlier save behind.
fn stale_blob_purges<T: Entity>(id: &str, written: &[BlobWrite]) -> Vec<BatchOp> {
    T::BLOB_FIELDS
        .iter()
        .filter_map(|name| {
            let blob_id = format!("{id}/{name}");
            (!written.iter().any(|blob| blob.id == blob_id))
                .then_some(BatchOp::PurgeBlob { id: blob_id })
        })
        .collect()
}

fn fulltext_index_name<T: Entity>() -> String {
    format!("{}-index", T::TYPE_NAME)
}

/// Decodes engine rows into typed elements, skipping rows that no longer
/// decode.
pub(crate) fn decode_rows<T, E>(collection: &str, rows: Vec<Row>, engine: &E) -> Vec<T>
where
    T: Entity,
    E: StorageEngine + ?Sized,
{
    rows.into_iter()
        .filter_map(|row| {
            let fields = row.columns.get(collection)?.as_object()?.clone();
            entity::decode(fields, engine)
        })
        .collect()
}
