//! Storage engine abstraction.
//!
//! A [`StorageEngine`] is the minimal blocking surface a physical store must
//! provide: document and blob CRUD, compiled-plan execution, atomic batches,
//! change listeners and index creation. Everything typed lives above this
//! trait in [`crate::store::Database`]; everything physical lives below it.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::StoreResult;
use crate::query::{Expr, SortTerm};

/// Which columns a compiled query asks the engine to produce per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// All document fields, no identifier.
    All,
    /// All document fields plus the document identifier.
    AllWithId,
    /// Only the document identifier.
    IdOnly,
}

/// A full-text match clause attached to a compiled query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    /// Name of the full-text index to match against.
    pub index: String,
    /// The search text; every whitespace-separated token must match.
    pub text: String,
}

/// A fully compiled query, ready for an engine to execute.
///
/// Plans are produced by the typed layer from a [`crate::query::QuerySpec`]:
/// namespacing is already resolved into the target collection, the type
/// discriminator is already folded into the filter where required, and a
/// skip without a limit has already been dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// Columns to produce per matching document.
    pub projection: Projection,
    /// Filter predicate; `None` matches every document in the collection.
    pub filter: Option<Expr>,
    /// Optional full-text match clause, ANDed with the filter.
    pub text: Option<TextMatch>,
    /// Sort terms applied in order.
    pub sort: Vec<SortTerm>,
    /// Maximum number of rows to return.
    pub limit: Option<usize>,
    /// Number of leading rows to discard before applying the limit.
    pub skip: Option<usize>,
}

/// One result row from an executed plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// The document identifier, when the projection selected it.
    pub id: Option<String>,
    /// Projected columns, keyed by collection name.
    pub columns: Map<String, Value>,
}

/// A single write inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    /// Insert or replace a document.
    SaveDocument {
        /// Target collection.
        collection: String,
        /// Document identifier.
        id: String,
        /// The full field map to store.
        fields: Map<String, Value>,
    },
    /// Remove a document. Removing an absent document is not an error.
    PurgeDocument {
        /// Target collection.
        collection: String,
        /// Document identifier.
        id: String,
    },
    /// Insert or replace a binary attachment.
    SaveBlob {
        /// Blob identifier.
        id: String,
        /// Raw bytes.
        bytes: Vec<u8>,
    },
    /// Remove a binary attachment. Removing an absent blob is not an error.
    PurgeBlob {
        /// Blob identifier.
        id: String,
    },
}

/// Opaque handle identifying a registered change listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(pub u64);

/// Callback invoked with the full result set each time a listened query's
/// results may have changed, or with the error that kept a cycle from
/// producing them.
pub type RowObserver = Arc<dyn Fn(StoreResult<Vec<Row>>) + Send + Sync>;

/// The blocking contract a physical store implements.
///
/// All methods take `&self`; implementations are internally synchronized and
/// safe to share across threads behind an `Arc`.
pub trait StorageEngine: Send + Sync + fmt::Debug + 'static {
    /// Inserts or replaces a document.
    fn save_document(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> StoreResult<()>;

    /// Fetches a document's field map by identifier.
    fn get_document(&self, collection: &str, id: &str) -> StoreResult<Option<Map<String, Value>>>;

    /// Removes a document. Absent documents are ignored.
    fn purge_document(&self, collection: &str, id: &str) -> StoreResult<()>;

    /// Executes a compiled plan against a collection.
    fn execute(&self, collection: &str, plan: &QueryPlan) -> StoreResult<Vec<Row>>;

    /// Applies a sequence of writes atomically, in order.
    ///
    /// Either every operation takes effect or none does, and concurrent
    /// readers never observe a partially applied batch.
    fn apply_batch(&self, ops: Vec<BatchOp>) -> StoreResult<()>;

    /// Registers a change listener for a plan over a collection.
    ///
    /// After any mutation that touches the collection the engine re-executes
    /// the plan and invokes the observer with the full result set. Delivery
    /// happens on a background thread and may overlap with later deliveries.
    fn register_listener(
        &self,
        collection: &str,
        plan: QueryPlan,
        observer: RowObserver,
    ) -> StoreResult<ListenerToken>;

    /// Removes a previously registered listener. Unknown tokens are ignored.
    fn remove_listener(&self, token: ListenerToken) -> StoreResult<()>;

    /// Creates a value index over a field. Creating it again is a no-op.
    fn create_index(&self, collection: &str, field: &str) -> StoreResult<()>;

    /// Creates or replaces a named full-text index over the given fields.
    fn create_fulltext_index(
        &self,
        collection: &str,
        name: &str,
        fields: &[String],
    ) -> StoreResult<()>;

    /// Inserts or replaces a binary attachment.
    fn save_blob(&self, id: &str, bytes: Vec<u8>) -> StoreResult<()>;

    /// Fetches a binary attachment by identifier.
    fn get_blob(&self, id: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Removes a binary attachment. Absent blobs are ignored.
    fn delete_blob(&self, id: &str) -> StoreResult<()>;
}
