//! Future-based adapter over [`Database`].
//!
//! [`TaskDatabase`] mirrors the blocking surface as `async` methods. Each
//! call runs the blocking operation on a worker thread and resolves through
//! a oneshot channel, so the adapter works under any executor. None of the
//! semantics change; ordering guarantees are those of the blocking core.

use futures::channel::oneshot;

use crate::engine::StorageEngine;
use crate::entity::Entity;
use crate::error::{StoreError, StoreResult};
use crate::live::LiveQuery;
use crate::query::{Expr, QueryOption, QuerySpec};
use crate::store::Database;

/// Asynchronous, future-returning view of a [`Database`].
#[derive(Debug, Clone)]
pub struct TaskDatabase<E: StorageEngine> {
    db: Database<E>,
}

impl<E: StorageEngine> Database<E> {
    /// Returns a future-based adapter sharing this database's engine.
    pub fn tasks(&self) -> TaskDatabase<E> {
        TaskDatabase { db: self.clone() }
    }
}

/// Runs a blocking job on a worker thread and resolves with its result.
pub(crate) async fn dispatch<R, F>(job: F) -> StoreResult<R>
where
    R: Send + 'static,
    F: FnOnce() -> StoreResult<R> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let _ = tx.send(job());
    });
    match rx.await {
        Ok(result) => result,
        Err(oneshot::Canceled) => {
            Err(StoreError::Engine("worker thread exited before completing".to_string()))
        }
    }
}

impl<E: StorageEngine> TaskDatabase<E> {
    /// Stores an element as a new document.
    pub async fn insert<T: Entity>(&self, element: T) -> StoreResult<()> {
        let db = self.db.clone();
        dispatch(move || db.insert(&element)).await
    }

    /// Stores several elements in one atomic batch.
    pub async fn insert_many<T: Entity>(&self, elements: Vec<T>) -> StoreResult<()> {
        let db = self.db.clone();
        dispatch(move || db.insert_many(&elements)).await
    }

    /// Inserts or fully replaces by primary key.
    pub async fn upsert<T: Entity>(&self, element: T) -> StoreResult<()> {
        let db = self.db.clone();
        dispatch(move || db.upsert(&element)).await
    }

    /// Inserts or merges over the stored document by primary key.
    pub async fn upsert_merge<T: Entity>(&self, element: T) -> StoreResult<()> {
        let db = self.db.clone();
        dispatch(move || db.upsert_merge(&element)).await
    }

    /// Upserts several elements in one atomic batch.
    pub async fn upsert_many<T: Entity>(&self, elements: Vec<T>) -> StoreResult<()> {
        let db = self.db.clone();
        dispatch(move || db.upsert_many(&elements)).await
    }

    /// Fetches every element of the type.
    pub async fn get<T: Entity>(&self) -> StoreResult<Vec<T>> {
        let db = self.db.clone();
        dispatch(move || db.get()).await
    }

    /// Fetches the elements matching a filter expression.
    pub async fn get_where<T: Entity>(&self, filter: Expr) -> StoreResult<Vec<T>> {
        let db = self.db.clone();
        dispatch(move || db.get_where(filter)).await
    }

    /// Fetches elements using a list of [`QueryOption`]s.
    pub async fn get_with<T: Entity>(&self, options: Vec<QueryOption>) -> StoreResult<Vec<T>> {
        let db = self.db.clone();
        dispatch(move || db.get_with(options)).await
    }

    /// Fetches elements matching a full [`QuerySpec`].
    pub async fn get_spec<T: Entity>(&self, spec: QuerySpec) -> StoreResult<Vec<T>> {
        let db = self.db.clone();
        dispatch(move || db.get_spec(&spec)).await
    }

    /// Removes every element of the type.
    pub async fn delete_all<T: Entity>(&self) -> StoreResult<()> {
        let db = self.db.clone();
        dispatch(move || db.delete_all::<T>()).await
    }

    /// Removes the elements matching a filter expression.
    pub async fn delete_where<T: Entity>(&self, filter: Expr) -> StoreResult<()> {
        let db = self.db.clone();
        dispatch(move || db.delete_where::<T>(filter)).await
    }

    /// Removes the stored document for a primary-keyed element.
    pub async fn delete<T: Entity>(&self, element: T) -> StoreResult<()> {
        let db = self.db.clone();
        dispatch(move || db.delete(&element)).await
    }

    /// Atomically replaces the type's contents with the given elements.
    pub async fn delete_all_and_insert<T: Entity>(&self, elements: Vec<T>) -> StoreResult<()> {
        let db = self.db.clone();
        dispatch(move || db.delete_all_and_insert(&elements)).await
    }

    /// Finds elements through the type's full-text index.
    pub async fn search<T: Entity>(&self, text: String) -> StoreResult<Vec<T>> {
        let db = self.db.clone();
        dispatch(move || db.search(&text)).await
    }

    /// Stores raw bytes under an identifier.
    pub async fn save_blob(&self, bytes: Vec<u8>, id: String) -> StoreResult<()> {
        let db = self.db.clone();
        dispatch(move || db.save_blob(bytes, &id)).await
    }

    /// Fetches raw bytes stored under an identifier.
    pub async fn get_blob(&self, id: String) -> StoreResult<Option<Vec<u8>>> {
        let db = self.db.clone();
        dispatch(move || db.get_blob(&id)).await
    }

    /// Removes the bytes stored under an identifier.
    pub async fn delete_blob(&self, id: String) -> StoreResult<()> {
        let db = self.db.clone();
        dispatch(move || db.delete_blob(&id)).await
    }

    /// Observes every element of the type. See [`Database::live`].
    pub fn live<T: Entity>(
        &self,
        observer: impl Fn(Vec<T>) + Send + Sync + 'static,
    ) -> StoreResult<LiveQuery<E>> {
        self.db.live(observer)
    }
}
