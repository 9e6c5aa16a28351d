//! Callback-based adapter over [`Database`].
//!
//! Each operation runs on a worker thread and reports through a one-shot
//! completion closure. Useful from contexts that have neither an async
//! executor nor a thread to block.

use crate::engine::StorageEngine;
use crate::entity::Entity;
use crate::error::StoreResult;
use crate::query::{Expr, QueryOption};
use crate::store::Database;

/// Completion-callback view of a [`Database`].
#[derive(Debug, Clone)]
pub struct CallbackDatabase<E: StorageEngine> {
    db: Database<E>,
}

impl<E: StorageEngine> Database<E> {
    /// Returns a callback-based adapter sharing this database's engine.
    pub fn callbacks(&self) -> CallbackDatabase<E> {
        CallbackDatabase { db: self.clone() }
    }
}

impl<E: StorageEngine> CallbackDatabase<E> {
    fn run<R, F, C>(&self, job: F, completion: C)
    where
        R: Send + 'static,
        F: FnOnce(Database<E>) -> StoreResult<R> + Send + 'static,
        C: FnOnce(StoreResult<R>) + Send + 'static,
    {
        let db = self.db.clone();
        std::thread::spawn(move || completion(job(db)));
    }

    /// Stores an element, reporting the outcome to `completion`.
    pub fn insert<T: Entity>(
        &self,
        element: T,
        completion: impl FnOnce(StoreResult<()>) + Send + 'static,
    ) {
        self.run(move |db| db.insert(&element), completion);
    }

    /// Stores several elements atomically, reporting the outcome.
    pub fn insert_many<T: Entity>(
        &self,
        elements: Vec<T>,
        completion: impl FnOnce(StoreResult<()>) + Send + 'static,
    ) {
        self.run(move |db| db.insert_many(&elements), completion);
    }

    /// Inserts or fully replaces by primary key, reporting the outcome.
    pub fn upsert<T: Entity>(
        &self,
        element: T,
        completion: impl FnOnce(StoreResult<()>) + Send + 'static,
    ) {
        self.run(move |db| db.upsert(&element), completion);
    }

    /// Fetches every element of the type, delivering them to `completion`.
    pub fn get<T: Entity>(
        &self,
        completion: impl FnOnce(StoreResult<Vec<T>>) + Send + 'static,
    ) {
        self.run(|db| db.get(), completion);
    }

    /// Fetches the elements matching a filter, delivering them to
    /// `completion`.
    pub fn get_where<T: Entity>(
        &self,
        filter: Expr,
        completion: impl FnOnce(StoreResult<Vec<T>>) + Send + 'static,
    ) {
        self.run(move |db| db.get_where(filter), completion);
    }

    /// Fetches elements selected by the options, delivering them to
    /// `completion`.
    pub fn get_with<T: Entity>(
        &self,
        options: Vec<QueryOption>,
        completion: impl FnOnce(StoreResult<Vec<T>>) + Send + 'static,
    ) {
        self.run(move |db| db.get_with(options), completion);
    }

    /// Removes every element of the type, reporting the outcome.
    pub fn delete_all<T: Entity>(
        &self,
        completion: impl FnOnce(StoreResult<()>) + Send + 'static,
    ) {
        self.run(|db| db.delete_all::<T>(), completion);
    }

    /// Removes the elements matching a filter, reporting the outcome.
    pub fn delete_where<T: Entity>(
        &self,
        filter: Expr,
        completion: impl FnOnce(StoreResult<()>) + Send + 'static,
    ) {
        self.run(move |db| db.delete_where::<T>(filter), completion);
    }

    /// Finds elements through the type's full-text index, delivering them to
    /// `completion`.
    pub fn search<T: Entity>(
        &self,
        text: String,
        completion: impl FnOnce(StoreResult<Vec<T>>) + Send + 'static,
    ) {
        self.run(move |db| db.search(&text), completion);
    }

    /// Stores raw bytes under an identifier, reporting the outcome.
    pub fn save_blob(
        &self,
        bytes: Vec<u8>,
        id: String,
        completion: impl FnOnce(StoreResult<()>) + Send + 'static,
    ) {
        self.run(move |db| db.save_blob(bytes, &id), completion);
    }

    /// Fetches raw bytes stored under an identifier, delivering them to
    /// `completion`.
    pub fn get_blob(
        &self,
        id: String,
        completion: impl FnOnce(StoreResult<Option<Vec<u8>>>) + Send + 'static,
    ) {
        self.run(move |db| db.get_blob(&id), completion);
    }
}
