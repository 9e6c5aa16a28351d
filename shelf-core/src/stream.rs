//! Stream-based adapter over [`Database`].
//!
//! One-shot operations become single-item streams that yield the operation's
//! result and complete. Live queries become [`LiveStream`]s that yield the
//! full result set on every change and stay open until cancelled or dropped.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use futures::channel::mpsc::{self, UnboundedReceiver};
use futures::stream;

use crate::engine::StorageEngine;
use crate::entity::Entity;
use crate::error::StoreResult;
use crate::live::LiveQuery;
use crate::query::{Expr, QueryOption, QuerySpec};
use crate::store::Database;
use crate::task::dispatch;

/// Stream-returning view of a [`Database`].
#[derive(Debug, Clone)]
pub struct StreamDatabase<E: StorageEngine> {
    db: Database<E>,
}

impl<E: StorageEngine> Database<E> {
    /// Returns a stream-based adapter sharing this database's engine.
    pub fn streams(&self) -> StreamDatabase<E> {
        StreamDatabase { db: self.clone() }
    }
}

impl<E: StorageEngine> StreamDatabase<E> {
    fn one_shot<R, F>(&self, job: F) -> impl Stream<Item = StoreResult<R>> + use<R, F, E>
    where
        R: Send + 'static,
        F: FnOnce(Database<E>) -> StoreResult<R> + Send + 'static,
    {
        let db = self.db.clone();
        stream::once(async move { dispatch(move || job(db)).await })
    }

    /// Yields the result of storing the element, then completes.
    pub fn insert<T: Entity>(&self, element: T) -> impl Stream<Item = StoreResult<()>> + use<T, E> {
        self.one_shot(move |db| db.insert(&element))
    }

    /// Yields the result of upserting the element, then completes.
    pub fn upsert<T: Entity>(&self, element: T) -> impl Stream<Item = StoreResult<()>> + use<T, E> {
        self.one_shot(move |db| db.upsert(&element))
    }

    /// Yields every element of the type once, then completes.
    pub fn get<T: Entity>(&self) -> impl Stream<Item = StoreResult<Vec<T>>> + use<T, E> {
        self.one_shot(|db| db.get())
    }

    /// Yields the elements matching the filter once, then completes.
    pub fn get_where<T: Entity>(&self, filter: Expr) -> impl Stream<Item = StoreResult<Vec<T>>> + use<T, E> {
        self.one_shot(move |db| db.get_where(filter))
    }

    /// Yields the elements selected by the options once, then completes.
    pub fn get_with<T: Entity>(
        &self,
        options: Vec<QueryOption>,
    ) -> impl Stream<Item = StoreResult<Vec<T>>> + use<T, E> {
        self.one_shot(move |db| db.get_with(options))
    }

    /// Yields the result of removing every element of the type.
    pub fn delete_all<T: Entity>(&self) -> impl Stream<Item = StoreResult<()>> + use<T, E> {
        self.one_shot(|db| db.delete_all::<T>())
    }

    /// Observes every element of the type as a long-lived stream.
    pub fn live<T: Entity>(&self) -> StoreResult<LiveStream<T, E>> {
        self.live_spec(&QuerySpec::new())
    }

    /// Observes the elements matching a filter as a long-lived stream.
    pub fn live_where<T: Entity>(&self, filter: Expr) -> StoreResult<LiveStream<T, E>> {
        self.live_spec(&QuerySpec { filter: Some(filter), ..QuerySpec::default() })
    }

    /// Observes the elements matching a spec as a long-lived stream.
    ///
    /// The stream yields the current result set immediately, then again after
    /// every relevant mutation. Update cycles that fail yield `Err` items;
    /// the stream itself stays open until cancelled or dropped.
    pub fn live_spec<T: Entity>(&self, spec: &QuerySpec) -> StoreResult<LiveStream<T, E>> {
        let (tx, rx) = mpsc::unbounded();
        let handle = self.db.live_results(spec, move |outcome: StoreResult<Vec<T>>| {
            let _ = tx.unbounded_send(outcome);
        })?;
        Ok(LiveStream { rx, handle })
    }
}

/// A long-lived stream of full result sets from a live query.
///
/// Dropping the stream cancels the underlying subscription.
#[derive(Debug)]
pub struct LiveStream<T, E: StorageEngine> {
    rx: UnboundedReceiver<StoreResult<Vec<T>>>,
    handle: LiveQuery<E>,
}

impl<T, E: StorageEngine> LiveStream<T, E> {
    /// Cancels the subscription; the stream completes after any already
    /// queued items are drained.
    pub fn cancel(&self) {
        self.handle.cancel();
    }
}

impl<T, E: StorageEngine> Stream for LiveStream<T, E> {
    type Item = StoreResult<Vec<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().rx).poll_next(cx)
    }
}
