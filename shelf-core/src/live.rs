//! Live query subscriptions.
//!
//! A [`LiveQuery`] couples an engine change listener with a typed decode
//! relay. Subscribing delivers the current result set once, synchronously,
//! then redelivers the full set after every mutation that may have changed
//! it. Dropping the handle cancels the subscription.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine::{ListenerToken, QueryPlan, StorageEngine};
use crate::entity::Entity;
use crate::error::StoreResult;
use crate::store::decode_rows;

/// Handle to an active live query.
///
/// The subscription stays active until [`LiveQuery::cancel`] is called or the
/// handle is dropped. Cancellation is idempotent.
#[derive(Debug)]
pub struct LiveQuery<E: StorageEngine> {
    engine: Arc<E>,
    token: ListenerToken,
    cancelled: Arc<AtomicBool>,
}

impl<E: StorageEngine> LiveQuery<E> {
    /// Registers a listener for the plan and delivers the initial snapshot.
    ///
    /// An error while executing the initial snapshot deregisters the
    /// listener and fails the subscription.
    pub(crate) fn subscribe<T: Entity>(
        engine: Arc<E>,
        collection: String,
        plan: QueryPlan,
        observer: impl Fn(StoreResult<Vec<T>>) + Send + Sync + 'static,
    ) -> StoreResult<Self> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let relay = {
            let engine = engine.clone();
            let collection = collection.clone();
            let cancelled = cancelled.clone();
            Arc::new(move |outcome: StoreResult<Vec<crate::engine::Row>>| {
                if cancelled.load(Ordering::SeqCst) {
                    return;
                }
                observer(outcome.map(|rows| decode_rows(&collection, rows, engine.as_ref())));
            })
        };
        let token = engine.register_listener(&collection, plan.clone(), relay.clone())?;
        match engine.execute(&collection, &plan) {
            Ok(rows) => relay(Ok(rows)),
            Err(err) => {
                let _ = engine.remove_listener(token);
                return Err(err);
            }
        }
        Ok(Self { engine, token, cancelled })
    }

    /// Cancels the subscription. No further deliveries occur afterwards.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            if let Err(err) = self.engine.remove_listener(self.token) {
                tracing::warn!(%err, "failed to deregister live query listener");
            }
        }
    }
}

impl<E: StorageEngine> Drop for LiveQuery<E> {
    fn drop(&mut self) {
        self.cancel();
    }
}
