//! In-memory storage engine for shelf.
//!
//! Provides [`MemoryEngine`], a thread-safe, non-persistent implementation of
//! the [`shelf_core::engine::StorageEngine`] contract. It supports the full
//! typed surface: filtered queries, sorting and windowing, atomic batches,
//! change listeners, full-text matching and blob storage.

mod engine;
mod evaluator;

pub use engine::MemoryEngine;
