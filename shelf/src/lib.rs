//! Main shelf crate providing an embedded, typed document store.
//!
//! This crate is the primary entry point for users of the shelf project. It
//! re-exports the core modules, the `#[derive(Entity)]` macro and the
//! in-memory storage engine.
//!
//! # Features
//!
//! - **Typed storage** - Define your data with Serde, store it as documents
//! - **Composable queries** - Filters, sorting and windowing built fluently or from option lists
//! - **Live queries** - Observe a query and receive the full result set after every change
//! - **Concurrency adapters** - The same blocking core surfaced as futures, streams or callbacks
//! - **Blobs and full-text search** - Binary attachments and token-based text matching
//!
//! # Quick start
//!
//! ```ignore
//! use serde::{Deserialize, Serialize};
//! use shelf::memory::MemoryEngine;
//! use shelf::prelude::*;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Entity)]
//! pub struct User {
//!     #[entity(primary_key)]
//!     pub id: String,
//!     pub name: String,
//!     pub age: u32,
//! }
//!
//! fn main() -> StoreResult<()> {
//!     let db = Database::new(MemoryEngine::new())?;
//!
//!     db.insert(&User { id: "u1".into(), name: "Alice".into(), age: 34 })?;
//!
//!     let adults: Vec<User> = db.get_using(|q| {
//!         q.filter(field("age").gte(18)).sort("name", SortDirection::Asc)
//!     })?;
//!     println!("{adults:?}");
//!
//!     // Observe changes until the handle is dropped.
//!     let live = db.live(|users: Vec<User>| println!("now {} users", users.len()))?;
//!     db.insert(&User { id: "u2".into(), name: "Bob".into(), age: 40 })?;
//!     live.cancel();
//!     Ok(())
//! }
//! ```

pub use shelf_core::{callback, engine, entity, error, live, query, store, stream, task};

pub use shelf_core::entity::Entity;
pub use shelf_macros::Entity;

pub mod memory {
    //! The in-memory storage engine.
    pub use shelf_memory::MemoryEngine;
}

pub mod prelude;
