//! A typed, embedded document-storage layer with live queries.
//!
//! This crate is the core of the shelf project and provides:
//!
//! - **Entity mapping** ([`entity`]) - The trait and codec turning typed values into stored documents
//! - **Storage engine abstraction** ([`engine`]) - The blocking contract a physical store implements
//! - **Query and filtering API** ([`query`]) - Type-safe query construction and filtering
//! - **Typed database facade** ([`store`]) - The synchronous, thread-safe operation surface
//! - **Live queries** ([`live`]) - Continuously re-delivered result sets with cancellation handles
//! - **Concurrency adapters** ([`task`], [`stream`], [`callback`]) - Futures, streams and callbacks over the same core
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use serde::{Deserialize, Serialize};
//! use shelf_core::entity::Entity;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub id: String,
//!     pub name: String,
//! }
//!
//! impl Entity for User {
//!     const TYPE_NAME: &'static str = "User";
//!
//!     fn primary_key(&self) -> Option<String> {
//!         Some(self.id.clone())
//!     }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as shelf_core;

pub mod callback;
pub mod engine;
pub mod entity;
pub mod error;
pub mod live;
pub mod query;
pub mod store;
pub mod stream;
pub mod task;

pub use entity::Entity;
