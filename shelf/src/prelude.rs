//! Convenient re-exports of commonly used types from shelf.
//!
//! Import this prelude module to quickly access the most frequently used
//! types and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use shelf::prelude::*;
//! ```

pub use shelf_core::{
    callback::CallbackDatabase,
    engine::StorageEngine,
    entity::Entity,
    error::{StoreError, StoreResult},
    live::LiveQuery,
    query::{
        Expr, Field, FieldOp, QueryBuilder, QueryOption, QuerySpec, SortDirection, SortTerm, asc,
        desc, field,
    },
    store::{Database, DatabaseConfig, Namespacing},
    stream::{LiveStream, StreamDatabase},
    task::TaskDatabase,
};
pub use shelf_macros::Entity;
