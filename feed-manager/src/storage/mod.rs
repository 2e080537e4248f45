//! Embedded SQLite persistence.
//!
//! Entities are plain structs wired to tables through the [`entity!`]
//! macro; [`EntityStore`] provides the generic insert/upsert/query/remove
//! surface and [`DbStorage`] owns the pool plus the concrete stores.

pub mod condition;
pub mod db;
pub mod entity;
pub mod records;
pub mod store;
pub mod value;

pub use condition::Condition;
pub use db::DbStorage;
pub use entity::{Entity, StorageError};
pub use records::{InstrumentRecord, TradeRecord};
pub use store::EntityStore;
pub use value::SqlValue;
