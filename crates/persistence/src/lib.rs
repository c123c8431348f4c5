//! Checkpoint storage and the Persistency feature for weft.

pub mod feature;
pub mod file;
pub mod in_memory;
pub mod noop;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use feature::{Persistency, PersistencyConfig};
pub use file::FileStorage;
pub use in_memory::InMemoryStorage;
pub use noop::NoopStorage;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
