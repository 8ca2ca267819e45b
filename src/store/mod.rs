//! Storage interfaces and the SQLite implementation

pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteStore;
pub use traits::*;
