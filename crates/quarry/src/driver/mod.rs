//! Built-in [`Connection`](crate::Connection) adapters.

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteConnection;
