//! # quarry
//!
//! A synchronous database access layer for MySQL, PostgreSQL and SQLite.
//!
//! ## Features
//!
//! - **Query builder**: fluent `&mut self` builder compiled to SQL plus ordered bindings
//! - **Active record**: models with dirty tracking, mass-assignment guards, timestamps,
//!   soft deletes and lifecycle hooks
//! - **Relations**: has-one, has-many, belongs-to and belongs-to-many with eager loading,
//!   `with_count` and `where_has` existence filters
//! - **Schema builder**: table blueprints compiled per dialect
//! - **Migrations**: batched runs, rollback, reset, refresh and status
//!
//! quarry does not manage connections: hand it anything implementing [`Connection`].
//! With the default `sqlite` feature a [`SqliteConnection`] adapter is included.
//!
//! ```ignore
//! use quarry::{Query, SqliteConnection, values};
//!
//! let conn = SqliteConnection::open_in_memory()?;
//! Query::table("users").insert(&conn, values! { "name" => "Ada" })?;
//!
//! let mut q = Query::table("users");
//! q.where_eq("name", "Ada");
//! let user = q.first(&conn)?;
//! ```
//!
//! Every statement is emitted as a `tracing` event on the `quarry.sql` target.

pub mod config;
pub mod connection;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod ident;
pub mod migrate;
pub mod model;
pub mod query;
pub mod row;
pub mod schema;
pub mod transaction;
pub mod value;

#[cfg(test)]
mod testing;

pub use config::{DatabaseConfig, MigrationConfig};
pub use connection::Connection;
pub use dialect::Dialect;
pub use error::{OrmError, OrmResult};
pub use migrate::{DatabaseMigrationRepository, Migration, Migrator, SqlFileMigration};
pub use model::{Model, ModelQuery, Record, Relation, Relationship};
pub use query::{Compiled, Grammar, Paginator, Query, Values};
pub use row::{FromRow, Row, RowExt};
pub use schema::{Blueprint, Schema};
pub use transaction::transaction;
pub use value::{FromValue, Value};

#[cfg(feature = "sqlite")]
pub use driver::SqliteConnection;
