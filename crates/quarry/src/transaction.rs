//! Transaction helper.
//!
//! ```ignore
//! quarry::transaction(&conn, |conn| {
//!     Query::table("accounts").where_eq("id", 1).decrement(conn, "balance", 100)?;
//!     Query::table("accounts").where_eq("id", 2).increment(conn, "balance", 100)?;
//!     Ok(())
//! })?;
//! ```

use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};

/// Runs `body` inside a database transaction.
///
/// - Begins a transaction via [`Connection::begin_transaction`].
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)` and returns the original error.
pub fn transaction<T, F>(conn: &dyn Connection, body: F) -> OrmResult<T>
where
    F: FnOnce(&dyn Connection) -> OrmResult<T>,
{
    tracing::trace!(target: "quarry.sql", "BEGIN");
    conn.begin_transaction()?;
    match body(conn) {
        Ok(value) => {
            tracing::trace!(target: "quarry.sql", "COMMIT");
            conn.commit()?;
            Ok(value)
        }
        Err(error) => {
            tracing::trace!(target: "quarry.sql", "ROLLBACK");
            match conn.rollback() {
                Ok(()) => Err(error),
                Err(rollback_err) => Err(OrmError::Other(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            }
        }
    }
}
