// src/repositories/postgres/mod.rs

use crate::Error;

pub mod messages;

pub use messages::PostgresMessageStore;

/// Connection-level failures are transient; everything else is a real database error.
pub(crate) fn store_err(e: sqlx::Error) -> Error {
    match e {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => Error::StoreUnavailable(e.to_string()),
        other => Error::Database(other),
    }
}
