//! Database connectivity and error handling for run history persistence.

pub mod connection;
pub mod error;

pub use connection::{DatabaseConnection, DatabasePool, PoolStatistics};
pub use error::{DatabaseError, DbResult};
