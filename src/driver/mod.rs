//! User-facing driver surface: pooling, settings and public errors.
//!
//! Higher layers (sessions, transactions, result cursors) are built on
//! top of [`pool::ConnectionPool`] and the collector API from
//! [`crate::bolt`].

pub mod error;
pub mod pool;

pub use error::{DriverError, DriverResult};
pub use pool::{
    ConnectionPool, Connector, PoolSettings, PoolSettingsBuilder, PooledConnection,
    SocketConnector,
};
