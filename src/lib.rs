//! # graphbolt-driver
//!
//! Synchronous client core for the Bolt/1 graph database protocol.
//!
//! The crate covers the three layers every Bolt client is built from:
//!
//! - **PackStream codec** - the self-describing binary serialization
//!   format (integers, floats, strings, bytes, lists, insertion-ordered
//!   maps and tagged structures)
//! - **Chunked framing and protocol session** - 16-bit length-prefixed
//!   chunks around PackStream messages, the version handshake, and a
//!   pipelined request/response state machine with in-band failure and
//!   `RESET` semantics
//! - **Connection pool** - a per-address, size-bounded, idle-validated
//!   pool of live sessions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graphbolt_driver::{
//!     BoltServerAddress, ConnectionPool, PoolSettings, SocketConnector, Value, ValueMap,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut auth = ValueMap::new();
//!     auth.insert("scheme".to_string(), Value::from("basic"));
//!     auth.insert("principal".to_string(), Value::from("user"));
//!     auth.insert("credentials".to_string(), Value::from("secret"));
//!
//!     let settings = PoolSettings::default();
//!     let connector = SocketConnector::new(auth, &settings);
//!     let pool = ConnectionPool::new(Box::new(connector), settings);
//!
//!     let address = BoltServerAddress::new("localhost", 7687);
//!     let conn = pool.acquire(&address).map_err(|e| e.into_public())?;
//!     println!("connected to {:?}", conn.server());
//!
//!     conn.close(); // back to the pool
//!     pool.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`bolt`] - wire protocol: codec, framing, handshake, session
//! - [`driver`] - pooling and the public error surface
//!
//! ## Scope
//!
//! This is the protocol core: one direct server address, blocking IO,
//! thread safety at the pool layer. Query/session/transaction APIs,
//! cluster routing and URI handling belong to layers above; TLS plugs in
//! behind [`bolt::channel::ByteChannel`].

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bolt;
pub mod driver;

pub use bolt::{
    BoltError, BoltResult, BoltServerAddress, Collector, ConcurrencyGuardingConnection,
    Connection, ConnectionError, HandshakeError, Message, PackStreamError, ServerFailure,
    SocketClient, SocketConnection, Structure, Value, ValueMap, USER_AGENT,
};

pub use driver::{
    ConnectionPool, Connector, DriverError, DriverResult, PoolSettings, PoolSettingsBuilder,
    PooledConnection, SocketConnector,
};
