//! Connection pooling.
//!
//! The pool keeps one bounded FIFO of idle sessions per server address.
//! Acquire hands out an idle session, creates a new one while under
//! capacity, or blocks until a release frees something. Release
//! validates the session with a `RESET` round trip and either re-enqueues
//! or disposes it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::bolt::address::BoltServerAddress;
use crate::bolt::connection::{Connection, SocketConnection};
use crate::bolt::error::{BoltError, BoltResult};
use crate::bolt::guard::ConcurrencyGuardingConnection;
use crate::bolt::packstream::ValueMap;
use crate::bolt::response::Collector;
use crate::bolt::USER_AGENT;

/// Pool behavior knobs.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Maximum live sessions per address, in hand and idle combined.
    pub max_sessions: usize,
    /// Idle age beyond which a released connection gets its timestamp
    /// refreshed by the validation `RESET`.
    pub idle_time_before_connection_test: Duration,
    /// How long an acquire may block waiting for capacity.
    pub acquire_timeout: Duration,
    /// Bound on the TCP connect.
    pub connection_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_sessions: 50,
            idle_time_before_connection_test: Duration::from_millis(200),
            acquire_timeout: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolSettings {
    /// Start building settings from the defaults.
    pub fn builder() -> PoolSettingsBuilder {
        PoolSettingsBuilder {
            settings: Self::default(),
        }
    }
}

/// Builder for [`PoolSettings`].
#[derive(Debug, Clone)]
pub struct PoolSettingsBuilder {
    settings: PoolSettings,
}

impl PoolSettingsBuilder {
    /// Maximum live sessions per address.
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.settings.max_sessions = max;
        self
    }

    /// Idle age that triggers a timestamp refresh on validation.
    pub fn idle_time_before_connection_test(mut self, idle: Duration) -> Self {
        self.settings.idle_time_before_connection_test = idle;
        self
    }

    /// Acquire wait bound.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.settings.acquire_timeout = timeout;
        self
    }

    /// TCP connect bound.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connection_timeout = timeout;
        self
    }

    /// Finish building.
    pub fn build(self) -> PoolSettings {
        self.settings
    }
}

/// Factory producing connected, initialized sessions.
pub trait Connector: Send + Sync {
    /// Connect to `address`, run the handshake and `INIT`, and return
    /// the live session.
    fn connect(&self, address: &BoltServerAddress) -> BoltResult<Box<dyn Connection>>;
}

/// Production [`Connector`]: TCP connect, handshake, concurrency guard,
/// `INIT` with the crate user agent.
pub struct SocketConnector {
    client_name: String,
    auth_token: ValueMap,
    connection_timeout: Duration,
}

impl SocketConnector {
    /// Create a connector sending `auth_token` on `INIT`.
    pub fn new(auth_token: ValueMap, settings: &PoolSettings) -> Self {
        Self {
            client_name: USER_AGENT.to_string(),
            auth_token,
            connection_timeout: settings.connection_timeout,
        }
    }

    /// Override the client name sent on `INIT`.
    pub fn with_client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }
}

impl Connector for SocketConnector {
    fn connect(&self, address: &BoltServerAddress) -> BoltResult<Box<dyn Connection>> {
        let session = SocketConnection::connect(address.clone(), self.connection_timeout)?;
        let guarded = ConcurrencyGuardingConnection::new(session);
        guarded.init(&self.client_name, self.auth_token.clone())?;
        Ok(Box::new(guarded))
    }
}

/// A session checked out of the pool.
///
/// Operations delegate to the underlying session; any error passing
/// through is inspected so the pool can tell a poisoned connection from
/// a recoverable one. Dropping the handle (or calling
/// [`PooledConnection::close`]) releases it back to its pool, which
/// validates and either re-enqueues or disposes it.
pub struct PooledConnection {
    delegate: Option<Box<dyn Connection>>,
    address: BoltServerAddress,
    pool: Weak<ConnectionPool>,
    last_used: Mutex<Instant>,
    unrecoverable: AtomicBool,
    on_error: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("address", &self.address)
            .field("unrecoverable", &self.unrecoverable.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    fn new(
        delegate: Box<dyn Connection>,
        address: BoltServerAddress,
        pool: Weak<ConnectionPool>,
        last_used: Instant,
    ) -> Self {
        Self {
            delegate: Some(delegate),
            address,
            pool,
            last_used: Mutex::new(last_used),
            unrecoverable: AtomicBool::new(false),
            on_error: Mutex::new(None),
        }
    }

    fn delegate(&self) -> BoltResult<&dyn Connection> {
        self.delegate
            .as_deref()
            .ok_or_else(|| BoltError::Usage("the connection has been released".to_string()))
    }

    /// On a delegate error: anything fatal for the connection (transport
    /// or codec failures, unrecoverable server failures) poisons it so
    /// the pool disposes it on release; anything else gets an
    /// `ACK_FAILURE` queued (unless muted by an outstanding interrupt)
    /// so the session can continue.
    fn on_delegate_error(&self, error: BoltError) -> BoltError {
        if error.is_fatal_for_connection() {
            self.unrecoverable.store(true, Ordering::SeqCst);
        } else if let Ok(delegate) = self.delegate() {
            if !delegate.is_ack_failure_muted() {
                if let Err(secondary) = delegate.ack_failure() {
                    warn!(error = %secondary, "failed to queue ACK_FAILURE after error");
                }
            }
        }
        if let Some(callback) = self.on_error.lock().as_ref() {
            callback();
        }
        error
    }

    fn intercept<T>(&self, result: BoltResult<T>) -> BoltResult<T> {
        result.map_err(|e| self.on_delegate_error(e))
    }

    /// Send `INIT` and block for its response.
    pub fn init(&self, client_name: &str, auth_token: ValueMap) -> BoltResult<()> {
        let result = self.delegate()?.init(client_name, auth_token);
        self.intercept(result)
    }

    /// Queue a `RUN` with its collector.
    pub fn run(
        &self,
        statement: &str,
        parameters: ValueMap,
        collector: Box<dyn Collector>,
    ) -> BoltResult<()> {
        let result = self.delegate()?.run(statement, parameters, collector);
        self.intercept(result)
    }

    /// Queue a `DISCARD_ALL` with its collector.
    pub fn discard_all(&self, collector: Box<dyn Collector>) -> BoltResult<()> {
        let result = self.delegate()?.discard_all(collector);
        self.intercept(result)
    }

    /// Queue a `PULL_ALL` with its collector.
    pub fn pull_all(&self, collector: Box<dyn Collector>) -> BoltResult<()> {
        let result = self.delegate()?.pull_all(collector);
        self.intercept(result)
    }

    /// Queue a `RESET`.
    pub fn reset(&self) -> BoltResult<()> {
        let result = self.delegate()?.reset();
        self.intercept(result)
    }

    /// Queue an `ACK_FAILURE`.
    pub fn ack_failure(&self) -> BoltResult<()> {
        let result = self.delegate()?.ack_failure();
        self.intercept(result)
    }

    /// Interrupt the session out-of-band.
    pub fn reset_async(&self) -> BoltResult<()> {
        let result = self.delegate()?.reset_async();
        self.intercept(result)
    }

    /// Flush and drain all pending responses.
    pub fn sync(&self) -> BoltResult<()> {
        let result = self.delegate()?.sync();
        self.intercept(result)
    }

    /// Write queued messages.
    pub fn flush(&self) -> BoltResult<()> {
        let result = self.delegate()?.flush();
        self.intercept(result)
    }

    /// Receive one message.
    pub fn receive_one(&self) -> BoltResult<()> {
        let result = self.delegate()?.receive_one();
        self.intercept(result)
    }

    /// Whether the underlying channel is open.
    pub fn is_open(&self) -> bool {
        self.delegate.as_deref().is_some_and(Connection::is_open)
    }

    /// Whether failures are currently auto-acknowledged.
    pub fn is_ack_failure_muted(&self) -> bool {
        self.delegate
            .as_deref()
            .is_some_and(Connection::is_ack_failure_muted)
    }

    /// Server identification captured at `INIT`.
    pub fn server(&self) -> Option<String> {
        self.delegate.as_deref().and_then(Connection::server)
    }

    /// The remote address.
    pub fn address(&self) -> &BoltServerAddress {
        &self.address
    }

    /// Register a callback invoked whenever a delegated operation fails.
    pub fn on_error(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.on_error.lock() = Some(Box::new(callback));
    }

    /// Whether an unrecoverable failure has poisoned this connection.
    pub fn has_unrecoverable_errors(&self) -> bool {
        self.unrecoverable.load(Ordering::SeqCst)
    }

    /// Time since this connection was last used.
    pub fn idle_time(&self) -> Duration {
        self.last_used.lock().elapsed()
    }

    /// Refresh the last-used timestamp.
    pub fn update_timestamp(&self) {
        *self.last_used.lock() = Instant::now();
    }

    /// Release the connection back to its pool. The pool decides whether
    /// it is re-enqueued or disposed; the underlying session is not
    /// closed here.
    pub fn close(self) {
        drop(self);
    }

    /// Close the underlying session for good, bypassing the pool.
    pub fn dispose(mut self) -> BoltResult<()> {
        if let Some(pool) = self.pool.upgrade() {
            pool.discard(&mut self);
            Ok(())
        } else if let Some(delegate) = self.delegate.take() {
            delegate.close()
        } else {
            Ok(())
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.delegate.is_none() {
            return;
        }
        match self.pool.upgrade() {
            Some(pool) => pool.release(self),
            None => {
                if let Some(delegate) = self.delegate.take() {
                    if let Err(error) = delegate.close() {
                        warn!(%error, "failed to close orphaned connection");
                    }
                }
            }
        }
    }
}

struct IdleConnection {
    delegate: Box<dyn Connection>,
    last_used: Instant,
}

#[derive(Default)]
struct AddressPool {
    idle: VecDeque<IdleConnection>,
    live: usize,
}

struct PoolState {
    addresses: HashMap<BoltServerAddress, AddressPool>,
    terminated: bool,
}

/// Bounded, validating pool of live sessions, one queue per address.
///
/// Invariants: a connection is either in a caller's hand or in the idle
/// queue, never both; live connections per address never exceed
/// `max_sessions`; a closed pool disposes everything it is given.
pub struct ConnectionPool {
    connector: Box<dyn Connector>,
    settings: PoolSettings,
    state: Mutex<PoolState>,
    capacity_freed: Condvar,
}

impl ConnectionPool {
    /// Create a pool drawing new sessions from `connector`.
    pub fn new(connector: Box<dyn Connector>, settings: PoolSettings) -> Arc<Self> {
        Arc::new(Self {
            connector,
            settings,
            state: Mutex::new(PoolState {
                addresses: HashMap::new(),
                terminated: false,
            }),
            capacity_freed: Condvar::new(),
        })
    }

    /// Check a connection out for `address`.
    ///
    /// Reuses an idle connection when one is queued, creates a new one
    /// while under capacity, otherwise blocks up to the acquire timeout
    /// and then fails with [`BoltError::PoolFull`].
    pub fn acquire(self: &Arc<Self>, address: &BoltServerAddress) -> BoltResult<PooledConnection> {
        let deadline = Instant::now() + self.settings.acquire_timeout;
        let mut timed_out = false;
        let mut state = self.state.lock();
        loop {
            if state.terminated {
                return Err(BoltError::Usage(
                    "the connection pool has been closed".to_string(),
                ));
            }

            let entry = state.addresses.entry(address.clone()).or_default();
            if let Some(idle) = entry.idle.pop_front() {
                return Ok(PooledConnection::new(
                    idle.delegate,
                    address.clone(),
                    Arc::downgrade(self),
                    idle.last_used,
                ));
            }

            if entry.live < self.settings.max_sessions {
                entry.live += 1;
                drop(state);
                return match self.connector.connect(address) {
                    Ok(delegate) => Ok(PooledConnection::new(
                        delegate,
                        address.clone(),
                        Arc::downgrade(self),
                        Instant::now(),
                    )),
                    Err(error) => {
                        let mut state = self.state.lock();
                        if let Some(entry) = state.addresses.get_mut(address) {
                            entry.live = entry.live.saturating_sub(1);
                        }
                        drop(state);
                        self.capacity_freed.notify_one();
                        Err(error)
                    }
                };
            }

            if timed_out {
                return Err(BoltError::PoolFull {
                    address: address.clone(),
                    max_sessions: self.settings.max_sessions,
                });
            }
            timed_out = self
                .capacity_freed
                .wait_until(&mut state, deadline)
                .timed_out();
        }
    }

    /// Take a connection back. Unrecoverable, unvalidatable and orphaned
    /// connections are disposed; the rest re-enter the idle queue.
    fn release(&self, conn: &mut PooledConnection) {
        let Some(delegate) = conn.delegate.take() else {
            return;
        };
        let address = conn.address.clone();

        if conn.unrecoverable.load(Ordering::SeqCst) {
            self.dispose(&address, delegate);
            return;
        }

        {
            let state = self.state.lock();
            if state.terminated || !state.addresses.contains_key(&address) {
                drop(state);
                self.dispose(&address, delegate);
                return;
            }
        }

        // Validate with a RESET round trip before anyone else can get
        // this connection. Runs outside the pool lock: it blocks on IO.
        if delegate.reset().and_then(|()| delegate.sync()).is_err() {
            self.dispose(&address, delegate);
            return;
        }
        let last_used =
            if conn.idle_time() > self.settings.idle_time_before_connection_test {
                Instant::now()
            } else {
                *conn.last_used.lock()
            };

        let mut state = self.state.lock();
        if state.terminated {
            drop(state);
            self.dispose(&address, delegate);
            return;
        }
        match state.addresses.get_mut(&address) {
            Some(entry) if entry.idle.len() < self.settings.max_sessions => {
                entry.idle.push_back(IdleConnection {
                    delegate,
                    last_used,
                });
                drop(state);
                self.capacity_freed.notify_one();
            }
            _ => {
                drop(state);
                self.dispose(&address, delegate);
            }
        }
    }

    /// Dispose a connection handed back through
    /// [`PooledConnection::dispose`].
    fn discard(&self, conn: &mut PooledConnection) {
        if let Some(delegate) = conn.delegate.take() {
            let address = conn.address.clone();
            self.dispose(&address, delegate);
        }
    }

    fn dispose(&self, address: &BoltServerAddress, delegate: Box<dyn Connection>) {
        if let Err(error) = delegate.close() {
            warn!(%error, "failed to close disposed connection");
        }
        let mut state = self.state.lock();
        if let Some(entry) = state.addresses.get_mut(address) {
            entry.live = entry.live.saturating_sub(1);
        }
        drop(state);
        self.capacity_freed.notify_one();
    }

    /// Drop an address: its idle connections are disposed now, and any
    /// connection of that address still in a caller's hand is disposed
    /// on release.
    pub fn purge(&self, address: &BoltServerAddress) {
        let drained = {
            let mut state = self.state.lock();
            match state.addresses.remove(address) {
                Some(entry) => entry.idle,
                None => return,
            }
        };
        for idle in drained {
            if let Err(error) = idle.delegate.close() {
                warn!(%error, "failed to close purged connection");
            }
        }
        self.capacity_freed.notify_all();
    }

    /// Shut the pool down: mark it terminated and dispose every idle
    /// connection. Later acquires fail and later releases dispose.
    pub fn close(&self) {
        let drained: Vec<IdleConnection> = {
            let mut state = self.state.lock();
            state.terminated = true;
            state
                .addresses
                .values_mut()
                .flat_map(|entry| entry.idle.drain(..))
                .collect()
        };
        for idle in drained {
            if let Err(error) = idle.delegate.close() {
                warn!(%error, "failed to close pooled connection on shutdown");
            }
        }
        self.capacity_freed.notify_all();
    }

    /// Live connections (in hand plus idle) for an address.
    pub fn live_count(&self, address: &BoltServerAddress) -> usize {
        self.state
            .lock()
            .addresses
            .get(address)
            .map_or(0, |entry| entry.live)
    }

    /// Idle connections queued for an address.
    pub fn idle_count(&self, address: &BoltServerAddress) -> usize {
        self.state
            .lock()
            .addresses
            .get(address)
            .map_or(0, |entry| entry.idle.len())
    }
}
