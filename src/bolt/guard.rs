//! Concurrent-misuse detection.
//!
//! Sessions are not thread-safe, and the contract is to tell the caller
//! so rather than quietly serialize them. The guard flips an atomic
//! in-use flag around every operation; a second thread (or a reentrant
//! call) entering while the flag is set gets an error.

use std::sync::atomic::{AtomicBool, Ordering};

use super::address::BoltServerAddress;
use super::connection::Connection;
use super::error::{BoltError, BoltResult};
use super::packstream::ValueMap;
use super::response::Collector;

const CONCURRENT_USE: &str =
    "You are using a session from multiple locations at the same time, which is not \
     supported. If you want to use multiple threads, you should ensure that each session \
     is used by only one thread at a time. One way to do that is to give each thread its \
     own dedicated session.";

/// Wraps a [`Connection`], raising a usage error on concurrent entry.
///
/// `reset_async` is deliberately not guarded: it is the out-of-band
/// interrupt, meant to be called from another thread while an operation
/// is in flight.
pub struct ConcurrencyGuardingConnection<C: Connection> {
    delegate: C,
    in_use: AtomicBool,
}

impl<C: Connection> ConcurrencyGuardingConnection<C> {
    /// Wrap `delegate`.
    pub fn new(delegate: C) -> Self {
        Self {
            delegate,
            in_use: AtomicBool::new(false),
        }
    }

    /// The wrapped connection.
    pub fn get_ref(&self) -> &C {
        &self.delegate
    }

    fn guarded<T>(&self, op: impl FnOnce(&C) -> BoltResult<T>) -> BoltResult<T> {
        if self
            .in_use
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BoltError::Usage(CONCURRENT_USE.to_string()));
        }
        let result = op(&self.delegate);
        self.in_use.store(false, Ordering::SeqCst);
        result
    }
}

impl<C: Connection> Connection for ConcurrencyGuardingConnection<C> {
    fn init(&self, client_name: &str, auth_token: ValueMap) -> BoltResult<()> {
        self.guarded(|c| c.init(client_name, auth_token))
    }

    fn run(
        &self,
        statement: &str,
        parameters: ValueMap,
        collector: Box<dyn Collector>,
    ) -> BoltResult<()> {
        self.guarded(|c| c.run(statement, parameters, collector))
    }

    fn discard_all(&self, collector: Box<dyn Collector>) -> BoltResult<()> {
        self.guarded(|c| c.discard_all(collector))
    }

    fn pull_all(&self, collector: Box<dyn Collector>) -> BoltResult<()> {
        self.guarded(|c| c.pull_all(collector))
    }

    fn reset(&self) -> BoltResult<()> {
        self.guarded(Connection::reset)
    }

    fn ack_failure(&self) -> BoltResult<()> {
        self.guarded(Connection::ack_failure)
    }

    fn reset_async(&self) -> BoltResult<()> {
        self.delegate.reset_async()
    }

    fn sync(&self) -> BoltResult<()> {
        self.guarded(Connection::sync)
    }

    fn flush(&self) -> BoltResult<()> {
        self.guarded(Connection::flush)
    }

    fn receive_one(&self) -> BoltResult<()> {
        self.guarded(Connection::receive_one)
    }

    fn close(&self) -> BoltResult<()> {
        self.guarded(Connection::close)
    }

    fn is_open(&self) -> bool {
        self.delegate.is_open()
    }

    fn is_ack_failure_muted(&self) -> bool {
        self.delegate.is_ack_failure_muted()
    }

    fn server(&self) -> Option<String> {
        self.delegate.server()
    }

    fn address(&self) -> BoltServerAddress {
        self.delegate.address()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::*;
    use crate::bolt::test_support::MockConnection;

    #[test]
    fn test_sequential_use_passes_through() {
        let mock = MockConnection::new();
        let guard = ConcurrencyGuardingConnection::new(mock.clone());

        guard.reset().unwrap();
        guard.sync().unwrap();
        guard.flush().unwrap();
        assert_eq!(mock.calls(), ["reset", "sync", "flush"]);
    }

    #[test]
    fn test_concurrent_use_is_detected() {
        let mock = MockConnection::new();
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        {
            let entered = entered.clone();
            let release = release.clone();
            mock.set_hook(move |op| {
                if op == "sync" {
                    entered.wait();
                    release.wait();
                }
                Ok(())
            });
        }

        let guard = Arc::new(ConcurrencyGuardingConnection::new(mock.clone()));
        let inside = {
            let guard = guard.clone();
            thread::spawn(move || guard.sync())
        };

        // Wait until the first thread is inside the delegate, then try to
        // enter from here.
        entered.wait();
        let err = guard.reset().unwrap_err();
        match err {
            BoltError::Usage(message) => {
                assert!(message.contains("multiple locations at the same time"));
            }
            other => panic!("expected usage error, got {other:?}"),
        }

        release.wait();
        inside.join().unwrap().unwrap();

        // The flag was restored; the session is usable again.
        guard.reset().unwrap();
        assert_eq!(mock.calls(), ["sync", "reset"]);
    }

    #[test]
    fn test_flag_restored_after_delegate_error() {
        let mock = MockConnection::new();
        mock.set_hook(|op| {
            if op == "flush" {
                Err(BoltError::Usage("boom".to_string()))
            } else {
                Ok(())
            }
        });
        let guard = ConcurrencyGuardingConnection::new(mock.clone());

        assert!(guard.flush().is_err());
        // A failed operation must not leave the guard engaged.
        guard.reset().unwrap();
    }

    #[test]
    fn test_reset_async_bypasses_guard() {
        let mock = MockConnection::new();
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        {
            let entered = entered.clone();
            let release = release.clone();
            mock.set_hook(move |op| {
                if op == "sync" {
                    entered.wait();
                    release.wait();
                }
                Ok(())
            });
        }

        let guard = Arc::new(ConcurrencyGuardingConnection::new(mock.clone()));
        let inside = {
            let guard = guard.clone();
            thread::spawn(move || guard.sync())
        };

        entered.wait();
        // The out-of-band interrupt goes through even mid-operation.
        guard.reset_async().unwrap();
        release.wait();
        inside.join().unwrap().unwrap();

        assert_eq!(mock.calls(), ["sync", "reset_async"]);
    }
}
