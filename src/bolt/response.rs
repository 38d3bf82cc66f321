//! Response routing.
//!
//! Each queued request is paired with a [`Collector`]. Responses arrive in
//! send order, so the handler keeps the collectors in a FIFO: `SUCCESS`,
//! `FAILURE` and `IGNORED` terminate the head collector, `RECORD`s are
//! streamed to it in between.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::{BoltResult, ServerFailure};
use super::message::{signature, MessageHandler};
use super::packstream::{PackStreamError, Value, ValueMap};

/// Per-request callback object receiving the server's streamed response.
///
/// Every queued request sees exactly one terminal event (`on_success`,
/// `on_failure` or `on_ignored`), preceded by any number of `on_record`
/// calls, and then `on_complete`.
pub trait Collector: Send {
    /// Terminal: the request succeeded.
    fn on_success(&mut self, meta: ValueMap) {
        let _ = meta;
    }

    /// One result row for this request.
    fn on_record(&mut self, fields: Vec<Value>) {
        let _ = fields;
    }

    /// Terminal: the request failed on the server.
    fn on_failure(&mut self, code: &str, message: &str) {
        let _ = (code, message);
    }

    /// Terminal: the request was skipped because the server is in a
    /// failed state.
    fn on_ignored(&mut self) {}

    /// Called after whichever terminal event arrived.
    fn on_complete(&mut self) {}
}

/// Collector that discards everything. Used for `RESET` and
/// `ACK_FAILURE`, whose outcomes the session reads from the handler's
/// stored failure instead.
pub struct NoOpCollector;

impl Collector for NoOpCollector {}

/// Collector for `INIT`: captures the server identification string from
/// the success metadata.
pub struct InitCollector {
    server: Arc<Mutex<Option<String>>>,
}

impl InitCollector {
    /// Create a collector writing into the shared server-info slot.
    pub fn new(server: Arc<Mutex<Option<String>>>) -> Self {
        Self { server }
    }
}

impl Collector for InitCollector {
    fn on_success(&mut self, meta: ValueMap) {
        if let Some(name) = meta.get("server").and_then(Value::as_str) {
            *self.server.lock() = Some(name.to_string());
        }
    }
}

/// Collector for an out-of-band `RESET`: a successful response means the
/// interrupt is over, so both session flags clear.
pub struct ResetCollector {
    interrupted: Arc<AtomicBool>,
    ack_failure_muted: Arc<AtomicBool>,
}

impl ResetCollector {
    /// Create a collector clearing the given session flags on success.
    pub fn new(interrupted: Arc<AtomicBool>, ack_failure_muted: Arc<AtomicBool>) -> Self {
        Self {
            interrupted,
            ack_failure_muted,
        }
    }
}

impl Collector for ResetCollector {
    fn on_success(&mut self, _meta: ValueMap) {
        self.interrupted.store(false, Ordering::SeqCst);
        self.ack_failure_muted.store(false, Ordering::SeqCst);
    }
}

/// FIFO of collectors, one per in-flight request, fed by the message
/// reader.
#[derive(Default)]
pub struct SocketResponseHandler {
    collectors: VecDeque<Box<dyn Collector>>,
    failure: Option<ServerFailure>,
}

impl SocketResponseHandler {
    /// Create an empty handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair the next request with its collector. Must be called in the
    /// same order the requests are queued.
    pub fn append_collector(&mut self, collector: Box<dyn Collector>) {
        self.collectors.push_back(collector);
    }

    /// Number of requests still waiting for their terminal response.
    pub fn collectors_waiting(&self) -> usize {
        self.collectors.len()
    }

    /// Whether the last receive stored a server failure.
    pub fn server_failure_occurred(&self) -> bool {
        self.failure.is_some()
    }

    /// Whether the stored failure is a protocol violation.
    pub fn protocol_violation_error_occurred(&self) -> bool {
        self.failure
            .as_ref()
            .is_some_and(ServerFailure::is_protocol_violation)
    }

    /// The stored failure, if any.
    pub fn server_failure(&self) -> Option<ServerFailure> {
        self.failure.clone()
    }

    /// Forget the stored failure.
    pub fn clear_error(&mut self) {
        self.failure = None;
    }

    fn pop_head(&mut self, sig: u8) -> BoltResult<Box<dyn Collector>> {
        self.collectors
            .pop_front()
            .ok_or_else(|| PackStreamError::UnexpectedMessage(sig).into())
    }
}

impl MessageHandler for SocketResponseHandler {
    fn handle_success(&mut self, meta: ValueMap) -> BoltResult<()> {
        let mut collector = self.pop_head(signature::SUCCESS)?;
        collector.on_success(meta);
        collector.on_complete();
        Ok(())
    }

    fn handle_record(&mut self, fields: Vec<Value>) -> BoltResult<()> {
        match self.collectors.front_mut() {
            Some(collector) => {
                collector.on_record(fields);
                Ok(())
            }
            None => Err(PackStreamError::UnexpectedMessage(signature::RECORD).into()),
        }
    }

    fn handle_ignored(&mut self) -> BoltResult<()> {
        let mut collector = self.pop_head(signature::IGNORED)?;
        collector.on_ignored();
        collector.on_complete();
        Ok(())
    }

    fn handle_failure(&mut self, code: String, message: String) -> BoltResult<()> {
        let mut collector = self.pop_head(signature::FAILURE)?;
        collector.on_failure(&code, &message);
        collector.on_complete();
        self.failure = Some(ServerFailure::new(code, message));
        Ok(())
    }
}
