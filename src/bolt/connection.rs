//! Protocol session.
//!
//! [`SocketConnection`] drives a pipelined request/response exchange: the
//! request operations only queue a message together with its collector,
//! [`Connection::flush`] writes the queue, and the receive operations
//! drain server responses into the collector FIFO. `INIT` alone is
//! synchronous.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::address::BoltServerAddress;
use super::channel::SharedChannel;
use super::error::{BoltError, BoltResult};
use super::message::Message;
use super::packstream::ValueMap;
use super::response::{
    Collector, InitCollector, NoOpCollector, ResetCollector, SocketResponseHandler,
};
use super::socket::SocketClient;

/// The operational surface of one protocol session.
///
/// Not thread-safe by contract: apart from [`Connection::reset_async`],
/// which is the out-of-band interrupt, callers must serialize access.
/// [`crate::bolt::guard::ConcurrencyGuardingConnection`] turns violations
/// of that contract into errors.
pub trait Connection: Send + Sync {
    /// Send `INIT` and block until the server answers it.
    fn init(&self, client_name: &str, auth_token: ValueMap) -> BoltResult<()>;

    /// Queue a `RUN` with its collector. Does not block.
    fn run(
        &self,
        statement: &str,
        parameters: ValueMap,
        collector: Box<dyn Collector>,
    ) -> BoltResult<()>;

    /// Queue a `DISCARD_ALL` with its collector. Does not block.
    fn discard_all(&self, collector: Box<dyn Collector>) -> BoltResult<()>;

    /// Queue a `PULL_ALL` with its collector. Does not block.
    fn pull_all(&self, collector: Box<dyn Collector>) -> BoltResult<()>;

    /// Queue a `RESET`. Does not block.
    fn reset(&self) -> BoltResult<()>;

    /// Queue an `ACK_FAILURE`. Does not block.
    fn ack_failure(&self) -> BoltResult<()>;

    /// Send `RESET` out-of-band and mark the session interrupted until
    /// the server acknowledges it.
    fn reset_async(&self) -> BoltResult<()>;

    /// Flush queued messages and drain every pending response.
    fn sync(&self) -> BoltResult<()>;

    /// Write all queued messages to the channel in FIFO order.
    fn flush(&self) -> BoltResult<()>;

    /// Read exactly one server message and route it.
    fn receive_one(&self) -> BoltResult<()>;

    /// Tear the session down, closing the channel.
    fn close(&self) -> BoltResult<()>;

    /// Whether the underlying channel is open.
    fn is_open(&self) -> bool;

    /// Whether failures are currently acknowledged automatically
    /// (muted while an interrupt is outstanding).
    fn is_ack_failure_muted(&self) -> bool;

    /// The server identification captured from `INIT`.
    fn server(&self) -> Option<String>;

    /// The remote address.
    fn address(&self) -> BoltServerAddress;
}

/// A live session over one socket.
pub struct SocketConnection {
    socket: SocketClient,
    pending: Mutex<VecDeque<Message>>,
    handler: Mutex<SocketResponseHandler>,
    interrupted: Arc<AtomicBool>,
    ack_failure_muted: Arc<AtomicBool>,
    server_info: Arc<Mutex<Option<String>>>,
}

impl SocketConnection {
    /// Connect to `address` and complete the handshake. The session still
    /// needs [`Connection::init`] before running statements.
    pub fn connect(address: BoltServerAddress, timeout: Duration) -> BoltResult<Self> {
        Ok(Self::with_socket(SocketClient::connect(address, timeout)?))
    }

    /// Run the handshake over an externally created channel.
    pub fn start(address: BoltServerAddress, channel: SharedChannel) -> BoltResult<Self> {
        Ok(Self::with_socket(SocketClient::start(address, channel)?))
    }

    fn with_socket(socket: SocketClient) -> Self {
        Self {
            socket,
            pending: Mutex::new(VecDeque::new()),
            handler: Mutex::new(SocketResponseHandler::new()),
            interrupted: Arc::new(AtomicBool::new(false)),
            ack_failure_muted: Arc::new(AtomicBool::new(false)),
            server_info: Arc::new(Mutex::new(None)),
        }
    }

    fn queue_message(&self, message: Message, collector: Box<dyn Collector>) -> BoltResult<()> {
        self.ensure_not_interrupted()?;
        let mut pending = self.pending.lock();
        self.handler.lock().append_collector(collector);
        pending.push_back(message);
        Ok(())
    }

    /// While interrupted, already-queued responses are drained first;
    /// any failure among them is raised immediately.
    fn ensure_not_interrupted(&self) -> BoltResult<()> {
        if self.interrupted.load(Ordering::SeqCst) {
            while self.handler.lock().collectors_waiting() > 0 {
                self.receive_one()?;
            }
        }
        Ok(())
    }

    fn receive_all(&self) -> BoltResult<()> {
        self.socket.receive_all(&self.handler)?;
        self.assert_no_server_failure()
    }

    fn assert_no_server_failure(&self) -> BoltResult<()> {
        let failure = {
            let mut handler = self.handler.lock();
            match handler.server_failure() {
                Some(failure) => {
                    handler.clear_error();
                    Some(failure)
                }
                None => None,
            }
        };
        if let Some(failure) = failure {
            self.interrupted.store(false, Ordering::SeqCst);
            return Err(BoltError::Server(failure));
        }
        Ok(())
    }
}

impl Connection for SocketConnection {
    fn init(&self, client_name: &str, auth_token: ValueMap) -> BoltResult<()> {
        let collector = InitCollector::new(self.server_info.clone());
        self.queue_message(
            Message::Init {
                client_name: client_name.to_string(),
                auth_token,
            },
            Box::new(collector),
        )?;
        self.sync()
    }

    fn run(
        &self,
        statement: &str,
        parameters: ValueMap,
        collector: Box<dyn Collector>,
    ) -> BoltResult<()> {
        self.queue_message(
            Message::Run {
                statement: statement.to_string(),
                parameters,
            },
            collector,
        )
    }

    fn discard_all(&self, collector: Box<dyn Collector>) -> BoltResult<()> {
        self.queue_message(Message::DiscardAll, collector)
    }

    fn pull_all(&self, collector: Box<dyn Collector>) -> BoltResult<()> {
        self.queue_message(Message::PullAll, collector)
    }

    fn reset(&self) -> BoltResult<()> {
        self.queue_message(Message::Reset, Box::new(NoOpCollector))
    }

    fn ack_failure(&self) -> BoltResult<()> {
        self.queue_message(Message::AckFailure, Box::new(NoOpCollector))
    }

    fn reset_async(&self) -> BoltResult<()> {
        let collector = ResetCollector::new(
            self.interrupted.clone(),
            self.ack_failure_muted.clone(),
        );
        self.queue_message(Message::Reset, Box::new(collector))?;
        self.flush()?;
        self.interrupted.store(true, Ordering::SeqCst);
        self.ack_failure_muted.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn sync(&self) -> BoltResult<()> {
        self.flush()?;
        self.receive_all()
    }

    fn flush(&self) -> BoltResult<()> {
        self.ensure_not_interrupted()?;
        let mut pending = self.pending.lock();
        self.socket.send(&mut pending)
    }

    fn receive_one(&self) -> BoltResult<()> {
        self.socket.receive_one(&self.handler)?;
        self.assert_no_server_failure()
    }

    fn close(&self) -> BoltResult<()> {
        self.socket.stop()
    }

    fn is_open(&self) -> bool {
        self.socket.is_open()
    }

    fn is_ack_failure_muted(&self) -> bool {
        self.ack_failure_muted.load(Ordering::SeqCst)
    }

    fn server(&self) -> Option<String> {
        self.server_info.lock().clone()
    }

    fn address(&self) -> BoltServerAddress {
        self.socket.address().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::chunk::ChunkedOutput;
    use crate::bolt::error::ServerFailure;
    use crate::bolt::message::MessageWriter;
    use crate::bolt::packstream::Value;
    use crate::bolt::test_support::{RecordingCollector, ScriptedChannel};

    fn frame(messages: &[Message]) -> Vec<u8> {
        let sink = Arc::new(ScriptedChannel::new());
        let mut writer = MessageWriter::new(ChunkedOutput::new(sink.clone()));
        for message in messages {
            writer.write_message(message).unwrap();
        }
        writer.flush().unwrap();
        sink.written()
    }

    fn connection_over(replies: Vec<Vec<u8>>) -> (SocketConnection, Arc<ScriptedChannel>) {
        let mut reads = vec![vec![0x00, 0x00, 0x00, 0x01]];
        reads.extend(replies);
        let scripted = Arc::new(ScriptedChannel::with_reads(reads));
        let conn = SocketConnection::start(BoltServerAddress::default(), scripted.clone()).unwrap();
        (conn, scripted)
    }

    fn success(entries: &[(&str, Value)]) -> Message {
        let mut meta = ValueMap::new();
        for (k, v) in entries {
            meta.insert((*k).to_string(), v.clone());
        }
        Message::Success { meta }
    }

    #[test]
    fn test_init_is_synchronous_and_captures_server() {
        let (conn, scripted) = connection_over(vec![frame(&[success(&[(
            "server",
            Value::from("Neo4j/3.0.0"),
        )])])]);

        let mut auth = ValueMap::new();
        auth.insert("scheme".to_string(), "basic".into());
        auth.insert("principal".to_string(), "u".into());
        auth.insert("credentials".to_string(), "p".into());
        conn.init("driver/1.0", auth).unwrap();

        assert_eq!(conn.server().as_deref(), Some("Neo4j/3.0.0"));
        // INIT went over the wire during init(), not later.
        assert!(scripted.written().len() > 20);
    }

    #[test]
    fn test_run_pull_all_pipeline() {
        let (conn, scripted) = connection_over(vec![frame(&[
            success(&[("fields", Value::List(vec!["1".into()]))]),
            Message::Record {
                fields: vec![Value::Int(1)],
            },
            success(&[]),
        ])]);

        let (run_collector, run_events) = RecordingCollector::new();
        let (pull_collector, pull_events) = RecordingCollector::new();
        conn.run("RETURN 1", ValueMap::new(), Box::new(run_collector))
            .unwrap();
        conn.pull_all(Box::new(pull_collector)).unwrap();
        // Queueing alone writes nothing.
        assert_eq!(scripted.written().len(), 20);

        conn.sync().unwrap();

        assert_eq!(run_events.lock().as_slice(), ["success", "complete"]);
        assert_eq!(
            pull_events.lock().as_slice(),
            ["record", "success", "complete"]
        );
    }

    #[test]
    fn test_failure_then_ignored_then_ack_recovers() {
        let (conn, _) = connection_over(vec![
            frame(&[
                Message::Failure {
                    code: "Neo.ClientError.Statement.SyntaxError".to_string(),
                    message: "bad".to_string(),
                },
                Message::Ignored,
            ]),
            frame(&[success(&[])]),
        ]);

        let (run_collector, run_events) = RecordingCollector::new();
        let (pull_collector, pull_events) = RecordingCollector::new();
        conn.run("BAD", ValueMap::new(), Box::new(run_collector))
            .unwrap();
        conn.pull_all(Box::new(pull_collector)).unwrap();

        let err = conn.sync().unwrap_err();
        match err {
            BoltError::Server(ServerFailure { code, .. }) => {
                assert_eq!(code, "Neo.ClientError.Statement.SyntaxError");
            }
            other => panic!("expected server failure, got {other:?}"),
        }
        assert_eq!(
            run_events.lock().as_slice(),
            ["failure:Neo.ClientError.Statement.SyntaxError", "complete"]
        );
        assert_eq!(pull_events.lock().as_slice(), ["ignored", "complete"]);

        // ACK_FAILURE clears the server-side state; the session goes on.
        conn.ack_failure().unwrap();
        conn.sync().unwrap();
        assert!(conn.is_open());
    }

    #[test]
    fn test_reset_async_sends_immediately_and_mutes_ack() {
        let (conn, scripted) = connection_over(vec![frame(&[success(&[])])]);

        conn.reset_async().unwrap();
        assert!(conn.is_ack_failure_muted());
        // RESET was flushed without waiting for sync().
        assert_eq!(
            &scripted.written()[20..],
            &[0x00, 0x02, 0xB0, 0x0F, 0x00, 0x00]
        );

        // Draining the RESET's SUCCESS clears the interrupt and unmutes.
        conn.receive_one().unwrap();
        assert!(!conn.is_ack_failure_muted());
    }

    #[test]
    fn test_interrupted_queue_op_drains_and_raises_pending_failures() {
        // A RUN/PULL_ALL pair is in flight when reset_async interrupts.
        // The server kills the RUN, ignores the PULL_ALL, then confirms
        // the RESET.
        let (conn, _) = connection_over(vec![frame(&[
            Message::Failure {
                code: "Neo.TransientError.General.DatabaseUnavailable".to_string(),
                message: "terminated".to_string(),
            },
            Message::Ignored,
            success(&[]),
        ])]);

        let (run_collector, _) = RecordingCollector::new();
        let (pull_collector, _) = RecordingCollector::new();
        conn.run("LONG QUERY", ValueMap::new(), Box::new(run_collector))
            .unwrap();
        conn.pull_all(Box::new(pull_collector)).unwrap();
        conn.flush().unwrap();

        conn.reset_async().unwrap();

        // The next queue operation drains the backlog; the stored
        // failure surfaces on it.
        let err = conn.reset().unwrap_err();
        match err {
            BoltError::Server(ServerFailure { code, .. }) => {
                assert_eq!(code, "Neo.TransientError.General.DatabaseUnavailable");
            }
            other => panic!("expected server failure, got {other:?}"),
        }

        // Finish draining: IGNORED for PULL_ALL, SUCCESS for RESET.
        conn.receive_one().unwrap();
        conn.receive_one().unwrap();
        assert!(!conn.is_ack_failure_muted());

        // Clean again: new work queues without complaint.
        conn.reset().unwrap();
    }

    #[test]
    fn test_close_shuts_channel() {
        let (conn, _) = connection_over(vec![]);
        assert!(conn.is_open());
        conn.close().unwrap();
        assert!(!conn.is_open());
    }
}
