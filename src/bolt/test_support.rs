//! In-memory doubles shared by the unit tests: a scripted byte channel,
//! slice-backed pack IO, and a recording `Connection`.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::address::BoltServerAddress;
use super::channel::ByteChannel;
use super::connection::Connection;
use super::error::BoltResult;
use super::packstream::io::{PackInput, PackOutput};
use super::packstream::{PackStreamError, ValueMap};
use super::response::Collector;

/// A [`ByteChannel`] that replays scripted reads and records writes.
pub struct ScriptedChannel {
    reads: Mutex<VecDeque<Vec<u8>>>,
    written: Mutex<Vec<u8>>,
    open: AtomicBool,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::with_reads(Vec::new())
    }

    /// Each element is returned by one `read` call, allowing short reads.
    pub fn with_reads(reads: Vec<Vec<u8>>) -> Self {
        Self {
            reads: Mutex::new(reads.into()),
            written: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
        }
    }

    /// Queue more readable bytes after construction.
    pub fn push_read(&self, bytes: Vec<u8>) {
        self.reads.lock().push_back(bytes);
    }

    /// Everything written so far.
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }
}

impl ByteChannel for ScriptedChannel {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reads = self.reads.lock();
        match reads.front_mut() {
            None => Ok(0), // EOF
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                chunk.drain(..n);
                if chunk.is_empty() {
                    reads.pop_front();
                }
                Ok(n)
            }
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.written.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn shutdown(&self) -> io::Result<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// A [`PackOutput`] writing into a plain byte vector.
pub struct VecOutput {
    bytes: Vec<u8>,
}

impl VecOutput {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl PackOutput for VecOutput {
    fn write_u8(&mut self, value: u8) -> Result<(), PackStreamError> {
        self.bytes.push(value);
        Ok(())
    }

    fn write_u16(&mut self, value: u16) -> Result<(), PackStreamError> {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    fn write_u32(&mut self, value: u32) -> Result<(), PackStreamError> {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    fn write_u64(&mut self, value: u64) -> Result<(), PackStreamError> {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), PackStreamError> {
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PackStreamError> {
        Ok(())
    }
}

/// A [`PackInput`] reading from a plain byte vector.
pub struct VecInput {
    data: Vec<u8>,
    pos: usize,
}

impl VecInput {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&[u8], PackStreamError> {
        if self.data.len() - self.pos < n {
            return Err(PackStreamError::EndOfStream {
                expected: n - (self.data.len() - self.pos),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}

impl PackInput for VecInput {
    fn read_u8(&mut self) -> Result<u8, PackStreamError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, PackStreamError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, PackStreamError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64, PackStreamError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }

    fn read_bytes(&mut self, dest: &mut [u8]) -> Result<(), PackStreamError> {
        let n = dest.len();
        dest.copy_from_slice(self.take(n)?);
        Ok(())
    }

    fn peek_u8(&mut self) -> Result<u8, PackStreamError> {
        if self.pos >= self.data.len() {
            return Err(PackStreamError::EndOfStream { expected: 1 });
        }
        Ok(self.data[self.pos])
    }
}

type OpHook = Box<dyn FnMut(&str) -> BoltResult<()> + Send>;

/// A recording [`Connection`] with scriptable per-operation behavior.
pub struct MockConnection {
    address: BoltServerAddress,
    calls: Mutex<Vec<String>>,
    hook: Mutex<Option<OpHook>>,
    open: AtomicBool,
    ack_muted: AtomicBool,
}

impl MockConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            address: BoltServerAddress::default(),
            calls: Mutex::new(Vec::new()),
            hook: Mutex::new(None),
            open: AtomicBool::new(true),
            ack_muted: AtomicBool::new(false),
        })
    }

    /// Install a hook invoked with each operation name; returning an error
    /// makes that operation fail.
    pub fn set_hook(&self, hook: impl FnMut(&str) -> BoltResult<()> + Send + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    pub fn set_ack_muted(&self, muted: bool) {
        self.ack_muted.store(muted, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, op: &str) -> BoltResult<()> {
        self.calls.lock().push(op.to_string());
        // Take the hook out while it runs so a blocking hook does not
        // hold the lock against other operations.
        let mut hook = self.hook.lock().take();
        let result = match hook.as_mut() {
            Some(hook) => hook(op),
            None => Ok(()),
        };
        if let Some(hook) = hook {
            let mut slot = self.hook.lock();
            if slot.is_none() {
                *slot = Some(hook);
            }
        }
        result
    }
}

impl Connection for Arc<MockConnection> {
    fn init(&self, _client_name: &str, _auth_token: ValueMap) -> BoltResult<()> {
        self.record("init")
    }

    fn run(
        &self,
        _statement: &str,
        _parameters: ValueMap,
        _collector: Box<dyn Collector>,
    ) -> BoltResult<()> {
        self.record("run")
    }

    fn discard_all(&self, _collector: Box<dyn Collector>) -> BoltResult<()> {
        self.record("discard_all")
    }

    fn pull_all(&self, _collector: Box<dyn Collector>) -> BoltResult<()> {
        self.record("pull_all")
    }

    fn reset(&self) -> BoltResult<()> {
        self.record("reset")
    }

    fn ack_failure(&self) -> BoltResult<()> {
        self.record("ack_failure")
    }

    fn reset_async(&self) -> BoltResult<()> {
        self.record("reset_async")
    }

    fn sync(&self) -> BoltResult<()> {
        self.record("sync")
    }

    fn flush(&self) -> BoltResult<()> {
        self.record("flush")
    }

    fn receive_one(&self) -> BoltResult<()> {
        self.record("receive_one")
    }

    fn close(&self) -> BoltResult<()> {
        self.open.store(false, Ordering::SeqCst);
        self.record("close")
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn is_ack_failure_muted(&self) -> bool {
        self.ack_muted.load(Ordering::SeqCst)
    }

    fn server(&self) -> Option<String> {
        Some("MockServer/1.0".to_string())
    }

    fn address(&self) -> BoltServerAddress {
        self.address.clone()
    }
}

/// A [`Collector`] that logs every event it receives.
pub struct RecordingCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingCollector {
    /// Returns the collector and a shared handle to its event log.
    pub fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                events: events.clone(),
            },
            events,
        )
    }
}

impl Collector for RecordingCollector {
    fn on_success(&mut self, _meta: crate::bolt::packstream::ValueMap) {
        self.events.lock().push("success".to_string());
    }

    fn on_record(&mut self, fields: Vec<crate::bolt::packstream::Value>) {
        let _ = fields;
        self.events.lock().push("record".to_string());
    }

    fn on_failure(&mut self, code: &str, _message: &str) {
        self.events.lock().push(format!("failure:{code}"));
    }

    fn on_ignored(&mut self) {
        self.events.lock().push("ignored".to_string());
    }

    fn on_complete(&mut self) {
        self.events.lock().push("complete".to_string());
    }
}
