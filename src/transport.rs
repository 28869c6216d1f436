//! The byte-stream transport capability (spec §6.1).
//!
//! `httpcore` never reaches for a socket directly: every read and write
//! goes through a `Transport` implementation supplied by the embedder. This
//! keeps the core usable on transports that aren't BSD sockets at all
//! (proprietary payment-terminal stacks, TLS wrappers, mock transports in
//! tests) while still shipping a batteries-included [`TcpTransport`] for the
//! common case, the way the reference implementation shipped a
//! `DefaultHttpStream` backed by BSD sockets alongside the pluggable
//! interface.

use crate::error::{HttpError, Result};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

/// A per-call deadline. `None` means "implementation default" (spec §3:
/// "Zero means implementation default").
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Deadline(Option<Duration>);

impl Deadline {
    pub const NONE: Deadline = Deadline(None);

    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            Deadline::NONE
        } else {
            Deadline(Some(Duration::from_millis(ms)))
        }
    }

    pub fn duration(&self, default: Duration) -> Duration {
        self.0.unwrap_or(default)
    }

    /// An absolute instant this deadline expires at, anchored to `now`.
    pub fn expires_at(&self, now: Instant, default: Duration) -> Instant {
        now + self.duration(default)
    }
}

/// Opaque, transport-defined connection handle. The core never inspects
/// its value; it only passes it back to `close`/`read`/`write`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Handle(pub u64);

impl Handle {
    /// Sentinel returned before any successful `open`.
    pub const INVALID: Handle = Handle(u64::MAX);

    pub fn is_valid(&self) -> bool {
        *self != Handle::INVALID
    }
}

impl Default for &Handle {
    fn default() -> Self {
        &Handle::INVALID
    }
}

/// The four-operation transport capability (spec §6.1). Implementations are
/// free to block up to (but not necessarily exactly) the given deadline;
/// the core does not enforce a cumulative deadline across calls, only a
/// per-call one.
pub trait Transport {
    /// Opens a connection to `host:port`. `use_tls` is forwarded verbatim
    /// and is otherwise meaningless to the core (spec §9 open question c).
    fn open(&self, host: &str, port: u16, use_tls: bool, deadline: Deadline) -> Result<Handle>;

    /// Closes a previously opened handle. Implementations should treat an
    /// already-closed handle as a no-op success.
    fn close(&self, handle: Handle, deadline: Deadline) -> Result<()>;

    /// Reads at most `out.len()` bytes. Returns `0` on orderly EOF.
    fn read(&self, handle: Handle, out: &mut [u8], deadline: Deadline) -> Result<usize>;

    /// Writes `data`, retrying internally until either all bytes are
    /// written or the deadline is reached. A short write that can't make
    /// further progress before the deadline is a transport error.
    fn write(&self, handle: Handle, data: &[u8], deadline: Deadline) -> Result<usize>;
}

/// Default transport: a single `TcpStream` per handle, looked up by index.
///
/// This is the crate's equivalent of the reference implementation's
/// BSD-socket `DefaultHttpStream` — a normal, swappable [`Transport`] impl
/// with no special status, kept around because a client library that can
/// never actually connect to anything is not a usable deliverable.
#[derive(Default)]
pub struct TcpTransport {
    streams: std::sync::Mutex<Vec<Option<TcpStream>>>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            streams: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl Transport for TcpTransport {
    fn open(&self, host: &str, port: u16, _use_tls: bool, deadline: Deadline) -> Result<Handle> {
        use std::net::ToSocketAddrs;

        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|_| HttpError::Transport("could not resolve host"))?
            .next()
            .ok_or(HttpError::Transport("no address resolved for host"))?;

        let timeout = deadline.duration(Duration::from_secs(20));
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|_| HttpError::Transport("connect failed"))?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(|_| HttpError::Transport("set_read_timeout failed"))?;
        stream
            .set_write_timeout(Some(timeout))
            .map_err(|_| HttpError::Transport("set_write_timeout failed"))?;

        let mut streams = self.streams.lock().unwrap();
        streams.push(Some(stream));
        Ok(Handle((streams.len() - 1) as u64))
    }

    fn close(&self, handle: Handle, _deadline: Deadline) -> Result<()> {
        let mut streams = self.streams.lock().unwrap();
        if let Some(slot) = streams.get_mut(handle.0 as usize) {
            *slot = None;
        }
        Ok(())
    }

    fn read(&self, handle: Handle, out: &mut [u8], deadline: Deadline) -> Result<usize> {
        let mut streams = self.streams.lock().unwrap();
        let stream = streams
            .get_mut(handle.0 as usize)
            .and_then(|s| s.as_mut())
            .ok_or(HttpError::Transport("read on closed handle"))?;
        if !deadline.0.is_none() {
            let _ = stream.set_read_timeout(Some(deadline.duration(Duration::from_secs(20))));
        }
        stream
            .read(out)
            .map_err(|_| HttpError::Transport("read failed"))
    }

    fn write(&self, handle: Handle, data: &[u8], deadline: Deadline) -> Result<usize> {
        let mut streams = self.streams.lock().unwrap();
        let stream = streams
            .get_mut(handle.0 as usize)
            .and_then(|s| s.as_mut())
            .ok_or(HttpError::Transport("write on closed handle"))?;
        if !deadline.0.is_none() {
            let _ = stream.set_write_timeout(Some(deadline.duration(Duration::from_secs(20))));
        }
        stream
            .write_all(data)
            .map_err(|_| HttpError::Transport("write failed"))?;
        Ok(data.len())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! A scriptable in-memory transport for unit tests: `open`/`close` are
    //! no-ops, reads are served from a queue of byte chunks (one chunk per
    //! call, to simulate arbitrarily fragmented wire reads per spec §8
    //! property 5), writes are recorded for inspection.
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    pub struct MockTransport {
        pub reads: RefCell<VecDeque<Vec<u8>>>,
        pub written: RefCell<Vec<u8>>,
        pub fail_reads: RefCell<bool>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                reads: RefCell::new(VecDeque::new()),
                written: RefCell::new(Vec::new()),
                fail_reads: RefCell::new(false),
            }
        }

        /// Queue bytes as a single read chunk.
        pub fn push_read(&self, chunk: &[u8]) {
            self.reads.borrow_mut().push_back(chunk.to_vec());
        }

        /// Queue an entire buffer, one byte per read call, simulating a
        /// maximally fragmented wire.
        pub fn push_bytes_individually(&self, data: &[u8]) {
            for b in data {
                self.reads.borrow_mut().push_back(vec![*b]);
            }
        }
    }

    impl Transport for MockTransport {
        fn open(&self, _host: &str, _port: u16, _use_tls: bool, _deadline: Deadline) -> Result<Handle> {
            Ok(Handle(0))
        }

        fn close(&self, _handle: Handle, _deadline: Deadline) -> Result<()> {
            Ok(())
        }

        fn read(&self, _handle: Handle, out: &mut [u8], _deadline: Deadline) -> Result<usize> {
            if *self.fail_reads.borrow() {
                return Err(HttpError::Transport("mock read failure"));
            }
            let front = self.reads.borrow_mut().pop_front();
            match front {
                Some(chunk) => {
                    let n = chunk.len().min(out.len());
                    out[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        // Put back the remainder, preserving order.
                        self.reads.borrow_mut().push_front(chunk[n..].to_vec());
                    }
                    Ok(n)
                }
                None => Ok(0),
            }
        }

        fn write(&self, _handle: Handle, data: &[u8], _deadline: Deadline) -> Result<usize> {
            self.written.borrow_mut().extend_from_slice(data);
            Ok(data.len())
        }
    }
}
