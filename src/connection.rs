//! Connection context and control surface (spec §4.2, §4.3).
//!
//! `Connection<T>` owns exactly the state spec §3 lists: the transport
//! handle, the three timeouts, the receive-state flags, the declared
//! content length, the staging buffer, and the chunk bookkeeping pair. It
//! borrows a [`Runtime`] rather than owning a transport directly, matching
//! the §9 design note's preference for an explicitly constructed runtime
//! object over mutable process-wide globals — `crate::runtime` layers the
//! spec-literal process-wide `set_transport`/`set_memory_interface` entry
//! points on top of this for callers porting 1:1 from the historical API.

use crate::error::{HttpError, Result};
use crate::flags::{ConnFlags, FlagOperations, Mask};
use crate::runtime::Runtime;
use crate::staging::Staging;
use crate::transport::{Deadline, Handle, Transport};

/// The three independent per-call deadlines a connection carries (spec §3).
/// Each is `Deadline::NONE` ("implementation default") until set.
#[derive(Copy, Clone, Debug, Default)]
pub struct Timeouts {
    pub connect: Deadline,
    pub send: Deadline,
    pub recv: Deadline,
}

/// Construction-time settings for a [`Connection`], analogous to the
/// teacher's `htp_config::htp_cfg_t` "build once, hand to the parser"
/// object. Unlike `htp_cfg_t` this isn't shared across connections or
/// locked after first use — each `Connection` owns its own copy of the
/// values it was built with.
#[derive(Copy, Clone, Debug)]
pub struct HttpConfig {
    pub staging_capacity: usize,
    pub timeouts: Timeouts,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            staging_capacity: crate::staging::DEFAULT_CAPACITY,
            timeouts: Timeouts::default(),
        }
    }
}

impl HttpConfig {
    pub fn builder() -> HttpConfigBuilder {
        HttpConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct HttpConfigBuilder {
    config: HttpConfig,
}

impl HttpConfigBuilder {
    pub fn staging_capacity(mut self, capacity: usize) -> Self {
        self.config.staging_capacity = capacity;
        self
    }

    pub fn connect_timeout(mut self, deadline: Deadline) -> Self {
        self.config.timeouts.connect = deadline;
        self
    }

    pub fn send_timeout(mut self, deadline: Deadline) -> Self {
        self.config.timeouts.send = deadline;
        self
    }

    pub fn recv_timeout(mut self, deadline: Deadline) -> Self {
        self.config.timeouts.recv = deadline;
        self
    }

    pub fn build(self) -> HttpConfig {
        self.config
    }
}

/// One logical HTTP/1.x connection: a transport handle plus the receive
/// state machine's durable state. Not `Send`/`Sync` — per spec §5 this is
/// single-threaded-per-context, and borrowing `&mut self` for every
/// operation that mutates state enforces that at compile time rather than
/// by convention.
pub struct Connection<'a, T: Transport> {
    pub(crate) runtime: &'a Runtime<T>,
    pub(crate) handle: Handle,
    pub timeouts: Timeouts,
    pub(crate) flags: ConnFlags,
    pub(crate) content_length: usize,
    pub(crate) staging: Option<Staging>,
    pub(crate) staging_capacity: usize,
    pub(crate) chunk_size: usize,
    pub(crate) chunk_read: usize,
    pub(crate) last_error: Option<HttpError>,
}

impl<'a, T: Transport> Connection<'a, T> {
    pub fn new(runtime: &'a Runtime<T>) -> Self {
        Self {
            runtime,
            handle: Handle::INVALID,
            timeouts: Timeouts::default(),
            flags: ConnFlags::new(),
            content_length: 0,
            staging: None,
            staging_capacity: crate::staging::DEFAULT_CAPACITY,
            chunk_size: 0,
            chunk_read: 0,
            last_error: None,
        }
    }

    pub fn with_staging_capacity(mut self, capacity: usize) -> Self {
        self.staging_capacity = capacity;
        self
    }

    pub fn with_config(runtime: &'a Runtime<T>, config: HttpConfig) -> Self {
        Self::new(runtime)
            .with_staging_capacity(config.staging_capacity)
            .with_timeouts(config.timeouts)
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Declared `Content-Length` from the most recently received response
    /// header (0 when absent, or when chunked framing overrode it — spec
    /// §9 open question a).
    pub fn content_length(&self) -> usize {
        self.content_length
    }

    /// The most recent error observed by `recv`/`send`, if any. `recv`
    /// itself flattens errors to `0` per spec §7; use this (or
    /// [`Connection::recv_checked`]) to tell "response complete" apart
    /// from "transport broken".
    pub fn last_error(&self) -> Option<&HttpError> {
        self.last_error.as_ref()
    }

    /// Opens the underlying transport and marks the connection established.
    /// `use_tls` is forwarded to the transport verbatim and otherwise
    /// unused by the core (spec §9 open question c).
    pub fn connect(&mut self, host: &str, port: u16, use_tls: bool) -> Result<()> {
        log::debug!("connecting to {}:{} (tls={})", host, port, use_tls);
        let handle = self
            .runtime
            .transport()
            .open(host, port, use_tls, self.timeouts.connect)?;
        self.handle = handle;
        self.flags.set(Mask::CONNECTION_ESTABLISHED);
        Ok(())
    }

    /// Releases the staging buffer, resets transient receive state, and
    /// closes the transport. With `force = true`, any transport error is
    /// suppressed and the logical context is reset regardless.
    pub fn disconnect(&mut self, force: bool) -> Result<()> {
        log::debug!("disconnecting (force={})", force);
        self.staging = None;
        self.content_length = 0;
        self.flags.reset();
        self.chunk_read = 0;
        self.chunk_size = 0;
        let handle = self.handle;
        self.handle = Handle::INVALID;
        let result = self.runtime.transport().close(handle, self.timeouts.recv);
        if force {
            Ok(())
        } else {
            result
        }
    }

    pub fn is_connected(&self) -> bool {
        self.flags.is_set(Mask::CONNECTION_ESTABLISHED)
    }

    /// Sends a full request message (spec §4.3).
    ///
    /// If the previous response's chunked body was never fully drained,
    /// this first drives the chunked decoder on a scratch buffer to
    /// consume it, so the wire is left at a clean request boundary. A
    /// failure to drain is logged but does not abort the send — per spec,
    /// "the send still proceeds after the state reset, but the wire may be
    /// corrupted"; callers should prefer to disconnect and reconnect after
    /// any prior receive error instead of relying on this best effort.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(HttpError::ProtocolState("send called while not connected"));
        }
        if self.flags.is_set(Mask::ENDING_CHUNK_REQUIRED) {
            if let Err(e) = self.drain_pending_chunked_body() {
                log::warn!("failed to drain pending chunked body before send: {}", e);
            }
        }
        self.reset_transient();

        let mut written = 0;
        while written < data.len() {
            let n = self
                .runtime
                .transport()
                .write(self.handle, &data[written..], self.timeouts.send)?;
            if n == 0 {
                return Err(HttpError::Transport("write made no progress"));
            }
            written += n;
        }
        Ok(())
    }

    /// Clears everything `send` must clear between requests, while
    /// preserving `CONNECTION_ESTABLISHED` — spec §4.3 resets
    /// `content_length`, `flags`, `staging.len`, `chunk_read`, but
    /// zeroing the established bit too would make `is_connected` lie
    /// about a connection that `send` just successfully reused.
    pub(crate) fn reset_transient(&mut self) {
        self.content_length = 0;
        let established = self.is_connected();
        self.flags.reset();
        self.flags.set_to(Mask::CONNECTION_ESTABLISHED, established);
        if let Some(staging) = self.staging.as_mut() {
            staging.clear();
        }
        self.chunk_size = 0;
        self.chunk_read = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::transport::mock::MockTransport;

    #[test]
    fn send_before_connect_is_a_protocol_error() {
        let runtime = Runtime::new(MockTransport::new());
        let mut conn = Connection::new(&runtime);
        assert_eq!(
            conn.send(b"GET / HTTP/1.1\r\n\r\n").unwrap_err(),
            HttpError::ProtocolState("send called while not connected")
        );
    }

    #[test]
    fn connect_then_disconnect_round_trips_is_connected() {
        let runtime = Runtime::new(MockTransport::new());
        let mut conn = Connection::new(&runtime);
        assert!(!conn.is_connected());
        conn.connect("example.test", 80, false).unwrap();
        assert!(conn.is_connected());
        conn.disconnect(false).unwrap();
        assert!(!conn.is_connected());
    }

    #[test]
    fn with_config_applies_staging_capacity_and_timeouts() {
        let runtime = Runtime::new(MockTransport::new());
        let config = HttpConfig::builder()
            .staging_capacity(128)
            .recv_timeout(Deadline::from_millis(5_000))
            .build();
        let conn = Connection::with_config(&runtime, config);
        assert_eq!(conn.staging_capacity, 128);
        assert_eq!(conn.timeouts.recv, Deadline::from_millis(5_000));
    }

    #[test]
    fn send_resets_transient_state_but_not_established_flag() {
        let runtime = Runtime::new(MockTransport::new());
        let mut conn = Connection::new(&runtime);
        conn.connect("example.test", 80, false).unwrap();
        conn.content_length = 42;
        conn.send(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(conn.content_length, 0);
        assert!(conn.is_connected());
    }
}
