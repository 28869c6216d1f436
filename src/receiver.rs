//! The response receiver state machine (spec §4.4).
//!
//! Phase A accumulates header bytes from the transport into the connection's
//! staging buffer until a `\r\n\r\n` terminator is found, rotating the
//! buffer via `Staging::drain_front` when it fills up without one. Phase B
//! delivers the body, either by identity framing (drain staging, then read
//! straight into the caller's buffer) or by decoding `chunked` framing one
//! chunk at a time. Both phases are designed to make progress regardless of
//! how the transport happens to fragment reads (spec §8 property 5) and to
//! survive being re-entered call after call with a fresh `out` buffer each
//! time (spec §8 property 1).

use crate::connection::Connection;
use crate::error::{HttpError, Result};
use crate::flags::{FlagOperations, Mask};
use crate::request;
use crate::staging::Staging;
use crate::transport::Transport;
use bstr::ByteSlice;
use std::time::Duration;

const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(20);

fn find_header_terminator(buf: &[u8]) -> Option<usize> {
    buf.find(b"\r\n\r\n").map(|i| i + 4)
}

/// Start index of the last `\r\n` in `buf`, used to rotate the staging
/// buffer without losing an in-progress header line (spec §9).
fn find_last_crlf(buf: &[u8]) -> Option<usize> {
    let mut idx = None;
    let mut from = 0;
    while let Some(rel) = buf[from..].find(b"\r\n") {
        idx = Some(from + rel);
        from = from + rel + 1;
    }
    idx
}

/// Parses a chunk-size line (hex digits, optional `;extension`, per RFC
/// 7230 §4.1) directly from the slice — no intermediate buffer, per the §9
/// design note.
fn parse_chunk_size(line: &[u8]) -> Result<usize> {
    let size_part = match line.find_byte(b';') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let s = size_part
        .to_str()
        .map_err(|_| HttpError::Malformed("chunk size line is not valid utf8"))?
        .trim();
    if s.is_empty() {
        return Err(HttpError::Malformed("chunk size line is empty"));
    }
    usize::from_str_radix(s, 16).map_err(|_| HttpError::Malformed("chunk size is not valid hex"))
}

impl<'a, T: Transport> Connection<'a, T> {
    /// Receives up to `out.len()` bytes of the response into `out`,
    /// returning how many were written. Per spec §7, every error collapses
    /// to `0`; use [`Connection::last_error`] or [`Connection::recv_checked`]
    /// to distinguish "response complete" from "something went wrong".
    pub fn recv(&mut self, out: &mut [u8]) -> usize {
        match self.recv_checked(out) {
            Ok(n) => {
                self.last_error = None;
                n
            }
            Err(e) => {
                self.last_error = Some(e);
                0
            }
        }
    }

    /// Same as [`Connection::recv`] but surfaces the error instead of
    /// flattening it to `0` (spec §9 design note).
    pub fn recv_checked(&mut self, out: &mut [u8]) -> Result<usize> {
        if !self.is_connected() {
            return Err(HttpError::ProtocolState("recv called while not connected"));
        }
        if self.staging.is_none() {
            let buf = self
                .runtime
                .allocator()
                .alloc(self.staging_capacity)
                .ok_or(HttpError::ResourceExhausted(
                    "allocator returned no staging buffer",
                ))?;
            self.staging = Some(Staging::new(buf)?);
        }
        if !self.flags.is_set(Mask::HEADER_RECEIVED) {
            self.receive_header()?;
        }
        if self.flags.is_set(Mask::TRANSFER_CHUNKED) {
            if !self.flags.is_set(Mask::ENDING_CHUNK_REQUIRED) {
                return Ok(0);
            }
            self.recv_chunked(out)
        } else {
            self.recv_identity(out)
        }
    }

    /// Phase A: accumulate header bytes until `\r\n\r\n`, scanning the
    /// buffer for `Content-Length`/`Transfer-Encoding` as we go, then leave
    /// any body-prefix bytes that arrived in the same reads sitting in
    /// staging for phase B to drain first.
    fn receive_header(&mut self) -> Result<()> {
        loop {
            {
                let staging = self.staging.as_mut().unwrap();
                if staging.remaining() == 0 {
                    match find_last_crlf(staging.as_slice()) {
                        Some(idx) if idx > 0 => staging.drain_front(idx),
                        _ => {
                            return Err(HttpError::BufferTooSmall(
                                "response header exceeds staging buffer capacity",
                            ))
                        }
                    }
                }
            }

            let n = self.read_into_staging()?;
            if n == 0 {
                return Err(HttpError::Transport(
                    "connection closed while reading response header",
                ));
            }

            self.scan_response_properties();

            let staging = self.staging.as_mut().unwrap();
            if let Some(term_end) = find_header_terminator(staging.as_slice()) {
                staging.drain_front(term_end);
                self.flags.set(Mask::HEADER_RECEIVED);
                if self.flags.is_set(Mask::TRANSFER_CHUNKED) {
                    self.flags.set(Mask::ENDING_CHUNK_REQUIRED);
                }
                log::debug!(
                    "response header complete (content_length={}, chunked={})",
                    self.content_length,
                    self.flags.is_set(Mask::TRANSFER_CHUNKED)
                );
                return Ok(());
            }
        }
    }

    /// Best-effort scan of whatever header bytes have accumulated so far.
    /// Run after every read, since `Content-Length`/`Transfer-Encoding` may
    /// land anywhere across several reads; a line not fully present yet is
    /// silently skipped and picked up on the next call once it is.
    fn scan_response_properties(&mut self) {
        let full = self.staging.as_ref().unwrap().as_slice();
        // A staging rotation drops everything up to the last `\r\n` seen so
        // far, leaving that CRLF at the very front of the buffer holding
        // open the in-progress line after it. Unstripped, `find_header_line`
        // reads it as the blank line ending the header section and stops
        // scanning right there, so anything landing after a rotation point
        // would never be seen. Skip it before scanning.
        let buf = full.strip_prefix(b"\r\n").unwrap_or(full);

        if let Ok(value) = request::get_property("Content-Length", buf) {
            if let Ok(s) = value.to_str() {
                if let Ok(n) = s.trim().parse::<usize>() {
                    self.content_length = n;
                }
            }
        }

        if let Ok(value) = request::get_property("Transfer-Encoding", buf) {
            let lower = value.to_ascii_lowercase();
            if lower.contains_str("chunked") {
                // RFC 7230 §3.3.3p3: chunked framing wins over any declared
                // Content-Length, even though we keep the latter recorded.
                self.flags.set(Mask::TRANSFER_CHUNKED);
            }
        }
    }

    fn read_into_staging(&mut self) -> Result<usize> {
        let staging = self.staging.as_mut().unwrap();
        let before = staging.len();
        let n = self
            .runtime
            .transport()
            .read(self.handle, staging.read_slot(), self.timeouts.recv)?;
        staging.commit_read(before, n);
        Ok(n)
    }

    /// Phase B, identity framing: drain any leftover staged bytes first,
    /// then issue at most one transport read to fill the rest of `out`.
    fn recv_identity(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut produced = 0;
        if let Some(staging) = self.staging.as_mut() {
            if !staging.is_empty() {
                produced += staging.take_into(out);
            }
        }
        if produced < out.len() {
            let n = self.runtime.transport().read(
                self.handle,
                &mut out[produced..],
                self.timeouts.recv,
            )?;
            produced += n;
        }
        Ok(produced)
    }

    /// Phase B, chunked framing: read a chunk-size line if we're not
    /// already mid-chunk, then deliver up to `out.len()` bytes of the
    /// current chunk's body.
    fn recv_chunked(&mut self, out: &mut [u8]) -> Result<usize> {
        if !self.flags.is_set(Mask::READING_CHUNK) {
            let terminating = self.read_chunk_header()?;
            if terminating {
                return Ok(0);
            }
        }
        self.recv_chunk_body(out)
    }

    /// Reads and discards the previous chunk's trailing `\r\n` (if any is
    /// still pending) and the next chunk-size line, updating `chunk_size`.
    /// Returns `true` for the zero-size terminating chunk.
    fn read_chunk_header(&mut self) -> Result<bool> {
        self.fill_staging_at_least(2)?;
        {
            let staging = self.staging.as_mut().unwrap();
            if staging.as_slice().starts_with(b"\r\n") {
                staging.drain_front(2);
            }
        }

        loop {
            let staging = self.staging.as_mut().unwrap();
            if let Some(rel) = staging.as_slice().find(b"\r\n") {
                let size = parse_chunk_size(&staging.as_slice()[..rel])?;
                staging.drain_front(rel + 2);
                self.chunk_size = size;
                self.chunk_read = 0;
                if size == 0 {
                    self.flags.clear(Mask::ENDING_CHUNK_REQUIRED);
                    log::debug!("terminating chunk received");
                    return Ok(true);
                }
                self.flags.set(Mask::READING_CHUNK);
                return Ok(false);
            }
            if staging.remaining() == 0 {
                return Err(HttpError::Malformed(
                    "chunk size line exceeds staging buffer capacity",
                ));
            }
            drop(staging);
            let n = self.read_into_staging()?;
            if n == 0 {
                return Err(HttpError::Transport(
                    "connection closed while reading chunk size",
                ));
            }
        }
    }

    fn fill_staging_at_least(&mut self, min_len: usize) -> Result<()> {
        while self.staging.as_ref().unwrap().len() < min_len {
            if self.staging.as_ref().unwrap().remaining() == 0 {
                break;
            }
            let n = self.read_into_staging()?;
            if n == 0 {
                return Err(HttpError::Transport(
                    "connection closed while reading chunk framing",
                ));
            }
        }
        Ok(())
    }

    fn recv_chunk_body(&mut self, out: &mut [u8]) -> Result<usize> {
        let want = (self.chunk_size - self.chunk_read).min(out.len());
        let mut produced = 0;
        if let Some(staging) = self.staging.as_mut() {
            if !staging.is_empty() && want > 0 {
                produced += staging.take_into(&mut out[..want]);
            }
        }
        if produced < want {
            let n = self.runtime.transport().read(
                self.handle,
                &mut out[produced..want],
                self.timeouts.recv,
            )?;
            produced += n;
        }
        self.chunk_read += produced;
        if self.chunk_read == self.chunk_size {
            self.flags.clear(Mask::READING_CHUNK);
        }
        Ok(produced)
    }

    /// Drives the chunked decoder on a scratch buffer until the terminating
    /// chunk is consumed, used by `send` to clean up an unread body before
    /// reusing the connection.
    pub(crate) fn drain_pending_chunked_body(&mut self) -> Result<()> {
        let mut scratch = [0u8; 256];
        while self.flags.is_set(Mask::ENDING_CHUNK_REQUIRED) {
            let n = self.recv_chunked(&mut scratch)?;
            if n == 0 && !self.flags.is_set(Mask::ENDING_CHUNK_REQUIRED) {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::transport::mock::MockTransport;
    use rstest::rstest;

    fn connection<'a>(runtime: &'a Runtime<MockTransport>) -> Connection<'a, MockTransport> {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut conn = Connection::new(runtime).with_staging_capacity(64);
        conn.connect("example.test", 80, false).unwrap();
        conn
    }

    #[test]
    fn identity_response_delivered_in_small_reads() {
        let runtime = Runtime::new(MockTransport::new());
        let mut conn = connection(&runtime);
        runtime
            .transport()
            .push_read(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");

        let mut out = [0u8; 2];
        let mut collected = Vec::new();
        loop {
            let n = conn.recv_checked(&mut out).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&out[..n]);
            if collected.len() >= 5 {
                break;
            }
        }
        assert_eq!(collected, b"hello");
        assert_eq!(conn.content_length(), 5);
    }

    #[test]
    fn chunked_response_decoded_across_chunks() {
        let runtime = Runtime::new(MockTransport::new());
        let mut conn = connection(&runtime);
        runtime.transport().push_read(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
        );

        let mut out = [0u8; 100];
        let mut collected = Vec::new();
        loop {
            let n = conn.recv_checked(&mut out).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&out[..n]);
        }
        assert_eq!(collected, b"Wikipedia");
    }

    #[test]
    fn fragmented_byte_by_byte_wire_still_assembles_chunked_response() {
        let runtime = Runtime::new(MockTransport::new());
        let mut conn = connection(&runtime);
        runtime.transport().push_bytes_individually(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n",
        );

        let mut out = [0u8; 8];
        let mut collected = Vec::new();
        loop {
            let n = conn.recv_checked(&mut out).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&out[..n]);
        }
        assert_eq!(collected, b"abc");
    }

    #[test]
    fn header_larger_than_staging_is_reported_not_panicked() {
        let runtime = Runtime::new(MockTransport::new());
        let mut conn = connection(&runtime);
        let huge_header = format!("HTTP/1.1 200 OK\r\nX-Pad: {}\r\n\r\n", "a".repeat(300));
        runtime.transport().push_read(huge_header.as_bytes());

        let mut out = [0u8; 16];
        let err = conn.recv_checked(&mut out).unwrap_err();
        assert_eq!(err.status(), crate::error::Status::BufferTooSmall);
    }

    #[test]
    fn header_rotation_survives_a_400_byte_header_in_a_64_byte_staging_buffer() {
        let runtime = Runtime::new(MockTransport::new());
        let mut conn = connection(&runtime);
        let mut header = String::from("HTTP/1.1 200 OK\r\n");
        for i in 0..15 {
            header.push_str(&format!("X-Header-{}: value-{}\r\n", i, i));
        }
        header.push_str("Content-Length: 2\r\n\r\nhi");
        runtime.transport().push_read(header.as_bytes());

        let mut out = [0u8; 2];
        let n = conn.recv_checked(&mut out).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&out, b"hi");
        assert_eq!(conn.content_length(), 2);
    }

    #[test]
    fn header_rotation_still_detects_transfer_encoding_chunked() {
        let runtime = Runtime::new(MockTransport::new());
        let mut conn = connection(&runtime);
        let mut header = String::from("HTTP/1.1 200 OK\r\n");
        for i in 0..15 {
            header.push_str(&format!("X-Header-{}: value-{}\r\n", i, i));
        }
        header.push_str("Transfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n");
        runtime.transport().push_read(header.as_bytes());

        let mut out = [0u8; 8];
        let mut collected = Vec::new();
        loop {
            let n = conn.recv_checked(&mut out).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&out[..n]);
        }
        assert_eq!(collected, b"abc");
        assert!(conn.flags.is_set(Mask::TRANSFER_CHUNKED));
    }

    #[rstest]
    #[case(2)]
    #[case(5)]
    #[case(64)]
    fn output_buffer_size_does_not_change_total_bytes_delivered(#[case] out_cap: usize) {
        let runtime = Runtime::new(MockTransport::new());
        let mut conn = connection(&runtime);
        runtime
            .transport()
            .push_read(b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\nhello world");

        let mut out = vec![0u8; out_cap];
        let mut collected = Vec::new();
        loop {
            let n = conn.recv_checked(&mut out).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&out[..n]);
            if collected.len() >= 11 {
                break;
            }
        }
        assert_eq!(collected, b"hello world");
    }

    #[test]
    fn send_drains_unread_chunked_body_before_reusing_connection() {
        let runtime = Runtime::new(MockTransport::new());
        let mut conn = connection(&runtime);
        runtime.transport().push_read(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nhi\r\n0\r\n\r\n",
        );

        let mut out = [0u8; 1];
        let _ = conn.recv_checked(&mut out).unwrap();
        assert!(conn.flags.is_set(Mask::ENDING_CHUNK_REQUIRED));

        conn.send(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert!(!conn.flags.is_set(Mask::ENDING_CHUNK_REQUIRED));
    }
}
