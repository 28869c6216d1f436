//! The fixed-capacity staging buffer (spec §3, §4.4, glossary "staging
//! buffer").
//!
//! Allocated through the same injected
//! [`crate::runtime::StagingAllocator`] every other core allocation goes
//! through (spec §4.2, §6.2), never via a bare `Vec::with_capacity` — an
//! embedder on a fixed-pool system needs to actually see and bound this
//! allocation. Per the §9 design note this keeps an explicit logical window
//! into the capacity-bounded buffer instead of the original's repeated
//! whole-buffer `memmove`. Compaction (`drain_front`) still needs one
//! `copy_within` when it happens, but it happens only at the two points
//! spec §4.4 phase A calls for (terminator found; buffer full and rotated),
//! never per byte.

use crate::error::{HttpError, Result};

pub const DEFAULT_CAPACITY: usize = 256;

/// A context-owned accumulator used to accumulate response headers and to
/// hold body-prefix bytes that arrived in the same read as the header.
///
/// Backed by a single fixed-size allocation; `len` tracks how much of it is
/// valid data, always front-packed.
pub struct Staging {
    buf: Box<[u8]>,
    len: usize,
}

impl Staging {
    /// Wraps an already-allocated, capacity-sized buffer as an empty
    /// staging area. `buf` comes from
    /// [`crate::runtime::StagingAllocator::alloc`] — see
    /// `Connection::recv_checked`'s lazy allocation (spec §4.4: "lazily
    /// allocated on first recv").
    pub fn new(buf: Box<[u8]>) -> Result<Self> {
        if buf.is_empty() {
            return Err(HttpError::ResourceExhausted(
                "staging capacity must be non-zero",
            ));
        }
        Ok(Self { buf, len: 0 })
    }

    /// Allocates straight from the default allocator, bypassing any
    /// injected [`crate::runtime::StagingAllocator`]. Only for unit tests
    /// that exercise `Staging` on its own, without a `Runtime` to hand.
    #[cfg(test)]
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        use crate::runtime::{DefaultAllocator, StagingAllocator};
        let buf = DefaultAllocator
            .alloc(capacity)
            .ok_or(HttpError::ResourceExhausted("allocation failed"))?;
        Self::new(buf)
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Bytes of unused room. No reservation for a C-string null terminator
    /// is made (§9: "a reimplementation that uses byte-slice searches needs
    /// no such reservation").
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.len
    }

    /// Appends `data`, which must fit within `remaining()`.
    pub fn extend(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.remaining() {
            return Err(HttpError::BufferTooSmall("staging buffer has no room for this data"));
        }
        self.buf[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    /// Drops the first `n` bytes, shifting the remainder to the front in a
    /// single `copy_within`. `n` must be `<= len()`.
    pub fn drain_front(&mut self, n: usize) {
        debug_assert!(n <= self.len);
        let remaining = self.len - n;
        self.buf.copy_within(n..self.len, 0);
        self.len = remaining;
    }

    /// Copies up to `out.len()` bytes out of the front of the buffer and
    /// discards them, returning how many were copied. Used when delivering
    /// leftover body bytes straight out of staging (spec §4.4 phase B).
    pub fn take_into(&mut self, out: &mut [u8]) -> usize {
        let n = self.len.min(out.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        self.drain_front(n);
        n
    }

    /// Room available for a single transport read appended at the current
    /// end of the buffer.
    pub fn read_slot(&mut self) -> &mut [u8] {
        let start = self.len;
        &mut self.buf[start..]
    }

    /// Commits `n` bytes of a previous `read_slot()` call as real data.
    pub fn commit_read(&mut self, before_len: usize, n: usize) {
        self.len = before_len + n;
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_respects_capacity() {
        let mut s = Staging::with_capacity(4).unwrap();
        assert!(s.extend(b"abcd").is_ok());
        assert_eq!(s.remaining(), 0);
        assert!(s.extend(b"e").is_err());
    }

    #[test]
    fn drain_front_shifts_remainder() {
        let mut s = Staging::with_capacity(8).unwrap();
        s.extend(b"abcdef").unwrap();
        s.drain_front(2);
        assert_eq!(s.as_slice(), b"cdef");
        assert_eq!(s.len(), 4);
    }

    #[test]
    fn take_into_smaller_output_buffer() {
        let mut s = Staging::with_capacity(8).unwrap();
        s.extend(b"hello").unwrap();
        let mut out = [0u8; 2];
        let n = s.take_into(&mut out);
        assert_eq!(n, 2);
        assert_eq!(&out, b"he");
        assert_eq!(s.as_slice(), b"llo");
    }

    #[test]
    fn take_into_larger_output_buffer_drains_all() {
        let mut s = Staging::with_capacity(8).unwrap();
        s.extend(b"hi").unwrap();
        let mut out = [0u8; 8];
        let n = s.take_into(&mut out);
        assert_eq!(n, 2);
        assert!(s.is_empty());
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(Staging::with_capacity(0).is_err());
    }

    #[test]
    fn new_rejects_an_empty_allocator_buffer() {
        let buf: Box<[u8]> = Vec::new().into_boxed_slice();
        assert!(Staging::new(buf).is_err());
    }
}
