//! Request builder (spec §4.1).
//!
//! Operates entirely in place on a caller-owned `&mut [u8]`: every method
//! either succeeds and leaves the buffer valid up to `len()`, or fails and
//! leaves the buffer exactly as it was. Nothing here allocates.
//!
//! `set_property`/`get_property` match header names line-by-line,
//! case-insensitively, anchored at line start and terminated by `:` — this
//! is the §9 redesign of the original's unanchored substring search (see
//! `SPEC_FULL.md` §4.1 and `DESIGN.md`).

use crate::error::{HttpError, Result};
use bstr::ByteSlice;

/// HTTP methods this builder can format a request line for (spec §4.1).
///
/// cbindgen:rename-all=QualifiedScreamingSnakeCase
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
}

impl Method {
    fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// HTTP versions this builder can format a request line for (spec §4.1).
///
/// cbindgen:rename-all=QualifiedScreamingSnakeCase
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HttpVersion {
    V1_0,
    V1_1,
}

impl HttpVersion {
    fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::V1_0 => "1.0",
            HttpVersion::V1_1 => "1.1",
        }
    }
}

/// Result of searching a byte buffer for a header line by name.
enum LineSearch {
    /// No line in the buffer starts with `name` followed by `:`.
    NotFound,
    /// A line starts with `name:` but the buffer ends before its
    /// terminating CRLF — it may still be in flight.
    Unterminated,
    /// A complete `name: value\r\n` line was found at `[line_start,
    /// line_end)`, with `line_end` pointing at the `\r` of its CRLF.
    Found { line_start: usize, line_end: usize },
}

/// Scans `buf` for a header line whose name (the token before `:`) matches
/// `name` case-insensitively. Stops at the first blank line (end of header
/// section), since nothing past it is a header.
fn find_header_line(buf: &[u8], name: &[u8]) -> LineSearch {
    let mut pos = 0;
    while pos <= buf.len() {
        let rest = &buf[pos..];
        match rest.find("\r\n") {
            Some(rel) => {
                let line_end = pos + rel;
                let line = &buf[pos..line_end];
                if line.is_empty() {
                    // Blank line: end of header section.
                    return LineSearch::NotFound;
                }
                if line_starts_with_name(line, name) {
                    return LineSearch::Found { line_start: pos, line_end };
                }
                pos = line_end + 2;
            }
            None => {
                if !rest.is_empty() && line_starts_with_name(rest, name) {
                    return LineSearch::Unterminated;
                }
                return LineSearch::NotFound;
            }
        }
    }
    LineSearch::NotFound
}

/// True if `line` begins with `name`, followed immediately by `:`,
/// compared case-insensitively.
fn line_starts_with_name(line: &[u8], name: &[u8]) -> bool {
    line.len() > name.len()
        && line[name.len()] == b':'
        && line[..name.len()].eq_ignore_ascii_case(name)
}

/// Extracts and trims the value portion of a `name: value` line, given the
/// line's byte range within `buf`.
fn extract_value(buf: &[u8], line_start: usize, line_end: usize, name_len: usize) -> &[u8] {
    let mut value_start = line_start + name_len + 1; // skip "name:"
    if buf.get(value_start) == Some(&b' ') {
        value_start += 1;
    }
    buf[value_start..line_end].trim()
}

/// Reads a header value from an arbitrary HTTP message (request or
/// response) by name. Distinguishes "absent" from "present but not yet
/// terminated by CRLF" so an incremental caller (the receiver's phase A
/// scanner) can tell a still-arriving header from one that will never
/// exist in this message.
pub fn get_property<'a>(name: &str, message: &'a [u8]) -> Result<&'a [u8]> {
    match find_header_line(message, name.as_bytes()) {
        LineSearch::NotFound => Err(HttpError::Malformed("property not found")),
        LineSearch::Unterminated => Err(HttpError::Malformed("property line not terminated")),
        LineSearch::Found { line_start, line_end } => {
            Ok(extract_value(message, line_start, line_end, name.len()))
        }
    }
}

/// In-place formatter for a single HTTP/1.x request message.
pub struct RequestBuilder<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Resumes formatting into `buf`, treating the first `len` bytes as
    /// already-written content. Used at the C API boundary, where each call
    /// gets a fresh slice over the caller's buffer and the in-progress
    /// length has to be threaded through explicitly rather than kept in a
    /// live Rust borrow between calls.
    pub fn with_len(buf: &'a mut [u8], len: usize) -> Self {
        Self { buf, len }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Writes a trailing NUL just past `len`, when there's room, satisfying
    /// spec §3's "always null-terminated" invariant for embedders that hand
    /// this buffer to C string functions. Never required for anything in
    /// this module, which only ever does byte-slice search.
    fn terminate(&mut self) {
        if self.len < self.buf.len() {
            self.buf[self.len] = 0;
        }
    }

    fn push(&mut self, data: &[u8]) -> Result<()> {
        if self.len + data.len() > self.buf.len() {
            return Err(HttpError::BufferTooSmall("request buffer exhausted"));
        }
        self.buf[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        self.terminate();
        Ok(())
    }

    /// Writes `METHOD SP site SP HTTP/version CRLF` at offset 0.
    pub fn init(&mut self, method: Method, site: &str, version: HttpVersion) -> Result<usize> {
        let line = format!("{} {} HTTP/{}\r\n", method.as_str(), site, version.as_str());
        let bytes = line.as_bytes();
        if bytes.len() > self.buf.len() {
            return Err(HttpError::BufferTooSmall("request buffer too small for start line"));
        }
        self.buf[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        self.terminate();
        Ok(self.len)
    }

    /// Sets (inserting or replacing) a header. A second call with the same
    /// `name` replaces the first value rather than duplicating the line.
    pub fn set_property(&mut self, name: &str, value: &str) -> Result<()> {
        let name_bytes = name.as_bytes();
        if let LineSearch::Found { line_start, line_end } = find_header_line(&self.buf[..self.len], name_bytes) {
            let remove_end = line_end + 2; // past the line's own CRLF
            let tail_len = self.len - remove_end;
            self.buf.copy_within(remove_end..self.len, line_start);
            self.len = line_start + tail_len;
        }

        // "name: value\r\n" plus two bytes reserved for the eventual
        // terminating CRLFCRLF (spec §4.1).
        let addition_len = name_bytes.len() + 2 + value.len() + 2;
        if self.len + addition_len + 2 > self.buf.len() {
            return Err(HttpError::BufferTooSmall("no room to add header"));
        }
        let start = self.len;
        self.buf[start..start + name_bytes.len()].copy_from_slice(name_bytes);
        let mut at = start + name_bytes.len();
        self.buf[at..at + 2].copy_from_slice(b": ");
        at += 2;
        self.buf[at..at + value.len()].copy_from_slice(value.as_bytes());
        at += value.len();
        self.buf[at..at + 2].copy_from_slice(b"\r\n");
        self.len = at + 2;
        self.terminate();
        Ok(())
    }

    pub fn get_property(&self, name: &str) -> Result<&[u8]> {
        get_property(name, self.as_bytes())
    }

    /// Ensures the header section ends in CRLF CRLF.
    pub fn complete(&mut self) -> Result<usize> {
        let buf = self.as_bytes();
        if buf.ends_with(b"\r\n\r\n") {
            return Ok(self.len);
        }
        if buf.ends_with(b"\r\n") {
            self.push(b"\r\n")?;
        } else {
            self.push(b"\r\n\r\n")?;
        }
        Ok(self.len)
    }

    /// Appends a text body, inserting a `Content-Length` header first if
    /// one isn't already present.
    pub fn set_body_text(&mut self, body: &str) -> Result<usize> {
        if matches!(
            find_header_line(&self.buf[..self.len], b"Content-Length"),
            LineSearch::NotFound
        ) {
            self.set_property("Content-Length", &body.len().to_string())?;
        }
        self.push(b"\r\n")?;
        self.push(body.as_bytes())?;
        Ok(self.len)
    }

    /// Appends a raw, possibly-binary body after completing the header
    /// section. Always (re)writes `Content-Length` to `data.len()`.
    pub fn set_body_binary(&mut self, data: &[u8]) -> Result<usize> {
        self.set_property("Content-Length", &data.len().to_string())?;
        self.complete()?;
        self.push(data)?;
        Ok(self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> Vec<u8> {
        vec![0u8; 256]
    }

    #[test]
    fn init_writes_request_line() {
        let mut buf = build();
        let mut rb = RequestBuilder::new(&mut buf);
        let n = rb.init(Method::Get, "/", HttpVersion::V1_1).unwrap();
        assert_eq!(&rb.as_bytes()[..n], b"GET / HTTP/1.1\r\n");
    }

    #[test]
    fn init_fails_when_too_small() {
        let mut buf = [0u8; 4];
        let mut rb = RequestBuilder::new(&mut buf);
        assert!(rb.init(Method::Get, "/", HttpVersion::V1_1).is_err());
    }

    #[test]
    fn set_property_then_get_property_round_trips() {
        let mut buf = build();
        let mut rb = RequestBuilder::new(&mut buf);
        rb.init(Method::Get, "/", HttpVersion::V1_1).unwrap();
        rb.set_property("Host", "example.com").unwrap();
        assert_eq!(rb.get_property("Host").unwrap(), b"example.com");
    }

    #[test]
    fn set_property_replaces_existing_value() {
        let mut buf = build();
        let mut rb = RequestBuilder::new(&mut buf);
        rb.init(Method::Get, "/", HttpVersion::V1_1).unwrap();
        rb.set_property("Host", "first.example").unwrap();
        rb.set_property("Host", "second.example").unwrap();
        assert_eq!(rb.get_property("Host").unwrap(), b"second.example");
        // Exactly one Host line should remain.
        let occurrences = rb.as_bytes().windows(5).filter(|w| w.eq_ignore_ascii_case(b"Host:")).count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn set_property_does_not_prefix_match() {
        let mut buf = build();
        let mut rb = RequestBuilder::new(&mut buf);
        rb.init(Method::Get, "/", HttpVersion::V1_1).unwrap();
        rb.set_property("Content-Length", "5").unwrap();
        rb.set_property("Content-Length-Something", "9").unwrap();
        assert_eq!(rb.get_property("Content-Length").unwrap(), b"5");
        assert_eq!(rb.get_property("Content-Length-Something").unwrap(), b"9");
    }

    #[test]
    fn complete_is_idempotent() {
        let mut buf = build();
        let mut rb = RequestBuilder::new(&mut buf);
        rb.init(Method::Get, "/", HttpVersion::V1_1).unwrap();
        rb.set_property("Host", "h").unwrap();
        let first = rb.complete().unwrap();
        let second = rb.complete().unwrap();
        assert_eq!(first, second);
        assert!(rb.as_bytes().ends_with(b"\r\n\r\n"));
    }

    #[test]
    fn complete_appends_single_crlf_when_one_present() {
        let mut buf = build();
        let mut rb = RequestBuilder::new(&mut buf);
        rb.init(Method::Get, "/", HttpVersion::V1_1).unwrap();
        rb.complete().unwrap();
        assert!(rb.as_bytes().ends_with(b"\r\n\r\n"));
    }

    #[test]
    fn set_body_text_inserts_content_length() {
        let mut buf = build();
        let mut rb = RequestBuilder::new(&mut buf);
        rb.init(Method::Post, "/", HttpVersion::V1_1).unwrap();
        rb.set_property("Host", "h").unwrap();
        rb.set_body_text("hello").unwrap();
        assert_eq!(rb.get_property("Content-Length").unwrap(), b"5");
        assert!(rb.as_bytes().ends_with(b"\r\n\r\nhello"));
    }

    #[test]
    fn set_body_binary_handles_nul_bytes() {
        let mut buf = build();
        let mut rb = RequestBuilder::new(&mut buf);
        rb.init(Method::Post, "/", HttpVersion::V1_1).unwrap();
        let data = [0u8, 1, 2, 0, 3];
        let n = rb.set_body_binary(&data).unwrap();
        assert_eq!(&rb.as_bytes()[n - 5..n], &data);
        assert_eq!(rb.get_property("Content-Length").unwrap(), b"5");
    }

    #[test]
    fn get_property_on_incomplete_line_is_distinct_from_missing() {
        let msg = b"GET / HTTP/1.1\r\nHost: exam";
        match get_property("Host", msg) {
            Err(HttpError::Malformed(m)) => assert!(m.contains("not terminated")),
            other => panic!("expected unterminated error, got {:?}", other),
        }
        match get_property("Accept", msg) {
            Err(HttpError::Malformed(m)) => assert!(m.contains("not found")),
            other => panic!("expected not-found error, got {:?}", other),
        }
    }
}
