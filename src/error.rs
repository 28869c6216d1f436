//! Error and status reporting.
//!
//! `Status` is the C-ABI-safe return code used at the `c_api` boundary,
//! mirroring the teacher's `HtpStatus` convention of a small `#[repr(i32)]`
//! enum with `OK = 0` and negative error variants. `HttpError` is the richer
//! Rust-side type callers of the safe API actually match on; every
//! `HttpError` maps to exactly one `Status` for the FFI layer.

use std::fmt;

/// C-ABI status code. Zero is success, negative values are failure.
///
/// cbindgen:rename-all=QualifiedScreamingSnakeCase
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Ok = 0,
    BufferTooSmall = -1,
    Malformed = -2,
    Transport = -3,
    ProtocolState = -4,
    ResourceExhausted = -5,
}

/// Error kinds surfaced by the core (spec §7).
#[derive(Debug, PartialEq, Eq)]
pub enum HttpError {
    /// The request builder couldn't fit new content, or the response
    /// staging buffer can't accommodate even a single header line.
    BufferTooSmall(&'static str),
    /// Missing property terminator, missing chunk-size terminator, or an
    /// unparseable hex chunk size.
    Malformed(&'static str),
    /// The underlying transport's `read`/`write`/`open`/`close` failed,
    /// timed out, or would have blocked past the deadline.
    Transport(&'static str),
    /// An operation was invoked in a state that forbids it (e.g. `recv`
    /// before any `send`, or `send` after `disconnect`).
    ProtocolState(&'static str),
    /// The injected allocator returned `None`.
    ResourceExhausted(&'static str),
}

impl HttpError {
    pub fn status(&self) -> Status {
        match self {
            HttpError::BufferTooSmall(_) => Status::BufferTooSmall,
            HttpError::Malformed(_) => Status::Malformed,
            HttpError::Transport(_) => Status::Transport,
            HttpError::ProtocolState(_) => Status::ProtocolState,
            HttpError::ResourceExhausted(_) => Status::ResourceExhausted,
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::BufferTooSmall(msg) => write!(f, "buffer too small: {}", msg),
            HttpError::Malformed(msg) => write!(f, "malformed message: {}", msg),
            HttpError::Transport(msg) => write!(f, "transport failure: {}", msg),
            HttpError::ProtocolState(msg) => write!(f, "protocol state violation: {}", msg),
            HttpError::ResourceExhausted(msg) => write!(f, "resource exhausted: {}", msg),
        }
    }
}

impl std::error::Error for HttpError {}

pub type Result<T> = std::result::Result<T, HttpError>;
