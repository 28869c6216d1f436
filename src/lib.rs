//! An embeddable HTTP/1.x client protocol core.
//!
//! This crate implements the wire mechanics of an HTTP/1.x request/response
//! cycle — building a request message into a caller-owned buffer, sending
//! it over an injected [`transport::Transport`], and decoding a response
//! (identity or chunked framing) into caller-owned buffers of whatever size
//! the caller chooses to offer on each call. It does not resolve URLs
//! beyond host/port, does not implement TLS itself, and does not manage a
//! connection pool; those are left to the embedder.
//!
//! The pieces:
//!
//! - [`request`] builds a request message in place in a fixed buffer.
//! - [`transport`] is the pluggable byte-stream capability every
//!   connection is built on.
//! - [`staging`] is the fixed-capacity buffer the receiver accumulates
//!   header bytes into.
//! - [`connection`] and [`receiver`] together are the connection context
//!   and its receive state machine.
//! - [`runtime`] wires a [`transport::Transport`] (and, optionally, a
//!   staging allocator) into a [`runtime::Runtime`] that connections borrow.
//! - [`c_api`] is the C-ABI surface for embedding this core from C.

pub mod c_api;
pub mod connection;
pub mod error;
pub mod flags;
pub mod receiver;
pub mod request;
pub mod runtime;
pub mod staging;
pub mod transport;

pub use connection::{Connection, HttpConfig, HttpConfigBuilder, Timeouts};
pub use error::{HttpError, Result, Status};
pub use request::{get_property, HttpVersion, Method, RequestBuilder};
pub use runtime::{set_memory_interface, set_transport, Runtime, StagingAllocator};
pub use transport::{Deadline, Handle, TcpTransport, Transport};
