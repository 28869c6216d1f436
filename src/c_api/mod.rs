//! The C-ABI surface.
//!
//! Every function here is a thin wrapper: argument validation and
//! pointer/slice reconstruction only, with the real behavior living in
//! `connection`, `receiver`, `request`, and `runtime`. Connections created
//! through this surface are built on [`runtime::GlobalTransport`], so
//! `httpcore_set_transport` is how a C embedder supplies its own transport
//! — there is no C-facing equivalent of `Runtime::new`, since a generic
//! Rust type parameter has no C representation.
//!
//! The request builder functions don't hold a live `RequestBuilder` across
//! calls; C can't hold a Rust borrow, so each call reconstructs one over
//! the caller's buffer using the length the caller passes in and writes
//! back out.

use crate::connection::Connection as CoreConnection;
use crate::error::{HttpError, Result as TransportResult, Status};
use crate::request::{self, HttpVersion, Method, RequestBuilder};
use crate::runtime::{self, GlobalTransport};
use crate::transport::{Deadline, Handle, Transport};
use libc::{c_char, size_t};
use std::ffi::CStr;
use std::slice;

fn status_of<T>(result: Result<T, HttpError>) -> Status {
    match result {
        Ok(_) => Status::Ok,
        Err(e) => e.status(),
    }
}

unsafe fn cstr_to_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

// --- Transport injection ----------------------------------------------

/// The C-facing transport capability: one function pointer per
/// `Transport` operation, mirroring spec §9's "process-wide injected
/// capability, analogous to a C open/close/read/write interface" shape.
/// A `None` function pointer in any slot is a configuration error; calls
/// against it fail with `HTTPCORE_STATUS_PROTOCOL_STATE`.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct HttpcoreTransportVtable {
    pub open: Option<
        extern "C" fn(
            host: *const c_char,
            port: u16,
            use_tls: bool,
            timeout_ms: u64,
            out_handle: *mut u64,
        ) -> Status,
    >,
    pub close: Option<extern "C" fn(handle: u64, timeout_ms: u64) -> Status>,
    pub read: Option<
        extern "C" fn(
            handle: u64,
            out: *mut u8,
            out_cap: size_t,
            timeout_ms: u64,
            out_len: *mut size_t,
        ) -> Status,
    >,
    pub write: Option<
        extern "C" fn(
            handle: u64,
            data: *const u8,
            data_len: size_t,
            timeout_ms: u64,
            out_len: *mut size_t,
        ) -> Status,
    >,
}

fn deadline_ms(deadline: Deadline) -> u64 {
    deadline
        .duration(std::time::Duration::from_millis(0))
        .as_millis() as u64
}

impl Transport for HttpcoreTransportVtable {
    fn open(&self, host: &str, port: u16, use_tls: bool, deadline: Deadline) -> TransportResult<Handle> {
        let f = self
            .open
            .ok_or(HttpError::ProtocolState("transport vtable has no open"))?;
        let chost = std::ffi::CString::new(host)
            .map_err(|_| HttpError::Malformed("host contains an interior NUL"))?;
        let mut out_handle: u64 = 0;
        let status = f(chost.as_ptr(), port, use_tls, deadline_ms(deadline), &mut out_handle);
        if status == Status::Ok {
            Ok(Handle(out_handle))
        } else {
            Err(HttpError::Transport("vtable open failed"))
        }
    }

    fn close(&self, handle: Handle, deadline: Deadline) -> TransportResult<()> {
        let f = self
            .close
            .ok_or(HttpError::ProtocolState("transport vtable has no close"))?;
        let status = f(handle.0, deadline_ms(deadline));
        if status == Status::Ok {
            Ok(())
        } else {
            Err(HttpError::Transport("vtable close failed"))
        }
    }

    fn read(&self, handle: Handle, out: &mut [u8], deadline: Deadline) -> TransportResult<usize> {
        let f = self
            .read
            .ok_or(HttpError::ProtocolState("transport vtable has no read"))?;
        let mut out_len: size_t = 0;
        let status = f(
            handle.0,
            out.as_mut_ptr(),
            out.len(),
            deadline_ms(deadline),
            &mut out_len,
        );
        if status == Status::Ok {
            Ok(out_len)
        } else {
            Err(HttpError::Transport("vtable read failed"))
        }
    }

    fn write(&self, handle: Handle, data: &[u8], deadline: Deadline) -> TransportResult<usize> {
        let f = self
            .write
            .ok_or(HttpError::ProtocolState("transport vtable has no write"))?;
        let mut out_len: size_t = 0;
        let status = f(
            handle.0,
            data.as_ptr(),
            data.len(),
            deadline_ms(deadline),
            &mut out_len,
        );
        if status == Status::Ok {
            Ok(out_len)
        } else {
            Err(HttpError::Transport("vtable write failed"))
        }
    }
}

/// Installs the process-wide transport used by every connection created
/// afterwards through this C API (spec §4.2). Has no effect on connections
/// already open.
#[no_mangle]
pub extern "C" fn httpcore_set_transport(vtable: HttpcoreTransportVtable) -> Status {
    runtime::set_transport(vtable);
    Status::Ok
}

// --- Connection lifecycle -----------------------------------------------

/// Opaque connection context handle.
pub struct HttpcoreConnection {
    inner: CoreConnection<'static, GlobalTransport>,
}

/// Allocates a new, not-yet-connected connection context.
#[no_mangle]
pub extern "C" fn httpcore_connection_new() -> *mut HttpcoreConnection {
    let conn = Box::new(HttpcoreConnection {
        inner: CoreConnection::new(runtime::global_runtime()),
    });
    Box::into_raw(conn)
}

/// Releases a connection context. `conn` must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn httpcore_connection_free(conn: *mut HttpcoreConnection) {
    if !conn.is_null() {
        drop(Box::from_raw(conn));
    }
}

/// Opens the connection. `host` must be a NUL-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn httpcore_connection_connect(
    conn: *mut HttpcoreConnection,
    host: *const c_char,
    port: u16,
    use_tls: bool,
) -> Status {
    let conn = match conn.as_mut() {
        Some(c) => c,
        None => return Status::ProtocolState,
    };
    let host = match cstr_to_str(host) {
        Some(h) => h,
        None => return Status::Malformed,
    };
    status_of(conn.inner.connect(host, port, use_tls))
}

/// Closes the connection. With `force = true`, any transport error while
/// closing is suppressed.
#[no_mangle]
pub unsafe extern "C" fn httpcore_connection_disconnect(
    conn: *mut HttpcoreConnection,
    force: bool,
) -> Status {
    let conn = match conn.as_mut() {
        Some(c) => c,
        None => return Status::ProtocolState,
    };
    status_of(conn.inner.disconnect(force))
}

#[no_mangle]
pub unsafe extern "C" fn httpcore_connection_is_connected(conn: *const HttpcoreConnection) -> bool {
    match conn.as_ref() {
        Some(c) => c.inner.is_connected(),
        None => false,
    }
}

/// Sends `len` bytes from `data`.
#[no_mangle]
pub unsafe extern "C" fn httpcore_connection_send(
    conn: *mut HttpcoreConnection,
    data: *const u8,
    len: size_t,
) -> Status {
    let conn = match conn.as_mut() {
        Some(c) => c,
        None => return Status::ProtocolState,
    };
    if data.is_null() && len > 0 {
        return Status::Malformed;
    }
    let slice = if len == 0 { &[] } else { slice::from_raw_parts(data, len) };
    status_of(conn.inner.send(slice))
}

/// Receives up to `out_cap` bytes into `out`, writing the number of bytes
/// actually produced to `*out_len`. Per spec §7, a transport or protocol
/// error is reported as `*out_len = 0` with a non-`HTTPCORE_STATUS_OK`
/// return; a response that has simply ended also reports `*out_len = 0`
/// but returns `HTTPCORE_STATUS_OK` — callers distinguish the two by the
/// status code.
#[no_mangle]
pub unsafe extern "C" fn httpcore_connection_recv(
    conn: *mut HttpcoreConnection,
    out: *mut u8,
    out_cap: size_t,
    out_len: *mut size_t,
) -> Status {
    let conn = match conn.as_mut() {
        Some(c) => c,
        None => return Status::ProtocolState,
    };
    if out.is_null() || out_len.is_null() {
        return Status::Malformed;
    }
    let buf = slice::from_raw_parts_mut(out, out_cap);
    match conn.inner.recv_checked(buf) {
        Ok(n) => {
            *out_len = n;
            Status::Ok
        }
        Err(e) => {
            *out_len = 0;
            e.status()
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn httpcore_connection_content_length(conn: *const HttpcoreConnection) -> size_t {
    match conn.as_ref() {
        Some(c) => c.inner.content_length(),
        None => 0,
    }
}

#[no_mangle]
pub unsafe extern "C" fn httpcore_connection_last_error(conn: *const HttpcoreConnection) -> Status {
    match conn.as_ref().and_then(|c| c.inner.last_error()) {
        Some(e) => e.status(),
        None => Status::Ok,
    }
}

#[no_mangle]
pub unsafe extern "C" fn httpcore_connection_set_connect_timeout_ms(
    conn: *mut HttpcoreConnection,
    ms: u64,
) {
    if let Some(c) = conn.as_mut() {
        c.inner.timeouts.connect = Deadline::from_millis(ms);
    }
}

#[no_mangle]
pub unsafe extern "C" fn httpcore_connection_set_send_timeout_ms(conn: *mut HttpcoreConnection, ms: u64) {
    if let Some(c) = conn.as_mut() {
        c.inner.timeouts.send = Deadline::from_millis(ms);
    }
}

#[no_mangle]
pub unsafe extern "C" fn httpcore_connection_set_recv_timeout_ms(conn: *mut HttpcoreConnection, ms: u64) {
    if let Some(c) = conn.as_mut() {
        c.inner.timeouts.recv = Deadline::from_millis(ms);
    }
}

// --- Request builder ------------------------------------------------------

/// Writes `METHOD site HTTP/version\r\n` into `buf` and reports the
/// written length in `*out_len`.
#[no_mangle]
pub unsafe extern "C" fn httpcore_request_init(
    buf: *mut u8,
    buf_cap: size_t,
    method: Method,
    site: *const c_char,
    version: HttpVersion,
    out_len: *mut size_t,
) -> Status {
    if buf.is_null() || out_len.is_null() {
        return Status::Malformed;
    }
    let site = match cstr_to_str(site) {
        Some(s) => s,
        None => return Status::Malformed,
    };
    let slice = slice::from_raw_parts_mut(buf, buf_cap);
    let mut rb = RequestBuilder::new(slice);
    match rb.init(method, site, version) {
        Ok(n) => {
            *out_len = n;
            Status::Ok
        }
        Err(e) => e.status(),
    }
}

/// Sets (inserting or replacing) a header. `*len` is both the current
/// message length on entry and the updated length on a successful return.
#[no_mangle]
pub unsafe extern "C" fn httpcore_request_set_property(
    buf: *mut u8,
    buf_cap: size_t,
    len: *mut size_t,
    name: *const c_char,
    value: *const c_char,
) -> Status {
    if buf.is_null() || len.is_null() {
        return Status::Malformed;
    }
    let (name, value) = match (cstr_to_str(name), cstr_to_str(value)) {
        (Some(n), Some(v)) => (n, v),
        _ => return Status::Malformed,
    };
    let slice = slice::from_raw_parts_mut(buf, buf_cap);
    let mut rb = RequestBuilder::with_len(slice, *len);
    match rb.set_property(name, value) {
        Ok(()) => {
            *len = rb.len();
            Status::Ok
        }
        Err(e) => e.status(),
    }
}

/// Reads a header value. On success, `*out_ptr`/`*out_len` point into
/// `buf` itself — valid only as long as `buf` isn't modified or freed.
#[no_mangle]
pub unsafe extern "C" fn httpcore_request_get_property(
    buf: *const u8,
    len: size_t,
    name: *const c_char,
    out_ptr: *mut *const u8,
    out_len: *mut size_t,
) -> Status {
    if buf.is_null() || out_ptr.is_null() || out_len.is_null() {
        return Status::Malformed;
    }
    let name = match cstr_to_str(name) {
        Some(n) => n,
        None => return Status::Malformed,
    };
    let slice = slice::from_raw_parts(buf, len);
    match request::get_property(name, slice) {
        Ok(value) => {
            *out_ptr = value.as_ptr();
            *out_len = value.len();
            Status::Ok
        }
        Err(e) => e.status(),
    }
}

/// Ensures the header section ends in `\r\n\r\n`.
#[no_mangle]
pub unsafe extern "C" fn httpcore_request_complete(
    buf: *mut u8,
    buf_cap: size_t,
    len: *mut size_t,
) -> Status {
    if buf.is_null() || len.is_null() {
        return Status::Malformed;
    }
    let slice = slice::from_raw_parts_mut(buf, buf_cap);
    let mut rb = RequestBuilder::with_len(slice, *len);
    match rb.complete() {
        Ok(n) => {
            *len = n;
            Status::Ok
        }
        Err(e) => e.status(),
    }
}

/// Appends a NUL-terminated text body, inserting `Content-Length` first if
/// it isn't already present.
#[no_mangle]
pub unsafe extern "C" fn httpcore_request_set_body_text(
    buf: *mut u8,
    buf_cap: size_t,
    len: *mut size_t,
    body: *const c_char,
) -> Status {
    if buf.is_null() || len.is_null() {
        return Status::Malformed;
    }
    let body = match cstr_to_str(body) {
        Some(b) => b,
        None => return Status::Malformed,
    };
    let slice = slice::from_raw_parts_mut(buf, buf_cap);
    let mut rb = RequestBuilder::with_len(slice, *len);
    match rb.set_body_text(body) {
        Ok(n) => {
            *len = n;
            Status::Ok
        }
        Err(e) => e.status(),
    }
}

/// Appends a raw body of `data_len` bytes, always (re)writing
/// `Content-Length` to match.
#[no_mangle]
pub unsafe extern "C" fn httpcore_request_set_body_binary(
    buf: *mut u8,
    buf_cap: size_t,
    len: *mut size_t,
    data: *const u8,
    data_len: size_t,
) -> Status {
    if buf.is_null() || len.is_null() || (data.is_null() && data_len > 0) {
        return Status::Malformed;
    }
    let body = if data_len == 0 {
        &[]
    } else {
        slice::from_raw_parts(data, data_len)
    };
    let slice = slice::from_raw_parts_mut(buf, buf_cap);
    let mut rb = RequestBuilder::with_len(slice, *len);
    match rb.set_body_binary(body) {
        Ok(n) => {
            *len = n;
            Status::Ok
        }
        Err(e) => e.status(),
    }
}
