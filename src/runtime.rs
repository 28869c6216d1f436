//! The control surface's injection points (spec §4.2).
//!
//! Spec §4.2 describes a process-wide injected transport and allocator,
//! set once via `set_transport`/`set_memory_interface` before any
//! connection context is created. The §9 design note flags that shape as
//! awkward to test and recommends explicit construction instead. Both are
//! provided here: [`Runtime`] is the explicit, preferred object a caller
//! builds and threads through its own code; the `set_*` functions underneath
//! back a process-wide [`lazy_static`] default for callers porting the
//! historical global-setter API 1:1.

use crate::error::{HttpError, Result};
use crate::transport::{Deadline, Handle, TcpTransport, Transport};
use std::sync::RwLock;

/// The staging buffer allocator capability (spec §4.2, glossary "memory
/// interface"). Default behavior allocates from the global allocator; an
/// embedder on a fixed-pool system can supply a pool-backed one instead.
pub trait StagingAllocator: Send + Sync {
    fn alloc(&self, capacity: usize) -> Option<Box<[u8]>>;
}

/// Allocates from the global allocator, zero-initialized.
pub struct DefaultAllocator;

impl StagingAllocator for DefaultAllocator {
    fn alloc(&self, capacity: usize) -> Option<Box<[u8]>> {
        Some(vec![0u8; capacity].into_boxed_slice())
    }
}

/// An explicitly constructed runtime: a transport plus a staging allocator.
/// Create one per process (or per test) and borrow it from every
/// [`crate::connection::Connection`] built on top of it — this is the
/// preferred way to wire the core up in new code.
pub struct Runtime<T: Transport> {
    transport: T,
    allocator: Box<dyn StagingAllocator>,
}

impl<T: Transport> Runtime<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            allocator: Box::new(DefaultAllocator),
        }
    }

    pub fn with_allocator(transport: T, allocator: Box<dyn StagingAllocator>) -> Self {
        Self {
            transport,
            allocator,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn allocator(&self) -> &dyn StagingAllocator {
        self.allocator.as_ref()
    }
}

/// A type-erased transport used by the legacy process-wide globals, since
/// `lazy_static` needs a single concrete type to hold regardless of what
/// the embedder injects.
pub trait DynTransport: Send + Sync {
    fn open(&self, host: &str, port: u16, use_tls: bool, deadline: Deadline) -> Result<Handle>;
    fn close(&self, handle: Handle, deadline: Deadline) -> Result<()>;
    fn read(&self, handle: Handle, out: &mut [u8], deadline: Deadline) -> Result<usize>;
    fn write(&self, handle: Handle, data: &[u8], deadline: Deadline) -> Result<usize>;
}

impl<T: Transport + Send + Sync> DynTransport for T {
    fn open(&self, host: &str, port: u16, use_tls: bool, deadline: Deadline) -> Result<Handle> {
        Transport::open(self, host, port, use_tls, deadline)
    }
    fn close(&self, handle: Handle, deadline: Deadline) -> Result<()> {
        Transport::close(self, handle, deadline)
    }
    fn read(&self, handle: Handle, out: &mut [u8], deadline: Deadline) -> Result<usize> {
        Transport::read(self, handle, out, deadline)
    }
    fn write(&self, handle: Handle, data: &[u8], deadline: Deadline) -> Result<usize> {
        Transport::write(self, handle, data, deadline)
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_TRANSPORT: RwLock<Option<Box<dyn DynTransport>>> =
        RwLock::new(Some(Box::new(TcpTransport::new())));
    static ref GLOBAL_ALLOCATOR: RwLock<Box<dyn StagingAllocator>> =
        RwLock::new(Box::new(DefaultAllocator));
    static ref GLOBAL_RUNTIME: Runtime<GlobalTransport> =
        Runtime::with_allocator(GlobalTransport, Box::new(GlobalAllocator));
}

/// The runtime backing every connection created through the C API.
pub fn global_runtime() -> &'static Runtime<GlobalTransport> {
    &GLOBAL_RUNTIME
}

/// Installs the process-wide transport used by connections created through
/// the legacy global API. Spec §4.2: "installed once, before any
/// connection context is created"; installing a new one after contexts
/// already exist does not affect them, since they hold their own
/// [`Runtime`] reference.
pub fn set_transport<T: Transport + Send + Sync + 'static>(transport: T) {
    *GLOBAL_TRANSPORT.write().unwrap() = Some(Box::new(transport));
}

/// Installs the process-wide staging allocator used by the legacy global
/// API.
pub fn set_memory_interface<A: StagingAllocator + 'static>(allocator: A) {
    *GLOBAL_ALLOCATOR.write().unwrap() = Box::new(allocator);
}

pub(crate) fn with_global_transport<R>(f: impl FnOnce(&dyn DynTransport) -> R) -> Result<R> {
    let guard = GLOBAL_TRANSPORT.read().unwrap();
    match guard.as_ref() {
        Some(t) => Ok(f(t.as_ref())),
        None => Err(HttpError::ProtocolState("no transport installed")),
    }
}

/// A zero-sized [`StagingAllocator`] that forwards to whatever is currently
/// installed via [`set_memory_interface`], mirroring [`GlobalTransport`]
/// below. Without this, `GLOBAL_RUNTIME` would allocate its staging buffers
/// straight from [`DefaultAllocator`] and `set_memory_interface` would be
/// an observable no-op for every connection created through the C API.
struct GlobalAllocator;

impl StagingAllocator for GlobalAllocator {
    fn alloc(&self, capacity: usize) -> Option<Box<[u8]>> {
        GLOBAL_ALLOCATOR.read().unwrap().alloc(capacity)
    }
}

/// A zero-sized [`Transport`] that forwards every call to whatever is
/// currently installed via [`set_transport`]. This is what the C API's
/// connections are built on, since C callers only ever get to the core
/// through `set_transport`/`set_memory_interface`, never through an
/// explicit [`Runtime::new`].
#[derive(Default)]
pub struct GlobalTransport;

impl Transport for GlobalTransport {
    fn open(&self, host: &str, port: u16, use_tls: bool, deadline: Deadline) -> Result<Handle> {
        with_global_transport(|t| t.open(host, port, use_tls, deadline))?
    }
    fn close(&self, handle: Handle, deadline: Deadline) -> Result<()> {
        with_global_transport(|t| t.close(handle, deadline))?
    }
    fn read(&self, handle: Handle, out: &mut [u8], deadline: Deadline) -> Result<usize> {
        with_global_transport(|t| t.read(handle, out, deadline))?
    }
    fn write(&self, handle: Handle, data: &[u8], deadline: Deadline) -> Result<usize> {
        with_global_transport(|t| t.write(handle, data, deadline))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    #[test]
    fn runtime_exposes_injected_transport() {
        let runtime = Runtime::new(MockTransport::new());
        runtime.transport().push_read(b"hi");
        let mut out = [0u8; 2];
        let n = runtime
            .transport()
            .read(Handle(0), &mut out, Deadline::NONE)
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(&out, b"hi");
    }

    #[test]
    fn global_transport_defaults_to_tcp_transport() {
        with_global_transport(|_t| ()).unwrap();
    }

    struct FixedSizeAllocator;

    impl StagingAllocator for FixedSizeAllocator {
        fn alloc(&self, _capacity: usize) -> Option<Box<[u8]>> {
            Some(vec![0u8; 7].into_boxed_slice())
        }
    }

    #[test]
    fn set_memory_interface_is_observed_by_the_global_runtime() {
        set_memory_interface(FixedSizeAllocator);
        let buf = global_runtime().allocator().alloc(64).unwrap();
        assert_eq!(buf.len(), 7);
        set_memory_interface(DefaultAllocator);
    }
}
