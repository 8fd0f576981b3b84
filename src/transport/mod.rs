//! Transport seam: the per-connection context a session drives.
//! Everything above this trait is transport-agnostic.

pub mod tcp;

use bytes::Bytes;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::oneshot;

pub use tcp::{TcpTransport, serve};

// -----------------------------------------------------------------------------
// ----- Types -----------------------------------------------------------------

/// A unit of work submitted to a connection's execution context.
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Resolves once the transport has written (or failed to write) one buffer.
/// A dropped sender means the transport went away before the send happened.
pub type SendCompletion = oneshot::Receiver<std::io::Result<()>>;

// -----------------------------------------------------------------------------
// ----- TransportContext ------------------------------------------------------

pub trait TransportContext: Send + Sync + 'static {
    /// Run `task` as soon as possible.
    fn execute(&self, task: Task);

    /// Run `task` once `delay` has elapsed.
    fn schedule(&self, task: Task, delay: Duration);

    /// Queue `buf` for transmission. An empty buffer is a pure flush.
    fn send(&self, buf: Bytes) -> SendCompletion;

    /// Close after everything already queued has been written.
    fn flush_and_close(&self);

    /// Close now, dropping anything still queued.
    fn close(&self);

    fn local_addr(&self) -> Option<SocketAddr>;

    fn remote_addr(&self) -> Option<SocketAddr>;
}
