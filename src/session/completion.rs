use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{oneshot, watch};

use crate::errors::SessionError;

// -----------------------------------------------------------------------------
// ----- WriteFuture -----------------------------------------------------------

/// Outcome of a single `Session::write`.
///
/// Resolves once the transport reports the buffer written or failed. Dropping
/// it does not cancel the write.
#[derive(Debug)]
pub struct WriteFuture {
    rx: oneshot::Receiver<Result<(), SessionError>>,
}

impl WriteFuture {
    pub(crate) fn new(rx: oneshot::Receiver<Result<(), SessionError>>) -> Self {
        Self { rx }
    }

    pub(crate) fn failed(err: SessionError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self { rx }
    }
}

impl Future for WriteFuture {
    type Output = Result<(), SessionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the continuation never ran (runtime gone).
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(SessionError::NotConnected)))
    }
}

// -----------------------------------------------------------------------------
// ----- ChainLink -------------------------------------------------------------

/// One position in a session's write chain. The next write waits on it.
pub(crate) struct ChainLink {
    rx: oneshot::Receiver<()>,
}

impl ChainLink {
    pub(crate) fn pending() -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    pub(crate) fn completed() -> Self {
        let (tx, link) = Self::pending();
        let _ = tx.send(());
        link
    }

    /// Waits for the previous write to settle, whatever its outcome.
    pub(crate) async fn settled(self) {
        let _ = self.rx.await;
    }
}

impl std::fmt::Debug for ChainLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChainLink")
    }
}

// -----------------------------------------------------------------------------
// ----- CloseFuture -----------------------------------------------------------

/// Resolves once the transport has confirmed the session closed.
///
/// Cheap to clone; every clone observes the same signal.
#[derive(Debug, Clone)]
pub struct CloseFuture {
    rx: watch::Receiver<bool>,
}

impl CloseFuture {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    pub fn is_closed(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn wait(mut self) {
        // Err only if the session was dropped, which also means closed.
        let _ = self.rx.wait_for(|closed| *closed).await;
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
