use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, warn};

use super::attributes::{AttributeValue, Attributes};
use super::completion::{ChainLink, CloseFuture, WriteFuture};
use super::handler::SessionHandler;
use super::state::SessionState;
use crate::errors::SessionError;
use crate::service::SessionService;
use crate::transport::TransportContext;

// -----------------------------------------------------------------------------
// ----- SessionId -------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// -----------------------------------------------------------------------------
// ----- Session ---------------------------------------------------------------

/// One connection as seen by the protocol engine.
///
/// The transport drives the lifecycle through the `on_*` methods; the engine
/// writes, schedules work, stores attributes and requests closes.
pub struct Session {
    id: SessionId,
    service: Arc<SessionService>,
    handler: Arc<dyn SessionHandler>,

    link: Mutex<Link>,
    attributes: Mutex<Attributes>,

    closed: watch::Sender<bool>,
}

/// Connection-bound state. `transport` is only `Some` between activation and
/// the end of teardown.
struct Link {
    state: SessionState,
    transport: Option<Arc<dyn TransportContext>>,
    remote_addr: Option<SocketAddr>,

    /// Settles when the most recently issued write has been handled.
    tail: Option<ChainLink>,
}

impl Link {
    fn live_transport(&self) -> Option<Arc<dyn TransportContext>> {
        if self.state.is_connected() {
            self.transport.clone()
        } else {
            None
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Static -------------------------------------------------------

impl Session {
    pub fn new(service: &Arc<SessionService>, handler: Arc<dyn SessionHandler>) -> Arc<Self> {
        let (closed, _) = watch::channel(false);

        Arc::new(Self {
            id: service.next_session_id(),
            service: service.clone(),
            handler,
            link: Mutex::new(Link {
                state: SessionState::Created,
                transport: None,
                remote_addr: None,
                tail: None,
            }),
            attributes: Mutex::new(Attributes::default()),
            closed,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Transport Events ---------------------------------------------

impl Session {
    /// The connection is ready. Registers the session and notifies the handler.
    pub fn on_connection_active(self: &Arc<Self>, transport: Arc<dyn TransportContext>) {
        let remote_addr = {
            let mut link = self.link.lock();
            if link.state != SessionState::Created {
                warn!(session_id = %self.id, state = ?link.state, "connection activated twice; ignoring");
                return;
            }

            link.remote_addr = transport.remote_addr();
            link.transport = Some(transport);
            link.tail = Some(ChainLink::completed());
            link.state = SessionState::Active;
            link.remote_addr
        };

        self.service.register(self.clone());
        debug!(session_id = %self.id, remote = ?remote_addr, "session active");

        if let Err(e) = self.handler.session_created(self) {
            error!(session_id = %self.id, "session_created failed: {e}");
            self.close_immediately();
        }
    }

    /// The connection is gone, for whatever reason. Safe to call repeatedly.
    pub fn on_connection_inactive(self: &Arc<Self>) {
        let was_connected = {
            let mut link = self.link.lock();
            let previous = link.state;
            if previous == SessionState::Closed {
                return;
            }
            link.state = SessionState::Closed;
            previous.is_connected()
        };

        if was_connected {
            self.service.unregister(self.id);

            // Transport stays attached so the handler can still read addresses.
            if let Err(e) = self.handler.session_closed(self) {
                warn!(session_id = %self.id, "session_closed failed: {e}");
            }

            let mut link = self.link.lock();
            link.transport = None;
            link.tail = None;
        }

        self.closed.send_replace(true);
        debug!(session_id = %self.id, "session closed");
    }

    /// Hand an inbound chunk to the handler.
    ///
    /// The chunk is copied, and `chunk` is cleared on every exit path so the
    /// transport can reuse it.
    pub fn on_data_received(self: &Arc<Self>, chunk: &mut BytesMut) -> Result<(), SessionError> {
        let chunk = ReleaseOnDrop(chunk);

        if !self.state().is_connected() {
            return Err(SessionError::NotConnected);
        }

        let message = Bytes::copy_from_slice(&chunk.0[..]);

        self.handler
            .message_received(self, message)
            .map_err(SessionError::Handler)
    }

    /// Log a transport failure and drop the connection.
    pub fn on_transport_error(&self, cause: &(dyn std::error::Error + 'static)) {
        error!(session_id = %self.id, "transport error: {cause}");
        self.close_immediately();
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Writes -------------------------------------------------------

impl Session {
    /// Queue `payload` for transmission.
    ///
    /// Buffers reach the transport in the order `write` was called. Each send
    /// starts only after the previous one has completed, and a failed send
    /// does not stop the ones behind it.
    pub fn write(self: &Arc<Self>, payload: &[u8]) -> WriteFuture {
        let buf = Bytes::copy_from_slice(payload);
        let (result_tx, result_rx) = oneshot::channel();
        let (next_tx, next) = ChainLink::pending();

        let (transport, prev) = {
            let mut link = self.link.lock();
            let Some(transport) = link.live_transport() else {
                return WriteFuture::failed(SessionError::NotConnected);
            };
            let Some(prev) = link.tail.replace(next) else {
                return WriteFuture::failed(SessionError::NotConnected);
            };
            (transport, prev)
        };

        let session = self.clone();
        transport.execute(Box::pin(async move {
            prev.settled().await;

            let outcome = session.transmit(buf).await;
            let _ = next_tx.send(());

            if let Err(e) = &outcome {
                debug!(session_id = %session.id, "write failed: {e}");
            }
            let _ = result_tx.send(outcome);
        }));

        WriteFuture::new(result_rx)
    }

    async fn transmit(&self, buf: Bytes) -> Result<(), SessionError> {
        // Re-checked here: the connection may have dropped while we waited.
        let Some(transport) = self.live_transport() else {
            return Err(SessionError::NotConnected);
        };

        match transport.send(buf).await {
            Ok(res) => res.map_err(SessionError::from),
            Err(_) => Err(SessionError::NotConnected),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Close --------------------------------------------------------

impl Session {
    /// Flush every pending write, then close. Resolves once the transport has
    /// confirmed the connection closed.
    pub fn close_gracefully(self: &Arc<Self>) -> CloseFuture {
        let Some((_, SessionState::Active)) = self.begin_close() else {
            return self.close_future();
        };

        let flushed = self.write(&[]);
        let session = self.clone();

        if let Some(transport) = self.live_transport() {
            transport.execute(Box::pin(async move {
                if let Err(e) = flushed.await {
                    debug!(session_id = %session.id, "final flush failed: {e}");
                }
                if let Some(transport) = session.live_transport() {
                    transport.flush_and_close();
                }
            }));
        }

        self.close_future()
    }

    /// Close without draining pending writes.
    pub fn close_immediately(&self) -> CloseFuture {
        if let Some((transport, _)) = self.begin_close() {
            transport.close();
        }

        self.close_future()
    }

    pub fn close_future(&self) -> CloseFuture {
        CloseFuture::new(self.closed.subscribe())
    }

    /// Moves an active session to `Closing`. Returns the transport and the
    /// state before the call, or `None` when there is nothing to close.
    fn begin_close(&self) -> Option<(Arc<dyn TransportContext>, SessionState)> {
        let mut link = self.link.lock();
        let previous = link.state;

        match previous {
            SessionState::Created => {
                link.state = SessionState::Closed;
                drop(link);
                self.closed.send_replace(true);
                None
            }
            SessionState::Active | SessionState::Closing => {
                link.state = SessionState::Closing;
                link.transport.clone().map(|t| (t, previous))
            }
            SessionState::Closed => None,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Scheduling ---------------------------------------------------

impl Session {
    pub fn execute<F>(&self, task: F) -> Result<(), SessionError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let transport = self.live_transport().ok_or(SessionError::NotConnected)?;
        transport.execute(Box::pin(task));
        Ok(())
    }

    pub fn schedule<F>(&self, task: F, delay: Duration) -> Result<(), SessionError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let transport = self.live_transport().ok_or(SessionError::NotConnected)?;
        transport.schedule(Box::pin(task), delay);
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Attributes ---------------------------------------------------

impl Session {
    pub fn attribute(&self, key: &str) -> Option<AttributeValue> {
        self.attributes.lock().get(key)
    }

    /// Typed lookup; `None` when missing or stored as another type.
    pub fn attribute_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.attribute(key)?.downcast::<T>().ok()
    }

    pub fn set_attribute<V: Any + Send + Sync>(
        &self,
        key: impl Into<String>,
        value: V,
    ) -> Option<AttributeValue> {
        self.attributes.lock().insert(key.into(), Arc::new(value))
    }

    pub fn remove_attribute(&self, key: &str) -> Option<AttributeValue> {
        self.attributes.lock().remove(key)
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Accessors ----------------------------------------------------

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn service(&self) -> &Arc<SessionService> {
        &self.service
    }

    pub fn state(&self) -> SessionState {
        self.link.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Peer address captured at activation.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.link.lock().remote_addr
    }

    /// `None` once the transport has been released.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        let transport = self.link.lock().transport.clone()?;
        transport.local_addr()
    }

    fn live_transport(&self) -> Option<Arc<dyn TransportContext>> {
        self.link.lock().live_transport()
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Session {}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let link = self.link.lock();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &link.state)
            .field("remote_addr", &link.remote_addr)
            .field("attributes", &self.attributes.lock().len())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

/// Clears the borrowed transport buffer when dropped, panics included.
struct ReleaseOnDrop<'a>(&'a mut BytesMut);

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
