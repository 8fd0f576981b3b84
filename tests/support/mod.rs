use bytes::Bytes;
use iosession::{
    HandlerError, SendCompletion, Session, SessionHandler, SessionId, SessionService, Task,
    TransportContext,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const REMOTE_ADDR: &str = "10.0.0.2:52000";
pub const LOCAL_ADDR: &str = "10.0.0.1:2222";

const WAIT_LIMIT: Duration = Duration::from_secs(5);

// -----------------------------------------------------------------------------
// ----- RecordingTransport ----------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Send(Vec<u8>),
    FlushAndClose,
    Close,
}

/// Fake transport that records what the session asks of it, in order.
///
/// Sends complete after a short per-send delay. Close requests are confirmed
/// asynchronously by calling back into the attached session.
#[derive(Debug)]
pub struct RecordingTransport {
    events: Mutex<Vec<TransportEvent>>,
    sends: AtomicUsize,
    fixed_delay: Option<Duration>,
    failing_sends: Mutex<HashSet<usize>>,
    confirm_close: AtomicBool,
    session: Mutex<Weak<Session>>,
}

#[allow(dead_code)]
impl RecordingTransport {
    /// Completion delays vary per send (0..5ms) to shuffle completion timing.
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    pub fn with_fixed_delay(delay: Duration) -> Arc<Self> {
        Self::build(Some(delay))
    }

    fn build(fixed_delay: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            sends: AtomicUsize::new(0),
            fixed_delay,
            failing_sends: Mutex::new(HashSet::new()),
            confirm_close: AtomicBool::new(true),
            session: Mutex::new(Weak::new()),
        })
    }

    /// Attach `session` and fire its connection-active event.
    pub fn connect(self: &Arc<Self>, session: &Arc<Session>) {
        *self.session.lock() = Arc::downgrade(session);
        session.on_connection_active(self.clone());
    }

    /// Simulate the peer dropping the connection.
    pub fn disconnect(&self) {
        if let Some(session) = self.session.lock().upgrade() {
            session.on_connection_inactive();
        }
    }

    /// The zero-based `index`-th send completes with an error.
    pub fn fail_send(&self, index: usize) {
        self.failing_sends.lock().insert(index);
    }

    /// Leave close requests unconfirmed until `disconnect` is called.
    pub fn hold_close(&self) {
        self.confirm_close.store(false, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<TransportEvent> {
        self.events.lock().clone()
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TransportEvent::Send(buf) => Some(buf),
                _ => None,
            })
            .collect()
    }

    fn delay_for(&self, index: usize) -> Duration {
        self.fixed_delay
            .unwrap_or_else(|| Duration::from_millis(((index * 7) % 5) as u64))
    }

    fn record_close(&self, event: TransportEvent) {
        self.events.lock().push(event);

        if !self.confirm_close.load(Ordering::SeqCst) {
            return;
        }

        let session = self.session.lock().clone();
        tokio::spawn(async move {
            if let Some(session) = session.upgrade() {
                session.on_connection_inactive();
            }
        });
    }
}

impl TransportContext for RecordingTransport {
    fn execute(&self, task: Task) {
        tokio::spawn(task);
    }

    fn schedule(&self, task: Task, delay: Duration) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }

    fn send(&self, buf: Bytes) -> SendCompletion {
        let index = self.sends.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push(TransportEvent::Send(buf.to_vec()));

        let delay = self.delay_for(index);
        let fails = self.failing_sends.lock().contains(&index);
        let (done, completion) = oneshot::channel();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let res = if fails {
                Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    format!("send {index} failed"),
                ))
            } else {
                Ok(())
            };
            let _ = done.send(res);
        });

        completion
    }

    fn flush_and_close(&self) {
        self.record_close(TransportEvent::FlushAndClose);
    }

    fn close(&self) {
        self.record_close(TransportEvent::Close);
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        LOCAL_ADDR.parse().ok()
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        REMOTE_ADDR.parse().ok()
    }
}

// -----------------------------------------------------------------------------
// ----- RecordingHandler ------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerEvent {
    Created(SessionId),
    Message(SessionId, Vec<u8>),
    Closed {
        id: SessionId,
        local_addr: Option<SocketAddr>,
        still_registered: bool,
    },
}

#[derive(Debug, Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<HandlerEvent>>,
    fail_created: AtomicBool,
    fail_messages: AtomicBool,
    echo: AtomicBool,
}

#[allow(dead_code)]
impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Writes every received message straight back.
    pub fn echoing() -> Arc<Self> {
        let handler = Self::default();
        handler.echo.store(true, Ordering::SeqCst);
        Arc::new(handler)
    }

    pub fn fail_created(&self) {
        self.fail_created.store(true, Ordering::SeqCst);
    }

    pub fn fail_messages(&self) {
        self.fail_messages.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<HandlerEvent> {
        self.events.lock().clone()
    }

    pub fn count_closed(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, HandlerEvent::Closed { .. }))
            .count()
    }
}

impl SessionHandler for RecordingHandler {
    fn session_created(&self, session: &Arc<Session>) -> Result<(), HandlerError> {
        self.events.lock().push(HandlerEvent::Created(session.id()));

        if self.fail_created.load(Ordering::SeqCst) {
            return Err("session setup rejected".into());
        }

        Ok(())
    }

    fn session_closed(&self, session: &Arc<Session>) -> Result<(), HandlerError> {
        self.events.lock().push(HandlerEvent::Closed {
            id: session.id(),
            local_addr: session.local_addr(),
            still_registered: session.service().contains(session.id()),
        });
        Ok(())
    }

    fn message_received(
        &self,
        session: &Arc<Session>,
        message: Bytes,
    ) -> Result<(), HandlerError> {
        if message.as_ref() == b"panic" {
            panic!("handler blew up");
        }

        self.events
            .lock()
            .push(HandlerEvent::Message(session.id(), message.to_vec()));

        if self.fail_messages.load(Ordering::SeqCst) {
            return Err("malformed packet".into());
        }

        if self.echo.load(Ordering::SeqCst) {
            let _ = session.write(&message);
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

/// A fresh service with one session attached to a recording transport.
#[allow(dead_code)]
pub fn connected_session(
    transport: &Arc<RecordingTransport>,
) -> (Arc<SessionService>, Arc<RecordingHandler>, Arc<Session>) {
    let service = SessionService::new();
    let handler = RecordingHandler::new();
    let session = Session::new(&service, handler.clone());
    transport.connect(&session);
    (service, handler, session)
}

/// Await `fut`, failing the test if it takes unreasonably long.
#[allow(dead_code)]
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(WAIT_LIMIT, fut)
        .await
        .expect("timed out waiting on future")
}

/// Poll `cond` until it holds.
#[allow(dead_code)]
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    within(async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
}
