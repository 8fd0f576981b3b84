/// Lifecycle of a session, driven by transport connection events.
///
/// Only `Created -> Active` and `Active | Closing -> Closed` are caused by the
/// transport. Application code can move an active session to `Closing` by
/// requesting a close; the transport confirms it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, not yet attached to a live connection or registered.
    Created,

    /// Attached to a live connection and registered with the service.
    Active,

    /// A graceful or immediate close was requested; writes may still flush.
    Closing,

    /// Connection torn down, unregistered, transport released.
    Closed,
}

impl SessionState {
    /// True while the session holds a transport.
    pub fn is_connected(self) -> bool {
        matches!(self, SessionState::Active | SessionState::Closing)
    }
}
