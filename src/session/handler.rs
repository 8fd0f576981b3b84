use bytes::Bytes;
use std::sync::Arc;

use super::Session;
use crate::errors::HandlerError;

// -----------------------------------------------------------------------------
// ----- SessionHandler --------------------------------------------------------

/// The protocol engine sitting on top of a session.
///
/// Callbacks run on the connection's execution context. `session_closed` is
/// called while the transport is still attached, so addresses and attributes
/// can be read, but work scheduled from it will not run.
pub trait SessionHandler: Send + Sync + 'static {
    fn session_created(&self, session: &Arc<Session>) -> Result<(), HandlerError>;

    fn session_closed(&self, session: &Arc<Session>) -> Result<(), HandlerError>;

    /// `message` is an owned copy; the transport reclaims its own buffer once
    /// this returns, whatever the outcome.
    fn message_received(&self, session: &Arc<Session>, message: Bytes) -> Result<(), HandlerError>;
}
