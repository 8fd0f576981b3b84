use std::path::PathBuf;
use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- HandlerError ----------------------------------------------------------

/// Opaque failure raised by a protocol handler callback.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

// -----------------------------------------------------------------------------
// ----- SessionError ----------------------------------------------------------

#[derive(Debug, Error)]
pub enum SessionError {
    /// The session has no live transport (never activated, or torn down).
    #[error("session is not connected")]
    NotConnected,

    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handler error: {0}")]
    Handler(#[source] HandlerError),
}

impl SessionError {
    pub fn is_not_connected(&self) -> bool {
        matches!(self, SessionError::NotConnected)
    }
}

// -----------------------------------------------------------------------------
// ----- ConfigError -----------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("toml parse error: {source}")]
    Toml {
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
