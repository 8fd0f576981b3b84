pub mod config;
pub mod errors;
pub mod service;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use config::{LogLevel, TransportConfig};
pub use errors::{ConfigError, HandlerError, SessionError};
pub use service::SessionService;
pub use session::{
    AttributeValue, CloseFuture, Session, SessionHandler, SessionId, SessionState, WriteFuture,
};
pub use transport::{SendCompletion, Task, TcpTransport, TransportContext};
