pub mod attributes;
pub mod completion;
pub mod handler;
pub mod session;
pub mod state;

pub use attributes::AttributeValue;
pub use completion::{CloseFuture, WriteFuture};
pub use handler::SessionHandler;
pub use session::{Session, SessionId};
pub use state::SessionState;
