pub mod config;
pub mod types;

pub use config::TransportConfig;
pub use types::LogLevel;
