pub mod daemon;
pub mod logging;
pub mod runtime;
pub mod server;
pub mod types;
mod validate;

pub use daemon::OrchdConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use runtime::RuntimeConfig;
pub use server::ServerConfig;
pub use types::HumanDuration;
