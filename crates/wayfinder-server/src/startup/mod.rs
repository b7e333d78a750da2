//! Launcher startup: logging and shutdown

pub mod logging;
pub mod shutdown;

pub use logging::{LoggingConfig, LoggingGuard, init_logging};
pub use shutdown::{ShutdownSignal, close_with_timeout, listen_for_shutdown_signal};
