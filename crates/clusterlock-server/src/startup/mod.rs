//! Application startup utilities module.
//!
//! Logging bootstrap, record store selection and signal handling for the
//! clusterlock binary.

mod logging;
mod shutdown;
mod storage;

pub use logging::{LogRotation, LoggingConfig, LoggingGuard, ROOT_LOG_FILE, init_logging};
pub use shutdown::{ShutdownSignal, run_with_timeout, wait_for_shutdown_signal};
pub use storage::record_store;
