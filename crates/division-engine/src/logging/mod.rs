//! Logger initialization.
//!
//! The engine logs through the `log` facade; `init_logging` installs
//! `env_logger` as the backend for binaries that want one.

mod init;

pub use init::{DEFAULT_FILTER, LoggingConfig, init_logging};
