//! Logging utilities.
//!
//! The engine logs through the `log` facade. `init_logging` installs an
//! `env_logger` backend once, early in `main`.

mod init;

pub use init::{init_logging, LoggingConfig};
