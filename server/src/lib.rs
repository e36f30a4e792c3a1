//! Bookshelf engagement server.
//!
//! Wires configuration, the `PostgreSQL` stores, the in-process broadcaster
//! and the HTTP surface together. The binary in `main.rs` only loads the
//! environment, installs logging and calls [`run`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod config;

pub use app::run;
pub use config::{Config, ConfigError};
