//! HTTP request handlers.
//!
//! This module contains all HTTP handlers organized by domain.

pub mod books;
pub mod chapters;
pub mod health;
pub mod library;
pub mod websocket;

pub use health::{health_check, metrics};
