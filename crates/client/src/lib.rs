//! Try-on service client library.
//!
//! Provides the REST API wrapper, job submission, cancellable poll
//! sessions, and a controller that keeps one try-on run per UI context.

pub mod api;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod session;
