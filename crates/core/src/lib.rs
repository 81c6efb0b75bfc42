//! Domain types for the virtual try-on client.
//!
//! Media validation and encoding, the job model, and the shared error
//! types. Nothing in this crate talks to the network.

pub mod error;
pub mod job;
pub mod media;
pub mod types;
