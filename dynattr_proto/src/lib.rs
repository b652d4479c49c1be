//! Protocol bindings for the dynamic attribute engine.
//!
//! These are the serde types exchanged with the platform backend: attribute
//! descriptors and their content, callback declarations, and the collected
//! payload the console submits. Consumers outside the engine should only ever
//! need these types plus the engine's public handle.

#![deny(warnings)]
#![warn(unused_extern_crates)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod attribute;
pub mod callback;
pub mod error;
