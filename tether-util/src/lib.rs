//! Shared primitives for the tether crates: device key derivation and
//! signing helpers, identifier newtypes and URI handling.

pub mod crypto;
pub mod http;
pub mod types;
