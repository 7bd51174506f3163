//! Shared contracts for the cachet forward-private encrypted index.
//!
//! The client derives every storage address from a fresh random key that the
//! server never sees; the server holds a flat pile of opaque rows and cannot
//! group, predict, or correlate them. This crate defines the pieces both
//! sides agree on: the error type, the typed byte identifiers, the AEAD and
//! MAC primitives, and the [`IndexStore`] interface the server implements.

pub mod crypto;
pub mod error;
pub mod traits;
pub mod types;

pub use error::*;
pub use traits::*;
pub use types::*;
