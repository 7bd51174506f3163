//! Client for the cachet forward-private encrypted index.
//!
//! The client owns all secrets: a durable table mapping each keyword to the
//! head of its encrypted chain, and (transitively, through the chain) every
//! per-file key. The server referenced through
//! [`cachet_core::IndexStore`] sees only opaque rows.
//!
//! Forward privacy comes from one rule enforced here: every index entry is
//! sealed under a *fresh random* key, never one derived from the keyword,
//! the document, or any earlier key. Having watched every past search, the
//! server still cannot tell which keyword a new update belongs to.

pub mod client;
pub mod node;
pub mod state;

pub use client::{ChainFault, Client, DocEntry, SearchOutcome};
pub use node::ChainNode;
pub use state::HeadTable;
