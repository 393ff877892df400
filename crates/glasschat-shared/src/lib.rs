//! # glasschat-shared
//!
//! Domain types shared by every GlassChat crate.
//!
//! The structs here mirror the conversation store's documents field for
//! field: serde rename attributes pin the exact names the existing data
//! uses (`userOnline`, `activeCall`, `replyToId`, ...), so a snapshot
//! round-trips byte-compatible with what other clients read and write.

pub mod constants;
pub mod types;

pub use types::*;
