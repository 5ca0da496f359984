//! Common types shared across memflush crates.
//!
//! This crate holds the buffered [`Turn`] record, the user/assistant pairing
//! rule used when submitting turns to durable storage, and the shared error
//! type.

pub mod error;
pub mod turn;

pub use error::{MemflushError, Result};
pub use turn::{Turn, TurnPair, TurnRole, conversation_id, pair_turns};
