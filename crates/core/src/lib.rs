//! Shared domain types for the Postbox notification pipeline.
//!
//! Zero internal dependencies: every other workspace crate builds on
//! these types.

pub mod error;
pub mod payload;
pub mod types;

pub use error::CoreError;
pub use payload::{GlobalVars, NotificationPayload};
pub use types::EventTag;
