//! Virtual agent bridge core contracts and value types.
//!
//! This crate exposes the conversation envelope exchanged with the remote agent, the closed set
//! of response items it can emit, the decoder that classifies those items by their `uiType`
//! discriminator, and the immutable configuration shared by every bridge component.
pub mod config;
pub mod decode;
pub mod types;

pub use config::*;
pub use decode::*;
pub use types::*;
