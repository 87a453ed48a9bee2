//! Session orchestration for the Maya bridge.
//!
//! Provides:
//! - `BridgeContext` - Process-wide settings cache and current listener
//! - `CommandDispatcher` - Sends commands under an explicit failure policy
//! - `set_streaming_enabled` - Output streaming lifecycle
//! - `Bridge` - Editor entry points

pub mod bridge;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod streaming;

pub use bridge::{Bridge, Dispatch, Document};
pub use context::BridgeContext;
pub use dispatcher::{CommandDispatcher, FailurePolicy, SendOutcome};
pub use error::BridgeError;
pub use streaming::set_streaming_enabled;

#[cfg(test)]
pub(crate) mod testing;
