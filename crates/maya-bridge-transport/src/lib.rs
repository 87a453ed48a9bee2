//! Transport layer for the Maya bridge.
//!
//! Provides:
//! - Datagram protocol constants, stop tokens and message formatting
//! - `CommandClient` - short-lived TCP sends to Maya command ports
//! - `OutputListener` - background UDP receiver for streamed output
//! - `ConsolePublisher` - adaptive fragmenting publisher of console events

pub mod client;
pub mod listener;
pub mod protocol;
pub mod publisher;

pub use client::CommandClient;
pub use listener::{ListenerConfig, ListenerError, ListenerPhase, OutputListener};
pub use protocol::{MessageKind, StopToken, format_message};
pub use publisher::{
    AdaptiveSender, CallbackId, ConsoleBus, ConsolePublisher, DatagramTransport, MessageSource,
    PublishError,
};
