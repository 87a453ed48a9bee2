//! Core abstractions for the Maya remote execution bridge.
//!
//! This crate provides the fundamental building blocks:
//! - `Endpoint` - Host/port pair of a remote command port
//! - `Language` / `ExecutionMode` - What is being sent and how it runs
//! - `BridgeSettings` - Configuration surface and its sources
//! - `CommandSender` and `Notifier` traits

pub mod endpoint;
pub mod language;
pub mod settings;
pub mod traits;

pub use endpoint::Endpoint;
pub use language::{ExecutionMode, Language};
pub use settings::{BridgeSettings, ConfigError, JsonSettingsFile, SettingsSource, StaticSettings};
pub use traits::{CommandSender, LogNotifier, Notifier, TransportError};
