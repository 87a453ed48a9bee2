//! Bridge error.

use maya_bridge_command::BuildError;
use maya_bridge_core::{ConfigError, Language, TransportError};
use maya_bridge_transport::ListenerError;

/// Bridge error.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Command error: {0}")]
    Build(#[from] BuildError),
    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),
    #[error("Settings error: {0}")]
    Config(#[from] ConfigError),
    #[error("No Maya host configured for {} commands", .0.name())]
    ConfigurationUnavailable(Language),
}
