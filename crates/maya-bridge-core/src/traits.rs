//! Core traits for command delivery and user notification.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::Endpoint;

/// Command channel error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },
    #[error("Timed out connecting to {endpoint}")]
    Timeout { endpoint: Endpoint },
    #[error("Failed to write to {endpoint}: {source}")]
    Write {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },
    #[error("Timed out writing to {endpoint}")]
    WriteTimeout { endpoint: Endpoint },
}

impl TransportError {
    /// Endpoint the failed attempt was aimed at.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        match self {
            Self::Connect { endpoint, .. }
            | Self::Timeout { endpoint }
            | Self::Write { endpoint, .. }
            | Self::WriteTimeout { endpoint } => endpoint,
        }
    }
}

/// Trait for delivering raw command bytes to a remote command port.
#[async_trait]
pub trait CommandSender: Send + Sync {
    /// Deliver `payload` to `endpoint` over a short-lived connection.
    async fn send(&self, endpoint: &Endpoint, payload: &[u8]) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: CommandSender + ?Sized> CommandSender for Arc<T> {
    async fn send(&self, endpoint: &Endpoint, payload: &[u8]) -> Result<(), TransportError> {
        self.as_ref().send(endpoint, payload).await
    }
}

/// Trait for surfacing errors to the user.
///
/// Implement this trait to integrate with your editor's dialogs.
pub trait Notifier: Send + Sync {
    /// Show a blocking error message.
    fn error_message(&self, message: &str);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn error_message(&self, message: &str) {
        tracing::error!("{message}");
    }
}
