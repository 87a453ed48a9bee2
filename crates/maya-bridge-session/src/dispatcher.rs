//! Command dispatch with an explicit failure policy.

use std::sync::Arc;

use maya_bridge_command::WireCommand;
use maya_bridge_core::{CommandSender, Notifier, TransportError};

use crate::{context::BridgeContext, error::BridgeError};

/// What happens when a command cannot be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Notify the user, then return the error. Used for user-initiated sends.
    Surface,
    /// Log and return the error without notifying.
    Propagate,
    /// Log and report [`SendOutcome::Suppressed`].
    Suppress,
}

/// Result of a dispatch that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Bytes written and the connection closed.
    Delivered,
    /// Delivery failed under [`FailurePolicy::Suppress`].
    Suppressed,
}

impl SendOutcome {
    /// Whether the command reached the command port.
    #[must_use]
    pub const fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Sends wire commands to the command port of their language.
pub struct CommandDispatcher<C: CommandSender> {
    sender: C,
    notifier: Arc<dyn Notifier>,
}

impl<C: CommandSender> CommandDispatcher<C> {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(sender: C, notifier: Arc<dyn Notifier>) -> Self {
        Self { sender, notifier }
    }

    /// Underlying sender.
    #[must_use]
    pub const fn sender(&self) -> &C {
        &self.sender
    }

    /// Notifier used for surfaced failures.
    #[must_use]
    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    /// Render `command` and deliver it.
    ///
    /// # Errors
    /// Returns `ConfigurationUnavailable` if no host is configured,
    /// `Build` if the command cannot be rendered, and `Transport` on
    /// delivery failure unless `policy` is `Suppress`.
    pub async fn send_command(
        &self,
        ctx: &mut BridgeContext,
        command: &WireCommand,
        policy: FailurePolicy,
    ) -> Result<SendOutcome, BridgeError> {
        let endpoint = ctx.resolve_endpoint(command.language())?;
        let bytes = command.to_bytes()?;

        match self.sender.send(&endpoint, &bytes).await {
            Ok(()) => Ok(SendOutcome::Delivered),
            Err(err) => self.handle_failure(err, policy),
        }
    }

    fn handle_failure(
        &self,
        err: TransportError,
        policy: FailurePolicy,
    ) -> Result<SendOutcome, BridgeError> {
        let endpoint = err.endpoint().clone();
        match policy {
            FailurePolicy::Surface => {
                tracing::error!(%endpoint, "Failed to communicate with Maya: {err}");
                self.notifier.error_message(&format!(
                    "Failed to communicate with Maya ({endpoint}):\n{err}"
                ));
                Err(err.into())
            }
            FailurePolicy::Propagate => {
                tracing::error!(%endpoint, "Failed to communicate with Maya: {err}");
                Err(err.into())
            }
            FailurePolicy::Suppress => {
                tracing::warn!(%endpoint, "Failed to communicate with Maya: {err}");
                Ok(SendOutcome::Suppressed)
            }
        }
    }
}
