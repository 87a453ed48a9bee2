//! Editor-facing entry points.

use std::{path::PathBuf, sync::Arc};

use maya_bridge_command::{BuildError, WireCommand, WrapOptions};
use maya_bridge_core::{CommandSender, Language, LogNotifier, Notifier, SettingsSource};
use maya_bridge_transport::CommandClient;
use serde::{Deserialize, Serialize};

use crate::{
    context::BridgeContext,
    dispatcher::{CommandDispatcher, FailurePolicy, SendOutcome},
    error::BridgeError,
    streaming::set_streaming_enabled,
};

/// The editor view a send acts on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Syntax name reported by the editor, e.g. `Python` or `MEL`.
    pub syntax: String,
    /// Backing file, if the document was ever saved.
    pub file_path: Option<PathBuf>,
    /// Whether the buffer has unsaved changes.
    pub is_dirty: bool,
    /// Selected regions; empty regions are ignored.
    pub selections: Vec<String>,
}

impl Document {
    fn has_selection(&self) -> bool {
        self.selections.iter().any(|region| !region.is_empty())
    }
}

/// What a send did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A command was dispatched.
    Sent(SendOutcome),
    /// The selection held nothing to run.
    NothingToSend,
    /// The document is not Python or MEL.
    UnsupportedLanguage,
}

/// Editor entry points over one [`BridgeContext`].
pub struct Bridge<C: CommandSender> {
    ctx: BridgeContext,
    dispatcher: CommandDispatcher<C>,
}

impl Bridge<CommandClient> {
    /// Bridge over TCP with log-only notifications.
    #[must_use]
    pub fn with_defaults(source: Arc<dyn SettingsSource>) -> Self {
        Self::new(
            BridgeContext::new(source),
            CommandClient::new(),
            Arc::new(LogNotifier),
        )
    }
}

impl<C: CommandSender> Bridge<C> {
    /// Create a bridge.
    #[must_use]
    pub fn new(ctx: BridgeContext, sender: C, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            ctx,
            dispatcher: CommandDispatcher::new(sender, notifier),
        }
    }

    /// Shared context.
    #[must_use]
    pub const fn context(&self) -> &BridgeContext {
        &self.ctx
    }

    /// Send the selection of `document`, or the whole file when nothing is
    /// selected.
    ///
    /// Streaming is re-applied first when it is on, so a restarted Maya gets
    /// the publisher back before the user's code runs.
    ///
    /// # Errors
    /// Returns error if settings are unavailable, the file is unsaved, or
    /// delivery fails. Delivery failures are also shown to the user.
    pub async fn send_document(&mut self, document: &Document) -> Result<Dispatch, BridgeError> {
        let Some(language) = Language::from_syntax(&document.syntax) else {
            tracing::info!(syntax = %document.syntax, "No Maya-recognized language found");
            return Ok(Dispatch::UnsupportedLanguage);
        };

        let settings = self.ctx.ensure_settings()?;
        let wrap = WrapOptions::from_settings(&settings);

        let built = if document.has_selection() {
            WireCommand::fragment(
                language,
                &document.selections,
                settings.strip_sending_comments,
                wrap,
            )
        } else if document.is_dirty {
            Err(BuildError::UnsavedChanges)
        } else {
            WireCommand::file(language, document.file_path.as_deref(), wrap)
        };

        let command = match built {
            Ok(command) => command,
            Err(err) if err.is_nothing_to_send() => {
                tracing::debug!("Selection is empty after comment stripping");
                return Ok(Dispatch::NothingToSend);
            }
            Err(err) => {
                self.dispatcher.notifier().error_message(&err.to_string());
                return Err(err.into());
            }
        };

        tracing::info!(
            language = language.name(),
            mode = ?command.mode(),
            "Sending to Maya: {:?}",
            command.preview()
        );

        if self.ctx.streaming_enabled() {
            if let Err(e) = set_streaming_enabled(&mut self.ctx, &self.dispatcher, true).await {
                tracing::warn!("Failed to re-apply output streaming: {e}");
            }
        }

        let outcome = self
            .dispatcher
            .send_command(&mut self.ctx, &command, FailurePolicy::Surface)
            .await?;
        Ok(Dispatch::Sent(outcome))
    }

    /// Start receiving Maya's script editor output.
    ///
    /// # Errors
    /// Returns error if streaming cannot be set up.
    pub async fn enable_output(&mut self) -> Result<(), BridgeError> {
        self.set_output(true).await
    }

    /// Stop receiving Maya's script editor output.
    ///
    /// # Errors
    /// Returns error if the remote publisher cannot be disabled.
    pub async fn disable_output(&mut self) -> Result<(), BridgeError> {
        self.set_output(false).await
    }

    async fn set_output(&mut self, enable: bool) -> Result<(), BridgeError> {
        self.ctx.ensure_settings()?;
        self.ctx.cache_output_setting(enable);
        set_streaming_enabled(&mut self.ctx, &self.dispatcher, enable).await
    }

    /// Reload settings and bring streaming in line with them.
    ///
    /// Re-entrant calls while a resync is running return at once.
    ///
    /// # Errors
    /// Returns error if settings cannot be read or streaming cannot be changed.
    pub async fn sync_settings(&mut self) -> Result<(), BridgeError> {
        let Some(_guard) = self.ctx.try_begin_sync() else {
            tracing::debug!("Settings resync already running");
            return Ok(());
        };

        let settings = self.ctx.refresh_settings()?;
        if settings.receive_maya_output {
            set_streaming_enabled(&mut self.ctx, &self.dispatcher, true).await
        } else if self.ctx.listener().is_some() {
            set_streaming_enabled(&mut self.ctx, &self.dispatcher, false).await
        } else {
            Ok(())
        }
    }

    /// Release the listener. Call when the plugin is unloaded.
    pub fn unload(&mut self) {
        if self.ctx.teardown() {
            tracing::info!("Output listener stopped on unload");
        }
    }
}

impl<C: CommandSender> Drop for Bridge<C> {
    fn drop(&mut self) {
        self.ctx.teardown();
    }
}
