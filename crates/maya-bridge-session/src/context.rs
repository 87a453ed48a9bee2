//! Bridge context: cached settings and the current output listener.

use std::{
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use maya_bridge_core::{BridgeSettings, ConfigError, Endpoint, Language, SettingsSource};
use maya_bridge_transport::{ListenerConfig, OutputListener};

use crate::error::BridgeError;

/// Produces the writer a newly started listener prints into.
pub type SinkFactory = Arc<dyn Fn() -> Box<dyn Write + Send> + Send + Sync>;

/// State shared by every bridge operation.
///
/// One context exists per editor process. It is passed explicitly to the
/// dispatcher and the streaming controller so tests can build their own.
pub struct BridgeContext {
    source: Arc<dyn SettingsSource>,
    settings: Option<BridgeSettings>,
    listener: Option<OutputListener>,
    listener_config: ListenerConfig,
    sink: SinkFactory,
    streaming_enabled: bool,
    syncing: Arc<AtomicBool>,
}

impl BridgeContext {
    /// Create a context reading settings from `source`.
    ///
    /// Settings are loaded lazily on first use. Listener output goes to stdout.
    #[must_use]
    pub fn new(source: Arc<dyn SettingsSource>) -> Self {
        Self {
            source,
            settings: None,
            listener: None,
            listener_config: ListenerConfig::default(),
            sink: Arc::new(|| Box::new(std::io::stdout())),
            streaming_enabled: false,
            syncing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Override the listener bind configuration.
    #[must_use]
    pub fn with_listener_config(mut self, config: ListenerConfig) -> Self {
        self.listener_config = config;
        self
    }

    /// Override where listener output is printed.
    #[must_use]
    pub fn with_output_sink<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Write + Send> + Send + Sync + 'static,
    {
        self.sink = Arc::new(factory);
        self
    }

    /// Cached settings, if loaded.
    #[must_use]
    pub const fn settings(&self) -> Option<&BridgeSettings> {
        self.settings.as_ref()
    }

    /// Reload settings from the source, replacing the cache.
    ///
    /// # Errors
    /// Returns error if the source cannot be read.
    pub fn refresh_settings(&mut self) -> Result<BridgeSettings, ConfigError> {
        let settings = self.source.load()?;
        tracing::debug!(host = ?settings.maya_hostname, "Settings loaded");
        self.settings = Some(settings.clone());
        Ok(settings)
    }

    /// Cached settings, reloading first if none are cached or no host is set.
    ///
    /// # Errors
    /// Returns error if a reload is needed and fails.
    pub fn ensure_settings(&mut self) -> Result<BridgeSettings, ConfigError> {
        if let Some(settings) = self
            .settings
            .as_ref()
            .filter(|s| s.has_host())
        {
            return Ok(settings.clone());
        }
        tracing::debug!("Settings not synchronized, reloading");
        self.refresh_settings()
    }

    /// Command port for `language`, resynchronizing settings once if needed.
    ///
    /// # Errors
    /// Returns `ConfigurationUnavailable` if no host is configured after the resync.
    pub fn resolve_endpoint(&mut self, language: Language) -> Result<Endpoint, BridgeError> {
        self.ensure_settings()?
            .endpoint_for(language)
            .ok_or(BridgeError::ConfigurationUnavailable(language))
    }

    /// Current listener, alive or not.
    #[must_use]
    pub const fn listener(&self) -> Option<&OutputListener> {
        self.listener.as_ref()
    }

    /// Whether streaming was last requested on.
    #[must_use]
    pub const fn streaming_enabled(&self) -> bool {
        self.streaming_enabled
    }

    /// Whether a settings resync is in progress.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Shut down and drop the listener. Returns whether one existed.
    pub fn teardown(&mut self) -> bool {
        self.streaming_enabled = false;
        match self.listener.take() {
            Some(listener) => {
                listener.shutdown();
                tracing::debug!(id = %listener.id(), "Output listener released");
                true
            }
            None => false,
        }
    }

    pub(crate) const fn set_streaming_enabled(&mut self, enable: bool) {
        self.streaming_enabled = enable;
    }

    pub(crate) fn take_listener(&mut self) -> Option<OutputListener> {
        self.listener.take()
    }

    pub(crate) fn install_listener(&mut self, listener: OutputListener) {
        self.listener = Some(listener);
    }

    pub(crate) fn listener_config(&self) -> ListenerConfig {
        self.listener_config.clone()
    }

    pub(crate) fn output_sink(&self) -> Box<dyn Write + Send> {
        (self.sink)()
    }

    pub(crate) fn try_begin_sync(&self) -> Option<SyncGuard> {
        SyncGuard::acquire(&self.syncing)
    }

    pub(crate) fn cache_output_setting(&mut self, enable: bool) {
        if let Some(settings) = self.settings.as_mut() {
            settings.receive_maya_output = enable;
        }
    }
}

impl std::fmt::Debug for BridgeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeContext")
            .field("settings", &self.settings)
            .field("listener", &self.listener)
            .field("listener_config", &self.listener_config)
            .field("streaming_enabled", &self.streaming_enabled)
            .field("syncing", &self.is_syncing())
            .finish_non_exhaustive()
    }
}

/// Held while a settings resync runs; released on drop, including when the
/// resync future is cancelled.
pub(crate) struct SyncGuard(Arc<AtomicBool>);

impl SyncGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Self(Arc::clone(flag)))
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
