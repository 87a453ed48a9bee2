//! Console publisher: forwards console events to an output listener.
//!
//! The largest datagram a platform accepts is not known up front. Each event
//! starts at [`INITIAL_PACKET_SIZE`] and, whenever the transport reports the
//! datagram as too long, halves the packet size and retries the same unsent
//! chunk. Bytes are never skipped or repeated, so the datagrams of one event
//! concatenate back to the formatted text.

use std::{
    io,
    net::{SocketAddr, UdpSocket},
    sync::Arc,
};

use thiserror::Error;

use crate::protocol::{INITIAL_PACKET_SIZE, MIN_PACKET_SIZE, MessageKind, format_message};

#[cfg(unix)]
const EMSGSIZE: i32 = libc::EMSGSIZE;
#[cfg(windows)]
const EMSGSIZE: i32 = 10040; // WSAEMSGSIZE

/// Whether `err` means the datagram exceeds what the transport can carry.
#[must_use]
pub fn is_message_too_large(err: &io::Error) -> bool {
    #[cfg(any(unix, windows))]
    {
        err.raw_os_error() == Some(EMSGSIZE)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = err;
        false
    }
}

/// Publisher error.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Datagram rejected as too large even at {size} byte(s)")]
    PacketTooSmall { size: usize },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Anything that can send one datagram.
pub trait DatagramTransport: Send + Sync {
    /// Send `buf` as one datagram to `target`.
    ///
    /// # Errors
    /// Returns the transport error unchanged.
    fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;
}

impl DatagramTransport for UdpSocket {
    fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        Self::send_to(self, buf, target)
    }
}

impl<T: DatagramTransport + ?Sized> DatagramTransport for Arc<T> {
    fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        (**self).send_to(buf, target)
    }
}

/// Summary of one published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    /// Datagrams sent.
    pub datagrams: usize,
    /// Packet size in effect when the message finished.
    pub packet_size: usize,
}

/// Splits text into datagrams, shrinking on "too large" rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptiveSender {
    initial_packet_size: usize,
}

impl Default for AdaptiveSender {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveSender {
    /// Sender starting at the default packet size.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            initial_packet_size: INITIAL_PACKET_SIZE,
        }
    }

    /// Sender starting at `size` bytes per packet.
    #[must_use]
    pub const fn with_initial_packet_size(size: usize) -> Self {
        Self {
            initial_packet_size: size,
        }
    }

    /// Send `text` to `target` as one or more datagrams.
    ///
    /// # Errors
    /// Returns `PacketTooSmall` if even a single byte is rejected as too
    /// large, or `Io` for any other transport error.
    pub fn send<T>(&self, transport: &T, target: SocketAddr, text: &str) -> Result<SendReport, PublishError>
    where
        T: DatagramTransport + ?Sized,
    {
        let mut size = self.initial_packet_size;
        if size < MIN_PACKET_SIZE {
            return Err(PublishError::PacketTooSmall { size });
        }

        let mut pos = 0;
        let mut datagrams = 0;
        while pos < text.len() {
            let end = chunk_end(text, pos, size);
            match transport.send_to(&text.as_bytes()[pos..end], target) {
                Ok(_) => {
                    pos = end;
                    datagrams += 1;
                }
                Err(e) if is_message_too_large(&e) => {
                    if size / 2 < MIN_PACKET_SIZE {
                        return Err(PublishError::PacketTooSmall { size });
                    }
                    size /= 2;
                    tracing::debug!(packet_size = size, "Datagram too large, shrinking packets");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(SendReport {
            datagrams,
            packet_size: size,
        })
    }
}

/// End of the chunk starting at `start`, at most `size` bytes long.
///
/// Cuts back to a UTF-8 boundary unless that would leave an empty chunk.
fn chunk_end(text: &str, start: usize, size: usize) -> usize {
    let hard_end = start.saturating_add(size).min(text.len());
    let mut end = hard_end;
    while end > start && !text.is_char_boundary(end) {
        end -= 1;
    }
    if end == start { hard_end } else { end }
}

/// Registration handle returned by a [`MessageSource`].
pub type CallbackId = u64;

/// Callback invoked for every console event.
pub type OutputCallback = Box<dyn FnMut(&str, MessageKind) -> Result<(), PublishError> + Send>;

/// Source of console events on the remote side.
pub trait MessageSource {
    /// Register a callback.
    fn add_callback(&mut self, callback: OutputCallback) -> CallbackId;

    /// Remove a callback; returns whether it was registered.
    fn remove_callback(&mut self, id: CallbackId) -> bool;
}

/// In-process console event bus.
#[derive(Default)]
pub struct ConsoleBus {
    next_id: CallbackId,
    callbacks: Vec<(CallbackId, OutputCallback)>,
}

impl ConsoleBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Deliver an event to every callback.
    ///
    /// Every callback runs even if an earlier one fails.
    ///
    /// # Errors
    /// Returns the first callback error.
    pub fn emit(&mut self, message: &str, kind: MessageKind) -> Result<(), PublishError> {
        let mut first_err = None;
        for (id, callback) in &mut self.callbacks {
            if let Err(e) = callback(message, kind) {
                tracing::warn!(callback = *id, "Console callback failed: {e}");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl MessageSource for ConsoleBus {
    fn add_callback(&mut self, callback: OutputCallback) -> CallbackId {
        self.next_id += 1;
        self.callbacks.push((self.next_id, callback));
        self.next_id
    }

    fn remove_callback(&mut self, id: CallbackId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(cid, _)| *cid != id);
        self.callbacks.len() != before
    }
}

/// Publishes console events from a [`MessageSource`] to a listener address.
///
/// Holds at most one registration; reconfiguring always removes the old
/// callback before adding a new one.
pub struct ConsolePublisher<S: MessageSource> {
    source: S,
    transport: Arc<dyn DatagramTransport>,
    sender: AdaptiveSender,
    registration: Option<CallbackId>,
    target: Option<SocketAddr>,
}

impl<S: MessageSource> ConsolePublisher<S> {
    /// Create a publisher sending through `transport`.
    #[must_use]
    pub fn new(source: S, transport: Arc<dyn DatagramTransport>) -> Self {
        Self {
            source,
            transport,
            sender: AdaptiveSender::new(),
            registration: None,
            target: None,
        }
    }

    /// Create a publisher with its own UDP socket.
    ///
    /// # Errors
    /// Returns error if the socket cannot be bound.
    pub fn bind(source: S) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self::new(source, Arc::new(socket)))
    }

    /// Override the packet sizing.
    #[must_use]
    pub fn with_sender(mut self, sender: AdaptiveSender) -> Self {
        self.sender = sender;
        self
    }

    /// Enable streaming to `target`, or disable it.
    pub fn configure(&mut self, enable: bool, target: SocketAddr) {
        if enable && self.registration.is_none() {
            tracing::info!(%target, "Enable streaming console output");
        } else if !enable && self.registration.is_some() {
            tracing::info!("Disable streaming console output");
        }

        if let Some(id) = self.registration.take() {
            self.source.remove_callback(id);
            self.target = None;
        }
        if !enable {
            return;
        }

        let transport = Arc::clone(&self.transport);
        let sender = self.sender;
        let callback: OutputCallback = Box::new(move |message, kind| {
            let text = format_message(message, kind);
            sender.send(transport.as_ref(), target, &text).map(|_| ())
        });
        self.registration = Some(self.source.add_callback(callback));
        self.target = Some(target);
    }

    /// Whether a callback is registered.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.registration.is_some()
    }

    /// Live registration handle.
    #[must_use]
    pub const fn registration(&self) -> Option<CallbackId> {
        self.registration
    }

    /// Address events are sent to.
    #[must_use]
    pub const fn target(&self) -> Option<SocketAddr> {
        self.target
    }

    /// The event source.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// The event source, mutably.
    pub const fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}
