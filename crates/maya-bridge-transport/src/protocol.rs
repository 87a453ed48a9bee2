//! Datagram protocol for streamed console output.
//!
//! One datagram carries one fragment of formatted text, with no envelope.
//! The only reserved value is a listener's stop token.

use std::fmt;

use uuid::Uuid;

/// Largest datagram the listener will read.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// First packet size tried for each published message.
pub const INITIAL_PACKET_SIZE: usize = 8 * 1024;

/// Smallest packet size before a send is considered impossible.
pub const MIN_PACKET_SIZE: usize = 1;

/// Tag prefixed to non-display console messages.
pub const OUTPUT_TAG: &str = "[MayaBridge] ";

const STOP_PREFIX: &str = "maya-bridge::listener::stop::";

/// Kind of a console event on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Plain script editor output.
    Display,
    /// Warning.
    Warning,
    /// Error.
    Error,
    /// Command result.
    Result,
}

/// Format a console event the way the listener prints it.
#[must_use]
pub fn format_message(message: &str, kind: MessageKind) -> String {
    match kind {
        MessageKind::Display => message.to_string(),
        MessageKind::Warning => format!("{OUTPUT_TAG}# Warning: {message} #\n"),
        MessageKind::Error => format!("{OUTPUT_TAG}// Error: {message} //\n"),
        MessageKind::Result => format!("{OUTPUT_TAG}# Result: {message} #\n"),
    }
}

/// Reserved datagram that stops one listener.
///
/// A random UUID behind a fixed prefix, generated once per listener.
#[derive(Clone, PartialEq, Eq)]
pub struct StopToken(Vec<u8>);

impl StopToken {
    /// Generate a fresh token.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("{STOP_PREFIX}{}", Uuid::new_v4()).into_bytes())
    }

    /// Token bytes as sent on the wire.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether `datagram` is exactly this token.
    #[must_use]
    pub fn matches(&self, datagram: &[u8]) -> bool {
        datagram == self.0.as_slice()
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StopToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StopToken")
            .field(&String::from_utf8_lossy(&self.0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_message() {
        assert_eq!(format_message("hello\n", MessageKind::Display), "hello\n");
        assert_eq!(
            format_message("bad", MessageKind::Warning),
            "[MayaBridge] # Warning: bad #\n"
        );
        assert_eq!(
            format_message("boom", MessageKind::Error),
            "[MayaBridge] // Error: boom //\n"
        );
        assert_eq!(format_message("42", MessageKind::Result), "[MayaBridge] # Result: 42 #\n");
    }

    #[test]
    fn test_stop_tokens_are_unique() {
        let a = StopToken::new();
        let b = StopToken::new();
        assert_ne!(a, b);
        assert!(a.matches(a.as_bytes()));
        assert!(!a.matches(b.as_bytes()));
        assert!(!a.matches(&a.as_bytes()[..a.as_bytes().len() - 1]));
        assert!(a.as_bytes().starts_with(STOP_PREFIX.as_bytes()));
    }
}
