//! Wire command building for the Maya bridge.
//!
//! Provides:
//! - `WireCommand` - The exact text sent to a Maya command port
//! - Python template rendering with explicit literal quoting
//! - The console publisher install script and its control calls

pub mod publisher_script;
pub mod template;
pub mod wire;

pub use publisher_script::{PUBLISHER_SCRIPT, STREAM_FUNCTION, stream_control_call};
pub use template::{PyTemplate, PyValue, TemplateError, TemplateId, quote_mel_str, quote_py_str};
pub use wire::{BuildError, WireCommand, WrapOptions, join_selection};
