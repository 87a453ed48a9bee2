//! Remote console publisher: install script and control calls.

use std::net::SocketAddr;

use crate::template::{PyTemplate, PyValue, TemplateError, TemplateId};

/// Python source defining the console publisher inside Maya.
///
/// Safe to send repeatedly; the live registration survives reinstalls.
pub const PUBLISHER_SCRIPT: &str = include_str!("../scripts/publish_console.py");

/// Function the install script defines to enable or disable streaming.
pub const STREAM_FUNCTION: &str = "_maya_bridge_stream_console";

/// Python call that enables streaming to `target`, or disables it.
///
/// # Errors
/// Returns error if the control template cannot be rendered.
pub fn stream_control_call(enable: bool, target: SocketAddr) -> Result<String, TemplateError> {
    PyTemplate::new(TemplateId::StreamControl)
        .field("function", PyValue::Name(STREAM_FUNCTION))
        .field("enable", enable)
        .field("host", target.ip().to_string())
        .field("port", target.port())
        .render()
}
