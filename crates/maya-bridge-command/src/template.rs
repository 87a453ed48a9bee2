//! Python source templates rendered from named fields.
//!
//! A template is a fixed Python source with `{field}` placeholders. Values are
//! never pasted in as raw text: every string goes through [`quote_py_str`], so
//! a payload can only ever become a single Python string literal.

use thiserror::Error;

/// Template rendering error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Template field has no value: {0}")]
    MissingField(String),
    #[error("Value given for unknown template field: {0}")]
    UnknownField(&'static str),
}

/// Known templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateId {
    /// Runs a fragment or file inside the private namespace, with optional
    /// undo chunk and traceback capture.
    ExecWrapper,
    /// Calls the console publisher's enable/disable function.
    StreamControl,
}

impl TemplateId {
    /// Python source with placeholders.
    #[must_use]
    pub const fn source(self) -> &'static str {
        match self {
            Self::ExecWrapper => EXEC_WRAPPER,
            Self::StreamControl => STREAM_CONTROL,
        }
    }
}

const EXEC_WRAPPER: &str = r"# -*- coding: utf-8 -*-
import traceback
import __main__

import maya.cmds

_bridge_ns = __main__.__dict__.get({ns_key})
if _bridge_ns is None:
    _bridge_ns = __main__.__dict__.copy()
    __main__.__dict__[{ns_key}] = _bridge_ns

try:
    if {undo}:
        maya.cmds.undoInfo(openChunk=True, chunkName={chunk_name})
    if {isolated}:
        _bridge_scope = _bridge_ns
        _bridge_scope['__file__'] = {file}
    else:
        _bridge_scope = __main__.__dict__
    if {from_file}:
        with open({payload}) as _bridge_fh:
            exec(compile(_bridge_fh.read(), {payload}, 'exec'), _bridge_scope, _bridge_scope)
    else:
        exec({payload}, _bridge_scope, _bridge_scope)
except:
    traceback.print_exc()
finally:
    if {undo}:
        maya.cmds.undoInfo(closeChunk=True)
";

const STREAM_CONTROL: &str = "{function}({enable}, host={host}, port={port})\n";

/// A value substituted into a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PyValue {
    /// `True` / `False`.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// String literal, quoted and escaped.
    Str(String),
    /// Bare identifier. Only accepts static names defined in this workspace.
    Name(&'static str),
}

impl PyValue {
    /// Render as Python source.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::Int(n) => n.to_string(),
            Self::Str(s) => quote_py_str(s),
            Self::Name(name) => (*name).to_string(),
        }
    }
}

impl From<bool> for PyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for PyValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for PyValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<u16> for PyValue {
    fn from(value: u16) -> Self {
        Self::Int(i64::from(value))
    }
}

/// A template plus its ordered field values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyTemplate {
    id: TemplateId,
    fields: Vec<(&'static str, PyValue)>,
}

impl PyTemplate {
    /// Start a template with no fields.
    #[must_use]
    pub const fn new(id: TemplateId) -> Self {
        Self {
            id,
            fields: Vec::new(),
        }
    }

    /// Set a field, replacing any earlier value for the same name.
    #[must_use]
    pub fn field(mut self, name: &'static str, value: impl Into<PyValue>) -> Self {
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
        self
    }

    /// Template being filled.
    #[must_use]
    pub const fn id(&self) -> TemplateId {
        self.id
    }

    /// Substitute every placeholder.
    ///
    /// # Errors
    /// Returns error if a placeholder has no value or a value has no placeholder.
    pub fn render(&self) -> Result<String, TemplateError> {
        let source = self.id.source();
        let mut out = String::with_capacity(source.len() + 128);
        let mut used = vec![false; self.fields.len()];
        let mut rest = source;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let name_len = after
                .bytes()
                .take_while(|b| b.is_ascii_lowercase() || *b == b'_')
                .count();

            if name_len > 0 && after.as_bytes().get(name_len) == Some(&b'}') {
                let name = &after[..name_len];
                let idx = self
                    .fields
                    .iter()
                    .position(|(n, _)| *n == name)
                    .ok_or_else(|| TemplateError::MissingField(name.to_string()))?;
                used[idx] = true;
                out.push_str(&self.fields[idx].1.render());
                rest = &after[name_len + 1..];
            } else {
                out.push('{');
                rest = after;
            }
        }
        out.push_str(rest);

        if let Some(idx) = used.iter().position(|u| !u) {
            return Err(TemplateError::UnknownField(self.fields[idx].0));
        }
        Ok(out)
    }
}

/// Quote `s` as a single-quoted Python string literal.
///
/// Non-ASCII text is kept as-is (the wrapper declares UTF-8 source); quotes,
/// backslashes and control characters are escaped.
#[must_use]
pub fn quote_py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Quote `s` as a MEL string literal.
#[must_use]
pub fn quote_mel_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Parse a literal produced by [`quote_py_str`] back into its text.
#[cfg(test)]
pub(crate) fn unquote_py_str(literal: &str) -> Option<String> {
    let inner = literal.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
            }
            _ => return None,
        }
    }
    Some(out)
}
