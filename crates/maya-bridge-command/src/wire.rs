//! Wire command building.

use std::path::{Path, PathBuf};

use maya_bridge_core::{BridgeSettings, ExecutionMode, Language};
use thiserror::Error;

use crate::template::{PyTemplate, TemplateError, TemplateId, quote_mel_str};

/// Key under which the private namespace is cached on `__main__`.
pub const NAMESPACE_KEY: &str = "_maya_bridge_namespace";

/// Name of the undo chunk opened around each Python send.
pub const UNDO_CHUNK_NAME: &str = "MayaBridge Code";

/// Number of payload characters echoed to the log.
const PREVIEW_CHARS: usize = 200;

/// Command build error.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Nothing to send")]
    EmptyPayload,
    #[error("File must be saved before sending to Maya")]
    MissingSourcePath,
    #[error("Save changes before sending the file to Maya")]
    UnsavedChanges,
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}

impl BuildError {
    /// Whether this only means there was nothing to do.
    #[must_use]
    pub const fn is_nothing_to_send(&self) -> bool {
        matches!(self, Self::EmptyPayload)
    }
}

/// How Python payloads are wrapped on the remote side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WrapOptions {
    /// Run inside the cached private namespace instead of `__main__`.
    pub isolated_namespace: bool,
    /// Bracket the run with an undo chunk.
    pub wrap_undo: bool,
}

impl WrapOptions {
    /// Options taken from the user settings.
    #[must_use]
    pub const fn from_settings(settings: &BridgeSettings) -> Self {
        Self {
            isolated_namespace: settings.no_collisions,
            wrap_undo: settings.create_undo,
        }
    }

    /// Options for internal control code: same namespace, never an undo chunk.
    #[must_use]
    pub const fn control(self) -> Self {
        Self {
            isolated_namespace: self.isolated_namespace,
            wrap_undo: false,
        }
    }
}

/// Join selected regions into one payload.
///
/// Each region is split into lines on `\r\n`, `\n` or a bare `\r`; whole-line comments are dropped when
/// `strip_comments` is set. Lines are joined with the language separator.
#[must_use]
pub fn join_selection<I, S>(language: Language, regions: I, strip_comments: bool) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut lines: Vec<String> = Vec::new();
    for region in regions {
        lines.extend(
            split_lines(region.as_ref())
                .into_iter()
                .filter(|line| !(strip_comments && language.is_comment_line(line)))
                .map(str::to_string),
        );
    }
    lines.join(language.line_separator())
}

fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let Some(end) = rest.find(['\r', '\n']) else {
            lines.push(rest);
            break;
        };
        lines.push(&rest[..end]);
        let terminator = if rest[end..].starts_with("\r\n") { 2 } else { 1 };
        rest = &rest[end + terminator..];
    }
    lines
}

/// A command ready to be sent to a Maya command port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireCommand {
    language: Language,
    mode: ExecutionMode,
    payload: String,
    source_path: Option<PathBuf>,
    wrap: WrapOptions,
}

impl WireCommand {
    /// Build a command from selected source regions.
    ///
    /// # Errors
    /// Returns `EmptyPayload` if nothing remains after joining.
    pub fn fragment<I, S>(
        language: Language,
        regions: I,
        strip_comments: bool,
        wrap: WrapOptions,
    ) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let payload = join_selection(language, regions, strip_comments);
        if payload.is_empty() {
            return Err(BuildError::EmptyPayload);
        }
        Ok(Self {
            language,
            mode: ExecutionMode::ExecFragment,
            payload,
            source_path: None,
            wrap,
        })
    }

    /// Build a command that runs a whole file on the remote side.
    ///
    /// # Errors
    /// Returns `MissingSourcePath` if no path is given.
    pub fn file(
        language: Language,
        source_path: Option<&Path>,
        wrap: WrapOptions,
    ) -> Result<Self, BuildError> {
        let path = source_path.ok_or(BuildError::MissingSourcePath)?;
        let path_text = path.to_string_lossy();
        if path_text.is_empty() {
            return Err(BuildError::MissingSourcePath);
        }
        let payload = match language {
            Language::Python => path_text.into_owned(),
            Language::Mel => format!("rehash; source {};", quote_mel_str(&path_text)),
        };
        Ok(Self {
            language,
            mode: ExecutionMode::ExecFile,
            payload,
            source_path: Some(path.to_path_buf()),
            wrap,
        })
    }

    /// Build an internal Python control command.
    ///
    /// # Errors
    /// Returns `EmptyPayload` if `code` is empty.
    pub fn control(code: impl Into<String>, wrap: WrapOptions) -> Result<Self, BuildError> {
        let payload = code.into();
        if payload.is_empty() {
            return Err(BuildError::EmptyPayload);
        }
        Ok(Self {
            language: Language::Python,
            mode: ExecutionMode::ExecFragment,
            payload,
            source_path: None,
            wrap: wrap.control(),
        })
    }

    /// Target language.
    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
    }

    /// Execution mode.
    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Unwrapped payload text.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Source file, for whole-file commands.
    #[must_use]
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Wrap options.
    #[must_use]
    pub const fn wrap(&self) -> WrapOptions {
        self.wrap
    }

    /// Start of the payload, for log lines.
    #[must_use]
    pub fn preview(&self) -> String {
        self.payload.chars().take(PREVIEW_CHARS).collect()
    }

    /// The wrapper template for Python commands, `None` for MEL.
    #[must_use]
    pub fn template(&self) -> Option<PyTemplate> {
        if self.language != Language::Python {
            return None;
        }
        let file = self
            .source_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        Some(
            PyTemplate::new(TemplateId::ExecWrapper)
                .field("ns_key", NAMESPACE_KEY)
                .field("undo", self.wrap.wrap_undo)
                .field("chunk_name", UNDO_CHUNK_NAME)
                .field("isolated", self.wrap.isolated_namespace)
                .field("file", file)
                .field("from_file", self.mode == ExecutionMode::ExecFile)
                .field("payload", self.payload.as_str()),
        )
    }

    /// Render the exact text to transmit.
    ///
    /// # Errors
    /// Returns error if the wrapper template cannot be rendered.
    pub fn render(&self) -> Result<String, BuildError> {
        let text = match self.template() {
            Some(template) => template.render()?,
            None => self.payload.clone(),
        };
        tracing::trace!(
            language = self.language.name(),
            bytes = text.len(),
            "Rendered wire command"
        );
        Ok(text)
    }

    /// Render to the bytes written on the wire.
    ///
    /// # Errors
    /// Returns error if the wrapper template cannot be rendered.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BuildError> {
        self.render().map(String::into_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{quote_py_str, unquote_py_str};

    const WRAPPED: WrapOptions = WrapOptions {
        isolated_namespace: true,
        wrap_undo: true,
    };

    #[test]
    fn test_comment_stripping() {
        let lines = ["x = 1", "# comment", "y = 2"];
        assert_eq!(join_selection(Language::Python, [lines.join("\n")], true), "x = 1\ny = 2");
        assert_eq!(
            join_selection(Language::Python, [lines.join("\n")], false),
            "x = 1\n# comment\ny = 2"
        );
        assert_eq!(
            join_selection(Language::Python, ["x = 1\r# comment\ry = 2\r"], true),
            "x = 1\ny = 2"
        );
        assert_eq!(
            join_selection(Language::Python, ["x = 1\r\n# comment\r\n\ny = 2"], true),
            "x = 1\n\ny = 2"
        );
    }

    #[test]
    fn test_mel_joins_with_carriage_return() {
        let joined = join_selection(Language::Mel, ["sphere;\n// note", "polyCube;"], true);
        assert_eq!(joined, "sphere;\rpolyCube;");
    }

    #[test]
    fn test_comment_only_selection_is_empty() {
        let result = WireCommand::fragment(Language::Python, ["# a\n   # b"], true, WRAPPED);
        assert!(matches!(result, Err(BuildError::EmptyPayload)));
        assert!(result.unwrap_err().is_nothing_to_send());
    }

    #[test]
    fn test_wrapped_fragment_recovers_payload() {
        let cmd = WireCommand::fragment(Language::Python, ["print(1+1)"], true, WRAPPED).unwrap();
        let rendered = cmd.render().unwrap();

        let literal = quote_py_str("print(1+1)");
        let exec_call = format!("exec({literal}, _bridge_scope, _bridge_scope)");
        let exec_at = rendered.find(&exec_call).expect("exec call present");
        assert_eq!(unquote_py_str(&literal).as_deref(), Some("print(1+1)"));

        let open_at = rendered.find("undoInfo(openChunk=True").unwrap();
        let close_at = rendered.find("undoInfo(closeChunk=True)").unwrap();
        assert!(open_at < exec_at && exec_at < close_at);
        assert!(rendered.contains("if True:\n        maya.cmds.undoInfo(openChunk"));
        assert!(rendered.contains("traceback.print_exc()"));
        assert!(rendered.contains(&format!("__main__.__dict__.get('{NAMESPACE_KEY}')")));
    }

    #[test]
    fn test_python_file_compiles_from_path() {
        let path = Path::new("/tmp/rig tools/build.py");
        let cmd = WireCommand::file(Language::Python, Some(path), WrapOptions::default()).unwrap();
        assert_eq!(cmd.mode(), ExecutionMode::ExecFile);
        assert_eq!(cmd.payload(), "/tmp/rig tools/build.py");

        let rendered = cmd.render().unwrap();
        assert!(rendered.contains("with open('/tmp/rig tools/build.py') as _bridge_fh:"));
        assert!(rendered.contains("if False:\n        maya.cmds.undoInfo(openChunk"));
    }

    #[test]
    fn test_mel_file_sources_by_name() {
        let path = Path::new(r"C:\scripts\tool.mel");
        let cmd = WireCommand::file(Language::Mel, Some(path), WRAPPED).unwrap();
        assert_eq!(cmd.render().unwrap(), r#"rehash; source "C:\\scripts\\tool.mel";"#);
        assert!(cmd.template().is_none());
    }

    #[test]
    fn test_file_without_path() {
        assert!(matches!(
            WireCommand::file(Language::Python, None, WRAPPED),
            Err(BuildError::MissingSourcePath)
        ));
    }

    #[test]
    fn test_control_never_opens_undo() {
        let cmd = WireCommand::control("pass", WRAPPED).unwrap();
        assert_eq!(
            cmd.wrap(),
            WrapOptions {
                isolated_namespace: true,
                wrap_undo: false
            }
        );
    }

    #[test]
    fn test_preview_is_bounded() {
        let long = "x".repeat(500);
        let cmd = WireCommand::fragment(Language::Mel, [long], false, WRAPPED).unwrap();
        assert_eq!(cmd.preview().len(), 200);
    }
}
