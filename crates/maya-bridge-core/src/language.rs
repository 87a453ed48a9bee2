//! Source languages understood by the remote interpreter.

use serde::{Deserialize, Serialize};

/// Language of the code being sent.
///
/// Each language is served by its own command port on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// Python, executed through the wrapper template.
    Python,
    /// MEL, sent as raw statements.
    Mel,
}

impl Language {
    /// Detect the language from an editor syntax name or path.
    ///
    /// Matching is case-insensitive; Python wins when both names appear.
    #[must_use]
    pub fn from_syntax(syntax: &str) -> Option<Self> {
        let syntax = syntax.to_ascii_lowercase();
        if syntax.contains("python") {
            Some(Self::Python)
        } else if syntax.contains("mel") {
            Some(Self::Mel)
        } else {
            None
        }
    }

    /// Separator used when joining selected lines.
    ///
    /// The MEL command port consumes carriage-return separated statements.
    #[must_use]
    pub const fn line_separator(self) -> &'static str {
        match self {
            Self::Python => "\n",
            Self::Mel => "\r",
        }
    }

    /// Prefix that marks a whole-line comment.
    #[must_use]
    pub const fn comment_prefix(self) -> &'static str {
        match self {
            Self::Python => "#",
            Self::Mel => "//",
        }
    }

    /// Whether `line` is a whole-line comment in this language.
    #[must_use]
    pub fn is_comment_line(self, line: &str) -> bool {
        line.trim_start().starts_with(self.comment_prefix())
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Mel => "mel",
        }
    }
}

/// How the remote side should run the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Execute the payload text directly.
    ExecFragment,
    /// Execute the file the payload refers to.
    ExecFile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_syntax() {
        assert_eq!(
            Language::from_syntax("Packages/Python/Python.sublime-syntax"),
            Some(Language::Python)
        );
        assert_eq!(
            Language::from_syntax("Packages/MayaSublime/MEL.tmLanguage"),
            Some(Language::Mel)
        );
        assert_eq!(Language::from_syntax("Packages/Rust/Rust.sublime-syntax"), None);
    }

    #[test]
    fn test_comment_lines() {
        assert!(Language::Python.is_comment_line("   # note"));
        assert!(!Language::Python.is_comment_line("x = 1  # trailing"));
        assert!(Language::Mel.is_comment_line("\t// note"));
        assert!(!Language::Mel.is_comment_line("# not a mel comment"));
    }
}
