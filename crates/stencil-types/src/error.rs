use crate::{SourceFile, Span};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of diagnostics kept before the rest are only counted.
pub const MAX_ERRORS: usize = 20;

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Syntax,
    Structure,
    Expression,
}

/// Numeric error code (E100–E399).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Syntax errors (E100–E199) ──
    pub const UNEXPECTED_TOKEN: Self = Self(100);
    pub const UNTERMINATED_COMMENT: Self = Self(101);
    pub const INVALID_DIRECTIVE: Self = Self(102);

    // ── Structure errors (E200–E299) ──
    pub const UNCLOSED_BLOCK: Self = Self(200);
    pub const UNMATCHED_END: Self = Self(201);
    pub const DUPLICATE_ELSE: Self = Self(202);
    pub const STRUCTURAL_LIMIT_EXCEEDED: Self = Self(203);
    pub const INCLUDE_NOT_ALLOWED: Self = Self(204);

    // ── Expression errors (E300–E399) ──
    pub const ARRAY_DEPTH_EXCEEDED: Self = Self(300);
    pub const UNKNOWN_PROPERTY: Self = Self(301);
    pub const EXPECTED_VALUE: Self = Self(302);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            200..=299 => ErrorCategory::Structure,
            300..=399 => ErrorCategory::Expression,
            _ => ErrorCategory::Syntax,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Structure => write!(f, "structure"),
            Self::Expression => write!(f, "expression"),
        }
    }
}

/// A structured template compile diagnostic.
///
/// `fragment` is the raw text of the offending tag (e.g. `{IF a ==}`), so
/// the message can point at the exact markup without re-reading the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StencilError {
    /// Template name.
    pub file: String,
    pub code: ErrorCode,
    /// Derived from `code`.
    pub category: ErrorCategory,
    pub message: String,
    #[serde(flatten)]
    pub span: Span,
    pub fragment: String,
    /// The source line the span starts on.
    #[serde(default)]
    pub source_line: String,
}

impl StencilError {
    /// Create a new error.
    pub fn new(
        file: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
        fragment: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            code,
            category: code.category(),
            message: message.into(),
            span,
            fragment: fragment.into(),
            source_line: String::new(),
        }
    }

    /// Attach the source line the span starts on.
    pub fn with_source_line(mut self, line: impl Into<String>) -> Self {
        self.source_line = line.into();
        self
    }

    /// The diagnostic with the start line of its span taken from `source`.
    pub fn located_in(self, source: &SourceFile) -> Self {
        let line = source.line(self.span.start_line).unwrap_or_default().to_string();
        self.with_source_line(line)
    }
}

impl fmt::Display for StencilError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} [{}] {}",
            self.file, self.span, self.code, self.category, self.message
        )?;
        if !self.fragment.is_empty() {
            write!(f, " in `{}`", self.fragment)?;
        }
        Ok(())
    }
}

impl std::error::Error for StencilError {}

/// All diagnostics produced while compiling one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileErrors {
    pub errors: Vec<StencilError>,
    pub total_errors: usize,
}

impl CompileErrors {
    /// Create an empty result (no errors).
    pub fn empty() -> Self {
        Self {
            errors: Vec::new(),
            total_errors: 0,
        }
    }

    /// Check if there are any errors.
    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Add an error, respecting the [`MAX_ERRORS`] limit.
    pub fn push_error(&mut self, error: StencilError) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(error);
        }
        self.total_errors += 1;
    }

    /// Append every error from `other`.
    pub fn extend(&mut self, other: CompileErrors) {
        let dropped = other.total_errors - other.errors.len();
        for error in other.errors {
            self.push_error(error);
        }
        self.total_errors += dropped;
    }

    /// The first diagnostic, if any.
    pub fn first(&self) -> Option<&StencilError> {
        self.errors.first()
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.first() {
            None => write!(f, "no errors"),
            Some(first) if self.total_errors == 1 => write!(f, "{first}"),
            Some(first) => write!(f, "{first} (and {} more)", self.total_errors - 1),
        }
    }
}

impl std::error::Error for CompileErrors {}
