//! Error Types and Diagnostic Reporting
//!
//! All fallible operations in this crate surface one of the `CelError`
//! variants. The `ErrorReporter` collects diagnostics across processing
//! phases and renders them with a source snippet and caret indicator,
//! in the style:
//!
//! ```text
//! ERROR: <input>:1:5: unexpected token
//!  | a + + b
//!  | ....^
//! ```

use std::io::Write;

use termcolor::{Color, ColorSpec, WriteColor};

use crate::source::SourceBuffer;

/// Unified error type for the core operations.
#[derive(Debug, Clone, PartialEq)]
pub enum CelError {
    /// Index into a code-point array was out of bounds.
    OutOfRange { index: i64, size: usize },
    /// A literal token could not be decoded. The offset is a code-point
    /// index into the token text.
    MalformedLiteral { offset: usize, message: String },
    /// A numeric narrowing or conversion would lose information.
    NumericOverflow { message: String },
    /// A mutation visited more nodes than permitted in a single call.
    IterationLimit { limit: usize },
    /// A descriptor, field, or message type could not be found.
    Unresolved { name: String },
    /// An AST invariant was violated; unreachable for well-formed inputs.
    InvalidState { message: String },
}

impl CelError {
    pub fn malformed(offset: usize, message: impl Into<String>) -> Self {
        CelError::MalformedLiteral {
            offset,
            message: message.into(),
        }
    }

    pub fn overflow(message: impl Into<String>) -> Self {
        CelError::NumericOverflow {
            message: message.into(),
        }
    }

    pub fn unresolved(name: impl Into<String>) -> Self {
        CelError::Unresolved { name: name.into() }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        CelError::InvalidState {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CelError::OutOfRange { index, size } => {
                write!(f, "index {} out of range for size {}", index, size)
            }
            CelError::MalformedLiteral { offset, message } => {
                write!(f, "malformed literal at offset {}: {}", offset, message)
            }
            CelError::NumericOverflow { message } => write!(f, "numeric overflow: {}", message),
            CelError::IterationLimit { limit } => {
                write!(f, "iteration budget of {} node visits exhausted", limit)
            }
            CelError::Unresolved { name } => write!(f, "unresolved reference: {}", name),
            CelError::InvalidState { message } => write!(f, "invalid state: {}", message),
        }
    }
}

impl std::error::Error for CelError {}

/// A single reported diagnostic, captured against the context that was
/// active when it was reported.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportedError {
    /// Expression id the error is attached to, when known.
    pub expr_id: Option<i64>,
    /// Code-point offset into the context's source text.
    pub offset: usize,
    /// Human-readable message.
    pub message: String,
    /// Description of the context (typically a file name).
    pub description: String,
    /// 1-based line, when the context carried source text.
    pub line: Option<u32>,
    /// 1-based column, when the context carried source text.
    pub column: Option<u32>,
    /// The text of the offending source line.
    pub snippet: Option<String>,
}

impl ReportedError {
    /// Render the error in the canonical diagnostic form, including the
    /// source line and a caret column indicator when available.
    pub fn render(&self) -> String {
        let mut out = String::new();
        match (self.line, self.column) {
            (Some(line), Some(column)) => {
                out.push_str(&format!(
                    "ERROR: {}:{}:{}: {}",
                    self.description, line, column, self.message
                ));
            }
            _ => {
                out.push_str(&format!("ERROR: {}: {}", self.description, self.message));
            }
        }
        if let (Some(column), Some(snippet)) = (self.column, &self.snippet) {
            out.push_str(&format!("\n | {}", snippet));
            out.push_str("\n | ");
            for _ in 1..column {
                out.push('.');
            }
            out.push('^');
        }
        out
    }
}

impl std::fmt::Display for ReportedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// One entry of the reporter's context stack.
#[derive(Debug, Clone)]
struct ErrorContext {
    description: String,
    source: Option<SourceBuffer>,
}

/// Collects diagnostics across processing phases.
///
/// Contexts nest: each `enter_context` pushes a (description, source)
/// pair, and errors reported while it is on top are resolved against
/// that source for line/column and snippet information. Errors are kept
/// in the order they were reported.
#[derive(Debug, Clone, Default)]
pub struct ErrorReporter {
    contexts: Vec<ErrorContext>,
    errors: Vec<ReportedError>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a reporting context. `source` enables snippet rendering.
    pub fn enter_context(&mut self, description: impl Into<String>, source: Option<SourceBuffer>) {
        self.contexts.push(ErrorContext {
            description: description.into(),
            source,
        });
    }

    /// Pop the innermost context. Popping an empty stack is a no-op.
    pub fn exit_context(&mut self) {
        self.contexts.pop();
    }

    /// Report an error at `offset` (a code-point index into the current
    /// context's source), optionally attached to an expression id.
    pub fn report(&mut self, expr_id: Option<i64>, offset: usize, message: impl Into<String>) {
        let (description, line, column, snippet) = match self.contexts.last() {
            Some(context) => {
                let description = context.description.clone();
                match &context.source {
                    Some(source) => match source.location(offset) {
                        Some(location) => (
                            description,
                            Some(location.line),
                            Some(location.column),
                            source.line_text(location.line),
                        ),
                        None => (description, None, None, None),
                    },
                    None => (description, None, None, None),
                }
            }
            None => ("<unknown>".to_string(), None, None, None),
        };
        self.errors.push(ReportedError {
            expr_id,
            offset,
            message: message.into(),
            description,
            line,
            column,
            snippet,
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// All reported errors, in insertion order.
    pub fn all_errors(&self) -> &[ReportedError] {
        &self.errors
    }

    /// Render every error, separated by blank lines.
    pub fn render_all(&self) -> String {
        self.errors
            .iter()
            .map(ReportedError::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Render every error to a colored stream. The `ERROR:` heading is
    /// emitted in red; snippets use the default color.
    pub fn render_colored(&self, writer: &mut dyn WriteColor) -> std::io::Result<()> {
        let mut heading = ColorSpec::new();
        heading.set_fg(Some(Color::Red)).set_bold(true);
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(writer)?;
            }
            let rendered = error.render();
            let mut lines = rendered.lines();
            if let Some(first) = lines.next() {
                writer.set_color(&heading)?;
                write!(writer, "ERROR:")?;
                writer.reset()?;
                writeln!(writer, "{}", first.trim_start_matches("ERROR:"))?;
            }
            for line in lines {
                writeln!(writer, "{}", line)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_with_source_context() {
        let source = SourceBuffer::from_text("a + + b");
        let mut reporter = ErrorReporter::new();
        reporter.enter_context("test.cel", Some(source));
        reporter.report(None, 4, "unexpected token");
        reporter.exit_context();

        assert_eq!(reporter.error_count(), 1);
        let rendered = reporter.all_errors()[0].render();
        assert_eq!(
            rendered,
            "ERROR: test.cel:1:5: unexpected token\n | a + + b\n | ....^"
        );
    }

    #[test]
    fn test_report_without_source() {
        let mut reporter = ErrorReporter::new();
        reporter.enter_context("inner", None);
        reporter.report(Some(3), 0, "boom");
        assert_eq!(reporter.all_errors()[0].render(), "ERROR: inner: boom");
        assert_eq!(reporter.all_errors()[0].expr_id, Some(3));
    }

    #[test]
    fn test_errors_keep_insertion_order() {
        let mut reporter = ErrorReporter::new();
        reporter.enter_context("x", None);
        reporter.report(None, 0, "first");
        reporter.report(None, 1, "second");
        let messages: Vec<_> = reporter
            .all_errors()
            .iter()
            .map(|e| e.message.as_str())
            .collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn test_multiline_source_location() {
        let source = SourceBuffer::from_text("a\nbb\nccc");
        let mut reporter = ErrorReporter::new();
        reporter.enter_context("m", Some(source));
        // Offset 5 is the second 'c' on line 3.
        reporter.report(None, 6, "here");
        let error = &reporter.all_errors()[0];
        assert_eq!(error.line, Some(3));
        assert_eq!(error.column, Some(2));
        assert_eq!(error.snippet.as_deref(), Some("ccc"));
    }
}
