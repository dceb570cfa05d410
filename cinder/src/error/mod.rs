//! Error types, diagnostics and reporting

use crate::syntax::Span;
use serde::Serialize;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, CompileError>;

/// Compile error that aborts compilation
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("Lexer error at {span}: {message}")]
    Lexer { message: String, span: Span },

    #[error("Syntax error at {span}: {message}")]
    Syntax { message: String, span: Span },

    #[error("IO error: {message}")]
    Io { message: String },
}

impl CompileError {
    pub fn lexer(message: impl Into<String>, span: Span) -> Self {
        Self::Lexer {
            message: message.into(),
            span,
        }
    }

    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::Syntax {
            message: message.into(),
            span,
        }
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Lexer { span, .. } | Self::Syntax { span, .. } => Some(*span),
            Self::Io { .. } => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Lexer { message, .. } => message,
            Self::Syntax { message, .. } => message,
            Self::Io { message } => message,
        }
    }
}

/// A position in the source, lines and columns 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourcePos {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceRange {
    pub start: SourcePos,
    pub end: SourcePos,
}

impl SourceRange {
    pub fn span(&self) -> Span {
        Span::new(self.start.offset, self.end.offset)
    }
}

/// Offset to line/column translation for one source text
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset at which each line starts
    line_starts: Vec<usize>,
    source: String,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            line_starts,
            source: source.to_string(),
        }
    }

    pub fn position(&self, offset: usize) -> SourcePos {
        let offset = offset.min(self.source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = self
            .source
            .get(line_start..offset)
            .map_or(offset - line_start, |text| text.chars().count());
        SourcePos {
            offset,
            line: line + 1,
            column: column + 1,
        }
    }

    pub fn range(&self, span: Span) -> SourceRange {
        SourceRange {
            start: self.position(span.start),
            end: self.position(span.end),
        }
    }
}

/// Non-fatal compile diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub range: SourceRange,
}

impl Diagnostic {
    pub fn span(&self) -> Span {
        self.range.span()
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: {}",
            self.range.start.line, self.range.start.column, self.message
        )
    }
}

fn print_report(filename: &str, source: &str, title: String, label: Option<(Span, &str)>) {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    let span = label.map_or(0..0, |(span, _)| span.into());
    let mut report = Report::build(ReportKind::Error, (filename, span.clone())).with_message(title);
    if let Some((_, message)) = label {
        report = report.with_label(
            Label::new((filename, span))
                .with_message(message)
                .with_color(Color::Red),
        );
    }
    if let Err(e) = report.finish().eprint((filename, Source::from(source))) {
        eprintln!("failed to render report: {e}");
    }
}

/// Report a thrown compile error with ariadne
pub fn report_error(filename: &str, source: &str, error: &CompileError) {
    let kind = match error {
        CompileError::Lexer { .. } => "Lexer",
        CompileError::Syntax { .. } => "Syntax",
        CompileError::Io { .. } => "IO",
    };
    match error.span() {
        Some(span) => print_report(
            filename,
            source,
            format!("{kind} error"),
            Some((span, error.message())),
        ),
        None => print_report(
            filename,
            source,
            format!("{kind} error: {}", error.message()),
            None,
        ),
    }
}

/// Report an accumulated compile diagnostic
pub fn report_diagnostic(filename: &str, source: &str, diagnostic: &Diagnostic) {
    print_report(
        filename,
        source,
        "Compile error".to_string(),
        Some((diagnostic.span(), &diagnostic.message)),
    );
}

/// Report an error that reached the bottom of the call stack
pub fn report_runtime_error(filename: &str, source: &str, message: &str, span: Option<Span>) {
    match span {
        Some(span) => print_report(filename, source, "Runtime error".to_string(), Some((span, message))),
        None => print_report(filename, source, format!("Runtime error: {message}"), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_accessors() {
        let err = CompileError::syntax("expected `;`", Span::new(3, 4));
        assert_eq!(err.message(), "expected `;`");
        assert_eq!(err.span(), Some(Span::new(3, 4)));
        assert_eq!(err.to_string(), "Syntax error at 3..4: expected `;`");
    }

    #[test]
    fn test_io_error_has_no_span() {
        let err = CompileError::io_error("missing file");
        assert_eq!(err.span(), None);
        assert_eq!(err.to_string(), "IO error: missing file");
    }

    #[test]
    fn test_line_index_positions() {
        let index = LineIndex::new("init x = 1;\ninit y = 2;\n");
        assert_eq!(
            index.position(0),
            SourcePos {
                offset: 0,
                line: 1,
                column: 1
            }
        );
        let pos = index.position(17);
        assert_eq!((pos.line, pos.column), (2, 6));
    }

    #[test]
    fn test_line_index_counts_code_points() {
        let index = LineIndex::new("\"é\" x");
        // 'x' sits after a two-byte character
        let pos = index.position(5);
        assert_eq!((pos.line, pos.column), (1, 5));
    }

    #[test]
    fn test_line_index_clamps_offset() {
        let index = LineIndex::new("ab");
        assert_eq!(index.position(99).offset, 2);
    }

    #[test]
    fn test_diagnostic_display() {
        let index = LineIndex::new("init x = y;");
        let diagnostic = Diagnostic {
            message: "'y' is not defined".to_string(),
            range: index.range(Span::new(9, 10)),
        };
        assert_eq!(diagnostic.to_string(), "1:10: 'y' is not defined");
        assert_eq!(diagnostic.span(), Span::new(9, 10));
    }
}
