//! Diagnostic reporting for the Kona lowering core.
//!
//! This module provides rustc-style, colored diagnostics on stderr plus the
//! structured [`Diagnostic`] container the desugaring and emission passes
//! thread through their `Result` types. Reporting is split from detection:
//! passes build `Diagnostic` values and the driver decides when to render
//! them, which keeps probing callers (and tests) free to inspect failures
//! without stderr noise.
//!
//! Severity matters here. `Error` marks a positioned semantic failure in the
//! unit being compiled (the user's program is at fault); `Bug` marks an
//! invariant violation in the input tree, meaning the front end handed the
//! core something inconsistent with a well-typed, fully desugared AST, and
//! the unit aborts with no output.

use std::sync::atomic::{AtomicBool, Ordering};

/// Result type threaded through desugaring and emission.
///
/// Diagnostics are boxed: the success path dominates and the error payload
/// should not widen every return value.
pub type DiagnosticResult<T> = Result<T, Box<Diagnostic>>;

/// How severe a diagnostic is, and therefore how it is labeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    /// A semantic error in the compiled unit.
    Error,
    /// An upstream contract breach: the input was not a well-typed AST.
    Bug,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Bug => "internal error",
        }
    }

    fn color(self) -> &'static str {
        match self {
            // Yellow for warnings, red for everything fatal
            Severity::Warning => "\x1b[33m",
            Severity::Error | Severity::Bug => "\x1b[31m",
        }
    }
}

/// Structured diagnostic container propagated through the pipeline.
///
/// The optional `span_start` is a byte offset into the unit's source text;
/// when both it and the source are available at emission time, the renderer
/// shows the offending line with a caret marker instead of a bare header.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Primary message describing the issue.
    pub message: String,
    /// Source file the unit was compiled from, if known.
    pub file: Option<String>,
    /// Additional context or suggestion.
    pub note: Option<String>,
    /// Byte offset into the source text for caret highlighting.
    pub span_start: Option<usize>,
}

impl Diagnostic {
    /// Creates a diagnostic with only a message.
    pub fn simple(severity: Severity, msg: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            message: msg.into(),
            file: None,
            note: None,
            span_start: None,
        }
    }

    /// Boxed form of [`Diagnostic::simple`], for `DiagnosticResult` errors.
    pub fn simple_boxed(severity: Severity, msg: impl Into<String>) -> Box<Self> {
        Box::new(Self::simple(severity, msg))
    }

    /// Creates a diagnostic anchored at a byte offset in the source.
    pub fn with_span(severity: Severity, msg: impl Into<String>, span_start: usize) -> Self {
        Diagnostic {
            severity,
            message: msg.into(),
            file: None,
            note: None,
            span_start: Some(span_start),
        }
    }

    /// Boxed form of [`Diagnostic::with_span`].
    pub fn span_boxed(severity: Severity, msg: impl Into<String>, span_start: usize) -> Box<Self> {
        Box::new(Self::with_span(severity, msg, span_start))
    }

    /// Creates a boxed invariant-violation diagnostic.
    pub fn bug(msg: impl Into<String>) -> Box<Self> {
        let mut d = Self::simple(Severity::Bug, msg);
        d.note = Some("the input tree violates the front-end contract; this is not an error in the source program".to_string());
        Box::new(d)
    }

    /// Like [`Diagnostic::bug`], anchored at a byte offset.
    pub fn bug_at(msg: impl Into<String>, span_start: usize) -> Box<Self> {
        let mut d = Self::with_span(Severity::Bug, msg, span_start);
        d.note = Some("the input tree violates the front-end contract; this is not an error in the source program".to_string());
        Box::new(d)
    }
}

/// Converts a byte offset into 1-based line and 0-based column coordinates.
///
/// Falls back to the last line with column 0 when the offset lies beyond the
/// source text, so rendering degrades instead of panicking on synthesized
/// spans.
pub(crate) fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut byte_idx = 0usize;
    for (lineno, line) in source.lines().enumerate() {
        let line_len = line.len() + 1; // trailing newline
        if offset >= byte_idx && offset < byte_idx + line_len {
            return (lineno + 1, offset - byte_idx);
        }
        byte_idx += line_len;
    }
    (source.lines().count().max(1), 0)
}

/// Prints a compact diagnostic without span information.
///
/// Shows the severity-colored header, the sanitized file path when known,
/// and up to the first six source lines for context.
pub fn report_error(file: Option<&str>, source: Option<&str>, message: &str, note: Option<&str>) {
    render(Severity::Error, file, source, None, message, note);
}

/// Prints a span-aware diagnostic with a caret under the error column.
pub fn report_error_span(
    file: Option<&str>,
    source: &str,
    span_start: usize,
    message: &str,
    note: Option<&str>,
) {
    render(
        Severity::Error,
        file,
        Some(source),
        Some(span_start),
        message,
        note,
    );
}

/// Reports a diagnostic and returns an `anyhow::Error` carrying the message,
/// for callers terminating a unit with `?`.
pub fn report_error_and_bail<T>(
    file: Option<&str>,
    source: Option<&str>,
    message: &str,
    note: Option<&str>,
) -> anyhow::Result<T> {
    report_error(file, source, message, note);
    Err(anyhow::anyhow!("{}", message))
}

/// Emits a structured diagnostic, selecting the caret-highlighted form when
/// both a span and the source text are available.
///
/// Respects the global suppression state; see [`suppress`].
pub fn emit_diagnostic(d: &Diagnostic, source: Option<&str>) {
    if !DIAGNOSTICS_ENABLED.load(Ordering::SeqCst) {
        return;
    }
    render(
        d.severity,
        d.file.as_deref(),
        source,
        d.span_start,
        &d.message,
        d.note.as_deref(),
    );
}

fn render(
    severity: Severity,
    file: Option<&str>,
    source: Option<&str>,
    span_start: Option<usize>,
    message: &str,
    note: Option<&str>,
) {
    let color = severity.color();
    let reset = "\x1b[0m";

    eprintln!("{}{}{}: {}", color, severity.label(), reset, message);

    match (span_start, source) {
        (Some(span), Some(src)) => {
            let (line_no, col) = line_col(src, span);
            if let Some(path) = file {
                eprintln!("  --> {}:{}:{}", sanitize_file_path(path), line_no, col + 1);
            }

            // Show the offending line with one line of context either side.
            let lines: Vec<&str> = src.lines().collect();
            let total = lines.len();
            if total > 0 {
                let idx = line_no - 1;
                let start = idx.saturating_sub(1);
                let end = if idx + 1 < total { idx + 1 } else { total - 1 };
                for (i, line) in lines.iter().enumerate().take(end + 1).skip(start) {
                    eprintln!("{:4} | {}", i + 1, line);
                    if i == idx {
                        let mut caret = String::new();
                        for _ in 0..col {
                            caret.push(' ');
                        }
                        caret.push('^');
                        eprintln!("     | {}", caret);
                    }
                }
            }
        }
        _ => {
            if let Some(path) = file {
                eprintln!("  --> {}", sanitize_file_path(path));
            }
            if let Some(src) = source {
                for (i, line) in src.lines().enumerate().take(6) {
                    eprintln!("{:4} | {}", i + 1, line);
                }
            }
        }
    }

    if let Some(note) = note {
        let blue = "\x1b[34m";
        eprintln!("{}note{}: {}", blue, reset, note);
    }
}

static DIAGNOSTICS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Reduces a path to its file name so diagnostics never leak directory
/// structure into logs.
fn sanitize_file_path(path: &str) -> String {
    std::path::Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .to_string()
}

/// Temporarily silences diagnostic output.
///
/// Returns a guard that restores the previous state when dropped. Used by
/// callers that probe for failures they intend to handle, and by tests that
/// assert on returned diagnostics rather than stderr.
pub fn suppress() -> SuppressGuard {
    let prev = DIAGNOSTICS_ENABLED.swap(false, Ordering::SeqCst);
    SuppressGuard { prev }
}

/// RAII guard restoring the diagnostic output state on drop.
pub struct SuppressGuard {
    prev: bool,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        DIAGNOSTICS_ENABLED.store(self.prev, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_points_at_second_line() {
        let src = "class A {\n  field\n}\n";
        let (line, col) = line_col(src, 12);
        assert_eq!(line, 2);
        assert_eq!(col, 2);
    }

    #[test]
    fn line_col_clamps_past_end() {
        let (line, col) = line_col("one line", 10_000);
        assert_eq!(line, 1);
        assert_eq!(col, 0);
    }

    #[test]
    fn bug_diagnostics_carry_contract_note() {
        let d = Diagnostic::bug("impossible operand");
        assert_eq!(d.severity, Severity::Bug);
        assert!(d.note.as_deref().is_some_and(|n| n.contains("contract")));
    }

    #[test]
    fn suppression_guard_restores_state_on_drop() {
        assert!(DIAGNOSTICS_ENABLED.load(Ordering::SeqCst));
        {
            let _guard = suppress();
            assert!(!DIAGNOSTICS_ENABLED.load(Ordering::SeqCst));
            emit_diagnostic(&Diagnostic::simple(Severity::Error, "hidden"), None);
        }
        assert!(DIAGNOSTICS_ENABLED.load(Ordering::SeqCst));
    }
}
