//! Diagnostic accumulation.
//!
//! The core never renders or prints; it builds structured [`Diagnostic`]
//! values and collects them in a [`Report`]. A renderer (outside this
//! crate) decides presentation, and a host deciding process exit codes
//! should consult [`Report::has_errors`]: zero diagnostics of severity
//! `Error` or above means success.

use std::fmt;

use parking_lot::Mutex;

use crate::intern::Name;
use crate::span::Span;

/// Diagnostic severity, ordered from least to most severe.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum Severity {
    /// Internal trace output, only emitted in debug mode.
    Debug,
    Note,
    Help,
    Warning,
    Error,
    /// An internal invariant violation, caught and surfaced instead of
    /// aborting the process.
    Ice,
}

impl Severity {
    pub fn is_error(self) -> bool {
        self >= Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Debug => "debug",
            Severity::Note => "note",
            Severity::Help => "help",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Ice => "internal compiler error",
        };
        f.write_str(name)
    }
}

/// A machine-applicable byte-range replacement.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Edit {
    pub span: Span,
    pub replace: String,
}

impl Edit {
    pub fn replace(span: Span, replacement: impl Into<String>) -> Edit {
        Edit {
            span,
            replace: replacement.into(),
        }
    }

    pub fn delete(span: Span) -> Edit {
        Edit {
            span,
            replace: String::new(),
        }
    }
}

/// A source excerpt attached to a diagnostic: a span, a label, and any
/// suggested edits anchored to it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Snippet {
    pub span: Span,
    /// The file the span points into; `None` means the file the
    /// diagnostic was reported against.
    pub file: Option<Name>,
    pub message: String,
    pub edits: Vec<Edit>,
}

/// One diagnostic: severity, primary message, snippets, and free-form
/// notes and helps.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub snippets: Vec<Snippet>,
    pub notes: Vec<String>,
    pub helps: Vec<String>,
    /// Debug trace fields (query names, panic payloads); never rendered
    /// to end users outside debug mode.
    pub trace: Vec<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            severity,
            message: message.into(),
            snippets: Vec::new(),
            notes: Vec::new(),
            helps: Vec::new(),
            trace: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(Severity::Warning, message)
    }

    pub fn ice(message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(Severity::Ice, message)
    }

    /// Attaches a labelled span.
    pub fn with_span(mut self, span: Span, message: impl Into<String>) -> Diagnostic {
        self.snippets.push(Snippet {
            span,
            file: None,
            message: message.into(),
            edits: Vec::new(),
        });
        self
    }

    /// Attaches a labelled span pointing into another file.
    pub fn with_span_in(
        mut self,
        file: Name,
        span: Span,
        message: impl Into<String>,
    ) -> Diagnostic {
        self.snippets.push(Snippet {
            span,
            file: Some(file),
            message: message.into(),
            edits: Vec::new(),
        });
        self
    }

    /// Attaches a labelled span carrying a suggested replacement.
    pub fn with_edit(
        mut self,
        span: Span,
        message: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Diagnostic {
        self.snippets.push(Snippet {
            span,
            file: None,
            message: message.into(),
            edits: vec![Edit::replace(span, replacement)],
        });
        self
    }

    /// Attaches a labelled span suggesting deletion of that span.
    pub fn with_deletion(mut self, span: Span, message: impl Into<String>) -> Diagnostic {
        self.snippets.push(Snippet {
            span,
            file: None,
            message: message.into(),
            edits: vec![Edit::delete(span)],
        });
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Diagnostic {
        self.notes.push(note.into());
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Diagnostic {
        self.helps.push(help.into());
        self
    }

    pub fn trace(mut self, field: impl Into<String>) -> Diagnostic {
        self.trace.push(field.into());
        self
    }

    /// The span of the first snippet, if any; used for ordering.
    pub fn primary_span(&self) -> Option<Span> {
        self.snippets.first().map(|s| s.span)
    }
}

/// An append-only diagnostic sink.
///
/// Shared by reference throughout a compilation stage; interior mutability
/// keeps the push sites out of the borrow checker's way while a stage also
/// holds shared borrows of the token stream or AST.
#[derive(Default)]
pub struct Report {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl Report {
    pub fn new() -> Report {
        Report::default()
    }

    pub fn push(&self, diagnostic: Diagnostic) {
        self.diagnostics.lock().push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.lock().len()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .lock()
            .iter()
            .any(|d| d.severity.is_error())
    }

    /// Copies out all diagnostics, ordered by primary span then severity.
    pub fn to_vec(&self) -> Vec<Diagnostic> {
        let mut out = self.diagnostics.lock().clone();
        out.sort_by_key(|d| (d.primary_span().unwrap_or_default(), d.severity));
        out
    }

    /// Moves all diagnostics out, leaving the report empty.
    pub fn drain(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.diagnostics.lock())
    }

    pub fn extend(&self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.lock().extend(diagnostics);
    }
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report")
            .field("diagnostics", &*self.diagnostics.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chains() {
        let diag = Diagnostic::error("mixed tags and names in reserved range")
            .with_edit(Span::new(10, 13), "string name here", "")
            .note("reserved names and tags cannot share a clause")
            .help("split into two reserved declarations");
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.snippets.len(), 1);
        assert_eq!(diag.snippets[0].edits[0].replace, "");
        assert_eq!(diag.primary_span(), Some(Span::new(10, 13)));
    }

    #[test]
    fn report_orders_by_span() {
        let report = Report::new();
        report.push(Diagnostic::error("b").with_span(Span::new(9, 10), ""));
        report.push(Diagnostic::error("a").with_span(Span::new(2, 4), ""));
        let diags = report.to_vec();
        assert_eq!(diags[0].message, "a");
        assert_eq!(diags[1].message, "b");
        assert!(report.has_errors());
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Ice > Severity::Error);
        assert!(Severity::Error > Severity::Warning);
        assert!(!Severity::Warning.is_error());
        assert!(Severity::Ice.is_error());
    }
}
