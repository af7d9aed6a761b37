//! The reusable separated-list combinator.
//!
//! Comma/semicolon lists appear all over the grammar (range items,
//! compact options, dict entries, signature types) with slightly varying
//! rules. `delimited` owns the shared separator bookkeeping: leading,
//! missing, doubled, and trailing separators each get a precise
//! diagnostic with a byte-range edit.

use crate::report::Diagnostic;
use crate::span::Span;

use super::Parser;

/// Configuration for one `delimited` call.
#[derive(Copy, Clone)]
pub struct DelimitedOptions {
    /// Accepted separator tokens.
    pub separators: &'static [&'static str],
    /// Whether a separator between elements is mandatory.
    pub required: bool,
    /// Whether a separator may trail the final element.
    pub allow_trailing: bool,
}

impl DelimitedOptions {
    /// Comma-separated, mandatory, no trailing comma: the common case.
    pub fn comma() -> DelimitedOptions {
        DelimitedOptions {
            separators: &[","],
            required: true,
            allow_trailing: false,
        }
    }

    /// Dict entries: separators optional, both `,` and `;` accepted,
    /// trailing allowed.
    pub fn dict() -> DelimitedOptions {
        DelimitedOptions {
            separators: &[",", ";"],
            required: false,
            allow_trailing: true,
        }
    }
}

impl<'a> Parser<'a> {
    /// Parses elements until `stop` matches or input runs out.
    ///
    /// `element` must consume at least one token when it returns `Some`;
    /// the progress sentinel turns a violation into an ICE.
    pub(crate) fn delimited<T>(
        &mut self,
        options: DelimitedOptions,
        stop: impl Fn(&Self) -> bool,
        mut element: impl FnMut(&mut Self) -> Option<T>,
    ) -> Vec<T> {
        let mut out = Vec::new();
        let mut last_separator: Option<Span> = None;

        // A separator before any element is an error we can fix.
        if let Some(span) = self.eat_separator(options) {
            self.report.push(
                Diagnostic::error("leading separator in list")
                    .with_deletion(span, "remove this separator"),
            );
        }

        loop {
            if self.cursor.at_end() || stop(self) {
                break;
            }
            let before = self.cursor.offset();
            if let Some(item) = element(self) {
                out.push(item);
            }
            if self.cursor.offset() == before {
                // The element parser refused the token (and already
                // diagnosed it); skip it so the list always advances.
                self.bump();
            }
            self.must_progress(before, "delimited list");

            match self.eat_separator(options) {
                Some(span) => {
                    last_separator = Some(span);
                    // Doubled separators collapse to one.
                    while let Some(extra) = self.eat_separator(options) {
                        self.report.push(
                            Diagnostic::error("extra separator in list")
                                .with_deletion(extra, "remove this separator"),
                        );
                        last_separator = Some(extra);
                    }
                }
                None => {
                    if self.cursor.at_end() || stop(self) {
                        last_separator = None;
                        break;
                    }
                    if options.required {
                        let at = self.here();
                        self.report.push(
                            Diagnostic::error("missing separator in list").with_edit(
                                at,
                                "insert one here",
                                options.separators[0].to_string(),
                            ),
                        );
                    }
                    last_separator = None;
                }
            }
        }

        if let Some(span) = last_separator {
            if !options.allow_trailing {
                self.report.push(
                    Diagnostic::error("trailing separator in list")
                        .with_deletion(span, "remove this separator"),
                );
            }
        }
        out
    }

    fn eat_separator(&mut self, options: DelimitedOptions) -> Option<Span> {
        for separator in options.separators {
            if let Some(span) = self.eat(separator) {
                return Some(span);
            }
        }
        None
    }
}
