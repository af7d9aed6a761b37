//! Expression parsing: a small precedence climber.
//!
//! Level 0 is `key: value` field syntax inside dicts (tolerating `=`
//! with a fix-it) and `path { ... }` aggregation; level 1 is the `to`
//! range operator; above that sit prefix minus and the primaries.
//! Negative numbers stay prefixed rather than folded so a formatter can
//! reproduce the source.

use crate::ast::{
    ExprAny, ExprArray, ExprDict, ExprError, ExprField, ExprLiteral, ExprPath, ExprPrefix,
    ExprPrefixed, ExprRange,
};
use crate::report::Diagnostic;
use crate::token::{TokenId, TokenKind};

use super::{DelimitedOptions, Parser};

impl<'a> Parser<'a> {
    /// Level 1: `lo to hi`, or anything tighter.
    pub(crate) fn parse_expr(&mut self) -> ExprAny {
        let lo = self.parse_unary();
        if self.at("to") {
            self.bump();
            let hi = if self.peek().is_some() && !self.at(",") && !self.at(";") {
                Some(self.parse_unary())
            } else {
                let at = self.here();
                self.report.push(
                    Diagnostic::error("expected an upper bound after `to`")
                        .with_span(at, "bound missing here"),
                );
                None
            };
            let mut span = self.ast.expr_span(lo);
            if let Some(hi) = hi {
                span = span.join(self.ast.expr_span(hi));
            }
            return self.ast.alloc_range_expr(ExprRange { span, lo, hi });
        }
        lo
    }

    /// Level 0: one entry of a dict body.
    pub(crate) fn parse_expr_field(&mut self) -> Option<ExprAny> {
        self.peek()?;
        let key = self.parse_expr();

        let separator = if let Some(span) = self.eat(":") {
            Some(span)
        } else if self.at("=") {
            // Text-format dicts use `:`; `=` is a common slip worth
            // auto-correcting.
            let span = self.bump().map(|(_, t)| t.span);
            if let Some(span) = span {
                self.report.push(
                    Diagnostic::error("dict entries use `:`, not `=`").with_edit(
                        span,
                        "write `:` here",
                        ":".to_string(),
                    ),
                );
            }
            span
        } else {
            None
        };

        // `path { ... }` and `path [ ... ]` aggregate without a
        // separator.
        let value = if separator.is_some() {
            Some(self.parse_expr())
        } else if let Some(open) = self.at_group('{') {
            self.bump();
            Some(self.parse_dict(open))
        } else if let Some(open) = self.at_group('<') {
            self.bump();
            Some(self.parse_dict(open))
        } else if let Some(open) = self.at_group('[') {
            self.bump();
            Some(self.parse_array(open))
        } else {
            // A bare expression; let the consumer decide if that is
            // meaningful.
            return Some(key);
        };

        let mut span = self.ast.expr_span(key);
        if let Some(value) = value {
            span = span.join(self.ast.expr_span(value));
        }
        Some(self.ast.alloc_field_expr(ExprField {
            span,
            key,
            separator,
            value,
        }))
    }

    fn parse_unary(&mut self) -> ExprAny {
        if let Some(span) = self.eat("-") {
            let inner = match self.peek() {
                Some(_) => Some(self.parse_unary()),
                None => None,
            };
            let full = inner.map_or(span, |e| span.join(self.ast.expr_span(e)));
            return self.ast.alloc_prefixed(ExprPrefixed {
                span: full,
                prefix: ExprPrefix::Minus,
                prefix_span: span,
                inner,
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ExprAny {
        let (id, token) = match self.peek() {
            Some(pair) => pair,
            None => {
                let at = self.here();
                self.report.push(
                    Diagnostic::error("expected an expression").with_span(at, "nothing here"),
                );
                return self.ast.alloc_error_expr(ExprError { span: at });
            }
        };

        match token.kind {
            TokenKind::Number | TokenKind::Str => {
                self.bump();
                self.ast.alloc_literal(ExprLiteral {
                    span: token.span,
                    token: id,
                })
            }
            TokenKind::Ident => {
                let path = self.parse_path();
                self.ast.alloc_expr_path(ExprPath { path })
            }
            TokenKind::Punct => {
                let text = token.span.text(self.text);
                if token.is_group_open() {
                    match text.chars().next() {
                        Some('{') | Some('<') => {
                            self.bump();
                            return self.parse_dict(id);
                        }
                        Some('[') => {
                            self.bump();
                            return self.parse_array(id);
                        }
                        _ => {}
                    }
                }
                if text == "." && self.at_path_start() {
                    let path = self.parse_path();
                    return self.ast.alloc_expr_path(ExprPath { path });
                }
                self.report.push(
                    Diagnostic::error(format!("expected an expression, found `{text}`"))
                        .with_span(token.span, "not an expression"),
                );
                self.ast.alloc_error_expr(ExprError { span: token.span })
            }
            _ => {
                self.report.push(
                    Diagnostic::error("expected an expression")
                        .with_span(token.span, "not an expression"),
                );
                self.ast.alloc_error_expr(ExprError { span: token.span })
            }
        }
    }

    pub(super) fn parse_dict(&mut self, open: TokenId) -> ExprAny {
        let span = self.group_span(open);
        let entries = self.in_group(open, |p| {
            p.delimited(DelimitedOptions::dict(), |_| false, |p| p.parse_expr_field())
        });
        self.ast.alloc_dict(ExprDict { span, entries })
    }

    pub(super) fn parse_array(&mut self, open: TokenId) -> ExprAny {
        let span = self.group_span(open);
        let elems = self.in_group(open, |p| {
            p.delimited(
                DelimitedOptions::comma(),
                |_| false,
                |p| p.parse_expr_field(),
            )
        });
        self.ast.alloc_array(ExprArray { span, elems })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{ExprKind, ExprPrefix};
    use crate::parser::tests::parse_text;

    #[test]
    fn negative_default_stays_prefixed() {
        let (parsed, diags) = parse_text("message M { int32 x = 1 [default = -5]; }");
        assert!(diags.is_empty(), "{diags:?}");
        let message = parsed.ast.def(parsed.file.decls[0]).unwrap();
        let body = parsed.ast.body(message.body.unwrap());
        let field = parsed.ast.def(body.decls[0]).unwrap();
        let options = parsed.ast.array(field.options.unwrap()).unwrap();
        let entry = parsed.ast.field_expr(options.elems[0]).unwrap();
        let value = entry.value.unwrap();
        assert_eq!(value.kind(), ExprKind::Prefixed);
        let prefixed = parsed.ast.prefixed(value).unwrap();
        assert_eq!(prefixed.prefix, ExprPrefix::Minus);
        assert_eq!(prefixed.inner.unwrap().kind(), ExprKind::Literal);
    }

    #[test]
    fn range_expression() {
        let (parsed, diags) = parse_text("message M { extensions 100 to max; }");
        assert!(diags.is_empty(), "{diags:?}");
        let message = parsed.ast.def(parsed.file.decls[0]).unwrap();
        let body = parsed.ast.body(message.body.unwrap());
        let range = parsed.ast.range(body.decls[0]).unwrap();
        let item = parsed.ast.range_expr(range.items[0]).unwrap();
        assert_eq!(item.lo.kind(), ExprKind::Literal);
        assert_eq!(item.hi.unwrap().kind(), ExprKind::Path);
    }

    #[test]
    fn dict_value_with_colon_and_aggregation() {
        let (parsed, diags) =
            parse_text("option x = { key: 1 nested { a: 2 } list [1, 2] };");
        assert!(diags.is_empty(), "{diags:?}");
        let option = parsed.ast.def(parsed.file.decls[0]).unwrap();
        let dict = parsed.ast.dict(option.value.unwrap()).unwrap();
        assert_eq!(dict.entries.len(), 3);
        let nested = parsed.ast.field_expr(dict.entries[1]).unwrap();
        assert!(nested.separator.is_none());
        assert_eq!(nested.value.unwrap().kind(), ExprKind::Dict);
        let list = parsed.ast.field_expr(dict.entries[2]).unwrap();
        assert_eq!(list.value.unwrap().kind(), ExprKind::Array);
    }

    #[test]
    fn equals_in_dict_is_corrected() {
        let (_, diags) = parse_text("option x = { key = 1 };");
        let diag = diags
            .iter()
            .find(|d| d.message.contains("use `:`"))
            .unwrap();
        assert_eq!(diag.snippets[0].edits[0].replace, ":");
    }

    #[test]
    fn angle_dict() {
        let (parsed, diags) = parse_text("option x = { msg < a: 1 > };");
        assert!(diags.is_empty(), "{diags:?}");
        let option = parsed.ast.def(parsed.file.decls[0]).unwrap();
        let dict = parsed.ast.dict(option.value.unwrap()).unwrap();
        let entry = parsed.ast.field_expr(dict.entries[0]).unwrap();
        assert_eq!(entry.value.unwrap().kind(), ExprKind::Dict);
    }
}
