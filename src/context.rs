//! Per-file compilation context.
//!
//! A [`FileContext`] bundles everything derived from one file's text:
//! the token stream, the syntax tree, and the line index. It is built by
//! the parse query, sealed (never mutated again), and shared by `Arc`
//! with every downstream consumer, so cross-thread access needs no
//! locking.

use std::sync::Arc;

use bytes::Bytes;

use crate::ast::{Ast, ExprAny, ExprKind, ExprPrefix, Path, PathName, SourceFile};
use crate::intern::Name;
use crate::lexer::Lexed;
use crate::span::Span;
use crate::syntax::SyntaxMode;
use crate::token::{LitValue, TokenId, TokenStream};

/// One file, fully lexed and parsed.
pub struct FileContext {
    /// Canonical import path, interned.
    pub path: Name,
    pub lexed: Arc<Lexed>,
    pub ast: Ast,
    pub root: SourceFile,
    pub syntax: SyntaxMode,
    /// Byte offsets of line starts, for span-to-line/column mapping.
    line_starts: Vec<u32>,
}

impl FileContext {
    pub fn new(
        path: Name,
        lexed: Arc<Lexed>,
        ast: Ast,
        root: SourceFile,
        syntax: SyntaxMode,
    ) -> Arc<FileContext> {
        let mut line_starts = vec![0u32];
        for (offset, byte) in lexed.text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset as u32 + 1);
            }
        }
        Arc::new(FileContext {
            path,
            lexed,
            ast,
            root,
            syntax,
            line_starts,
        })
    }

    pub fn text(&self) -> &str {
        &self.lexed.text
    }

    pub fn stream(&self) -> &TokenStream {
        &self.lexed.stream
    }

    pub fn token_text(&self, id: TokenId) -> &str {
        self.stream().text_of(id, self.text())
    }

    /// Zero-based `(line, column)` of a byte offset. Columns count bytes
    /// within the line; a renderer may re-measure for display.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert) => insert - 1,
        };
        (line as u32, offset - self.line_starts[line])
    }

    /// Renders a path the way it was written, minus trivia.
    pub fn path_text(&self, path: &Path) -> String {
        let mut out = String::new();
        if path.leading_dot.is_some() {
            out.push('.');
        }
        for component in &path.components {
            if component.separator.is_some() {
                out.push('.');
            }
            match &component.name {
                PathName::Ident(token) => out.push_str(self.token_text(*token)),
                PathName::Extension(inner) => {
                    out.push('(');
                    out.push_str(&self.path_text(self.ast.path(*inner)));
                    out.push(')');
                }
                PathName::Missing(_) => {}
            }
        }
        out
    }

    /// The identifier components of a plain (extension-free) path.
    pub fn path_idents(&self, path: &Path) -> Option<Vec<&str>> {
        path.components
            .iter()
            .map(|c| match c.name {
                PathName::Ident(token) => Some(self.token_text(token)),
                _ => None,
            })
            .collect()
    }

    /// Constant-evaluates an expression to an integer, honoring prefix
    /// minus. `None` when the expression is not an in-range integer.
    pub fn int_value(&self, expr: ExprAny) -> Option<i128> {
        match expr.kind() {
            ExprKind::Literal => {
                let literal = self.ast.literal(expr)?;
                match self.stream().literal(literal.token)? {
                    LitValue::Int(value) => Some(*value as i128),
                    LitValue::Big(_) => None,
                    _ => None,
                }
            }
            ExprKind::Prefixed => {
                let prefixed = self.ast.prefixed(expr)?;
                match prefixed.prefix {
                    ExprPrefix::Minus => Some(-self.int_value(prefixed.inner?)?),
                }
            }
            _ => None,
        }
    }

    /// The decoded bytes of a string-literal expression.
    pub fn string_value(&self, expr: ExprAny) -> Option<Bytes> {
        let literal = self.ast.literal(expr)?;
        match self.stream().literal(literal.token)? {
            LitValue::Bytes(bytes) => Some(bytes.clone()),
            _ => None,
        }
    }

    /// The decoded UTF-8 of a string-literal expression.
    pub fn string_text(&self, expr: ExprAny) -> Option<String> {
        let bytes = self.string_value(expr)?;
        String::from_utf8(bytes.to_vec()).ok()
    }

    /// A float-literal value (also accepts integer literals, widened).
    pub fn float_value(&self, expr: ExprAny) -> Option<f64> {
        match expr.kind() {
            ExprKind::Literal => {
                let literal = self.ast.literal(expr)?;
                match self.stream().literal(literal.token)? {
                    LitValue::Float(value) => Some(*value),
                    LitValue::Int(value) => Some(*value as f64),
                    LitValue::Big(digits) => digits.parse().ok(),
                    _ => None,
                }
            }
            ExprKind::Prefixed => {
                let prefixed = self.ast.prefixed(expr)?;
                match prefixed.prefix {
                    ExprPrefix::Minus => Some(-self.float_value(prefixed.inner?)?),
                }
            }
            ExprKind::Path => {
                let path = self.ast.expr_path(expr)?;
                match self.path_text(self.ast.path(path.path)).as_str() {
                    "inf" => Some(f64::INFINITY),
                    "nan" => Some(f64::NAN),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    pub fn expr_span(&self, expr: ExprAny) -> Span {
        self.ast.expr_span(expr)
    }
}

impl std::fmt::Debug for FileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContext")
            .field("path", &self.path)
            .field("syntax", &self.syntax)
            .field("tokens", &self.stream().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;
    use crate::lexer::lex;
    use crate::parser::parse;
    use crate::report::Report;

    pub(crate) fn context_of(text: &str) -> (Arc<FileContext>, Report) {
        let interner = Interner::new();
        let report = Report::new();
        let lexed = lex(text.as_bytes(), &report);
        let parsed = parse(text, &lexed.stream, &report);
        let cx = FileContext::new(
            interner.intern("test.proto"),
            Arc::new(lexed),
            parsed.ast,
            parsed.file,
            SyntaxMode::default(),
        );
        (cx, report)
    }

    #[test]
    fn line_col_mapping() {
        let (cx, _) = context_of("abc\ndef\r\nghi");
        assert_eq!(cx.line_col(0), (0, 0));
        assert_eq!(cx.line_col(2), (0, 2));
        assert_eq!(cx.line_col(4), (1, 0));
        assert_eq!(cx.line_col(9), (2, 0));
        assert_eq!(cx.line_col(11), (2, 2));
    }

    #[test]
    fn int_values_with_minus() {
        let (cx, _) = context_of("message M { int32 x = 1 [default = -42]; }");
        let message = cx.ast.def(cx.root.decls[0]).unwrap();
        let body = cx.ast.body(message.body.unwrap());
        let field = cx.ast.def(body.decls[0]).unwrap();
        assert_eq!(cx.int_value(field.value.unwrap()), Some(1));
        let options = cx.ast.array(field.options.unwrap()).unwrap();
        let entry = cx.ast.field_expr(options.elems[0]).unwrap();
        assert_eq!(cx.int_value(entry.value.unwrap()), Some(-42));
    }

    #[test]
    fn path_text_round_trips() {
        let (cx, _) = context_of("option (my.ext).sub = 1;");
        let option = cx.ast.def(cx.root.decls[0]).unwrap();
        let path = cx.ast.path(option.name.unwrap());
        assert_eq!(cx.path_text(path), "(my.ext).sub");
    }
}
