//! Path parsing: dotted names with extension components.

use smallvec::SmallVec;

use crate::arena::Ptr;
use crate::ast::{Path, PathComponent, PathName};
use crate::report::Diagnostic;
use crate::span::Span;
use crate::token::TokenKind;

use super::Parser;

impl<'a> Parser<'a> {
    /// Longest-match path parse: `(separator, name)` pairs where a name
    /// is an identifier or a parenthesized extension path. Doubled and
    /// trailing separators are diagnosed with fix-its but still produce
    /// a usable path.
    pub(crate) fn parse_path(&mut self) -> Ptr<Path> {
        let mut components: SmallVec<[PathComponent; 2]> = SmallVec::new();
        let mut span: Option<Span> = None;
        let mut leading_dot = None;

        // Absolute paths open with a separator.
        if let Some(dot) = self.eat_dot() {
            leading_dot = Some(dot);
            span = Some(dot);
        }

        let mut expect_name = true;
        let mut separator: Option<Span> = None;
        loop {
            if expect_name {
                match self.parse_path_name() {
                    Some((name, name_span)) => {
                        span = Some(span.map_or(name_span, |s| s.join(name_span)));
                        components.push(PathComponent { separator, name });
                        separator = None;
                        expect_name = false;
                    }
                    None => {
                        // A separator with nothing after it.
                        if let Some(dot) = separator.take() {
                            self.report.push(
                                Diagnostic::error("trailing `.` in name")
                                    .with_deletion(dot, "remove this separator"),
                            );
                            components.push(PathComponent {
                                separator: Some(dot),
                                name: PathName::Missing(dot),
                            });
                        } else if components.is_empty() {
                            if let Some(dot) = leading_dot {
                                self.report.push(
                                    Diagnostic::error("expected a name after `.`")
                                        .with_span(dot, "this dot starts nothing"),
                                );
                            }
                        }
                        break;
                    }
                }
            } else {
                match self.eat_dot() {
                    Some(dot) => {
                        span = Some(span.map_or(dot, |s| s.join(dot)));
                        separator = Some(dot);
                        // Doubled separators collapse with a fix-it.
                        while let Some(extra) = self.eat_dot() {
                            self.report.push(
                                Diagnostic::error("doubled `.` in name")
                                    .with_deletion(extra, "remove one of the separators"),
                            );
                            span = Some(span.map_or(extra, |s| s.join(extra)));
                        }
                        expect_name = true;
                    }
                    None => break,
                }
            }
        }

        let span = span.unwrap_or_else(|| self.here());
        self.ast.alloc_path(Path {
            span,
            leading_dot,
            components,
        })
    }

    fn parse_path_name(&mut self) -> Option<(PathName, Span)> {
        let (id, token) = self.peek()?;
        match token.kind {
            TokenKind::Ident => {
                self.bump();
                Some((PathName::Ident(id), token.span))
            }
            TokenKind::Punct if token.is_group_open()
                && token.span.text(self.text).starts_with('(') =>
            {
                self.bump();
                let span = self.group_span(id);
                let inner = self.in_group(id, |p| {
                    let inner = p.parse_path();
                    p.expect_group_end("after the extension path");
                    inner
                });
                Some((PathName::Extension(inner), span))
            }
            _ => None,
        }
    }

    /// Consumes a lone `.` punct (not the start of a float).
    fn eat_dot(&mut self) -> Option<Span> {
        let (_, token) = self.peek()?;
        if token.kind == TokenKind::Punct && token.span.text(self.text) == "." {
            self.bump();
            Some(token.span)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{PathName, TypeKind};
    use crate::parser::tests::parse_text;

    #[test]
    fn dotted_path_components() {
        let (parsed, diags) = parse_text("package foo.bar.baz;");
        assert!(diags.is_empty(), "{diags:?}");
        let package = parsed.ast.package(parsed.file.decls[0]).unwrap();
        let path = parsed.ast.path(package.path.unwrap());
        assert_eq!(path.components.len(), 3);
        assert!(path.leading_dot.is_none());
        assert!(path.components[0].separator.is_none());
        assert!(path.components[1].separator.is_some());
    }

    #[test]
    fn absolute_type_path() {
        let (parsed, diags) = parse_text("message M { .foo.Bar b = 1; }");
        assert!(diags.is_empty(), "{diags:?}");
        let message = parsed.ast.def(parsed.file.decls[0]).unwrap();
        let body = parsed.ast.body(message.body.unwrap());
        let field = parsed.ast.def(body.decls[0]).unwrap();
        let ty = field.prefix.unwrap();
        assert_eq!(ty.kind(), TypeKind::Path);
        let type_path = parsed.ast.type_path(ty).unwrap();
        assert!(parsed.ast.path(type_path.path).leading_dot.is_some());
    }

    #[test]
    fn doubled_separator_fixit() {
        let (_, diags) = parse_text("package foo..bar;");
        let diag = diags
            .iter()
            .find(|d| d.message.contains("doubled `.`"))
            .unwrap();
        assert!(diag.snippets[0].edits[0].replace.is_empty());
    }

    #[test]
    fn trailing_separator_fixit() {
        let (_, diags) = parse_text("package foo.;");
        assert!(diags.iter().any(|d| d.message.contains("trailing `.`")));
    }

    #[test]
    fn extension_component() {
        let (parsed, diags) = parse_text("option (my.ext).field = 3;");
        assert!(diags.is_empty(), "{diags:?}");
        let option = parsed.ast.def(parsed.file.decls[0]).unwrap();
        let path = parsed.ast.path(option.name.unwrap());
        assert_eq!(path.components.len(), 2);
        match path.components[0].name {
            PathName::Extension(inner) => {
                assert_eq!(parsed.ast.path(inner).components.len(), 2);
            }
            ref other => panic!("expected extension component, got {other:?}"),
        }
        match path.components[1].name {
            PathName::Ident(_) => {}
            ref other => panic!("expected ident component, got {other:?}"),
        }
    }
}
