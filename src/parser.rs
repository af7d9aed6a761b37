//! Recursive-descent parsing over the token tree.
//!
//! The parser is permissive: every production returns a node, possibly a
//! partial one, and records diagnostics instead of bailing. Declarations
//! parse through one uniform shape (type-and-path prefix, optional
//! signature, `= value`, compact options, body) and are classified
//! afterwards, which keeps the grammar small and the recovery paths few.
//!
//! Every list-parsing loop is guarded: an iteration that consumes no
//! tokens is an internal error, raised as a panic and converted to an
//! "internal compiler error" diagnostic at the query boundary rather
//! than taking the process down.

mod delimited;
mod expr;
mod path;

use crate::ast::{
    Ast, DeclAny, DeclBody, DeclDef, DeclEmpty, DeclImport, DeclPackage, DeclRange, DeclSyntax,
    DefKeyword, ExprAny, ExprField, ExprPath, ImportModifier, Path, RangeKeyword, Signature,
    SourceFile, SyntaxKeyword, TypeAny, TypeGeneric, TypePath, TypePrefixed, TypeModifier,
};
use crate::arena::Ptr;
use crate::report::{Diagnostic, Report};
use crate::span::Span;
use crate::token::{Cursor, Token, TokenId, TokenKind, TokenStream};

pub use delimited::DelimitedOptions;

/// The result of parsing one file.
pub struct Parsed {
    pub ast: Ast,
    pub file: SourceFile,
}

/// Parses a lexed file into its syntax tree.
pub fn parse(text: &str, stream: &TokenStream, report: &Report) -> Parsed {
    let mut parser = Parser {
        text,
        stream,
        cursor: Cursor::over(stream),
        ast: Ast::default(),
        report,
    };
    let decls = parser.parse_decls();
    Parsed {
        ast: parser.ast,
        file: SourceFile {
            span: Span::new(0, text.len() as u32),
            decls,
        },
    }
}

pub(crate) struct Parser<'a> {
    text: &'a str,
    stream: &'a TokenStream,
    cursor: Cursor<'a>,
    ast: Ast,
    report: &'a Report,
}

/// One parsed element of a type-and-path prefix: a path, possibly with
/// generic arguments.
struct TypeComponent<'a> {
    ty: TypeAny,
    path: Option<Ptr<Path>>,
    span: Span,
    /// The text of a single-identifier component, for keyword dispatch.
    single: Option<&'a str>,
}

impl<'a> Parser<'a> {
    // Cursor helpers.

    fn peek(&self) -> Option<(TokenId, &'a Token)> {
        self.cursor.peek()
    }

    fn peek_text(&self) -> Option<&'a str> {
        self.cursor.peek_text(self.text)
    }

    fn at(&self, text: &str) -> bool {
        self.cursor.at(self.text, text)
    }

    fn bump(&mut self) -> Option<(TokenId, &'a Token)> {
        self.cursor.next()
    }

    fn eat(&mut self, text: &str) -> Option<Span> {
        if self.at(text) {
            self.bump().map(|(_, t)| t.span)
        } else {
            None
        }
    }

    fn expect(&mut self, text: &str, context: &str) -> Option<Span> {
        match self.eat(text) {
            Some(span) => Some(span),
            None => {
                let at = self.here();
                self.report.push(
                    Diagnostic::error(format!("expected `{text}` {context}"))
                        .with_edit(at, "insert it here", text.to_string()),
                );
                None
            }
        }
    }

    /// A zero-width span at the next token, for "insert here" edits.
    fn here(&self) -> Span {
        match self.peek() {
            Some((_, token)) => Span::empty(token.span.start),
            None => self.cursor.end_span(),
        }
    }

    /// True when the next token opens a fused group starting with `open`.
    fn at_group(&self, open: char) -> Option<TokenId> {
        let (id, token) = self.peek()?;
        if token.is_group_open() && token.span.text(self.text).starts_with(open) {
            Some(id)
        } else {
            None
        }
    }

    /// The joined span of a fused group, opener through closer.
    fn group_span(&self, open: TokenId) -> Span {
        let token = self.stream.get(open);
        let close = TokenId::from_index(open.index() + token.fuse as u32);
        token.span.join(self.stream.get(close).span)
    }

    /// Runs `f` with the cursor descended into the group at `open`,
    /// which must already be consumed from the outer cursor.
    fn in_group<R>(&mut self, open: TokenId, f: impl FnOnce(&mut Self) -> R) -> R {
        let inner = Cursor::children(self.stream, open);
        let saved = std::mem::replace(&mut self.cursor, inner);
        let result = f(self);
        self.cursor = saved;
        result
    }

    /// Diagnoses any tokens left unconsumed inside a group.
    fn expect_group_end(&mut self, context: &str) {
        if let Some((_, token)) = self.peek() {
            self.report.push(
                Diagnostic::error(format!("unexpected tokens {context}"))
                    .with_span(token.span, "not expected here"),
            );
            while self.bump().is_some() {}
        }
    }

    /// Every loop iteration must consume tokens; a stuck parser is an
    /// internal error, never an infinite loop.
    fn must_progress(&self, before: u32, production: &str) {
        if self.cursor.offset() == before {
            panic!("internal error: parser made no progress in {production}");
        }
    }

    // Declarations.

    fn parse_decls(&mut self) -> Vec<DeclAny> {
        let mut decls = Vec::new();
        while !self.cursor.at_end() {
            let before = self.cursor.offset();
            if let Some(decl) = self.parse_decl() {
                decls.push(decl);
            }
            self.must_progress(before, "declaration list");
        }
        decls
    }

    fn parse_decl(&mut self) -> Option<DeclAny> {
        let (id, token) = self.peek()?;
        let text = token.span.text(self.text);

        if text.starts_with(';') {
            self.bump();
            return Some(self.ast.alloc_empty(DeclEmpty { span: token.span }));
        }
        if token.is_group_open() && text.starts_with('{') {
            self.bump();
            let (_, any) = self.parse_body(id);
            return Some(any);
        }
        if !self.at_path_start() {
            self.bump();
            self.report.push(
                Diagnostic::error(format!("unexpected `{text}`"))
                    .with_span(token.span, "expected a declaration"),
            );
            return None;
        }

        let first = self.parse_type_component()?;
        match first.single {
            Some("syntax") => return Some(self.parse_syntax(first, SyntaxKeyword::Syntax)),
            Some("edition") => return Some(self.parse_syntax(first, SyntaxKeyword::Edition)),
            Some("package") => return Some(self.parse_package(first)),
            Some("import") => return Some(self.parse_import(first)),
            Some("reserved") => return Some(self.parse_range_decl(first, RangeKeyword::Reserved)),
            Some("extensions") => {
                return Some(self.parse_range_decl(first, RangeKeyword::Extensions))
            }
            // Options get their own production: their name may begin
            // with a parenthesized extension component, which in field
            // position would read as a method signature.
            Some("option") => return Some(self.parse_option_def(first)),
            _ => {}
        }
        Some(self.parse_def(first))
    }

    fn parse_option_def(&mut self, first: TypeComponent<'a>) -> DeclAny {
        let mut span = first.span;
        let name = self.parse_path();
        span = span.join(self.ast.path(name).span);
        let equals = self.expect("=", "between option name and value");
        let value = if self.at(";") {
            let at = self.here();
            self.report.push(
                Diagnostic::error("expected an option value").with_span(at, "value missing here"),
            );
            None
        } else {
            let value = self.parse_expr();
            span = span.join(self.ast.expr_span(value));
            Some(value)
        };
        if let Some(semi) = self.expect(";", "after the option") {
            span = span.join(semi);
        }
        self.ast.alloc_def(DeclDef {
            span,
            keyword: Some((DefKeyword::Option, first.span)),
            prefix: None,
            name: Some(name),
            signature: None,
            equals,
            value,
            options: None,
            body: None,
        })
    }

    fn parse_body(&mut self, open: TokenId) -> (Ptr<DeclBody>, DeclAny) {
        let span = self.group_span(open);
        let decls = self.in_group(open, |p| p.parse_decls());
        self.ast.alloc_body(DeclBody { span, decls })
    }

    fn parse_syntax(&mut self, first: TypeComponent<'a>, keyword: SyntaxKeyword) -> DeclAny {
        let mut span = first.span;
        self.expect("=", "after the syntax keyword");
        let value = if self.at(";") {
            let at = self.here();
            self.report.push(
                Diagnostic::error("expected a syntax value").with_span(at, "value missing here"),
            );
            None
        } else {
            let value = self.parse_expr();
            span = span.join(self.ast.expr_span(value));
            Some(value)
        };
        if let Some(semi) = self.expect(";", "after the syntax declaration") {
            span = span.join(semi);
        }
        self.ast.alloc_syntax(DeclSyntax {
            span,
            keyword,
            keyword_span: first.span,
            value,
        })
    }

    fn parse_package(&mut self, first: TypeComponent<'a>) -> DeclAny {
        let mut span = first.span;
        let path = if self.at_path_start() {
            let path = self.parse_path();
            span = span.join(self.ast.path(path).span);
            Some(path)
        } else {
            let at = self.here();
            self.report.push(
                Diagnostic::error("expected a package name").with_span(at, "name missing here"),
            );
            None
        };
        if let Some(semi) = self.expect(";", "after the package declaration") {
            span = span.join(semi);
        }
        self.ast.alloc_package(DeclPackage {
            span,
            keyword_span: first.span,
            path,
        })
    }

    fn parse_import(&mut self, first: TypeComponent<'a>) -> DeclAny {
        let mut span = first.span;
        let modifier = match self.peek_text() {
            Some("public") => {
                let (_, token) = self.bump().unwrap();
                Some((ImportModifier::Public, token.span))
            }
            Some("weak") => {
                let (_, token) = self.bump().unwrap();
                Some((ImportModifier::Weak, token.span))
            }
            _ => None,
        };
        let value = match self.peek() {
            Some((_, token)) if token.kind == TokenKind::Str => {
                let value = self.parse_expr();
                span = span.join(self.ast.expr_span(value));
                Some(value)
            }
            _ => {
                let at = self.here();
                self.report.push(
                    Diagnostic::error("expected an import path string")
                        .with_span(at, "path missing here"),
                );
                None
            }
        };
        if let Some(semi) = self.expect(";", "after the import declaration") {
            span = span.join(semi);
        }
        self.ast.alloc_import(DeclImport {
            span,
            keyword_span: first.span,
            modifier,
            value,
        })
    }

    fn parse_range_decl(&mut self, first: TypeComponent<'a>, keyword: RangeKeyword) -> DeclAny {
        let mut span = first.span;
        let items = self.delimited(
            DelimitedOptions::comma(),
            |p| p.at(";") || p.at_group('[').is_some(),
            |p| Some(p.parse_expr()),
        );
        if let Some(last) = items.last() {
            span = span.join(self.ast.expr_span(*last));
        }
        let options = if let Some(open) = self.at_group('[') {
            self.bump();
            span = span.join(self.group_span(open));
            Some(self.parse_compact_options(open))
        } else {
            None
        };
        if let Some(semi) = self.expect(";", "after the range declaration") {
            span = span.join(semi);
        }
        self.ast.alloc_range(DeclRange {
            span,
            keyword,
            keyword_span: first.span,
            items,
            options,
        })
    }

    fn parse_def(&mut self, first: TypeComponent<'a>) -> DeclAny {
        let mut span = first.span;
        let mut components = vec![first];
        while self.at_path_start() {
            let before = self.cursor.offset();
            match self.parse_type_component() {
                Some(component) => {
                    span = span.join(component.span);
                    components.push(component);
                }
                None => break,
            }
            self.must_progress(before, "type-and-path prefix");
        }

        let (keyword, prefix, name) = self.fold_components(components);

        // Method signature.
        let signature = if let Some(open) = self.at_group('(') {
            self.bump();
            let inputs_span = self.group_span(open);
            span = span.join(inputs_span);
            let inputs = self.in_group(open, |p| {
                p.delimited(DelimitedOptions::comma(), |_| false, |p| p.parse_type())
            });
            let mut outputs = Vec::new();
            let mut outputs_span = None;
            if self.at("returns") {
                self.bump();
                if let Some(open) = self.at_group('(') {
                    self.bump();
                    let group = self.group_span(open);
                    span = span.join(group);
                    outputs_span = Some(group);
                    outputs = self.in_group(open, |p| {
                        p.delimited(DelimitedOptions::comma(), |_| false, |p| p.parse_type())
                    });
                } else {
                    let at = self.here();
                    self.report.push(
                        Diagnostic::error("expected a parenthesized return type")
                            .with_span(at, "after `returns`"),
                    );
                }
            }
            Some(Signature {
                inputs,
                inputs_span,
                outputs,
                outputs_span,
            })
        } else {
            None
        };

        let equals = self.eat("=");
        let value = if equals.is_some() {
            let value = self.parse_expr();
            span = span.join(self.ast.expr_span(value));
            Some(value)
        } else {
            None
        };

        let options = if let Some(open) = self.at_group('[') {
            self.bump();
            span = span.join(self.group_span(open));
            Some(self.parse_compact_options(open))
        } else {
            None
        };

        let body = if let Some(open) = self.at_group('{') {
            self.bump();
            span = span.join(self.group_span(open));
            let (ptr, _) = self.parse_body(open);
            Some(ptr)
        } else {
            None
        };

        if let Some(semi) = self.eat(";") {
            span = span.join(semi);
        } else if body.is_none() {
            let at = self.here();
            self.report.push(
                Diagnostic::error("expected `;` after declaration")
                    .with_edit(at, "insert it here", ";".to_string()),
            );
        }

        self.ast.alloc_def(DeclDef {
            span,
            keyword,
            prefix,
            name,
            signature,
            equals,
            value,
            options,
            body,
        })
    }

    /// Splits a run of type components into (definition keyword, type
    /// prefix, declared name).
    fn fold_components(
        &mut self,
        mut components: Vec<TypeComponent<'a>>,
    ) -> (
        Option<(DefKeyword, Span)>,
        Option<TypeAny>,
        Option<Ptr<Path>>,
    ) {
        if components.len() == 1 {
            let only = components.pop().unwrap();
            if let Some(keyword) = only.single.and_then(def_keyword) {
                return (Some((keyword, only.span)), None, None);
            }
            return (None, None, only.path);
        }

        let last = components.pop().unwrap();
        let name = match last.path {
            Some(path) => Some(path),
            None => {
                self.report.push(
                    Diagnostic::error("expected a declaration name")
                        .with_span(last.span, "a generic type cannot be a name"),
                );
                None
            }
        };

        // A definition keyword directly before the name wins; whatever
        // precedes it (or the type, for fields) folds into the prefix.
        let keyword = components
            .last()
            .and_then(|c| c.single.and_then(def_keyword))
            .map(|keyword| (keyword, components.pop().unwrap().span));

        let mut prefix: Option<TypeAny> = None;
        while let Some(component) = components.pop() {
            match (component.single.and_then(type_modifier), prefix) {
                (Some(modifier), inner) => {
                    let inner_span = inner.map(|t| self.ast.type_span(t));
                    let span = inner_span.map_or(component.span, |s| component.span.join(s));
                    prefix = Some(self.ast.alloc_prefixed_type(TypePrefixed {
                        span,
                        modifier,
                        modifier_span: component.span,
                        inner,
                    }));
                }
                (None, None) => prefix = Some(component.ty),
                (None, Some(_)) => {
                    self.report.push(
                        Diagnostic::error("expected a field modifier")
                            .with_span(component.span, "only one type may precede the name"),
                    );
                }
            }
        }
        (keyword, prefix, name)
    }

    fn parse_compact_options(&mut self, open: TokenId) -> ExprAny {
        let span = self.group_span(open);
        let entries = self.in_group(open, |p| {
            p.delimited(
                DelimitedOptions::comma(),
                |_| false,
                |p| Some(p.parse_option_entry()),
            )
        });
        self.ast.alloc_array(crate::ast::ExprArray {
            span,
            elems: entries,
        })
    }

    /// One `name = value` entry of a compact option list.
    fn parse_option_entry(&mut self) -> ExprAny {
        // Option names may open with a parenthesized extension
        // component, which `parse_path` handles directly.
        let key = if self.at_path_start() || self.at_group('(').is_some() {
            let path = self.parse_path();
            self.ast.alloc_expr_path(ExprPath { path })
        } else {
            let at = self.here();
            self.report.push(
                Diagnostic::error("expected an option name").with_span(at, "name missing here"),
            );
            self.ast
                .alloc_error_expr(crate::ast::ExprError { span: at })
        };
        let separator = self.expect("=", "between option name and value");
        let value = if self.at(",") || self.cursor.at_end() {
            None
        } else {
            Some(self.parse_expr())
        };
        let mut span = self.ast.expr_span(key);
        if let Some(value) = value {
            span = span.join(self.ast.expr_span(value));
        }
        self.ast.alloc_field_expr(ExprField {
            span,
            key,
            separator,
            value,
        })
    }

    // Type expressions.

    fn at_path_start(&self) -> bool {
        match self.peek() {
            Some((_, token)) => {
                token.kind == TokenKind::Ident
                    || (token.kind == TokenKind::Punct
                        && token.span.text(self.text) == "."
                        && token.fuse == 0)
            }
            None => false,
        }
    }

    fn parse_type_component(&mut self) -> Option<TypeComponent<'a>> {
        if !self.at_path_start() {
            return None;
        }
        let path = self.parse_path();
        let path_node = self.ast.path(path);
        let mut span = path_node.span;
        let single = path_node.as_single_ident().map(|t| {
            self.stream.get(t).span.text(self.text)
        });

        if let Some(open) = self.at_group('<') {
            self.bump();
            let args_span = self.group_span(open);
            span = span.join(args_span);
            let args = self.in_group(open, |p| {
                p.delimited(DelimitedOptions::comma(), |_| false, |p| p.parse_type())
            });
            let ty = self.ast.alloc_generic(TypeGeneric {
                span,
                base: path,
                args,
                args_span,
            });
            return Some(TypeComponent {
                ty,
                path: None,
                span,
                single: None,
            });
        }

        let ty = self.ast.alloc_type_path(TypePath { path });
        Some(TypeComponent {
            ty,
            path: Some(path),
            span,
            single,
        })
    }

    /// A full type in argument position: modifiers, then a path or
    /// generic.
    fn parse_type(&mut self) -> Option<TypeAny> {
        let component = match self.parse_type_component() {
            Some(c) => c,
            None => {
                if let Some((_, token)) = self.peek() {
                    self.report.push(
                        Diagnostic::error("expected a type")
                            .with_span(token.span, "not a type"),
                    );
                    self.bump();
                }
                return None;
            }
        };
        if let Some(modifier) = component.single.and_then(type_modifier) {
            // `stream Foo`, `repeated int32`: modifier then the rest.
            if self.at_path_start() || self.at_group('<').is_some() {
                let inner = self.parse_type();
                let span = inner
                    .map(|t| component.span.join(self.ast.type_span(t)))
                    .unwrap_or(component.span);
                return Some(self.ast.alloc_prefixed_type(TypePrefixed {
                    span,
                    modifier,
                    modifier_span: component.span,
                    inner,
                }));
            }
        }
        Some(component.ty)
    }
}

fn def_keyword(text: &str) -> Option<DefKeyword> {
    Some(match text {
        "message" => DefKeyword::Message,
        "enum" => DefKeyword::Enum,
        "oneof" => DefKeyword::Oneof,
        "service" => DefKeyword::Service,
        "extend" => DefKeyword::Extend,
        "rpc" => DefKeyword::Rpc,
        "option" => DefKeyword::Option,
        "group" => DefKeyword::Group,
        _ => return None,
    })
}

fn type_modifier(text: &str) -> Option<TypeModifier> {
    Some(match text {
        "optional" => TypeModifier::Optional,
        "repeated" => TypeModifier::Repeated,
        "required" => TypeModifier::Required,
        "stream" => TypeModifier::Stream,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::DefKind;
    use crate::lexer::lex;

    pub(crate) fn parse_text(text: &str) -> (Parsed, Vec<Diagnostic>) {
        let report = Report::new();
        let lexed = lex(text.as_bytes(), &report);
        let parsed = parse(text, &lexed.stream, &report);
        (parsed, report.to_vec())
    }

    fn defs_of<'p>(parsed: &'p Parsed) -> Vec<&'p DeclDef> {
        parsed
            .file
            .decls
            .iter()
            .filter_map(|d| parsed.ast.def(*d))
            .collect()
    }

    #[test]
    fn minimal_file() {
        let (parsed, diags) = parse_text("syntax = \"proto3\";\nmessage M { string s = 1; }\n");
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(parsed.file.decls.len(), 2);
        let def = defs_of(&parsed)[0];
        assert_eq!(def.classify(), DefKind::Message);
        let body = parsed.ast.body(def.body.unwrap());
        assert_eq!(body.decls.len(), 1);
        let field = parsed.ast.def(body.decls[0]).unwrap();
        assert_eq!(field.classify(), DefKind::Field);
        assert!(field.prefix.is_some());
        assert!(field.equals.is_some());
    }

    #[test]
    fn enum_values_classify() {
        let (parsed, _) = parse_text("enum E { A = 0; B = 1; }");
        let def = defs_of(&parsed)[0];
        assert_eq!(def.classify(), DefKind::Enum);
        let body = parsed.ast.body(def.body.unwrap());
        for decl in &body.decls {
            assert_eq!(parsed.ast.def(*decl).unwrap().classify(), DefKind::EnumValue);
        }
    }

    #[test]
    fn method_signature() {
        let (parsed, diags) =
            parse_text("service S { rpc Get (Req) returns (stream Resp); }");
        assert!(diags.is_empty(), "{diags:?}");
        let service = defs_of(&parsed)[0];
        assert_eq!(service.classify(), DefKind::Service);
        let body = parsed.ast.body(service.body.unwrap());
        let method = parsed.ast.def(body.decls[0]).unwrap();
        assert_eq!(method.classify(), DefKind::Method);
        let signature = method.signature.as_ref().unwrap();
        assert_eq!(signature.inputs.len(), 1);
        assert_eq!(signature.outputs.len(), 1);
    }

    #[test]
    fn map_field_parses_as_generic() {
        let (parsed, diags) = parse_text("message M { map<string, int32> pairs = 3; }");
        assert!(diags.is_empty(), "{diags:?}");
        let message = defs_of(&parsed)[0];
        let body = parsed.ast.body(message.body.unwrap());
        let field = parsed.ast.def(body.decls[0]).unwrap();
        let ty = field.prefix.unwrap();
        assert_eq!(ty.kind(), crate::ast::TypeKind::Generic);
    }

    #[test]
    fn group_with_label() {
        let (parsed, _) = parse_text("message M { optional group Result = 1 { int32 x = 2; } }");
        let message = defs_of(&parsed)[0];
        let body = parsed.ast.body(message.body.unwrap());
        let group = parsed.ast.def(body.decls[0]).unwrap();
        assert_eq!(group.classify(), DefKind::Group);
        assert!(group.prefix.is_some());
        assert!(group.body.is_some());
    }

    #[test]
    fn import_modifiers() {
        let (parsed, diags) = parse_text("import public \"a.proto\";\nimport \"b.proto\";");
        assert!(diags.is_empty(), "{diags:?}");
        let imports: Vec<_> = parsed
            .file
            .decls
            .iter()
            .filter_map(|d| parsed.ast.import(*d))
            .collect();
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].modifier.map(|m| m.0), Some(ImportModifier::Public));
        assert!(imports[1].modifier.is_none());
    }

    #[test]
    fn missing_semicolon_is_diagnosed_with_edit() {
        let (_, diags) = parse_text("message M { int32 x = 1 }");
        let diag = diags
            .iter()
            .find(|d| d.message.contains("expected `;`"))
            .unwrap();
        assert_eq!(diag.snippets[0].edits[0].replace, ";");
    }

    #[test]
    fn reserved_parses_mixed_items() {
        let (parsed, _) = parse_text("message M { reserved 1, \"x\", 3 to 5; }");
        let message = defs_of(&parsed)[0];
        let body = parsed.ast.body(message.body.unwrap());
        let range = match body.decls[0].kind() {
            crate::ast::DeclKind::Range => parsed
                .ast
                .range(body.decls[0])
                .unwrap(),
            kind => panic!("expected range decl, got {kind:?}"),
        };
        assert_eq!(range.keyword, RangeKeyword::Reserved);
        assert_eq!(range.items.len(), 3);
    }

    #[test]
    fn unterminated_body_still_yields_field() {
        let (parsed, diags) = parse_text("message M { int32 x = 1;");
        assert!(diags.iter().any(|d| d.message.contains("unmatched `{`")));
        let message = defs_of(&parsed)[0];
        let body = parsed.ast.body(message.body.unwrap());
        assert_eq!(body.decls.len(), 1);
        let field = parsed.ast.def(body.decls[0]).unwrap();
        assert_eq!(field.classify(), DefKind::Field);
    }

    #[test]
    fn bare_body_is_a_decl() {
        let (parsed, _) = parse_text("{ ; }");
        assert_eq!(parsed.file.decls.len(), 1);
        assert!(parsed.ast.body_of(parsed.file.decls[0]).is_some());
    }

    #[test]
    fn compact_options_parse() {
        let (parsed, diags) =
            parse_text("message M { int32 x = 1 [deprecated = true, (my.ext) = 5]; }");
        assert!(diags.is_empty(), "{diags:?}");
        let message = defs_of(&parsed)[0];
        let body = parsed.ast.body(message.body.unwrap());
        let field = parsed.ast.def(body.decls[0]).unwrap();
        let options = parsed.ast.array(field.options.unwrap()).unwrap();
        assert_eq!(options.elems.len(), 2);
    }
}
