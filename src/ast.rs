//! The syntax tree.
//!
//! Nodes live in per-kind arenas owned by a file's [`Ast`]; handles are a
//! one-byte discriminant plus a compressed arena pointer, eight bytes
//! total. A handle is only meaningful together with the `Ast` (and file
//! context) it was allocated in. Declarations are deliberately uniform:
//! one [`DeclDef`] shape covers messages, enums, oneofs, services,
//! extends, fields, groups, enum values, options, and methods, and
//! [`DeclDef::classify`] derives which from the parts present. Parsing
//! stays shape-driven; meaning is the legalizer's problem.

use smallvec::SmallVec;

use crate::arena::{Arena, Ptr, RawPtr};
use crate::span::Span;
use crate::token::TokenId;

/// Declaration discriminants.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum DeclKind {
    Empty,
    Syntax,
    Package,
    Import,
    Def,
    Body,
    Range,
}

/// Expression discriminants.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum ExprKind {
    Literal,
    Path,
    Prefixed,
    Range,
    Array,
    Dict,
    Field,
    Error,
}

/// Type-expression discriminants.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum TypeKind {
    Path,
    Prefixed,
    Generic,
}

macro_rules! tagged_handle {
    ($(#[$meta:meta])* $any:ident, $kind:ty) => {
        $(#[$meta])*
        #[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
        pub struct $any {
            kind: $kind,
            ptr: RawPtr,
        }

        impl $any {
            pub(crate) fn new(kind: $kind, ptr: RawPtr) -> Self {
                Self { kind, ptr }
            }

            pub fn kind(self) -> $kind {
                self.kind
            }

            pub(crate) fn ptr(self) -> RawPtr {
                self.ptr
            }
        }
    };
}

tagged_handle!(
    /// Any declaration: a discriminant selecting the arena plus the
    /// pointer into it.
    DeclAny,
    DeclKind
);
tagged_handle!(
    /// Any expression.
    ExprAny,
    ExprKind
);
tagged_handle!(
    /// Any type expression.
    TypeAny,
    TypeKind
);

/// A lone `;`.
#[derive(Debug)]
pub struct DeclEmpty {
    pub span: Span,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SyntaxKeyword {
    Syntax,
    Edition,
}

/// `syntax = "proto3";` or `edition = "2023";`.
#[derive(Debug)]
pub struct DeclSyntax {
    pub span: Span,
    pub keyword: SyntaxKeyword,
    pub keyword_span: Span,
    pub value: Option<ExprAny>,
}

/// `package foo.bar;`
#[derive(Debug)]
pub struct DeclPackage {
    pub span: Span,
    pub keyword_span: Span,
    pub path: Option<Ptr<Path>>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ImportModifier {
    Public,
    Weak,
}

/// `import [public|weak] "path";`
#[derive(Debug)]
pub struct DeclImport {
    pub span: Span,
    pub keyword_span: Span,
    pub modifier: Option<(ImportModifier, Span)>,
    pub value: Option<ExprAny>,
}

/// A braced declaration list, either a definition's body or a stray bare
/// block.
#[derive(Debug)]
pub struct DeclBody {
    pub span: Span,
    pub decls: Vec<DeclAny>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RangeKeyword {
    Reserved,
    Extensions,
}

/// `reserved 1, 3 to 5, "name";` or `extensions 10 to max [...];`
#[derive(Debug)]
pub struct DeclRange {
    pub span: Span,
    pub keyword: RangeKeyword,
    pub keyword_span: Span,
    pub items: Vec<ExprAny>,
    pub options: Option<ExprAny>,
}

/// Definition keywords recognized by the parser in type position.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DefKeyword {
    Message,
    Enum,
    Oneof,
    Service,
    Extend,
    Rpc,
    Option,
    Group,
}

/// What a [`DeclDef`] turned out to be, judged from its parts.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum DefKind {
    Message,
    Enum,
    Oneof,
    Service,
    Extend,
    Field,
    Group,
    EnumValue,
    Option,
    Method,
    /// Shape matched nothing; the legalizer reports it.
    Invalid,
}

impl DefKind {
    pub fn describe(self) -> &'static str {
        match self {
            DefKind::Message => "message",
            DefKind::Enum => "enum",
            DefKind::Oneof => "oneof",
            DefKind::Service => "service",
            DefKind::Extend => "extend block",
            DefKind::Field => "field",
            DefKind::Group => "group",
            DefKind::EnumValue => "enum value",
            DefKind::Option => "option",
            DefKind::Method => "method",
            DefKind::Invalid => "declaration",
        }
    }
}

/// A method signature: `(input) returns (output)`.
#[derive(Debug)]
pub struct Signature {
    pub inputs: Vec<TypeAny>,
    pub inputs_span: Span,
    pub outputs: Vec<TypeAny>,
    pub outputs_span: Option<Span>,
}

/// The unified definition node.
///
/// Whichever parts the source had are present; classification into a
/// [`DefKind`] looks only at their shape.
#[derive(Debug)]
pub struct DeclDef {
    pub span: Span,
    /// Keyword found in type position (`message`, `rpc`, ...).
    pub keyword: Option<(DefKeyword, Span)>,
    /// Modifier/type prefix: the element type of a field, or the labels
    /// before a `group` keyword.
    pub prefix: Option<TypeAny>,
    pub name: Option<Ptr<Path>>,
    pub signature: Option<Signature>,
    pub equals: Option<Span>,
    pub value: Option<ExprAny>,
    /// Compact options: the bracketed list after the value.
    pub options: Option<ExprAny>,
    pub body: Option<Ptr<DeclBody>>,
}

impl DeclDef {
    pub fn classify(&self) -> DefKind {
        match self.keyword {
            Some((DefKeyword::Message, _)) => DefKind::Message,
            Some((DefKeyword::Enum, _)) => DefKind::Enum,
            Some((DefKeyword::Oneof, _)) => DefKind::Oneof,
            Some((DefKeyword::Service, _)) => DefKind::Service,
            Some((DefKeyword::Extend, _)) => DefKind::Extend,
            Some((DefKeyword::Rpc, _)) => DefKind::Method,
            Some((DefKeyword::Option, _)) => DefKind::Option,
            Some((DefKeyword::Group, _)) => DefKind::Group,
            None => {
                if self.signature.is_some() {
                    DefKind::Method
                } else if self.prefix.is_some() {
                    DefKind::Field
                } else if self.name.is_some() && self.equals.is_some() {
                    DefKind::EnumValue
                } else {
                    DefKind::Invalid
                }
            }
        }
    }
}

/// `expr` wrappers.
#[derive(Debug)]
pub struct ExprLiteral {
    pub span: Span,
    pub token: TokenId,
}

#[derive(Debug)]
pub struct ExprPath {
    pub path: Ptr<Path>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ExprPrefix {
    Minus,
}

/// `-expr`. Kept prefixed rather than folded so the source can be
/// reproduced.
#[derive(Debug)]
pub struct ExprPrefixed {
    pub span: Span,
    pub prefix: ExprPrefix,
    pub prefix_span: Span,
    pub inner: Option<ExprAny>,
}

/// `lo to hi`.
#[derive(Debug)]
pub struct ExprRange {
    pub span: Span,
    pub lo: ExprAny,
    pub hi: Option<ExprAny>,
}

/// `[a, b, c]`.
#[derive(Debug)]
pub struct ExprArray {
    pub span: Span,
    pub elems: Vec<ExprAny>,
}

/// `{ key: value ... }` or `< ... >`.
#[derive(Debug)]
pub struct ExprDict {
    pub span: Span,
    pub entries: Vec<ExprAny>,
}

/// `key: value` (or `key = value`, tolerated with a fix-it).
#[derive(Debug)]
pub struct ExprField {
    pub span: Span,
    pub key: ExprAny,
    pub separator: Option<Span>,
    pub value: Option<ExprAny>,
}

/// Recovery placeholder where an expression failed to parse.
#[derive(Debug)]
pub struct ExprError {
    pub span: Span,
}

/// Type expressions.
#[derive(Debug)]
pub struct TypePath {
    pub path: Ptr<Path>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TypeModifier {
    Optional,
    Repeated,
    Required,
    Stream,
}

impl TypeModifier {
    pub fn describe(self) -> &'static str {
        match self {
            TypeModifier::Optional => "optional",
            TypeModifier::Repeated => "repeated",
            TypeModifier::Required => "required",
            TypeModifier::Stream => "stream",
        }
    }
}

#[derive(Debug)]
pub struct TypePrefixed {
    pub span: Span,
    pub modifier: TypeModifier,
    pub modifier_span: Span,
    pub inner: Option<TypeAny>,
}

/// `base<args...>`; in practice only `map<K, V>` is legal.
#[derive(Debug)]
pub struct TypeGeneric {
    pub span: Span,
    pub base: Ptr<Path>,
    pub args: Vec<TypeAny>,
    pub args_span: Span,
}

/// A dotted name: components separated by `.`, optionally absolute, with
/// parenthesized extension components.
#[derive(Debug)]
pub struct Path {
    pub span: Span,
    /// Span of a leading `.` marking the path absolute.
    pub leading_dot: Option<Span>,
    pub components: SmallVec<[PathComponent; 2]>,
}

#[derive(Debug)]
pub struct PathComponent {
    /// The `.` before this component; the first component has none.
    pub separator: Option<Span>,
    pub name: PathName,
}

#[derive(Debug)]
pub enum PathName {
    Ident(TokenId),
    /// `(ext.path)` component of an option name.
    Extension(Ptr<Path>),
    /// Recovery: a separator with no name after it.
    Missing(Span),
}

impl Path {
    /// The token of a path that is exactly one plain identifier.
    pub fn as_single_ident(&self) -> Option<TokenId> {
        if self.leading_dot.is_none() && self.components.len() == 1 {
            match self.components[0].name {
                PathName::Ident(token) => Some(token),
                _ => None,
            }
        } else {
            None
        }
    }

    pub fn has_extension(&self) -> bool {
        self.components
            .iter()
            .any(|c| matches!(c.name, PathName::Extension(_)))
    }
}

/// The parsed root of one file.
#[derive(Debug, Default)]
pub struct SourceFile {
    pub span: Span,
    pub decls: Vec<DeclAny>,
}

/// All arenas for one file's syntax tree.
#[derive(Debug, Default)]
pub struct Ast {
    pub empties: Arena<DeclEmpty>,
    pub syntaxes: Arena<DeclSyntax>,
    pub packages: Arena<DeclPackage>,
    pub imports: Arena<DeclImport>,
    pub defs: Arena<DeclDef>,
    pub bodies: Arena<DeclBody>,
    pub range_decls: Arena<DeclRange>,
    pub literals: Arena<ExprLiteral>,
    pub expr_paths: Arena<ExprPath>,
    pub prefixed_exprs: Arena<ExprPrefixed>,
    pub range_exprs: Arena<ExprRange>,
    pub arrays: Arena<ExprArray>,
    pub dicts: Arena<ExprDict>,
    pub field_exprs: Arena<ExprField>,
    pub error_exprs: Arena<ExprError>,
    pub type_paths: Arena<TypePath>,
    pub prefixed_types: Arena<TypePrefixed>,
    pub generics: Arena<TypeGeneric>,
    pub paths: Arena<Path>,
}

macro_rules! alloc_methods {
    ($($fn_name:ident, $get_name:ident: $arena:ident, $node:ty, $any:ident, $kind:expr;)*) => {
        impl Ast {
            $(
                pub fn $fn_name(&mut self, node: $node) -> $any {
                    let ptr = self.$arena.alloc(node);
                    $any::new($kind, ptr.erase())
                }

                pub fn $get_name(&self, any: $any) -> Option<&$node> {
                    if any.kind() == $kind {
                        Some(self.$arena.deref(any.ptr().unerase()))
                    } else {
                        None
                    }
                }
            )*
        }
    };
}

alloc_methods! {
    alloc_empty, empty: empties, DeclEmpty, DeclAny, DeclKind::Empty;
    alloc_syntax, syntax: syntaxes, DeclSyntax, DeclAny, DeclKind::Syntax;
    alloc_package, package: packages, DeclPackage, DeclAny, DeclKind::Package;
    alloc_import, import: imports, DeclImport, DeclAny, DeclKind::Import;
    alloc_def, def: defs, DeclDef, DeclAny, DeclKind::Def;
    alloc_range, range: range_decls, DeclRange, DeclAny, DeclKind::Range;
    alloc_literal, literal: literals, ExprLiteral, ExprAny, ExprKind::Literal;
    alloc_expr_path, expr_path: expr_paths, ExprPath, ExprAny, ExprKind::Path;
    alloc_prefixed, prefixed: prefixed_exprs, ExprPrefixed, ExprAny, ExprKind::Prefixed;
    alloc_range_expr, range_expr: range_exprs, ExprRange, ExprAny, ExprKind::Range;
    alloc_array, array: arrays, ExprArray, ExprAny, ExprKind::Array;
    alloc_dict, dict: dicts, ExprDict, ExprAny, ExprKind::Dict;
    alloc_field_expr, field_expr: field_exprs, ExprField, ExprAny, ExprKind::Field;
    alloc_error_expr, error_expr: error_exprs, ExprError, ExprAny, ExprKind::Error;
    alloc_type_path, type_path: type_paths, TypePath, TypeAny, TypeKind::Path;
    alloc_prefixed_type, prefixed_type: prefixed_types, TypePrefixed, TypeAny, TypeKind::Prefixed;
    alloc_generic, generic: generics, TypeGeneric, TypeAny, TypeKind::Generic;
}

impl Ast {
    /// A braced body gets its own handle kind so bare blocks can appear
    /// in declaration position.
    pub fn alloc_body(&mut self, body: DeclBody) -> (Ptr<DeclBody>, DeclAny) {
        let ptr = self.bodies.alloc(body);
        (ptr, DeclAny::new(DeclKind::Body, ptr.erase()))
    }

    pub fn body(&self, ptr: Ptr<DeclBody>) -> &DeclBody {
        self.bodies.deref(ptr)
    }

    pub fn body_of(&self, any: DeclAny) -> Option<&DeclBody> {
        if any.kind() == DeclKind::Body {
            Some(self.bodies.deref(any.ptr().unerase()))
        } else {
            None
        }
    }

    pub fn alloc_path(&mut self, path: Path) -> Ptr<Path> {
        self.paths.alloc(path)
    }

    pub fn path(&self, ptr: Ptr<Path>) -> &Path {
        self.paths.deref(ptr)
    }

    pub fn decl_span(&self, decl: DeclAny) -> Span {
        match decl.kind() {
            DeclKind::Empty => self.empties.deref(decl.ptr().unerase()).span,
            DeclKind::Syntax => self.syntaxes.deref(decl.ptr().unerase()).span,
            DeclKind::Package => self.packages.deref(decl.ptr().unerase()).span,
            DeclKind::Import => self.imports.deref(decl.ptr().unerase()).span,
            DeclKind::Def => self.defs.deref(decl.ptr().unerase()).span,
            DeclKind::Body => self.bodies.deref(decl.ptr().unerase()).span,
            DeclKind::Range => self.range_decls.deref(decl.ptr().unerase()).span,
        }
    }

    pub fn expr_span(&self, expr: ExprAny) -> Span {
        match expr.kind() {
            ExprKind::Literal => self.literals.deref(expr.ptr().unerase()).span,
            ExprKind::Path => {
                let node: &ExprPath = self.expr_paths.deref(expr.ptr().unerase());
                self.path(node.path).span
            }
            ExprKind::Prefixed => self.prefixed_exprs.deref(expr.ptr().unerase()).span,
            ExprKind::Range => self.range_exprs.deref(expr.ptr().unerase()).span,
            ExprKind::Array => self.arrays.deref(expr.ptr().unerase()).span,
            ExprKind::Dict => self.dicts.deref(expr.ptr().unerase()).span,
            ExprKind::Field => self.field_exprs.deref(expr.ptr().unerase()).span,
            ExprKind::Error => self.error_exprs.deref(expr.ptr().unerase()).span,
        }
    }

    pub fn type_span(&self, ty: TypeAny) -> Span {
        match ty.kind() {
            TypeKind::Path => {
                let node: &TypePath = self.type_paths.deref(ty.ptr().unerase());
                self.path(node.path).span
            }
            TypeKind::Prefixed => self.prefixed_types.deref(ty.ptr().unerase()).span,
            TypeKind::Generic => self.generics.deref(ty.ptr().unerase()).span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_eight_bytes() {
        assert_eq!(std::mem::size_of::<DeclAny>(), 8);
        assert_eq!(std::mem::size_of::<ExprAny>(), 8);
        assert_eq!(std::mem::size_of::<TypeAny>(), 8);
    }

    #[test]
    fn alloc_and_classify() {
        let mut ast = Ast::default();
        let def = ast.alloc_def(DeclDef {
            span: Span::new(0, 10),
            keyword: Some((DefKeyword::Message, Span::new(0, 7))),
            prefix: None,
            name: None,
            signature: None,
            equals: None,
            value: None,
            options: None,
            body: None,
        });
        assert_eq!(def.kind(), DeclKind::Def);
        assert_eq!(ast.def(def).unwrap().classify(), DefKind::Message);
        assert_eq!(ast.decl_span(def), Span::new(0, 10));
    }

    #[test]
    fn shape_classification_without_keyword() {
        let mut ast = Ast::default();
        let path = ast.alloc_path(Path {
            span: Span::new(0, 3),
            leading_dot: None,
            components: SmallVec::new(),
        });
        let ty = ast.alloc_type_path(TypePath { path });
        let field = DeclDef {
            span: Span::new(0, 12),
            keyword: None,
            prefix: Some(ty),
            name: Some(path),
            signature: None,
            equals: Some(Span::new(8, 9)),
            value: None,
            options: None,
            body: None,
        };
        assert_eq!(field.classify(), DefKind::Field);

        let enum_value = DeclDef {
            prefix: None,
            ..field
        };
        assert_eq!(enum_value.classify(), DefKind::EnumValue);
    }

    #[test]
    fn wrong_kind_accessor_is_none() {
        let mut ast = Ast::default();
        let empty = ast.alloc_empty(DeclEmpty {
            span: Span::empty(0),
        });
        assert!(ast.def(empty).is_none());
        assert!(ast.empty(empty).is_some());
    }
}
