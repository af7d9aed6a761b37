//! Semantic legalization of the syntax tree.
//!
//! The parser accepts one uniform declaration shape; this pass decides
//! what is actually allowed where. It never mutates the tree and never
//! stops early: every violation is attached to the smallest meaningful
//! span, with a machine-applicable edit where one exists, and traversal
//! continues so a file surfaces its full error set in one run.

use itertools::Itertools;

use crate::ast::{
    Ast, DeclAny, DeclDef, DeclKind, DeclRange, DeclSyntax, DefKind, ExprAny, ExprKind, Path,
    RangeKeyword, SyntaxKeyword, TypeAny, TypeKind, TypeModifier,
};
use crate::report::{Diagnostic, Report};
use crate::span::Span;
use crate::syntax::{SyntaxMode, KNOWN_EDITIONS};
use crate::token::{LitValue, TokenStream};

/// Where a declaration appears.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Scope {
    File,
    Message,
    Enum,
    Oneof,
    Service,
    Extend,
    Group,
    Method,
}

impl Scope {
    fn describe(self) -> &'static str {
        match self {
            Scope::File => "at file scope",
            Scope::Message => "in a message",
            Scope::Enum => "in an enum",
            Scope::Oneof => "in a oneof",
            Scope::Service => "in a service",
            Scope::Extend => "in an extend block",
            Scope::Group => "in a group",
            Scope::Method => "in a method body",
        }
    }
}

/// Which parents may hold each definition kind.
fn allowed_in(kind: DefKind, scope: Scope) -> bool {
    use Scope::*;
    match kind {
        DefKind::Message | DefKind::Enum => matches!(scope, File | Scope::Message | Scope::Group),
        DefKind::Oneof => matches!(scope, Scope::Message | Scope::Group),
        DefKind::Service => matches!(scope, File),
        DefKind::Extend => matches!(scope, File | Scope::Message | Scope::Group),
        DefKind::Field => matches!(scope, Scope::Message | Scope::Group | Scope::Oneof | Scope::Extend),
        DefKind::Group => matches!(scope, Scope::Message | Scope::Group | Scope::Oneof | Scope::Extend),
        DefKind::EnumValue => matches!(scope, Scope::Enum),
        DefKind::Option => !matches!(scope, Scope::Extend),
        DefKind::Method => matches!(scope, Scope::Service),
        DefKind::Invalid => false,
    }
}

/// Runs legalization over a parsed file, returning its syntax mode.
pub fn legalize(
    text: &str,
    stream: &TokenStream,
    ast: &Ast,
    file: &crate::ast::SourceFile,
    report: &Report,
) -> SyntaxMode {
    let mut legalizer = Legalizer {
        text,
        stream,
        ast,
        report,
        syntax: SyntaxMode::default(),
        package_seen: None,
    };
    legalizer.check_syntax_decls(file);
    legalizer.check_decls(&file.decls, Scope::File);
    legalizer.syntax
}

struct Legalizer<'a> {
    text: &'a str,
    stream: &'a TokenStream,
    ast: &'a Ast,
    report: &'a Report,
    syntax: SyntaxMode,
    package_seen: Option<Span>,
}

impl<'a> Legalizer<'a> {
    fn src(&self, span: Span) -> &'a str {
        span.text(self.text)
    }

    // Syntax declarations: exactly one, and only as the first
    // declaration.

    fn check_syntax_decls(&mut self, file: &crate::ast::SourceFile) {
        let first_real = file
            .decls
            .iter()
            .position(|d| d.kind() != DeclKind::Empty);
        let mut first_syntax: Option<Span> = None;

        for (index, decl) in file.decls.iter().enumerate() {
            let syntax = match self.ast.syntax(*decl) {
                Some(syntax) => syntax,
                None => continue,
            };
            match first_syntax {
                None => {
                    first_syntax = Some(syntax.span);
                    if first_real != Some(index) {
                        self.report.push(
                            Diagnostic::error(
                                "the syntax declaration must be the first declaration in the file",
                            )
                            .with_span(syntax.span, "declared here"),
                        );
                    }
                    self.syntax = self.interpret_syntax_value(syntax);
                }
                Some(first) => {
                    self.report.push(
                        Diagnostic::error("more than one syntax declaration")
                            .with_span(syntax.span, "this one is extra")
                            .with_span(first, "first declared here"),
                    );
                }
            }
        }

        if first_syntax.is_none() {
            self.report.push(
                Diagnostic::warning("file has no syntax declaration")
                    .note("defaulting to proto2")
                    .help("add `syntax = \"proto3\";` or `edition = \"2023\";`"),
            );
        }
    }

    fn interpret_syntax_value(&self, decl: &DeclSyntax) -> SyntaxMode {
        let value = match decl.value {
            Some(value) => value,
            None => return SyntaxMode::default(),
        };
        let span = self.ast.expr_span(value);

        if value.kind() == ExprKind::Path {
            // `syntax = proto3`: a slip worth a quoted rewrite.
            let rewrite = format!("\"{}\"", self.src(span));
            self.report.push(
                Diagnostic::error("syntax value must be a quoted string").with_edit(
                    span,
                    "missing quotes",
                    rewrite,
                ),
            );
            return SyntaxMode::default();
        }

        let text = match self.string_literal(value) {
            Some(text) => text,
            None => {
                self.report.push(
                    Diagnostic::error("syntax value must be a string")
                        .with_span(span, "not a string"),
                );
                return SyntaxMode::default();
            }
        };

        let mode = match decl.keyword {
            SyntaxKeyword::Syntax => SyntaxMode::from_syntax_value(&text),
            SyntaxKeyword::Edition => SyntaxMode::from_edition_value(&text),
        };
        match mode {
            Some(mode) => mode,
            None => {
                let accepted = match decl.keyword {
                    SyntaxKeyword::Syntax => "`\"proto2\"` or `\"proto3\"`".to_string(),
                    SyntaxKeyword::Edition => KNOWN_EDITIONS
                        .iter()
                        .map(|e| format!("`\"{e}\"`"))
                        .collect::<Vec<_>>()
                        .join(", "),
                };
                self.report.push(
                    Diagnostic::error(format!("unknown syntax `{text}`"))
                        .with_span(span, "not recognized")
                        .help(format!("accepted values are {accepted}")),
                );
                SyntaxMode::default()
            }
        }
    }

    fn string_literal(&self, expr: ExprAny) -> Option<String> {
        let literal = self.ast.literal(expr)?;
        match self.stream.literal(literal.token)? {
            LitValue::Bytes(bytes) => String::from_utf8(bytes.to_vec()).ok(),
            _ => None,
        }
    }

    fn is_int_expr(&self, expr: ExprAny) -> bool {
        match expr.kind() {
            ExprKind::Literal => {
                let literal = match self.ast.literal(expr) {
                    Some(l) => l,
                    None => return false,
                };
                matches!(
                    self.stream.literal(literal.token),
                    Some(LitValue::Int(_) | LitValue::Big(_))
                )
            }
            ExprKind::Prefixed => self
                .ast
                .prefixed(expr)
                .and_then(|p| p.inner)
                .is_some_and(|inner| self.is_int_expr(inner)),
            _ => false,
        }
    }

    // Declaration lists.

    fn check_decls(&mut self, decls: &[DeclAny], scope: Scope) {
        for decl in decls {
            self.check_decl(*decl, scope);
        }
    }

    fn check_decl(&mut self, decl: DeclAny, scope: Scope) {
        match decl.kind() {
            DeclKind::Empty => {}
            DeclKind::Syntax => {
                if scope != Scope::File {
                    self.nesting_error("syntax declaration", self.ast.decl_span(decl), scope);
                }
            }
            DeclKind::Package => {
                let package = self.ast.package(decl).unwrap();
                if scope != Scope::File {
                    self.nesting_error("package declaration", package.span, scope);
                    return;
                }
                if let Some(first) = self.package_seen {
                    self.report.push(
                        Diagnostic::error("more than one package declaration")
                            .with_span(package.span, "this one is extra")
                            .with_span(first, "first declared here"),
                    );
                } else {
                    self.package_seen = Some(package.span);
                }
            }
            DeclKind::Import => {
                if scope != Scope::File {
                    self.nesting_error("import", self.ast.decl_span(decl), scope);
                }
            }
            DeclKind::Body => {
                let body = self.ast.body_of(decl).unwrap();
                self.report.push(
                    Diagnostic::error("unexpected bare block")
                        .with_span(body.span, "blocks must belong to a declaration"),
                );
                self.check_decls(&body.decls, scope);
            }
            DeclKind::Range => {
                let range = self.ast.range(decl).unwrap();
                let allowed = match range.keyword {
                    RangeKeyword::Reserved => {
                        matches!(scope, Scope::Message | Scope::Group | Scope::Enum)
                    }
                    RangeKeyword::Extensions => matches!(scope, Scope::Message | Scope::Group),
                };
                if !allowed {
                    let what = match range.keyword {
                        RangeKeyword::Reserved => "reserved declaration",
                        RangeKeyword::Extensions => "extension range",
                    };
                    self.nesting_error(what, range.span, scope);
                }
                self.check_range(range);
            }
            DeclKind::Def => {
                let def = self.ast.def(decl).unwrap();
                let kind = def.classify();
                if kind == DefKind::Invalid {
                    self.report.push(
                        Diagnostic::error("could not make sense of this declaration")
                            .with_span(def.span, "unrecognized shape"),
                    );
                    return;
                }
                if !allowed_in(kind, scope) {
                    self.nesting_error(kind.describe(), def.span, scope);
                }
                self.check_def(def, kind, scope);
            }
        }
    }

    fn nesting_error(&self, what: &str, span: Span, scope: Scope) {
        self.report.push(
            Diagnostic::error(format!("a {} cannot appear {}", what, scope.describe()))
                .with_span(span, "not allowed here"),
        );
    }

    // Definitions.

    fn check_def(&mut self, def: &DeclDef, kind: DefKind, scope: Scope) {
        self.check_def_name(def, kind);
        self.check_def_parts(def, kind);
        match kind {
            DefKind::Field => self.check_field(def, scope),
            DefKind::Group => self.check_group(def, scope),
            DefKind::Method => self.check_method(def),
            DefKind::EnumValue => {
                if def.value.is_none() {
                    self.report.push(
                        Diagnostic::error("enum value is missing its number")
                            .with_span(def.span, "expected `= <number>`"),
                    );
                }
            }
            _ => {}
        }

        if let Some(body) = def.body {
            let child = match kind {
                DefKind::Message => Some(Scope::Message),
                DefKind::Enum => Some(Scope::Enum),
                DefKind::Oneof => Some(Scope::Oneof),
                DefKind::Service => Some(Scope::Service),
                DefKind::Extend => Some(Scope::Extend),
                DefKind::Group => Some(Scope::Group),
                DefKind::Method => Some(Scope::Method),
                _ => None,
            };
            if let Some(child) = child {
                let body = self.ast.body(body);
                self.check_decls(&body.decls, child);
            }
        }
    }

    fn check_def_name(&self, def: &DeclDef, kind: DefKind) {
        let path = match def.name {
            Some(path) => self.ast.path(path),
            None => {
                if kind != DefKind::Invalid {
                    self.report.push(
                        Diagnostic::error(format!("{} is missing a name", kind.describe()))
                            .with_span(def.span, "expected a name"),
                    );
                }
                return;
            }
        };
        // Extend targets and option names may be qualified; everything
        // else gets a plain identifier.
        let qualified_ok = matches!(kind, DefKind::Extend | DefKind::Option);
        if !qualified_ok && (path.components.len() > 1 || path.leading_dot.is_some()) {
            self.report.push(
                Diagnostic::error(format!("{} names cannot be qualified", kind.describe()))
                    .with_span(path.span, "expected a bare identifier"),
            );
        }
        if kind == DefKind::Option && path.components.is_empty() {
            self.report.push(
                Diagnostic::error("option is missing its name").with_span(def.span, "here"),
            );
        }
    }

    /// Part-shape rules: which of body/value/signature/options each kind
    /// may carry.
    fn check_def_parts(&self, def: &DeclDef, kind: DefKind) {
        use DefKind::*;
        let needs_body = matches!(kind, Message | Enum | Oneof | Service | Extend | Group);
        if needs_body && def.body.is_none() {
            self.report.push(
                Diagnostic::error(format!("{} is missing its body", kind.describe()))
                    .with_span(def.span, "expected `{ ... }`"),
            );
        }
        if !needs_body && !matches!(kind, Method) {
            if let Some(body) = def.body {
                let span = self.ast.body(body).span;
                self.report.push(
                    Diagnostic::error(format!("a {} cannot have a body", kind.describe()))
                        .with_span(span, "unexpected block"),
                );
            }
        }

        let needs_value = matches!(kind, Field | EnumValue | Option | Group);
        if let (false, Some(equals)) = (needs_value, def.equals) {
            self.report.push(
                Diagnostic::error(format!("a {} cannot be assigned a value", kind.describe()))
                    .with_span(equals, "unexpected `=`"),
            );
        }
        if kind == Field && def.value.is_none() {
            self.report.push(
                Diagnostic::error("field is missing its number")
                    .with_span(def.span, "expected `= <number>`"),
            );
        }
        if kind == Option && def.value.is_none() {
            self.report.push(
                Diagnostic::error("option is missing its value")
                    .with_span(def.span, "expected `= <value>`"),
            );
        }

        if !matches!(kind, Method) {
            if let Some(signature) = &def.signature {
                self.report.push(
                    Diagnostic::error(format!(
                        "a {} cannot have a method signature",
                        kind.describe()
                    ))
                    .with_span(signature.inputs_span, "unexpected signature"),
                );
            }
        }

        let options_ok = matches!(kind, Field | EnumValue | Group);
        if !options_ok {
            if let Some(options) = def.options {
                let span = self.ast.expr_span(options);
                self.report.push(
                    Diagnostic::error(format!(
                        "compact options are not allowed on a {}",
                        kind.describe()
                    ))
                    .with_span(span, "not allowed here")
                    .help("use an `option` declaration inside the body instead"),
                );
            }
        }
    }

    // Fields and their modifiers.

    fn check_field(&mut self, def: &DeclDef, scope: Scope) {
        let ty = match def.prefix {
            Some(ty) => ty,
            None => return,
        };
        let (modifiers, base) = self.split_modifiers(ty);

        for (modifier, span) in &modifiers {
            self.check_modifier(*modifier, *span, scope);
        }

        match base {
            Some(base) if base.kind() == TypeKind::Generic => {
                self.check_map_type(base, &modifiers, scope);
            }
            Some(_) => {}
            None => {
                self.report.push(
                    Diagnostic::error("field is missing its type")
                        .with_span(def.span, "modifiers but no type"),
                );
            }
        }

        let is_map = base.is_some_and(|b| b.kind() == TypeKind::Generic);
        if self.syntax == SyntaxMode::Proto2
            && modifiers.is_empty()
            && !is_map
            && matches!(scope, Scope::Message | Scope::Group | Scope::Extend)
        {
            self.report.push(
                Diagnostic::error("proto2 fields must have an explicit label")
                    .with_span(def.span, "missing `optional`, `required`, or `repeated`"),
            );
        }
    }

    fn check_modifier(&mut self, modifier: TypeModifier, span: Span, scope: Scope) {
        if scope == Scope::Oneof {
            self.report.push(
                Diagnostic::error(format!(
                    "`{}` is not allowed on a oneof member",
                    modifier.describe()
                ))
                .with_deletion(span, "remove this label"),
            );
            return;
        }
        match modifier {
            TypeModifier::Required => match self.syntax {
                SyntaxMode::Proto2 => self.report.push(
                    Diagnostic::warning("`required` is deprecated and should not be used")
                        .with_span(span, "written here"),
                ),
                SyntaxMode::Proto3 => self.report.push(
                    Diagnostic::error("`required` is not allowed in proto3")
                        .with_deletion(span, "remove this label"),
                ),
                SyntaxMode::Edition(_) => self.report.push(
                    Diagnostic::error("`required` is not allowed in editions")
                        .with_deletion(span, "remove this label")
                        .help("use `features.field_presence = LEGACY_REQUIRED` instead"),
                ),
            },
            TypeModifier::Optional => {
                if self.syntax.is_editions() {
                    self.report.push(
                        Diagnostic::error("`optional` is not allowed in editions")
                            .with_deletion(span, "remove this label")
                            .help("presence is controlled by `features.field_presence`"),
                    );
                }
            }
            TypeModifier::Repeated => {}
            TypeModifier::Stream => {
                self.report.push(
                    Diagnostic::error("`stream` is only allowed on method parameters")
                        .with_deletion(span, "remove it"),
                );
            }
        }
    }

    fn check_map_type(&mut self, ty: TypeAny, modifiers: &[(TypeModifier, Span)], scope: Scope) {
        let generic = self.ast.generic(ty).unwrap();
        let base = self.ast.path(generic.base);
        let base_text = self.path_single_text(base);

        if base_text != Some("map") {
            self.report.push(
                Diagnostic::error("only `map<K, V>` may take type arguments")
                    .with_span(generic.span, "unsupported generic type"),
            );
            return;
        }
        if generic.args.len() != 2 {
            self.report.push(
                Diagnostic::error(format!(
                    "`map` takes exactly two type arguments, found {}",
                    generic.args.len()
                ))
                .with_span(generic.args_span, "wrong arity"),
            );
        }
        if scope == Scope::Oneof {
            self.report.push(
                Diagnostic::error("map fields are not allowed in oneofs")
                    .with_span(generic.span, "here"),
            );
        }
        if let Some((modifier, span)) = modifiers.first() {
            self.report.push(
                Diagnostic::error(format!(
                    "map fields cannot be labelled `{}`",
                    modifier.describe()
                ))
                .with_deletion(*span, "remove this label"),
            );
        }
        for arg in &generic.args {
            if self.ast.prefixed_type(*arg).is_some() {
                let span = self.ast.type_span(*arg);
                self.report.push(
                    Diagnostic::error("map type arguments cannot have labels")
                        .with_span(span, "here"),
                );
            }
        }
    }

    fn check_group(&mut self, def: &DeclDef, scope: Scope) {
        if self.syntax != SyntaxMode::Proto2 {
            self.report.push(
                Diagnostic::error(format!("groups are not allowed in {}", self.syntax))
                    .with_span(def.span, "groups are a proto2 feature"),
            );
        }
        if let Some(path) = def.name {
            let path = self.ast.path(path);
            if let Some(name) = self.path_single_text(path) {
                if !name.starts_with(|c: char| c.is_ascii_uppercase()) {
                    self.report.push(
                        Diagnostic::error("group names must start with a capital letter")
                            .with_span(path.span, "lowercase here"),
                    );
                }
            }
        }
        if let Some(ty) = def.prefix {
            let (modifiers, base) = self.split_modifiers(ty);
            for (modifier, span) in modifiers {
                self.check_modifier(modifier, span, scope);
            }
            if let Some(base) = base {
                let span = self.ast.type_span(base);
                self.report.push(
                    Diagnostic::error("a group declares its own type")
                        .with_span(span, "unexpected type before `group`"),
                );
            }
        }
        if def.value.is_none() {
            self.report.push(
                Diagnostic::error("group is missing its field number")
                    .with_span(def.span, "expected `= <number>`"),
            );
        }
    }

    fn check_method(&mut self, def: &DeclDef) {
        let signature = match &def.signature {
            Some(signature) => signature,
            None => {
                self.report.push(
                    Diagnostic::error("method is missing its signature")
                        .with_span(def.span, "expected `(Input) returns (Output)`"),
                );
                return;
            }
        };
        self.check_method_types(&signature.inputs, signature.inputs_span, "input");
        match signature.outputs_span {
            Some(span) => self.check_method_types(&signature.outputs, span, "output"),
            None => {
                self.report.push(
                    Diagnostic::error("method is missing its `returns` clause")
                        .with_span(signature.inputs_span, "after these parameters"),
                );
            }
        }
    }

    fn check_method_types(&self, types: &[TypeAny], span: Span, what: &str) {
        match types.len() {
            1 => {}
            0 => self.report.push(
                Diagnostic::error(format!("method takes exactly one {what} type, found none"))
                    .with_span(span, "empty here"),
            ),
            n => self.report.push(
                Diagnostic::error(format!("method takes exactly one {what} type, found {n}"))
                    .with_span(span, "too many types"),
            ),
        }
        for ty in types {
            // `stream T` is the one legal modifier here.
            if let Some(prefixed) = self.ast.prefixed_type(*ty) {
                if prefixed.modifier != TypeModifier::Stream {
                    self.report.push(
                        Diagnostic::error(format!(
                            "`{}` is not allowed on a method parameter",
                            prefixed.modifier.describe()
                        ))
                        .with_deletion(prefixed.modifier_span, "remove it"),
                    );
                }
                if let Some(inner) = prefixed.inner {
                    if self.ast.prefixed_type(inner).is_some() {
                        self.report.push(
                            Diagnostic::error("method parameters take at most one modifier")
                                .with_span(self.ast.type_span(inner), "here"),
                        );
                    }
                }
            }
        }
    }

    // Reserved and extension ranges.

    fn check_range(&mut self, range: &DeclRange) {
        let mut tags: Vec<Span> = Vec::new();
        let mut names: Vec<Span> = Vec::new();

        for item in &range.items {
            match self.classify_range_item(*item) {
                RangeItem::Tag => tags.push(self.ast.expr_span(*item)),
                RangeItem::Name => names.push(self.ast.expr_span(*item)),
                RangeItem::Bad => {
                    let span = self.ast.expr_span(*item);
                    let wanted = match range.keyword {
                        RangeKeyword::Reserved => "a tag number, range, or name",
                        RangeKeyword::Extensions => "a tag number or range",
                    };
                    self.report.push(
                        Diagnostic::error(format!("expected {wanted}"))
                            .with_span(span, "not usable in this declaration"),
                    );
                }
            }
        }

        match range.keyword {
            RangeKeyword::Extensions => {
                for span in &names {
                    self.report.push(
                        Diagnostic::error("extension ranges take tag numbers only")
                            .with_span(*span, "names cannot be extension ranges"),
                    );
                }
                if range.options.is_some() && !self.syntax.is_editions() {
                    let span = self.ast.expr_span(range.options.unwrap());
                    self.report.push(
                        Diagnostic::warning(
                            "extension range options are an editions feature",
                        )
                        .with_span(span, "declared here"),
                    );
                }
            }
            RangeKeyword::Reserved => {
                if !tags.is_empty() && !names.is_empty() {
                    self.push_mixed_reserved(range, &tags, &names);
                }
                if let Some(options) = range.options {
                    let span = self.ast.expr_span(options);
                    self.report.push(
                        Diagnostic::error("reserved declarations take no options")
                            .with_span(span, "remove these options"),
                    );
                }
                self.check_reserved_name_style(&names);
            }
        }

        for item in &range.items {
            self.check_range_bounds(*item);
        }
    }

    /// One clause cannot reserve both tags and names; offer the split.
    fn push_mixed_reserved(&self, range: &DeclRange, tags: &[Span], names: &[Span]) {
        let tag_list = tags.iter().map(|s| self.src(*s)).join(", ");
        let name_list = names.iter().map(|s| self.src(*s)).join(", ");
        let rewrite = format!("reserved {tag_list}; reserved {name_list};");
        self.report.push(
            Diagnostic::error("reserved tags and names cannot share a clause")
                .with_edit(range.span, "mixed here", rewrite)
                .help("split the clause into one for tags and one for names"),
        );
    }

    /// Editions reserve identifiers; proto2/proto3 reserve strings.
    fn check_reserved_name_style(&self, names: &[Span]) {
        for span in names {
            let text = self.src(*span);
            let quoted = text.starts_with('"') || text.starts_with('\'');
            if self.syntax.is_editions() && quoted {
                let bare = text.trim_matches(|c| c == '"' || c == '\'').to_string();
                self.report.push(
                    Diagnostic::error("editions reserved names are written without quotes")
                        .with_edit(*span, "quoted here", bare),
                );
            } else if !self.syntax.is_editions() && !quoted {
                self.report.push(
                    Diagnostic::error(format!(
                        "reserved names must be string literals in {}",
                        self.syntax
                    ))
                    .with_edit(*span, "bare identifier here", format!("\"{text}\"")),
                );
            }
        }
    }

    fn classify_range_item(&self, item: ExprAny) -> RangeItem {
        match item.kind() {
            _ if self.is_int_expr(item) => RangeItem::Tag,
            ExprKind::Range => RangeItem::Tag,
            ExprKind::Literal => {
                let literal = self.ast.literal(item).unwrap();
                match self.stream.literal(literal.token) {
                    Some(LitValue::Bytes(_)) => RangeItem::Name,
                    _ => RangeItem::Bad,
                }
            }
            ExprKind::Path => {
                let path = self.ast.expr_path(item).unwrap();
                if self.ast.path(path.path).as_single_ident().is_some() {
                    RangeItem::Name
                } else {
                    RangeItem::Bad
                }
            }
            _ => RangeItem::Bad,
        }
    }

    fn check_range_bounds(&self, item: ExprAny) {
        let range = match self.ast.range_expr(item) {
            Some(range) => range,
            None => return,
        };
        if !self.is_int_expr(range.lo) {
            self.report.push(
                Diagnostic::error("range bounds must be integers")
                    .with_span(self.ast.expr_span(range.lo), "not an integer"),
            );
        }
        if let Some(hi) = range.hi {
            let is_max = self
                .ast
                .expr_path(hi)
                .map(|p| self.ast.path(p.path))
                .and_then(|p| self.path_single_text(p))
                == Some("max");
            if !is_max && !self.is_int_expr(hi) {
                self.report.push(
                    Diagnostic::error("range bounds must be integers or `max`")
                        .with_span(self.ast.expr_span(hi), "not an integer"),
                );
            }
        }
    }

    // Small path helpers.

    fn split_modifiers(&self, mut ty: TypeAny) -> (Vec<(TypeModifier, Span)>, Option<TypeAny>) {
        let mut modifiers = Vec::new();
        loop {
            match self.ast.prefixed_type(ty) {
                Some(prefixed) => {
                    modifiers.push((prefixed.modifier, prefixed.modifier_span));
                    match prefixed.inner {
                        Some(inner) => ty = inner,
                        None => return (modifiers, None),
                    }
                }
                None => return (modifiers, Some(ty)),
            }
        }
    }

    fn path_single_text(&self, path: &Path) -> Option<&'a str> {
        let token = path.as_single_ident()?;
        Some(self.stream.get(token).span.text(self.text))
    }
}

#[derive(PartialEq)]
enum RangeItem {
    Tag,
    Name,
    Bad,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    pub(crate) fn legalize_text(text: &str) -> (SyntaxMode, Vec<Diagnostic>) {
        let report = Report::new();
        let lexed = lex(text.as_bytes(), &report);
        let parsed = parse(text, &lexed.stream, &report);
        let mode = legalize(text, &lexed.stream, &parsed.ast, &parsed.file, &report);
        (mode, report.to_vec())
    }

    fn errors(diags: &[Diagnostic]) -> Vec<&str> {
        diags
            .iter()
            .filter(|d| d.severity.is_error())
            .map(|d| d.message.as_str())
            .collect()
    }

    #[test]
    fn clean_proto3_file() {
        let (mode, diags) = legalize_text("syntax = \"proto3\";\nmessage M { string s = 1; }");
        assert_eq!(mode, SyntaxMode::Proto3);
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn missing_syntax_warns_proto2() {
        let (mode, diags) = legalize_text("message M { optional int32 x = 1; }");
        assert_eq!(mode, SyntaxMode::Proto2);
        assert!(diags
            .iter()
            .any(|d| d.message.contains("no syntax declaration")));
    }

    #[test]
    fn syntax_must_be_first() {
        let (_, diags) = legalize_text("package p;\nsyntax = \"proto3\";");
        assert!(errors(&diags)
            .iter()
            .any(|m| m.contains("must be the first declaration")));
    }

    #[test]
    fn duplicate_syntax_is_singleton_violation() {
        let (_, diags) = legalize_text("syntax = \"proto3\";\nsyntax = \"proto3\";");
        assert!(errors(&diags)
            .iter()
            .any(|m| m.contains("more than one syntax declaration")));
    }

    #[test]
    fn unknown_edition_lists_accepted() {
        let (_, diags) = legalize_text("edition = \"2020\";");
        let diag = diags
            .iter()
            .find(|d| d.message.contains("unknown syntax"))
            .unwrap();
        assert!(diag.helps[0].contains("2023"));
    }

    #[test]
    fn unquoted_syntax_gets_quote_edit() {
        let (_, diags) = legalize_text("syntax = proto3;");
        let diag = diags
            .iter()
            .find(|d| d.message.contains("quoted string"))
            .unwrap();
        assert_eq!(diag.snippets[0].edits[0].replace, "\"proto3\"");
    }

    #[test]
    fn required_warns_in_proto2_errors_in_proto3() {
        let (_, diags) = legalize_text("message M { required int32 x = 1; }");
        let required = diags
            .iter()
            .find(|d| d.message.contains("`required`"))
            .unwrap();
        assert_eq!(required.severity, crate::report::Severity::Warning);

        let (_, diags) =
            legalize_text("syntax = \"proto3\";\nmessage M { required int32 x = 1; }");
        let required = diags
            .iter()
            .find(|d| d.message.contains("`required`"))
            .unwrap();
        assert!(required.severity.is_error());
    }

    #[test]
    fn editions_forbids_optional_with_presence_help() {
        let (_, diags) =
            legalize_text("edition = \"2023\";\nmessage M { optional int32 x = 1; }");
        let diag = diags
            .iter()
            .find(|d| d.message.contains("`optional` is not allowed"))
            .unwrap();
        assert!(!diag.snippets[0].edits.is_empty());
        assert!(diag.helps[0].contains("features.field_presence"));
    }

    #[test]
    fn oneof_member_rules() {
        let (_, diags) = legalize_text(
            "syntax = \"proto3\";\nmessage M { oneof o { repeated int32 x = 1; map<string, int32> m = 2; } }",
        );
        let errors = errors(&diags);
        assert!(errors.iter().any(|m| m.contains("not allowed on a oneof member")));
        assert!(errors.iter().any(|m| m.contains("map fields are not allowed in oneofs")));
    }

    #[test]
    fn map_arity_and_base_checks() {
        let (_, diags) =
            legalize_text("syntax = \"proto3\";\nmessage M { map<string> m = 1; list<int32> l = 2; }");
        let errors = errors(&diags);
        assert!(errors.iter().any(|m| m.contains("exactly two type arguments")));
        assert!(errors.iter().any(|m| m.contains("only `map<K, V>`")));
    }

    #[test]
    fn mixed_reserved_suggests_split() {
        let (_, diags) = legalize_text("syntax = \"proto2\";\nmessage M { reserved 1, \"x\", 3 to 5; }");
        let diag = diags
            .iter()
            .find(|d| d.message.contains("cannot share a clause"))
            .unwrap();
        assert_eq!(
            diag.snippets[0].edits[0].replace,
            "reserved 1, 3 to 5; reserved \"x\";"
        );
    }

    #[test]
    fn reserved_name_style_per_mode() {
        let (_, diags) = legalize_text("syntax = \"proto3\";\nmessage M { reserved foo; }");
        let diag = diags
            .iter()
            .find(|d| d.message.contains("must be string literals"))
            .unwrap();
        assert_eq!(diag.snippets[0].edits[0].replace, "\"foo\"");

        let (_, diags) = legalize_text("edition = \"2023\";\nmessage M { reserved \"foo\"; }");
        let diag = diags
            .iter()
            .find(|d| d.message.contains("without quotes"))
            .unwrap();
        assert_eq!(diag.snippets[0].edits[0].replace, "foo");
    }

    #[test]
    fn extensions_reject_names() {
        let (_, diags) = legalize_text("syntax = \"proto2\";\nmessage M { extensions \"x\"; }");
        assert!(errors(&diags)
            .iter()
            .any(|m| m.contains("tag numbers only")));
    }

    #[test]
    fn nesting_violations() {
        let (_, diags) = legalize_text("syntax = \"proto3\";\nservice S { message M {} }\nmessage N { rpc Foo (A) returns (B); }");
        let errors = errors(&diags);
        assert!(errors.iter().any(|m| m.contains("message cannot appear in a service")));
        assert!(errors.iter().any(|m| m.contains("method cannot appear in a message")));
    }

    #[test]
    fn proto2_field_needs_label() {
        let (_, diags) = legalize_text("syntax = \"proto2\";\nmessage M { int32 x = 1; }");
        assert!(errors(&diags)
            .iter()
            .any(|m| m.contains("explicit label")));
    }

    #[test]
    fn method_signature_arity() {
        let (_, diags) =
            legalize_text("syntax = \"proto3\";\nservice S { rpc F (A, B) returns (); }");
        let errors = errors(&diags);
        assert!(errors.iter().any(|m| m.contains("found 2")));
        assert!(errors.iter().any(|m| m.contains("found none")));
    }

    #[test]
    fn groups_only_in_proto2() {
        let (_, diags) =
            legalize_text("syntax = \"proto3\";\nmessage M { group G = 1 {} }");
        assert!(errors(&diags)
            .iter()
            .any(|m| m.contains("groups are not allowed in proto3")));
    }
}
