//! Per-file IR construction.
//!
//! [`build_file`] consumes one parsed file plus the IR of its direct
//! imports and runs the seven build stages in order: context init, local
//! symbol collection, symbol-table merging, type resolution, range
//! indexing, option evaluation, and validation. Stages communicate
//! through the `Builder`; everything the later stages need from the AST
//! is captured as "pending" records during collection so the tree is
//! walked exactly once.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::arena::{Arena, Ptr};
use crate::ast::{
    DeclAny, DeclKind, DefKind, ExprAny, Path as AstPath, RangeKeyword, TypeAny, TypeKind,
    TypeModifier,
};
use crate::context::FileContext;
use crate::intern::{Interner, Name};
use crate::report::{Diagnostic, Report};
use crate::span::Span;
use crate::syntax::SyntaxMode;

use super::options::{FeatureSet, FieldPresence, OptionEnv, OptionTarget, OptionValue};
use super::ranges::{RangeEntry, RangeEntryKind, RangeIndex};
use super::resolve::{resolve_name, Resolution};
use super::symbol::{Symbol, SymbolKind, SymbolTable};
use super::types::{
    ElemType, Member, MemberKind, Method, MethodType, Oneof, Presence, Ref, Scalar, Service,
    TagRange, TypeDef, TypeDefKind,
};
use super::validate;
use super::value::Value;

/// The maximum field number, `2^29 - 1`.
pub(crate) const MAX_TAG: i64 = 536_870_911;

/// How an import entry became visible to this file.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ImportKind {
    Regular,
    Public,
    Weak,
    /// Reachable through imports but not imported directly.
    Transitive,
    /// Reachable through a chain of `import public`; its symbols are
    /// re-exported by this file.
    TransitivePublic,
}

/// A direct import handed to [`build_file`] by the caller, already
/// resolved to its IR (or `None` if opening or compiling it failed).
#[derive(Clone)]
pub struct ResolvedImport {
    pub path: Name,
    pub kind: ImportKind,
    pub span: Span,
    pub file: Option<Arc<FileIr>>,
}

/// An entry in a file's final import list.
#[derive(Clone)]
pub struct Import {
    pub path: Name,
    pub kind: ImportKind,
    /// Span of the import declaration; empty for transitive entries.
    pub span: Span,
    pub file: Option<Arc<FileIr>>,
}

pub(crate) struct IrArenas {
    pub types: Arena<TypeDef>,
    pub members: Arena<Member>,
    pub oneofs: Arena<Oneof>,
}

/// Everything [`build_file`] needs.
pub struct BuildInput<'a> {
    pub cx: Arc<FileContext>,
    pub imports: Vec<ResolvedImport>,
    pub interner: &'a Interner,
    pub report: &'a Report,
}

/// The finished IR of one file.
pub struct FileIr {
    pub cx: Arc<FileContext>,
    pub path: Name,
    pub package: Name,
    pub syntax: SyntaxMode,
    pub imports: Vec<Import>,
    /// Top-level types, in declaration order.
    pub types: Vec<Ptr<TypeDef>>,
    /// Top-level extension fields.
    pub extensions: Vec<Ptr<Member>>,
    pub services: Vec<Service>,
    pub options: Vec<OptionValue>,
    pub features: FeatureSet,
    /// Symbols this file makes visible to importers.
    pub exported: SymbolTable,
    /// Symbols visible inside this file.
    pub imported: SymbolTable,
    pub(crate) arenas: IrArenas,
}

impl FileIr {
    pub fn type_def(&self, ptr: Ptr<TypeDef>) -> &TypeDef {
        self.arenas.types.deref(ptr)
    }

    pub fn member(&self, ptr: Ptr<Member>) -> &Member {
        self.arenas.members.deref(ptr)
    }

    pub fn oneof(&self, ptr: Ptr<Oneof>) -> &Oneof {
        self.arenas.oneofs.deref(ptr)
    }

    /// All type definitions in this file, nested included.
    pub fn all_types(&self) -> impl Iterator<Item = (Ptr<TypeDef>, &TypeDef)> {
        self.arenas.types.iter_ptrs()
    }

    pub fn all_members(&self) -> impl Iterator<Item = (Ptr<Member>, &Member)> {
        self.arenas.members.iter_ptrs()
    }

    /// The file a [`Ref`] points into: 0 is this file, n is import n-1.
    pub fn file_of(&self, index: u32) -> Option<&FileIr> {
        if index == 0 {
            Some(self)
        } else {
            self.imports
                .get(index as usize - 1)
                .and_then(|import| import.file.as_deref())
        }
    }

    pub fn resolve_type_ref(&self, reference: Ref<TypeDef>) -> Option<&TypeDef> {
        Some(self.file_of(reference.file)?.type_def(reference.ptr))
    }

    pub fn import_index(&self, path: Name) -> Option<u32> {
        if path == self.path {
            return Some(0);
        }
        self.imports
            .iter()
            .position(|import| import.path == path)
            .map(|at| at as u32 + 1)
    }
}

impl std::fmt::Debug for FileIr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileIr")
            .field("path", &self.path)
            .field("types", &self.types.len())
            .field("exported", &self.exported.len())
            .finish()
    }
}

/// Scope kind during collection.
#[derive(Copy, Clone, PartialEq, Eq)]
enum CollectScope {
    TopLevel,
    Message(Ptr<TypeDef>),
    Enum(Ptr<TypeDef>),
    Oneof(Ptr<TypeDef>, Ptr<Oneof>),
    Extend(Ptr<TypeDef>),
    TopLevelExtend,
}

/// A member whose type and options still need later stages.
struct PendingMember {
    ptr: Ptr<Member>,
    /// The written type with modifiers stripped.
    ty: Option<TypeAny>,
    /// FQN of the enclosing scope, for resolution.
    scope: Name,
    /// Compact options array expression.
    options: Option<ExprAny>,
    modifiers: Vec<(TypeModifier, Span)>,
    /// For extensions: the extend target path.
    extend_target: Option<(Ptr<AstPath>, Span)>,
}

struct PendingOptionList {
    decls: Vec<(Ptr<AstPath>, Option<ExprAny>)>,
    target: OptionTarget,
    scope: Name,
    owner: OptionOwner,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum OptionOwner {
    File,
    Type(Ptr<TypeDef>),
    Oneof(Ptr<Oneof>),
    Service(usize),
    Method(usize, usize),
}

struct PendingMethod {
    service: usize,
    method: usize,
    input: Option<TypeAny>,
    output: Option<TypeAny>,
    scope: Name,
}

pub(crate) struct Builder<'a> {
    cx: Arc<FileContext>,
    interner: &'a Interner,
    report: &'a Report,
    syntax: SyntaxMode,
    package: Name,
    direct_imports: Vec<ResolvedImport>,
    arenas: IrArenas,
    types: Vec<Ptr<TypeDef>>,
    extensions: Vec<Ptr<Member>>,
    services: Vec<Service>,
    locals: Vec<Symbol>,
    pending_members: Vec<PendingMember>,
    pending_options: Vec<PendingOptionList>,
    pending_methods: Vec<PendingMethod>,
    imports: Vec<Import>,
    exported: SymbolTable,
    imported: SymbolTable,
    file_options: Vec<OptionValue>,
    features: FeatureSet,
    /// Owner paths whose symbols this file actually referenced.
    used_files: FxHashSet<Name>,
}

/// Runs the seven stages over one file.
pub fn build_file(input: BuildInput<'_>) -> FileIr {
    let BuildInput {
        cx,
        imports,
        interner,
        report,
    } = input;

    let syntax = cx.syntax;
    let mut builder = Builder {
        package: Name::EMPTY,
        syntax,
        features: FeatureSet::defaults(syntax),
        direct_imports: imports,
        arenas: IrArenas {
            types: Arena::new(),
            members: Arena::new(),
            oneofs: Arena::new(),
        },
        types: Vec::new(),
        extensions: Vec::new(),
        services: Vec::new(),
        locals: Vec::new(),
        pending_members: Vec::new(),
        pending_options: Vec::new(),
        pending_methods: Vec::new(),
        imports: Vec::new(),
        exported: SymbolTable::default(),
        imported: SymbolTable::default(),
        file_options: Vec::new(),
        used_files: FxHashSet::default(),
        cx,
        interner,
        report,
    };

    builder.init_package();
    builder.collect();
    builder.merge_symbols();
    builder.resolve_pending();
    builder.index_ranges();
    builder.evaluate_options();
    let used_files = std::mem::take(&mut builder.used_files);
    let file = builder.finish();
    validate::run(&file, &used_files, report, interner);
    file
}

impl<'a> Builder<'a> {
    // Stage 1: package and syntax. The path was canonicalized and the
    // syntax mode fixed before the builder runs.

    fn init_package(&mut self) {
        let cx = self.cx.clone();
        for decl in &cx.root.decls {
            let Some(package) = cx.ast.package(*decl) else {
                continue;
            };
            let Some(path) = package.path else { continue };
            let path = cx.ast.path(path);
            if let Some(parts) = cx.path_idents(path) {
                let mut fqn = Name::EMPTY;
                for part in parts {
                    fqn = self.interner.join(fqn, part);
                    self.locals.push(Symbol {
                        kind: SymbolKind::Package,
                        fqn,
                        file: cx.path,
                        ptr: None,
                        span: path.span,
                    });
                }
                self.package = fqn;
            }
            break;
        }
    }

    // Stage 2: one AST walk collecting arenas, symbols, and pending
    // work.

    fn collect(&mut self) {
        let cx = self.cx.clone();
        self.collect_decls(&cx.root.decls, self.package, CollectScope::TopLevel);
    }

    fn collect_decls(&mut self, decls: &[DeclAny], scope_fqn: Name, scope: CollectScope) {
        for decl in decls {
            match decl.kind() {
                DeclKind::Def => self.collect_def(*decl, scope_fqn, scope),
                DeclKind::Range => self.collect_range(*decl, scope),
                // Empty, syntax, package, import, and stray bodies are
                // handled elsewhere or already diagnosed.
                _ => {}
            }
        }
    }

    fn collect_def(&mut self, decl: DeclAny, scope_fqn: Name, scope: CollectScope) {
        let cx = self.cx.clone();
        let def = cx.ast.def(decl).expect("def decl");
        match def.classify() {
            DefKind::Message | DefKind::Group => {
                self.collect_type_def(decl, TypeDefKind::Message, scope_fqn, scope)
            }
            DefKind::Enum => self.collect_type_def(decl, TypeDefKind::Enum, scope_fqn, scope),
            DefKind::Field => self.collect_field(decl, scope_fqn, scope),
            DefKind::EnumValue => self.collect_enum_value(decl, scope_fqn, scope),
            DefKind::Oneof => self.collect_oneof(decl, scope_fqn, scope),
            DefKind::Extend => self.collect_extend(decl, scope_fqn, scope),
            DefKind::Service => self.collect_service(decl, scope_fqn),
            DefKind::Option => {
                // Non-file scopes peel options off before recursing, so
                // only file scope reaches here.
                if matches!(scope, CollectScope::TopLevel) {
                    if let Some(name) = def.name {
                        self.push_option_decl(
                            OptionOwner::File,
                            OptionTarget::File,
                            scope_fqn,
                            name,
                            def.value,
                        );
                    }
                }
            }
            DefKind::Method | DefKind::Invalid => {}
        }
    }

    fn push_option_decl(
        &mut self,
        owner: OptionOwner,
        target: OptionTarget,
        scope: Name,
        name: Ptr<AstPath>,
        value: Option<ExprAny>,
    ) {
        match self
            .pending_options
            .iter_mut()
            .find(|list| list.owner == owner)
        {
            Some(list) => list.decls.push((name, value)),
            None => self.pending_options.push(PendingOptionList {
                decls: vec![(name, value)],
                target,
                scope,
                owner,
            }),
        }
    }

    fn collect_type_def(
        &mut self,
        decl: DeclAny,
        kind: TypeDefKind,
        scope_fqn: Name,
        scope: CollectScope,
    ) {
        let cx = self.cx.clone();
        let def = cx.ast.def(decl).expect("def decl");
        let def_kind = def.classify();
        let (span, body) = (def.span, def.body);
        let Some((name, name_span)) = self.single_name(decl) else {
            return;
        };
        let fqn = self.interner.join(scope_fqn, &self.interner.resolve(name));
        let parent = match scope {
            CollectScope::Message(ptr) | CollectScope::Oneof(ptr, _) => Some(ptr),
            _ => None,
        };

        let ptr = self.arenas.types.alloc(TypeDef {
            kind,
            name,
            fqn,
            parent,
            members: Vec::new(),
            nested: Vec::new(),
            oneofs: Vec::new(),
            extensions: Vec::new(),
            reserved_ranges: Vec::new(),
            extension_ranges: Vec::new(),
            reserved_names: Vec::new(),
            options: Vec::new(),
            features: self.features,
            range_index: RangeIndex::default(),
            is_group: def_kind == DefKind::Group,
            span,
            name_span,
        });

        match scope {
            CollectScope::Message(parent) | CollectScope::Oneof(parent, _) => {
                self.arenas.types.deref_mut(parent).nested.push(ptr)
            }
            CollectScope::TopLevel => self.types.push(ptr),
            _ => {}
        }

        self.locals.push(Symbol {
            kind: match kind {
                TypeDefKind::Message => SymbolKind::Message,
                TypeDefKind::Enum => SymbolKind::Enum,
            },
            fqn,
            file: cx.path,
            ptr: Some(ptr.erase()),
            span: name_span,
        });

        // A group is both a type and a field of its parent.
        if def_kind == DefKind::Group {
            self.collect_group_field(decl, ptr, scope_fqn, scope);
        }

        if let Some(body) = body {
            let child_scope = match kind {
                TypeDefKind::Message => CollectScope::Message(ptr),
                TypeDefKind::Enum => CollectScope::Enum(ptr),
            };
            self.collect_type_body(body, fqn, child_scope, ptr);
        }
    }

    /// Walks a type body, peeling `option` declarations into the type's
    /// pending list.
    fn collect_type_body(
        &mut self,
        body: Ptr<crate::ast::DeclBody>,
        fqn: Name,
        scope: CollectScope,
        ptr: Ptr<TypeDef>,
    ) {
        let cx = self.cx.clone();
        let target = match scope {
            CollectScope::Enum(_) => OptionTarget::Enum,
            _ => OptionTarget::Message,
        };
        for decl in &cx.ast.body(body).decls {
            let option = cx.ast.def(*decl).and_then(|def| {
                (def.classify() == DefKind::Option).then_some((def.name, def.value))
            });
            if let Some((name, value)) = option {
                if let Some(name) = name {
                    self.push_option_decl(OptionOwner::Type(ptr), target, fqn, name, value);
                }
                continue;
            }
            self.collect_decls(std::slice::from_ref(decl), fqn, scope);
        }
    }

    fn collect_field(&mut self, decl: DeclAny, scope_fqn: Name, scope: CollectScope) {
        let cx = self.cx.clone();
        let def = cx.ast.def(decl).expect("def decl");
        let Some((name, name_span)) = self.single_name(decl) else {
            return;
        };

        let (container, oneof, member_kind) = match scope {
            CollectScope::Message(ptr) => (Some(ptr), None, MemberKind::Field),
            CollectScope::Oneof(msg, oneof) => (Some(msg), Some(oneof), MemberKind::Field),
            CollectScope::Extend(msg) => (Some(msg), None, MemberKind::Extension),
            CollectScope::TopLevelExtend => (None, None, MemberKind::Extension),
            _ => return,
        };

        let fqn = self.interner.join(scope_fqn, &self.interner.resolve(name));
        let tag = def.value.and_then(|v| cx.int_value(v)).map(saturate_tag);
        let modifiers = def
            .prefix
            .map(|ty| self.strip_modifiers(ty))
            .unwrap_or_default();
        let base_ty = def.prefix.and_then(|ty| self.modifier_base(ty));
        let type_span = base_ty.map(|t| cx.ast.type_span(t));

        let ptr = self.arenas.members.alloc(Member {
            kind: member_kind,
            name,
            fqn,
            tag,
            elem: None,
            map_value: None,
            presence: Presence::Implicit,
            container: container.map(Ref::local),
            oneof,
            options: Vec::new(),
            default: None,
            span: def.span,
            name_span,
            type_span,
        });

        match scope {
            CollectScope::Message(msg) => self.arenas.types.deref_mut(msg).members.push(ptr),
            CollectScope::Oneof(msg, oneof) => {
                self.arenas.types.deref_mut(msg).members.push(ptr);
                self.arenas.oneofs.deref_mut(oneof).members.push(ptr);
            }
            CollectScope::Extend(msg) => {
                self.arenas.types.deref_mut(msg).extensions.push(ptr)
            }
            CollectScope::TopLevelExtend => self.extensions.push(ptr),
            _ => {}
        }

        self.locals.push(Symbol {
            kind: match member_kind {
                MemberKind::Extension => SymbolKind::Extension,
                _ => SymbolKind::Field,
            },
            fqn,
            file: cx.path,
            ptr: Some(ptr.erase()),
            span: name_span,
        });

        self.pending_members.push(PendingMember {
            ptr,
            ty: base_ty,
            scope: scope_fqn,
            options: def.options,
            modifiers,
            extend_target: None,
        });
    }

    /// The field half of a `group` declaration: named after the group,
    /// lowercased, typed as the group message.
    fn collect_group_field(
        &mut self,
        decl: DeclAny,
        group_type: Ptr<TypeDef>,
        scope_fqn: Name,
        scope: CollectScope,
    ) {
        let cx = self.cx.clone();
        let def = cx.ast.def(decl).expect("def decl");
        let Some((type_name, name_span)) = self.single_name(decl) else {
            return;
        };
        let field_name = self.interner.resolve(type_name).to_lowercase();
        let name = self.interner.intern(&field_name);
        let fqn = self.interner.join(scope_fqn, &field_name);
        let tag = def.value.and_then(|v| cx.int_value(v)).map(saturate_tag);
        let modifiers = def
            .prefix
            .map(|ty| self.strip_modifiers(ty))
            .unwrap_or_default();

        let is_extension =
            matches!(scope, CollectScope::Extend(_) | CollectScope::TopLevelExtend);
        let (container, oneof) = match scope {
            CollectScope::Message(ptr) | CollectScope::Extend(ptr) => (Some(ptr), None),
            CollectScope::Oneof(msg, oneof) => (Some(msg), Some(oneof)),
            _ => (None, None),
        };

        let ptr = self.arenas.members.alloc(Member {
            kind: if is_extension {
                MemberKind::Extension
            } else {
                MemberKind::Field
            },
            name,
            fqn,
            tag,
            elem: Some(ElemType::Named(Ref::local(group_type))),
            map_value: None,
            presence: Presence::Explicit,
            container: container.map(Ref::local),
            oneof,
            options: Vec::new(),
            default: None,
            span: def.span,
            name_span,
            type_span: Some(name_span),
        });

        match scope {
            CollectScope::Message(msg) => self.arenas.types.deref_mut(msg).members.push(ptr),
            CollectScope::Oneof(msg, oneof) => {
                self.arenas.types.deref_mut(msg).members.push(ptr);
                self.arenas.oneofs.deref_mut(oneof).members.push(ptr);
            }
            CollectScope::Extend(msg) => self.arenas.types.deref_mut(msg).extensions.push(ptr),
            CollectScope::TopLevelExtend => self.extensions.push(ptr),
            _ => {}
        }

        self.locals.push(Symbol {
            kind: if is_extension {
                SymbolKind::Extension
            } else {
                SymbolKind::Field
            },
            fqn,
            file: cx.path,
            ptr: Some(ptr.erase()),
            span: name_span,
        });

        self.pending_members.push(PendingMember {
            ptr,
            ty: None,
            scope: scope_fqn,
            options: def.options,
            modifiers,
            extend_target: None,
        });
    }

    fn collect_enum_value(&mut self, decl: DeclAny, scope_fqn: Name, scope: CollectScope) {
        let cx = self.cx.clone();
        let def = cx.ast.def(decl).expect("def decl");
        let CollectScope::Enum(enum_ptr) = scope else {
            return;
        };
        let Some((name, name_span)) = self.single_name(decl) else {
            return;
        };
        // Enum values scope to the enum's *parent*: they are siblings of
        // the enum, not children.
        let parent_scope = {
            let enum_fqn = self.interner.resolve(self.arenas.types.deref(enum_ptr).fqn);
            match enum_fqn.rfind('.') {
                Some(at) => self.interner.intern(&enum_fqn[..at]),
                None => Name::EMPTY,
            }
        };
        let fqn = self
            .interner
            .join(parent_scope, &self.interner.resolve(name));
        let tag = def.value.and_then(|v| cx.int_value(v)).map(saturate_tag);

        let ptr = self.arenas.members.alloc(Member {
            kind: MemberKind::EnumValue,
            name,
            fqn,
            tag,
            elem: None,
            map_value: None,
            presence: Presence::Implicit,
            container: Some(Ref::local(enum_ptr)),
            oneof: None,
            options: Vec::new(),
            default: None,
            span: def.span,
            name_span,
            type_span: None,
        });
        self.arenas.types.deref_mut(enum_ptr).members.push(ptr);

        self.locals.push(Symbol {
            kind: SymbolKind::EnumValue,
            fqn,
            file: cx.path,
            ptr: Some(ptr.erase()),
            span: name_span,
        });

        self.pending_members.push(PendingMember {
            ptr,
            ty: None,
            scope: scope_fqn,
            options: def.options,
            modifiers: Vec::new(),
            extend_target: None,
        });
    }

    fn collect_oneof(&mut self, decl: DeclAny, scope_fqn: Name, scope: CollectScope) {
        let cx = self.cx.clone();
        let def = cx.ast.def(decl).expect("def decl");
        let msg = match scope {
            CollectScope::Message(ptr) => ptr,
            _ => return,
        };
        let Some((name, name_span)) = self.single_name(decl) else {
            return;
        };
        let fqn = self.interner.join(scope_fqn, &self.interner.resolve(name));
        let ptr = self.arenas.oneofs.alloc(Oneof {
            name,
            fqn,
            members: Vec::new(),
            options: Vec::new(),
            span: def.span,
        });
        self.arenas.types.deref_mut(msg).oneofs.push(ptr);
        self.locals.push(Symbol {
            kind: SymbolKind::Oneof,
            fqn,
            file: cx.path,
            ptr: Some(ptr.erase()),
            span: name_span,
        });

        let Some(body) = def.body else { return };
        for child in &cx.ast.body(body).decls {
            let option = cx.ast.def(*child).and_then(|def| {
                (def.classify() == DefKind::Option).then_some((def.name, def.value))
            });
            if let Some((opt_name, opt_value)) = option {
                if let Some(opt_name) = opt_name {
                    self.push_option_decl(
                        OptionOwner::Oneof(ptr),
                        OptionTarget::Oneof,
                        scope_fqn,
                        opt_name,
                        opt_value,
                    );
                }
                continue;
            }
            self.collect_decls(
                std::slice::from_ref(child),
                scope_fqn,
                CollectScope::Oneof(msg, ptr),
            );
        }
    }

    fn collect_extend(&mut self, decl: DeclAny, scope_fqn: Name, scope: CollectScope) {
        let cx = self.cx.clone();
        let def = cx.ast.def(decl).expect("def decl");
        let Some(target) = def.name else { return };
        let target_span = cx.ast.path(target).span;
        let extend_scope = match scope {
            CollectScope::Message(ptr) => CollectScope::Extend(ptr),
            _ => CollectScope::TopLevelExtend,
        };

        let first_pending = self.pending_members.len();
        if let Some(body) = def.body {
            let decls: Vec<DeclAny> = cx.ast.body(body).decls.clone();
            self.collect_decls(&decls, scope_fqn, extend_scope);
        }
        // Tag the new extension members with their resolve-later target.
        for pending in &mut self.pending_members[first_pending..] {
            pending.extend_target = Some((target, target_span));
        }
    }

    fn collect_service(&mut self, decl: DeclAny, scope_fqn: Name) {
        let cx = self.cx.clone();
        let def = cx.ast.def(decl).expect("def decl");
        let Some((name, name_span)) = self.single_name(decl) else {
            return;
        };
        let fqn = self.interner.join(scope_fqn, &self.interner.resolve(name));
        let service_index = self.services.len();
        self.services.push(Service {
            name,
            fqn,
            methods: Vec::new(),
            options: Vec::new(),
            span: def.span,
            name_span,
        });
        self.locals.push(Symbol {
            // Services share the type namespace for conflict purposes.
            kind: SymbolKind::Message,
            fqn,
            file: cx.path,
            ptr: None,
            span: name_span,
        });

        let Some(body) = def.body else { return };
        for child in &cx.ast.body(body).decls {
            let Some(child_def) = cx.ast.def(*child) else {
                continue;
            };
            match child_def.classify() {
                DefKind::Option => {
                    if let Some(opt_name) = child_def.name {
                        self.push_option_decl(
                            OptionOwner::Service(service_index),
                            OptionTarget::Service,
                            fqn,
                            opt_name,
                            child_def.value,
                        );
                    }
                }
                DefKind::Method => {
                    let Some((method_name, method_name_span)) = self.single_name(*child)
                    else {
                        continue;
                    };
                    let method_fqn = self
                        .interner
                        .join(fqn, &self.interner.resolve(method_name));
                    let input = child_def
                        .signature
                        .as_ref()
                        .and_then(|s| s.inputs.first().copied());
                    let output = child_def
                        .signature
                        .as_ref()
                        .and_then(|s| s.outputs.first().copied());
                    let method_index = self.services[service_index].methods.len();
                    self.services[service_index].methods.push(Method {
                        name: method_name,
                        fqn: method_fqn,
                        input: None,
                        output: None,
                        options: Vec::new(),
                        span: child_def.span,
                        name_span: method_name_span,
                    });
                    self.pending_methods.push(PendingMethod {
                        service: service_index,
                        method: method_index,
                        input,
                        output,
                        scope: fqn,
                    });

                    // Method bodies hold options.
                    if let Some(method_body) = child_def.body {
                        for opt in &cx.ast.body(method_body).decls {
                            let option = cx.ast.def(*opt).and_then(|def| {
                                (def.classify() == DefKind::Option)
                                    .then_some((def.name, def.value))
                            });
                            if let Some((Some(opt_name), opt_value)) = option {
                                self.push_option_decl(
                                    OptionOwner::Method(service_index, method_index),
                                    OptionTarget::Method,
                                    method_fqn,
                                    opt_name,
                                    opt_value,
                                );
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn collect_range(&mut self, decl: DeclAny, scope: CollectScope) {
        let cx = self.cx.clone();
        let Some(range) = cx.ast.range(decl) else {
            return;
        };
        let type_ptr = match scope {
            CollectScope::Message(ptr) | CollectScope::Enum(ptr) => ptr,
            _ => return,
        };
        let scope_fqn = self.arenas.types.deref(type_ptr).fqn;

        let mut tag_ranges = Vec::new();
        let mut names = Vec::new();
        for item in &range.items {
            if let Some(tag_range) = self.eval_tag_range(*item) {
                tag_ranges.push(tag_range);
            } else if let Some(name) = self.range_item_name(*item) {
                names.push((name, cx.expr_span(*item)));
            }
        }

        for (name, span) in &names {
            let fqn = self.interner.join(scope_fqn, &self.interner.resolve(*name));
            self.locals.push(Symbol {
                kind: SymbolKind::ReservedName,
                fqn,
                file: cx.path,
                ptr: None,
                span: *span,
            });
        }

        let type_def = self.arenas.types.deref_mut(type_ptr);
        match range.keyword {
            RangeKeyword::Reserved => {
                type_def.reserved_ranges.extend(tag_ranges);
                type_def
                    .reserved_names
                    .extend(names.into_iter().map(|(name, _)| name));
            }
            RangeKeyword::Extensions => type_def.extension_ranges.extend(tag_ranges),
        }
    }

    fn eval_tag_range(&self, item: ExprAny) -> Option<TagRange> {
        let cx = &self.cx;
        let span = cx.expr_span(item);
        if let Some(range) = cx.ast.range_expr(item) {
            let lo = cx.int_value(range.lo)?;
            let hi = match range.hi {
                Some(hi) => match cx.int_value(hi) {
                    Some(value) => value,
                    None if self.is_max_path(hi) => MAX_TAG as i128,
                    None => return None,
                },
                None => lo,
            };
            return Some(TagRange {
                lo: clamp_tag(lo),
                hi: clamp_tag(hi),
                span,
            });
        }
        let value = clamp_tag(cx.int_value(item)?);
        Some(TagRange {
            lo: value,
            hi: value,
            span,
        })
    }

    fn is_max_path(&self, expr: ExprAny) -> bool {
        self.cx
            .ast
            .expr_path(expr)
            .map(|p| self.cx.ast.path(p.path))
            .and_then(|p| p.as_single_ident())
            .map(|t| self.cx.token_text(t) == "max")
            .unwrap_or(false)
    }

    fn range_item_name(&self, item: ExprAny) -> Option<Name> {
        if let Some(text) = self.cx.string_text(item) {
            return Some(self.interner.intern(&text));
        }
        let path = self.cx.ast.expr_path(item)?;
        let token = self.cx.ast.path(path.path).as_single_ident()?;
        Some(self.interner.intern(self.cx.token_text(token)))
    }

    // Stage 3: symbol-table merging.

    fn merge_symbols(&mut self) {
        let directly_visible: Vec<Name> = std::iter::once(self.cx.path)
            .chain(self.direct_imports.iter().map(|i| i.path))
            .collect();

        // Exported: locals plus everything re-exported through `import
        // public` chains. Built silently; conflicts are reported once on
        // the imported superset below.
        let mut exported_raw = self.locals.clone();
        for import in &self.direct_imports {
            if import.kind == ImportKind::Public {
                if let Some(file) = &import.file {
                    exported_raw.extend(file.exported.to_entries());
                }
            }
        }
        self.exported = SymbolTable::build(
            exported_raw.clone(),
            self.interner,
            self.cx.path,
            &directly_visible,
            None,
        );

        let mut imported_raw = exported_raw;
        for import in &self.direct_imports {
            if import.kind != ImportKind::Public {
                if let Some(file) = &import.file {
                    imported_raw.extend(file.exported.to_entries());
                }
            }
        }
        self.imported = SymbolTable::build(
            imported_raw,
            self.interner,
            self.cx.path,
            &directly_visible,
            Some(self.report),
        );

        self.build_import_list();
    }

    /// The final import list: direct imports as declared, then every
    /// transitively reachable file, classified by whether its symbols
    /// are re-exported.
    fn build_import_list(&mut self) {
        fn add(map: &mut FxHashMap<Name, Arc<FileIr>>, file: &Arc<FileIr>) {
            if map.insert(file.path, file.clone()).is_none() {
                for import in &file.imports {
                    if let Some(inner) = &import.file {
                        add(map, inner);
                    }
                }
            }
        }
        let mut known: FxHashMap<Name, Arc<FileIr>> = FxHashMap::default();
        for import in &self.direct_imports {
            if let Some(file) = &import.file {
                add(&mut known, file);
            }
        }

        // A non-direct file whose symbols are visible here arrived over
        // a chain of `import public`.
        let visible_files: FxHashSet<Name> =
            self.imported.iter().map(|s| s.file).collect();

        let mut imports: Vec<Import> = self
            .direct_imports
            .iter()
            .map(|import| Import {
                path: import.path,
                kind: import.kind,
                span: import.span,
                file: import.file.clone(),
            })
            .collect();

        let mut transitive: Vec<(Arc<str>, Name)> = known
            .keys()
            .filter(|path| {
                **path != self.cx.path && !imports.iter().any(|i| i.path == **path)
            })
            .map(|path| (self.interner.resolve(*path), *path))
            .collect();
        // Path-sorted so the list (and every Ref built from it) is
        // deterministic.
        transitive.sort();
        for (_, path) in transitive {
            let kind = if visible_files.contains(&path) {
                ImportKind::TransitivePublic
            } else {
                ImportKind::Transitive
            };
            imports.push(Import {
                path,
                kind,
                span: Span::default(),
                file: known.get(&path).cloned(),
            });
        }
        self.imports = imports;
    }

    fn import_index_of(&self, path: Name) -> Option<u32> {
        if path == self.cx.path {
            return Some(0);
        }
        self.imports
            .iter()
            .position(|import| import.path == path)
            .map(|at| at as u32 + 1)
    }

    // Stage 4: type resolution.

    fn resolve_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending_members);
        for item in &pending {
            self.resolve_member(item);
        }
        self.pending_members = pending;

        let methods = std::mem::take(&mut self.pending_methods);
        for item in &methods {
            let scope = self.interner.resolve(item.scope).to_string();
            let input = item.input.map(|ty| self.resolve_method_type(ty, &scope));
            let output = item.output.map(|ty| self.resolve_method_type(ty, &scope));
            let method = &mut self.services[item.service].methods[item.method];
            method.input = input;
            method.output = output;
        }
        self.pending_methods = methods;
    }

    fn resolve_member(&mut self, pending: &PendingMember) {
        let cx = self.cx.clone();
        if let Some((target, span)) = pending.extend_target {
            let path = cx.ast.path(target);
            let scope = self.interner.resolve(pending.scope).to_string();
            if let Some(reference) = self.resolve_type_path(path, &scope, span, true) {
                self.arenas.members.deref_mut(pending.ptr).container = Some(reference);
            }
        }

        let Some(ty) = pending.ty else { return };
        let scope = self.interner.resolve(pending.scope).to_string();
        let (elem, map_value) = self.build_elem(ty, &scope);
        let member = self.arenas.members.deref_mut(pending.ptr);
        member.elem = elem;
        member.map_value = map_value;
    }

    /// Builds the element type for a written type, resolving named
    /// paths through the imported symbol table.
    fn build_elem(&mut self, ty: TypeAny, scope: &str) -> (Option<ElemType>, Option<ElemType>) {
        let cx = self.cx.clone();
        match ty.kind() {
            TypeKind::Path => {
                let path = cx.ast.path(cx.ast.type_path(ty).expect("path type").path);
                if let (None, Some(single)) = (path.leading_dot, path.as_single_ident()) {
                    let text = cx.token_text(single);
                    if let Some(scalar) = Scalar::from_name(text) {
                        if scalar.is_sentinel() {
                            self.report.push(
                                Diagnostic::error(format!(
                                    "`{text}` is a reserved word and cannot be a type"
                                ))
                                .with_span(path.span, "reserved"),
                            );
                            return (None, None);
                        }
                        return (Some(ElemType::Scalar(scalar)), None);
                    }
                }
                let span = path.span;
                let reference = self.resolve_type_path(path, scope, span, false);
                (reference.map(ElemType::Named), None)
            }
            TypeKind::Generic => {
                let generic = cx.ast.generic(ty).expect("generic type");
                let key = generic.args.first().copied();
                let value = generic.args.get(1).copied();
                let key_scalar = key.and_then(|k| self.map_key_scalar(k));
                let value_elem = value.and_then(|v| self.build_elem(v, scope).0);
                match (key_scalar, value_elem) {
                    (Some(key), Some(value)) => (Some(ElemType::Map(key)), Some(value)),
                    _ => (None, None),
                }
            }
            TypeKind::Prefixed => {
                // Modifiers were stripped during collection; reaching
                // one here means the written type was only modifiers.
                match cx.ast.prefixed_type(ty).and_then(|p| p.inner) {
                    Some(inner) => self.build_elem(inner, scope),
                    None => (None, None),
                }
            }
        }
    }

    fn map_key_scalar(&self, ty: TypeAny) -> Option<Scalar> {
        let span = self.cx.ast.type_span(ty);
        let scalar = self
            .cx
            .ast
            .type_path(ty)
            .map(|p| self.cx.ast.path(p.path))
            .and_then(|p| p.as_single_ident())
            .and_then(|t| Scalar::from_name(self.cx.token_text(t)));
        match scalar {
            Some(scalar) if scalar.is_valid_map_key() => Some(scalar),
            _ => {
                self.report.push(
                    Diagnostic::error("invalid map key type")
                        .with_span(span, "map keys must be an integral type, bool, or string"),
                );
                None
            }
        }
    }

    fn resolve_type_path(
        &mut self,
        path: &AstPath,
        scope: &str,
        span: Span,
        require_message: bool,
    ) -> Option<Ref<TypeDef>> {
        let text = self.cx.path_text(path);
        let absolute = path.leading_dot.is_some();
        let trimmed = text.trim_start_matches('.');

        let resolution = resolve_name(
            &self.imported,
            self.interner,
            scope,
            trimmed,
            absolute,
            |symbol| symbol.kind.is_type(),
        );
        let outcome = match resolution {
            Resolution::Found(symbol) => Ok((symbol.kind, symbol.file, symbol.ptr)),
            Resolution::WrongKind(symbol) => Err(Some(symbol.kind)),
            Resolution::NotFound => Err(None),
        };
        match outcome {
            Ok((kind, file, ptr)) => {
                if require_message && kind != SymbolKind::Message {
                    self.report.push(
                        Diagnostic::error(format!(
                            "`{text}` is an enum; only messages can be extended"
                        ))
                        .with_span(span, "not a message"),
                    );
                    return None;
                }
                self.used_files.insert(file);
                let file_index = self.import_index_of(file)?;
                Some(Ref::imported(file_index, ptr?.unerase()))
            }
            Err(Some(kind)) => {
                self.report.push(
                    Diagnostic::error(format!(
                        "cannot use {} `{text}` as a type",
                        kind.describe()
                    ))
                    .with_span(span, "not a type"),
                );
                None
            }
            Err(None) => {
                self.report.push(
                    Diagnostic::error(format!("unknown type `{text}`"))
                        .with_span(span, "not found in any enclosing scope")
                        .help("is the file declaring it imported?"),
                );
                None
            }
        }
    }

    fn resolve_method_type(&mut self, ty: TypeAny, scope: &str) -> MethodType {
        let cx = self.cx.clone();
        let span = cx.ast.type_span(ty);
        let (streaming, inner) = match cx.ast.prefixed_type(ty) {
            Some(prefixed) => (prefixed.modifier == TypeModifier::Stream, prefixed.inner),
            None => (false, Some(ty)),
        };
        let elem = match inner {
            Some(inner_ty) => {
                let (elem, _) = self.build_elem(inner_ty, scope);
                if let Some(ElemType::Scalar(scalar)) = elem {
                    self.report.push(
                        Diagnostic::error(format!(
                            "method types must be messages, not `{}`",
                            scalar.name()
                        ))
                        .with_span(span, "scalar type"),
                    );
                    None
                } else {
                    elem
                }
            }
            None => None,
        };
        MethodType {
            elem,
            streaming,
            span,
        }
    }

    // Stage 5: range indexing.

    fn index_ranges(&mut self) {
        for index in 0..self.arenas.types.len() {
            let mut entries: Vec<RangeEntry> = Vec::new();
            {
                let type_def = self.arenas.types.get(index);
                for range in &type_def.reserved_ranges {
                    entries.push(RangeEntry {
                        lo: range.lo,
                        hi: range.hi,
                        kind: RangeEntryKind::Reserved,
                        span: range.span,
                    });
                }
                for range in &type_def.extension_ranges {
                    entries.push(RangeEntry {
                        lo: range.lo,
                        hi: range.hi,
                        kind: RangeEntryKind::Extension,
                        span: range.span,
                    });
                }
            }
            let (built, overlaps) = RangeIndex::build(entries);
            for (a, b) in overlaps {
                self.report.push(
                    Diagnostic::error("tag ranges overlap")
                        .with_span(b.span, format!("{} to {} here", b.lo, b.hi))
                        .with_span(a.span, format!("overlaps {} to {}", a.lo, a.hi)),
                );
            }
            self.arenas.types.get_mut(index).range_index = built;
        }
    }

    // Stage 6: option evaluation.

    fn evaluate_options(&mut self) {
        let lists = std::mem::take(&mut self.pending_options);

        // File options first: feature overrides at file scope are the
        // base every narrower scope inherits from.
        let mut type_lists: FxHashMap<u32, &PendingOptionList> = FxHashMap::default();
        for list in &lists {
            match list.owner {
                OptionOwner::File => {
                    let (features, values) = self.eval_option_list(list, self.features);
                    self.features = features;
                    self.file_options.extend(values);
                }
                OptionOwner::Type(ptr) => {
                    type_lists.insert(ptr.index(), list);
                }
                _ => {}
            }
        }

        // Types in allocation order: parents precede their children, so
        // each inherits its parent's (already finalized) feature set
        // before applying its own overrides.
        for index in 0..self.arenas.types.len() {
            let base = self
                .arenas
                .types
                .get(index)
                .parent
                .map(|parent| self.arenas.types.deref(parent).features)
                .unwrap_or(self.features);
            let (features, values) = match type_lists.get(&index) {
                Some(list) => self.eval_option_list(list, base),
                None => (base, Vec::new()),
            };
            let type_def = self.arenas.types.get_mut(index);
            type_def.features = features;
            type_def.options.extend(values);
        }

        for list in &lists {
            match list.owner {
                OptionOwner::File | OptionOwner::Type(_) => {}
                OptionOwner::Oneof(ptr) => {
                    let (_, values) = self.eval_option_list(list, self.features);
                    self.arenas.oneofs.deref_mut(ptr).options.extend(values);
                }
                OptionOwner::Service(index) => {
                    let (_, values) = self.eval_option_list(list, self.features);
                    self.services[index].options.extend(values);
                }
                OptionOwner::Method(service, method) => {
                    let (_, values) = self.eval_option_list(list, self.features);
                    self.services[service].methods[method]
                        .options
                        .extend(values);
                }
            }
        }

        let pending = std::mem::take(&mut self.pending_members);
        for item in &pending {
            self.evaluate_member_options(item);
        }
        self.pending_members = pending;
    }

    fn eval_option_list(
        &self,
        list: &PendingOptionList,
        base: FeatureSet,
    ) -> (FeatureSet, Vec<OptionValue>) {
        let mut features = base;
        let mut values = Vec::new();
        let env = OptionEnv {
            cx: &self.cx,
            interner: self.interner,
            report: self.report,
            syntax: self.syntax,
            symbols: Some(&self.imported),
            scope: self.interner.resolve(list.scope).to_string(),
        };
        for (name, value) in &list.decls {
            let key = self.cx.ast.path(*name);
            if let Some(folded) = env.evaluate(list.target, key, *value, &mut features) {
                values.push(folded);
            }
        }
        (features, values)
    }

    fn evaluate_member_options(&mut self, pending: &PendingMember) {
        let cx = self.cx.clone();
        let (member_kind, elem, container) = {
            let member = self.arenas.members.deref(pending.ptr);
            (member.kind, member.elem, member.container)
        };
        let container_features = container
            .filter(|c| c.is_local() && member_kind != MemberKind::Extension)
            .map(|c| self.arenas.types.deref(c.ptr).features)
            .unwrap_or(self.features);
        let mut features = container_features;
        let mut values = Vec::new();
        let mut default = None;

        if let Some(options) = pending.options {
            let env = OptionEnv {
                cx: &cx,
                interner: self.interner,
                report: self.report,
                syntax: self.syntax,
                symbols: Some(&self.imported),
                scope: self.interner.resolve(pending.scope).to_string(),
            };
            let target = match member_kind {
                MemberKind::EnumValue => OptionTarget::EnumValue,
                _ => OptionTarget::Field,
            };
            if let Some(array) = cx.ast.array(options) {
                for entry in &array.elems {
                    let Some(field) = cx.ast.field_expr(*entry) else {
                        continue;
                    };
                    let Some(key_path) = cx.ast.expr_path(field.key) else {
                        let span = cx.expr_span(field.key);
                        self.report.push(
                            Diagnostic::error("expected an option name")
                                .with_span(span, "not an option name"),
                        );
                        continue;
                    };
                    let key = cx.ast.path(key_path.path);
                    let is_default = cx.path_idents(key).as_deref() == Some(&["default"][..]);
                    if is_default && member_kind != MemberKind::EnumValue {
                        default = self.evaluate_default(&env, elem, field.value, key.span);
                        continue;
                    }
                    if let Some(folded) = env.evaluate(target, key, field.value, &mut features)
                    {
                        values.push(folded);
                    }
                }
            }
        }

        let presence = self.compute_presence(pending, member_kind, elem, features);
        let member = self.arenas.members.deref_mut(pending.ptr);
        member.options.extend(values);
        member.presence = presence;
        if default.is_some() {
            member.default = default;
        }
    }

    fn evaluate_default(
        &self,
        env: &OptionEnv<'_>,
        elem: Option<ElemType>,
        value: Option<ExprAny>,
        key_span: Span,
    ) -> Option<Value> {
        if self.syntax == SyntaxMode::Proto3 {
            self.report.push(
                Diagnostic::error("explicit default values are not allowed in proto3")
                    .with_span(key_span, "remove the default"),
            );
            return None;
        }
        env.fold_default(&elem?, value?)
    }

    fn compute_presence(
        &self,
        pending: &PendingMember,
        kind: MemberKind,
        elem: Option<ElemType>,
        features: FeatureSet,
    ) -> Presence {
        if kind == MemberKind::EnumValue {
            return Presence::Implicit;
        }
        let has = |m: TypeModifier| pending.modifiers.iter().any(|(mm, _)| *mm == m);
        if has(TypeModifier::Repeated) || matches!(elem, Some(ElemType::Map(_))) {
            return Presence::Repeated;
        }
        if self.arenas.members.deref(pending.ptr).oneof.is_some() {
            return Presence::Shared;
        }
        if has(TypeModifier::Required) {
            return Presence::Required;
        }
        match self.syntax {
            SyntaxMode::Proto2 => Presence::Explicit,
            SyntaxMode::Proto3 => {
                if has(TypeModifier::Optional) || matches!(elem, Some(ElemType::Named(_))) {
                    Presence::Explicit
                } else {
                    Presence::Implicit
                }
            }
            SyntaxMode::Edition(_) => match features.field_presence {
                FieldPresence::Explicit => Presence::Explicit,
                FieldPresence::Implicit => Presence::Implicit,
                FieldPresence::LegacyRequired => Presence::Required,
            },
        }
    }

    // Helpers.

    fn single_name(&self, decl: DeclAny) -> Option<(Name, Span)> {
        let def = self.cx.ast.def(decl)?;
        let path = self.cx.ast.path(def.name?);
        let token = path.as_single_ident()?;
        let name = self.interner.intern(self.cx.token_text(token));
        Some((name, path.span))
    }

    fn strip_modifiers(&self, ty: TypeAny) -> Vec<(TypeModifier, Span)> {
        let mut modifiers = Vec::new();
        let mut current = ty;
        while let Some(prefixed) = self.cx.ast.prefixed_type(current) {
            modifiers.push((prefixed.modifier, prefixed.modifier_span));
            match prefixed.inner {
                Some(inner) => current = inner,
                None => break,
            }
        }
        modifiers
    }

    fn modifier_base(&self, ty: TypeAny) -> Option<TypeAny> {
        let mut current = ty;
        while let Some(prefixed) = self.cx.ast.prefixed_type(current) {
            current = prefixed.inner?;
        }
        Some(current)
    }

    fn finish(self) -> FileIr {
        FileIr {
            path: self.cx.path,
            cx: self.cx,
            package: self.package,
            syntax: self.syntax,
            imports: self.imports,
            types: self.types,
            extensions: self.extensions,
            services: self.services,
            options: self.file_options,
            features: self.features,
            exported: self.exported,
            imported: self.imported,
            arenas: self.arenas,
        }
    }
}

fn clamp_tag(value: i128) -> i32 {
    value.clamp(i32::MIN as i128, i32::MAX as i128) as i32
}

/// Saturating narrowing keeps out-of-range tags detectably out of range
/// instead of silently wrapping.
fn saturate_tag(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
