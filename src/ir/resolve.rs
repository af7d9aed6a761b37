//! Type-name resolution with Protobuf scope walking.
//!
//! A relative name is tried against the containing scope, then each
//! enclosing scope outward, ending at the root. Matching commits on the
//! *first component*: once some scope contains the first component, the
//! whole name must resolve there, which is how protoc behaves and why
//! shadowing a package name inside a message is so disruptive.

use crate::intern::Interner;

use super::symbol::{Symbol, SymbolTable};

pub enum Resolution<'t> {
    Found(&'t Symbol),
    /// The name resolved, but to something that is not usable here.
    WrongKind(&'t Symbol),
    NotFound,
}

/// Resolves `name` (already trimmed of a leading dot if `absolute`)
/// against `table`, starting from `scope` (the fully-qualified container
/// name, possibly empty).
pub fn resolve_name<'t>(
    table: &'t SymbolTable,
    interner: &Interner,
    scope: &str,
    name: &str,
    absolute: bool,
    accept: impl Fn(&Symbol) -> bool,
) -> Resolution<'t> {
    if absolute {
        return finish(table.lookup(name, interner), accept);
    }

    let first = name.split('.').next().unwrap_or(name);
    let mut scope = scope.to_string();
    loop {
        let candidate_first = join(&scope, first);
        if table.lookup(&candidate_first, interner).is_some() {
            // Committed: the full name must resolve in this scope.
            let candidate = join(&scope, name);
            return finish(table.lookup(&candidate, interner), accept);
        }
        if scope.is_empty() {
            return Resolution::NotFound;
        }
        scope = match scope.rfind('.') {
            Some(at) => scope[..at].to_string(),
            None => String::new(),
        };
    }
}

fn finish(symbol: Option<&Symbol>, accept: impl Fn(&Symbol) -> bool) -> Resolution<'_> {
    match symbol {
        Some(symbol) if accept(symbol) => Resolution::Found(symbol),
        Some(symbol) => Resolution::WrongKind(symbol),
        None => Resolution::NotFound,
    }
}

fn join(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::RawPtr;
    use crate::intern::Name;
    use crate::ir::symbol::SymbolKind;
    use crate::span::Span;

    fn table(interner: &Interner, names: &[(&str, SymbolKind)]) -> SymbolTable {
        let file = interner.intern("test.proto");
        let entries = names
            .iter()
            .map(|(fqn, kind)| Symbol {
                kind: *kind,
                fqn: interner.intern(fqn),
                file,
                ptr: None::<RawPtr>,
                span: Span::default(),
            })
            .collect();
        SymbolTable::build(entries, interner, file, &[file], None)
    }

    fn found_name(resolution: Resolution<'_>, interner: &Interner) -> Option<String> {
        match resolution {
            Resolution::Found(symbol) => Some(interner.resolve(symbol.fqn).to_string()),
            _ => None,
        }
    }

    #[test]
    fn inner_scope_wins() {
        let interner = Interner::new();
        let table = table(
            &interner,
            &[
                ("pkg", SymbolKind::Package),
                ("pkg.T", SymbolKind::Message),
                ("pkg.Outer", SymbolKind::Message),
                ("pkg.Outer.T", SymbolKind::Message),
            ],
        );
        let resolution = resolve_name(&table, &interner, "pkg.Outer", "T", false, |s| {
            s.kind.is_type()
        });
        assert_eq!(
            found_name(resolution, &interner),
            Some("pkg.Outer.T".to_string())
        );
    }

    #[test]
    fn walks_out_to_package_and_root() {
        let interner = Interner::new();
        let table = table(
            &interner,
            &[
                ("pkg", SymbolKind::Package),
                ("pkg.T", SymbolKind::Message),
                ("Other", SymbolKind::Message),
            ],
        );
        let inner = resolve_name(&table, &interner, "pkg.Outer", "T", false, |s| {
            s.kind.is_type()
        });
        assert_eq!(found_name(inner, &interner), Some("pkg.T".to_string()));

        let root = resolve_name(&table, &interner, "pkg.Outer", "Other", false, |s| {
            s.kind.is_type()
        });
        assert_eq!(found_name(root, &interner), Some("Other".to_string()));
    }

    #[test]
    fn absolute_skips_walking() {
        let interner = Interner::new();
        let table = table(
            &interner,
            &[
                ("pkg", SymbolKind::Package),
                ("pkg.T", SymbolKind::Message),
                ("T", SymbolKind::Enum),
            ],
        );
        let resolution = resolve_name(&table, &interner, "pkg.Inner", "T", true, |s| {
            s.kind.is_type()
        });
        assert_eq!(found_name(resolution, &interner), Some("T".to_string()));
    }

    #[test]
    fn first_component_commits() {
        let interner = Interner::new();
        // `a.T` exists at the root; `pkg.a` exists as a message with no
        // `T` inside. From scope `pkg`, `a.T` must commit to `pkg.a` and
        // fail rather than fall through to the root `a.T`.
        let table = table(
            &interner,
            &[
                ("pkg", SymbolKind::Package),
                ("pkg.a", SymbolKind::Message),
                ("a", SymbolKind::Package),
                ("a.T", SymbolKind::Message),
            ],
        );
        let resolution =
            resolve_name(&table, &interner, "pkg", "a.T", false, |s| s.kind.is_type());
        assert!(matches!(resolution, Resolution::NotFound));
    }

    #[test]
    fn wrong_kind_is_distinguished() {
        let interner = Interner::new();
        let table = table(
            &interner,
            &[
                ("pkg", SymbolKind::Package),
                ("pkg.f", SymbolKind::Field),
            ],
        );
        let resolution =
            resolve_name(&table, &interner, "pkg", "f", false, |s| s.kind.is_type());
        assert!(matches!(resolution, Resolution::WrongKind(_)));
    }
}
