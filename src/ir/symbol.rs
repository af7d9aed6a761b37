//! Symbols and symbol tables.
//!
//! A symbol table is a vector sorted by *resolved* fully-qualified name.
//! Interner ids are assigned in whatever order parallel queries touch
//! strings, so sorting by id would make output depend on scheduling;
//! sorting by string keeps merges, winners, and diagnostics
//! deterministic.

use multimap::MultiMap;

use crate::arena::RawPtr;
use crate::intern::{Interner, Name};
use crate::report::{Diagnostic, Report};
use crate::span::Span;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub enum SymbolKind {
    Package,
    Message,
    Enum,
    Field,
    Extension,
    EnumValue,
    Oneof,
    Scalar,
    ReservedName,
}

impl SymbolKind {
    pub fn describe(self) -> &'static str {
        match self {
            SymbolKind::Package => "package",
            SymbolKind::Message => "message",
            SymbolKind::Enum => "enum",
            SymbolKind::Field => "field",
            SymbolKind::Extension => "extension",
            SymbolKind::EnumValue => "enum value",
            SymbolKind::Oneof => "oneof",
            SymbolKind::Scalar => "scalar",
            SymbolKind::ReservedName => "reserved name",
        }
    }

    pub fn is_type(self) -> bool {
        matches!(self, SymbolKind::Message | SymbolKind::Enum)
    }

    /// Packages sort before anything else with the same name; the rest
    /// of the tie-break chain is (owning file path, definition offset).
    fn rank(self) -> u8 {
        match self {
            SymbolKind::Package => 0,
            _ => 1,
        }
    }
}

/// One exported or imported name.
#[derive(Clone, Debug)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub fqn: Name,
    /// Path of the defining file.
    pub file: Name,
    /// Pointer into the defining file's IR arenas; meaningless for
    /// packages and reserved names.
    pub ptr: Option<RawPtr>,
    pub span: Span,
}

/// A deduplicated, name-sorted symbol table.
#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: Vec<Symbol>,
}

impl SymbolTable {
    /// Builds a table from raw entries: sorts by resolved name with the
    /// deterministic tie-break chain, collapses duplicates, and reports
    /// genuine conflicts.
    ///
    /// `current_file` is the file diagnostics are charged to;
    /// `directly_visible` lists files whose symbols the current file can
    /// see without transiting an import.
    pub fn build(
        mut entries: Vec<Symbol>,
        interner: &Interner,
        current_file: Name,
        directly_visible: &[Name],
        report: Option<&Report>,
    ) -> SymbolTable {
        entries.sort_by(|a, b| {
            let key_a = (interner.resolve(a.fqn), a.kind.rank());
            let key_b = (interner.resolve(b.fqn), b.kind.rank());
            key_a
                .cmp(&key_b)
                .then_with(|| interner.resolve(a.file).cmp(&interner.resolve(b.file)))
                .then_with(|| a.span.start.cmp(&b.span.start))
        });

        let mut deduped: Vec<Symbol> = Vec::with_capacity(entries.len());
        let mut clashes: MultiMap<Name, Symbol> = MultiMap::new();
        for symbol in entries {
            match deduped.last() {
                Some(last) if last.fqn == symbol.fqn => {
                    if collapses_silently(last, &symbol) {
                        continue;
                    }
                    // Keep the winner (already first by tie-break); stash
                    // the loser for diagnostics.
                    clashes.insert(symbol.fqn, symbol);
                }
                _ => deduped.push(symbol),
            }
        }

        if let Some(report) = report {
            for (fqn, losers) in clashes.iter_all() {
                let winner = deduped
                    .iter()
                    .find(|s| s.fqn == *fqn)
                    .expect("winner for every clash");
                report.push(duplicate_diagnostic(
                    interner,
                    current_file,
                    directly_visible,
                    winner,
                    losers,
                ));
            }
        }

        SymbolTable { entries: deduped }
    }

    pub fn lookup(&self, fqn: &str, interner: &Interner) -> Option<&Symbol> {
        self.entries
            .binary_search_by(|symbol| interner.resolve(symbol.fqn).as_ref().cmp(fqn))
            .ok()
            .map(|index| &self.entries[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, for merging into a downstream table.
    pub fn to_entries(&self) -> Vec<Symbol> {
        self.entries.clone()
    }
}

/// Same-name pairs that are fine: identical packages, repeated reserved
/// names, or the exact same definition arriving through two import
/// chains.
fn collapses_silently(a: &Symbol, b: &Symbol) -> bool {
    if a.kind == SymbolKind::Package && b.kind == SymbolKind::Package {
        return true;
    }
    if a.kind == SymbolKind::ReservedName && b.kind == SymbolKind::ReservedName {
        return true;
    }
    a.kind == b.kind && a.file == b.file && a.span == b.span
}

fn duplicate_diagnostic(
    interner: &Interner,
    current_file: Name,
    directly_visible: &[Name],
    winner: &Symbol,
    losers: &[Symbol],
) -> Diagnostic {
    let name = interner.resolve(winner.fqn);

    // A member colliding with a reserved name gets its own wording.
    let reserved = [winner]
        .into_iter()
        .chain(losers)
        .find(|s| s.kind == SymbolKind::ReservedName);
    let offender = [winner]
        .into_iter()
        .chain(losers)
        .find(|s| s.kind != SymbolKind::ReservedName);
    if let (Some(reserved), Some(offender)) = (reserved, offender) {
        if offender.kind != SymbolKind::ReservedName {
            let mut diag = Diagnostic::error(format!("`{name}` is a reserved name"));
            diag = attach(diag, current_file, offender, "used here");
            diag = attach(diag, current_file, reserved, "reserved here");
            return diag;
        }
    }

    let mut diag = Diagnostic::error(format!("`{name}` declared multiple times"));
    diag = attach(diag, current_file, winner, "first declared here");
    for loser in losers {
        diag = attach(diag, current_file, loser, "declared again here");
    }
    let mut files: Vec<Name> = [winner].into_iter().chain(losers).map(|s| s.file).collect();
    files.dedup();
    let crosses_files = files.iter().any(|f| *f != current_file);
    let indirect = [winner]
        .into_iter()
        .chain(losers)
        .any(|s| !directly_visible.contains(&s.file));
    if crosses_files || indirect {
        diag = diag.help(
            "symbols of public imports are visible through every file that imports them",
        );
    }
    if [winner]
        .into_iter()
        .chain(losers)
        .any(|s| s.kind == SymbolKind::EnumValue)
    {
        diag = diag.note(
            "enum values are declared in their enum's enclosing scope, not inside the enum",
        );
    }
    diag
}

fn attach(diag: Diagnostic, current_file: Name, symbol: &Symbol, label: &str) -> Diagnostic {
    if symbol.file == current_file {
        diag.with_span(symbol.span, label)
    } else {
        diag.with_span_in(symbol.file, symbol.span, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// The table's name sequence, for determinism assertions.
    fn fqn_order(table: &SymbolTable, interner: &Interner) -> Vec<Arc<str>> {
        table.iter().map(|s| interner.resolve(s.fqn)).collect()
    }

    fn symbol(
        interner: &Interner,
        kind: SymbolKind,
        fqn: &str,
        file: &str,
        start: u32,
    ) -> Symbol {
        Symbol {
            kind,
            fqn: interner.intern(fqn),
            file: interner.intern(file),
            ptr: None,
            span: Span::new(start, start + 1),
        }
    }

    #[test]
    fn sorted_by_resolved_name() {
        let interner = Interner::new();
        // Intern in an order that makes id order disagree with string
        // order.
        let entries = vec![
            symbol(&interner, SymbolKind::Message, "zebra.Z", "a.proto", 0),
            symbol(&interner, SymbolKind::Message, "alpha.A", "a.proto", 10),
        ];
        let current = interner.intern("a.proto");
        let table = SymbolTable::build(entries, &interner, current, &[current], None);
        let order = fqn_order(&table, &interner);
        assert_eq!(&*order[0], "alpha.A");
        assert_eq!(&*order[1], "zebra.Z");
    }

    #[test]
    fn packages_collapse_silently() {
        let interner = Interner::new();
        let entries = vec![
            symbol(&interner, SymbolKind::Package, "pkg", "a.proto", 0),
            symbol(&interner, SymbolKind::Package, "pkg", "b.proto", 0),
        ];
        let report = Report::new();
        let current = interner.intern("a.proto");
        let table =
            SymbolTable::build(entries, &interner, current, &[current], Some(&report));
        assert_eq!(table.len(), 1);
        assert!(report.is_empty());
    }

    #[test]
    fn duplicates_report_all_locations() {
        let interner = Interner::new();
        let entries = vec![
            symbol(&interner, SymbolKind::Message, "pkg.M", "b.proto", 40),
            symbol(&interner, SymbolKind::Message, "pkg.M", "a.proto", 7),
        ];
        let report = Report::new();
        let current = interner.intern("b.proto");
        let table =
            SymbolTable::build(entries, &interner, current, &[current], Some(&report));
        assert_eq!(table.len(), 1);
        let diags = report.to_vec();
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("`pkg.M` declared multiple times"));
        assert_eq!(diags[0].snippets.len(), 2);
        // a.proto wins on file-path tie-break and is not directly
        // visible, so the transitive-visibility help appears.
        assert!(!diags[0].helps.is_empty());
    }

    #[test]
    fn package_beats_type_for_winner() {
        let interner = Interner::new();
        let entries = vec![
            symbol(&interner, SymbolKind::Message, "pkg", "a.proto", 0),
            symbol(&interner, SymbolKind::Package, "pkg", "z.proto", 0),
        ];
        let report = Report::new();
        let current = interner.intern("a.proto");
        let table =
            SymbolTable::build(entries, &interner, current, &[current], Some(&report));
        assert_eq!(table.iter().next().unwrap().kind, SymbolKind::Package);
    }

    #[test]
    fn lookup_by_name() {
        let interner = Interner::new();
        let entries = vec![
            symbol(&interner, SymbolKind::Message, "pkg.A", "a.proto", 0),
            symbol(&interner, SymbolKind::Enum, "pkg.B", "a.proto", 10),
        ];
        let current = interner.intern("a.proto");
        let table = SymbolTable::build(entries, &interner, current, &[current], None);
        assert_eq!(table.lookup("pkg.B", &interner).unwrap().kind, SymbolKind::Enum);
        assert!(table.lookup("pkg.C", &interner).is_none());
    }

    #[test]
    fn enum_value_clash_gets_scoping_note() {
        let interner = Interner::new();
        let entries = vec![
            symbol(&interner, SymbolKind::EnumValue, "pkg.X", "a.proto", 0),
            symbol(&interner, SymbolKind::Message, "pkg.X", "a.proto", 30),
        ];
        let report = Report::new();
        let current = interner.intern("a.proto");
        SymbolTable::build(entries, &interner, current, &[current], Some(&report));
        let diags = report.to_vec();
        assert!(diags[0].notes.iter().any(|n| n.contains("enclosing scope")));
    }
}
