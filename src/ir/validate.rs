//! Cross-cutting validation, the final IR stage.
//!
//! Everything here needs the fully built file: resolved types, range
//! indexes, evaluated options. Checks report and continue; nothing
//! aborts.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::intern::{Interner, Name};
use crate::report::{Diagnostic, Report};

use super::file::{FileIr, ImportKind, MAX_TAG};
use super::options::OptionValue;
use super::ranges::RangeEntryKind;
use super::types::{ElemType, Member, MemberKind, Presence, TypeDef, TypeDefKind};
use super::value::Value;

/// Tags 19000 to 19999 belong to the wire format.
const IMPL_RESERVED: std::ops::RangeInclusive<i64> = 19000..=19999;

pub(crate) fn run(
    file: &FileIr,
    used_files: &FxHashSet<Name>,
    report: &Report,
    interner: &Interner,
) {
    for (_, type_def) in file.all_types() {
        match type_def.kind {
            TypeDefKind::Message => check_message(file, type_def, report, interner),
            TypeDefKind::Enum => check_enum(file, type_def, report, interner),
        }
    }
    for (_, member) in file.all_members() {
        if member.kind == MemberKind::Extension {
            check_extension(file, member, report, interner);
        }
    }
    check_unused_imports(file, used_files, report, interner);
}

fn bool_option(options: &[OptionValue], interner: &Interner, name: &str) -> Option<bool> {
    options
        .iter()
        .find(|option| &*interner.resolve(option.name) == name)
        .and_then(|option| match option.value {
            Value::Bool(value) => Some(value),
            _ => None,
        })
}

fn check_message(file: &FileIr, message: &TypeDef, report: &Report, interner: &Interner) {
    let message_set =
        bool_option(&message.options, interner, "message_set_wire_format").unwrap_or(false);

    if message_set {
        if file.syntax != crate::syntax::SyntaxMode::Proto2 {
            report.push(
                Diagnostic::error("message-set wire format requires proto2")
                    .with_span(message.name_span, "declared here"),
            );
        }
        if message.extension_ranges.is_empty() {
            report.push(
                Diagnostic::error("a message-set must declare extension ranges")
                    .with_span(message.name_span, "no `extensions` declaration"),
            );
        }
    }

    let mut tags_seen: FxHashMap<i64, Name> = FxHashMap::default();
    for member_ptr in &message.members {
        let member = file.member(*member_ptr);
        if message_set {
            report.push(
                Diagnostic::error("a message-set cannot declare fields")
                    .with_span(member.name_span, "field not allowed")
                    .help("message-set messages carry only extensions"),
            );
        }
        let Some(tag) = member.tag else { continue };

        if !(1..=MAX_TAG).contains(&tag) {
            report.push(
                Diagnostic::error(format!(
                    "field numbers must be between 1 and {MAX_TAG}, not {tag}"
                ))
                .with_span(member.span, "out of range"),
            );
            continue;
        }
        if IMPL_RESERVED.contains(&tag) {
            report.push(
                Diagnostic::error(format!(
                    "field number {tag} is reserved for the Protobuf implementation"
                ))
                .with_span(member.span, "numbers 19000 to 19999 cannot be used"),
            );
        }

        match tags_seen.get(&tag) {
            Some(previous) => {
                report.push(
                    Diagnostic::error(format!(
                        "field number {tag} is already used by `{}`",
                        interner.resolve(*previous)
                    ))
                    .with_span(member.span, "reused here"),
                );
            }
            None => {
                tags_seen.insert(tag, member.name);
            }
        }

        if let Some(entry) = message.range_index.query(tag as i32) {
            match entry.kind {
                RangeEntryKind::Reserved => report.push(
                    Diagnostic::error(format!("field number {tag} is reserved"))
                        .with_span(member.span, "used here")
                        .with_span(entry.span, "reserved here"),
                ),
                RangeEntryKind::Extension => report.push(
                    Diagnostic::error(format!(
                        "field number {tag} is declared as an extension range"
                    ))
                    .with_span(member.span, "used here")
                    .with_span(entry.span, "extension range here"),
                ),
            }
        }
    }
}

fn check_enum(file: &FileIr, enum_def: &TypeDef, report: &Report, interner: &Interner) {
    if enum_def.members.is_empty() {
        report.push(
            Diagnostic::error("enums must declare at least one value")
                .with_span(enum_def.name_span, "empty enum"),
        );
        return;
    }

    let allow_alias = bool_option(&enum_def.options, interner, "allow_alias").unwrap_or(false);
    let open = enum_def.features.enum_type == super::options::EnumOpenness::Open;

    if open {
        let first = file.member(enum_def.members[0]);
        if first.tag != Some(0) {
            report.push(
                Diagnostic::error("the first value of an open enum must be zero")
                    .with_span(first.span, "nonzero first value")
                    .help("add a zero value first, or use a closed enum"),
            );
        }
    }

    let mut tags_seen: FxHashMap<i64, Name> = FxHashMap::default();
    for member_ptr in &enum_def.members {
        let member = file.member(*member_ptr);
        let Some(tag) = member.tag else { continue };

        if i32::try_from(tag).is_err() {
            report.push(
                Diagnostic::error(format!("enum value {tag} does not fit in 32 bits"))
                    .with_span(member.span, "out of range"),
            );
            continue;
        }

        match tags_seen.get(&tag) {
            Some(previous) if !allow_alias => {
                report.push(
                    Diagnostic::error(format!(
                        "enum value {tag} is already used by `{}`",
                        interner.resolve(*previous)
                    ))
                    .with_span(member.span, "reused here")
                    .help("set `option allow_alias = true;` to permit aliases"),
                );
            }
            Some(_) => {}
            None => {
                tags_seen.insert(tag, member.name);
            }
        }

        if let Some(entry) = enum_def.range_index.query(tag as i32) {
            if entry.kind == RangeEntryKind::Reserved {
                report.push(
                    Diagnostic::error(format!("enum value {tag} is reserved"))
                        .with_span(member.span, "used here")
                        .with_span(entry.span, "reserved here"),
                );
            }
        }
    }
}

fn check_extension(file: &FileIr, member: &Member, report: &Report, interner: &Interner) {
    let Some(container) = member.container else {
        return;
    };
    let Some(target) = file.resolve_type_ref(container) else {
        return;
    };

    if let Some(tag) = member.tag {
        if (1..=MAX_TAG).contains(&tag) {
            let in_extension_range = target
                .range_index
                .query(tag as i32)
                .is_some_and(|entry| entry.kind == RangeEntryKind::Extension);
            if !in_extension_range {
                report.push(
                    Diagnostic::error(format!(
                        "`{}` does not declare {tag} as an extension number",
                        interner.resolve(target.fqn)
                    ))
                    .with_span(member.span, "not in any extension range"),
                );
            }
        }
    }

    // Extensions of a message-set must be singular message fields.
    let message_set =
        bool_option(&target.options, interner, "message_set_wire_format").unwrap_or(false);
    if message_set {
        let is_message = matches!(member.elem, Some(ElemType::Named(reference))
            if file.resolve_type_ref(reference).is_some_and(|t| t.kind == TypeDefKind::Message));
        let singular = matches!(member.presence, Presence::Explicit | Presence::Shared);
        if !is_message || !singular {
            report.push(
                Diagnostic::error("extensions of a message-set must be singular message fields")
                    .with_span(member.span, "not a singular message field"),
            );
        }
    }
}

fn check_unused_imports(
    file: &FileIr,
    used_files: &FxHashSet<Name>,
    report: &Report,
    interner: &Interner,
) {
    for import in &file.imports {
        // Public and weak imports exist to re-export or tolerate
        // absence; only plain imports warn.
        if import.kind != ImportKind::Regular {
            continue;
        }
        let used = used_files.contains(&import.path)
            || import.file.as_deref().is_some_and(|imported| {
                imported
                    .exported
                    .iter()
                    .any(|symbol| used_files.contains(&symbol.file))
            });
        if !used {
            report.push(
                Diagnostic::warning(format!(
                    "import `{}` is unused",
                    interner.resolve(import.path)
                ))
                .with_deletion(import.span, "remove the import"),
            );
        }
    }
}
