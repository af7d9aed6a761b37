//! End-to-end compilation scenarios through the public API.

use pretty_assertions::assert_eq;
use protolith::ir::{ElemType, Presence, Scalar};
use protolith::{CancelToken, Diagnostic, MapOpener, Session, Severity, SyntaxMode};

fn session_with(files: &[(&str, &str)]) -> Session {
    let mut opener = MapOpener::new();
    for (path, text) in files {
        opener.insert(*path, text.to_string().into_bytes());
    }
    Session::new(Box::new(opener))
}

fn errors(diagnostics: &[Diagnostic]) -> Vec<&Diagnostic> {
    diagnostics
        .iter()
        .filter(|d| d.severity >= Severity::Error)
        .collect()
}

#[test]
fn minimal_proto3_file() {
    let session = session_with(&[(
        "m.proto",
        "syntax = \"proto3\";\nmessage M { string s = 1; }",
    )]);
    let result = session.compile(&["m.proto"]);
    assert!(!result.has_errors(), "{:#?}", result.diagnostics);

    let file = result.files[0].as_ref().unwrap();
    assert_eq!(file.syntax, SyntaxMode::Proto3);
    assert_eq!(file.types.len(), 1);

    let message = file.type_def(file.types[0]);
    assert_eq!(&*session.interner().resolve(message.fqn), "M");
    assert_eq!(message.members.len(), 1);

    let field = file.member(message.members[0]);
    assert_eq!(&*session.interner().resolve(field.name), "s");
    assert_eq!(field.tag, Some(1));
    assert_eq!(field.elem, Some(ElemType::Scalar(Scalar::String)));
    assert_eq!(field.presence, Presence::Implicit);

    // Exported symbols: {M, M.s}.
    assert!(file.exported.lookup("M", session.interner()).is_some());
    assert!(file.exported.lookup("M.s", session.interner()).is_some());
}

#[test]
fn reserved_mixing_tags_and_names_suggests_split() {
    let session = session_with(&[(
        "m.proto",
        "syntax = \"proto2\";\nmessage M { reserved 1, \"x\", 3 to 5; }",
    )]);
    let result = session.compile(&["m.proto"]);
    let mixed: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| d.message.contains("cannot share a clause"))
        .collect();
    assert_eq!(mixed.len(), 1);
    let edit = &mixed[0].snippets[0].edits[0];
    assert_eq!(edit.replace, "reserved 1, 3 to 5; reserved \"x\";");
}

#[test]
fn unterminated_delimiter_still_yields_the_field() {
    let session = session_with(&[("m.proto", "message M { int32 x = 1;")]);
    let result = session.compile(&["m.proto"]);

    let unmatched = result
        .diagnostics
        .iter()
        .find(|d| d.message.contains("encountered unmatched `{`"))
        .expect("unmatched-brace diagnostic");
    // Anchored at the brace.
    let span = unmatched.primary_span().unwrap();
    assert_eq!(span.start, 10);

    let file = result.files[0].as_ref().unwrap();
    let message = file.type_def(file.types[0]);
    assert_eq!(message.members.len(), 1);
    let field = file.member(message.members[0]);
    assert_eq!(&*session.interner().resolve(field.name), "x");
}

#[test]
fn duplicate_symbol_across_public_import() {
    let session = session_with(&[
        (
            "a.proto",
            "syntax = \"proto3\";\npackage pkg;\nmessage M { int32 a = 1; }",
        ),
        (
            "b.proto",
            "syntax = \"proto3\";\npackage pkg;\nimport public \"a.proto\";\nmessage M { int32 b = 1; }",
        ),
    ]);
    let result = session.compile(&["b.proto"]);
    let duplicate = result
        .diagnostics
        .iter()
        .find(|d| d.message.contains("`pkg.M` declared multiple times"))
        .expect("duplicate-symbol diagnostic");
    // Both definition sites are attached.
    assert_eq!(duplicate.snippets.len(), 2);
    assert!(duplicate
        .helps
        .iter()
        .any(|h| h.contains("public imports")));
}

#[test]
fn binary_literal_suggests_hex() {
    let session = session_with(&[(
        "m.proto",
        "syntax = \"proto2\";\nmessage M { optional int32 x = 1 [default = 0b1010]; }",
    )]);
    let result = session.compile(&["m.proto"]);
    let unsupported = result
        .diagnostics
        .iter()
        .find(|d| d.message.contains("unsupported base for integer literal"))
        .expect("unsupported-base diagnostic");
    assert_eq!(unsupported.snippets[0].edits[0].replace, "0xa");
}

#[test]
fn editions_forbids_optional() {
    let session = session_with(&[(
        "m.proto",
        "edition = \"2023\";\nmessage M { optional int32 x = 1; }",
    )]);
    let result = session.compile(&["m.proto"]);
    let optional = result
        .diagnostics
        .iter()
        .find(|d| d.message.contains("`optional` is not allowed in editions"))
        .expect("optional-in-editions diagnostic");
    // A delete suggestion and the feature pointer.
    assert!(optional.snippets[0].edits[0].replace.is_empty());
    assert!(optional
        .helps
        .iter()
        .any(|h| h.contains("features.field_presence")));
}

#[test]
fn type_resolution_walks_scopes_and_imports() {
    let session = session_with(&[
        (
            "dep.proto",
            "syntax = \"proto3\";\npackage dep;\nmessage Shared { int32 x = 1; }",
        ),
        (
            "main.proto",
            "syntax = \"proto3\";\npackage app;\nimport \"dep.proto\";\nmessage Outer {\n  message Inner { int32 y = 1; }\n  Inner inner = 1;\n  dep.Shared shared = 2;\n}",
        ),
    ]);
    let result = session.compile(&["main.proto"]);
    assert!(!result.has_errors(), "{:#?}", result.diagnostics);

    let file = result.files[0].as_ref().unwrap();
    let outer = file.type_def(file.types[0]);
    let inner_field = file.member(outer.members[0]);
    let shared_field = file.member(outer.members[1]);

    match inner_field.elem {
        Some(ElemType::Named(reference)) => {
            let target = file.resolve_type_ref(reference).unwrap();
            assert_eq!(&*session.interner().resolve(target.fqn), "app.Outer.Inner");
            assert!(reference.is_local());
        }
        other => panic!("expected resolved inner type, got {other:?}"),
    }
    match shared_field.elem {
        Some(ElemType::Named(reference)) => {
            let target = file.resolve_type_ref(reference).unwrap();
            assert_eq!(&*session.interner().resolve(target.fqn), "dep.Shared");
            assert!(!reference.is_local());
        }
        other => panic!("expected resolved imported type, got {other:?}"),
    }
}

#[test]
fn unknown_type_and_not_a_type() {
    let session = session_with(&[(
        "m.proto",
        "syntax = \"proto3\";\nmessage M { Missing a = 1; M.b b = 2; int32 c = 3; }",
    )]);
    let result = session.compile(&["m.proto"]);
    let messages: Vec<&str> = result
        .diagnostics
        .iter()
        .map(|d| d.message.as_str())
        .collect();
    assert!(messages.iter().any(|m| m.contains("unknown type `Missing`")));
    assert!(messages
        .iter()
        .any(|m| m.contains("cannot use field `M.b` as a type")));
}

#[test]
fn missing_file_fails() {
    let session = session_with(&[]);
    let result = session.compile(&["nope.proto"]);
    assert!(result.failed);
    assert!(result.files[0].is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("file not found")));
}

#[test]
fn unused_import_warns() {
    let session = session_with(&[
        ("dep.proto", "syntax = \"proto3\";\nmessage Unused {}"),
        (
            "main.proto",
            "syntax = \"proto3\";\nimport \"dep.proto\";\nmessage M { int32 x = 1; }",
        ),
    ]);
    let result = session.compile(&["main.proto"]);
    let warning = result
        .diagnostics
        .iter()
        .find(|d| d.message.contains("`dep.proto` is unused"))
        .expect("unused-import warning");
    assert_eq!(warning.severity, Severity::Warning);
}

#[test]
fn import_cycle_is_refused() {
    let session = session_with(&[
        ("a.proto", "syntax = \"proto3\";\nimport \"b.proto\";"),
        ("b.proto", "syntax = \"proto3\";\nimport \"a.proto\";"),
    ]);
    let result = session.compile(&["a.proto"]);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("import cycle")));
}

#[test]
fn duplicate_field_numbers_and_enum_rules() {
    let session = session_with(&[(
        "m.proto",
        "syntax = \"proto3\";\nmessage M { int32 a = 1; int32 b = 1; }\nenum E { FIRST = 1; }",
    )]);
    let result = session.compile(&["m.proto"]);
    let messages: Vec<&str> = result
        .diagnostics
        .iter()
        .map(|d| d.message.as_str())
        .collect();
    assert!(messages
        .iter()
        .any(|m| m.contains("field number 1 is already used by `a`")));
    assert!(messages
        .iter()
        .any(|m| m.contains("first value of an open enum must be zero")));
}

#[test]
fn field_in_reserved_range_is_rejected() {
    let session = session_with(&[(
        "m.proto",
        "syntax = \"proto3\";\nmessage M { reserved 5 to 10; int32 x = 7; }",
    )]);
    let result = session.compile(&["m.proto"]);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("field number 7 is reserved")));
}

#[test]
fn second_compile_is_memoized() {
    let session = session_with(&[(
        "m.proto",
        "syntax = \"proto3\";\nmessage M { string s = 1; }",
    )]);
    let first = session.compile(&["m.proto"]);
    assert!(first.changed);
    let second = session.compile(&["m.proto"]);
    assert!(!second.changed);
    assert!(!second.has_errors());
    assert!(second.files[0].is_some());
}

#[test]
fn invalidation_recomputes_dependents() {
    let session = session_with(&[
        (
            "dep.proto",
            "syntax = \"proto3\";\npackage dep;\nmessage D { int32 x = 1; }",
        ),
        (
            "main.proto",
            "syntax = \"proto3\";\nimport \"dep.proto\";\nmessage M { dep.D d = 1; }",
        ),
    ]);
    let first = session.compile(&["main.proto"]);
    assert!(first.changed);
    assert!(!session.compile(&["main.proto"]).changed);

    // Invalidating the leaf recomputes everything above it.
    session.invalidate(&["dep.proto"]);
    let after = session.compile(&["main.proto"]);
    assert!(after.changed);
    assert!(!after.has_errors());
}

#[test]
fn cancelled_compile_leaves_cache_reusable() {
    let session = session_with(&[(
        "m.proto",
        "syntax = \"proto3\";\nmessage M { string s = 1; }",
    )]);
    let token = CancelToken::new();
    token.cancel();
    let cancelled = session.compile_with_token(&["m.proto"], &token);
    assert!(!cancelled.changed);
    assert!(cancelled.files[0].is_none());

    let fresh = session.compile(&["m.proto"]);
    assert!(fresh.changed);
    assert!(!fresh.has_errors());
    assert!(fresh.files[0].is_some());
}

#[test]
fn weak_and_public_import_classification() {
    let session = session_with(&[
        ("a.proto", "syntax = \"proto3\";\npackage a;\nmessage A {}"),
        (
            "b.proto",
            "syntax = \"proto3\";\npackage b;\nimport public \"a.proto\";\nmessage B { a.A a = 1; }",
        ),
        (
            "c.proto",
            "syntax = \"proto3\";\nimport \"b.proto\";\nmessage C { a.A a = 1; b.B b = 2; }",
        ),
    ]);
    let result = session.compile(&["c.proto"]);
    // `a.A` is visible through b's public import chain.
    assert!(!result.has_errors(), "{:#?}", result.diagnostics);

    let file = result.files[0].as_ref().unwrap();
    use protolith::ir::ImportKind;
    let kinds: Vec<ImportKind> = file.imports.iter().map(|i| i.kind).collect();
    assert_eq!(kinds[0], ImportKind::Regular);
    assert!(kinds.contains(&ImportKind::TransitivePublic));
}
