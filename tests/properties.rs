//! Property-based invariants over the lexer, arenas, parser, and
//! symbol tables.

use proptest::prelude::*;

use protolith::arena::Arena;
use protolith::lexer::lex;
use protolith::parser::parse;
use protolith::report::Report;
use protolith::token::TokenId;
use protolith::{MapOpener, Session};

proptest! {
    /// Concatenating the text of every token in order reproduces the
    /// source exactly, whatever the input.
    #[test]
    fn tokenization_round_trips(text in "\\PC*") {
        let report = Report::new();
        let lexed = lex(text.as_bytes(), &report);
        let rebuilt: String = lexed
            .stream
            .iter()
            .map(|(id, _)| lexed.stream.text_of(id, &text))
            .collect();
        prop_assert_eq!(rebuilt, text);
    }

    /// Every fused opener points at a closer that points back.
    #[test]
    fn delimiter_offsets_are_symmetric(text in "[a-z0-9(){}\\[\\]<>;=,. \n\"]{0,80}") {
        let report = Report::new();
        let lexed = lex(text.as_bytes(), &report);
        for (id, token) in lexed.stream.iter() {
            if token.fuse != 0 {
                let partner_index = id.index() as i64 + token.fuse as i64;
                prop_assert!(partner_index >= 0);
                let partner = lexed.stream.get(TokenId::from_index(partner_index as u32));
                prop_assert_eq!(partner.fuse, -token.fuse);
            }
        }
    }

    /// Previously returned arena pointers keep dereferencing to the
    /// same values as the arena grows.
    #[test]
    fn arena_pointers_are_stable(values in proptest::collection::vec(any::<u64>(), 1..300)) {
        let mut arena = Arena::new();
        let mut ptrs = Vec::new();
        for (index, value) in values.iter().enumerate() {
            ptrs.push(arena.alloc(*value));
            // Everything allocated so far still reads back.
            for (ptr, expected) in ptrs.iter().zip(&values[..=index]) {
                prop_assert_eq!(arena.deref(*ptr), expected);
            }
        }
    }

    /// Sibling declarations occupy disjoint, strictly ordered spans,
    /// each contained in the file.
    #[test]
    fn sibling_spans_are_ordered_and_contained(field_count in 1usize..12) {
        let mut body = String::new();
        for i in 0..field_count {
            body.push_str(&format!("  int32 f{i} = {};\n", i + 1));
        }
        let text = format!("syntax = \"proto3\";\nmessage M {{\n{body}}}\n");

        let report = Report::new();
        let lexed = lex(text.as_bytes(), &report);
        let parsed = parse(&text, &lexed.stream, &report);

        let file_span = parsed.file.span;
        let mut previous_end = 0u32;
        for decl in &parsed.file.decls {
            let span = parsed.ast.decl_span(*decl);
            prop_assert!(span.start >= previous_end);
            prop_assert!(span.end <= file_span.end);
            previous_end = span.end;
        }

        // And the same holds one level down, inside the message body.
        let message = parsed.ast.def(parsed.file.decls[1]).unwrap();
        let message_span = parsed.ast.decl_span(parsed.file.decls[1]);
        let body = parsed.ast.body(message.body.unwrap());
        prop_assert!(message_span.contains_span(body.span));
        let mut previous_end = body.span.start;
        for decl in &body.decls {
            let span = parsed.ast.decl_span(*decl);
            prop_assert!(span.start >= previous_end);
            prop_assert!(body.span.contains_span(span));
            previous_end = span.end;
        }
    }

    /// Two sessions compiling the same source produce identical symbol
    /// tables: same FQN order, same kinds, same winners.
    #[test]
    fn symbol_tables_are_deterministic(seed in 0u32..50) {
        let text = format!(
            "syntax = \"proto3\";\npackage p{seed};\nmessage B {{ int32 x = 1; }}\nmessage A {{ B b = 1; }}\nenum E {{ E_ZERO = 0; }}\n"
        );
        let compile = || {
            let opener = MapOpener::new().add("d.proto", text.clone().into_bytes());
            let session = Session::new(Box::new(opener));
            let result = session.compile(&["d.proto"]);
            let file = result.files[0].as_ref().unwrap().clone();
            let names: Vec<(String, protolith::ir::SymbolKind)> = file
                .exported
                .iter()
                .map(|s| (session.interner().resolve(s.fqn).to_string(), s.kind))
                .collect();
            names
        };
        prop_assert_eq!(compile(), compile());
    }
}

#[test]
fn round_trip_with_bom_and_errors() {
    let text = "\u{FEFF}message M { unterminated \"string";
    let report = Report::new();
    let lexed = lex(text.as_bytes(), &report);
    let rebuilt: String = lexed
        .stream
        .iter()
        .map(|(id, _)| lexed.stream.text_of(id, text))
        .collect();
    assert_eq!(rebuilt, text);
}
