//! String literal lexing: escape decoding and implicit concatenation.
//!
//! Adjacent string literals, optionally separated by whitespace and
//! comments, fuse into a single token whose value is the concatenated
//! bytes. Escape errors diagnose and recover; the token keeps lexing so
//! one bad escape does not take the rest of the file with it.

use bytes::{BufMut, BytesMut};

use crate::report::Diagnostic;
use crate::span::Span;
use crate::token::{LitValue, TokenFlags, TokenKind};

use super::Lexer;

impl<'a> Lexer<'a> {
    pub(super) fn lex_string(&mut self, start: usize, prefix: &str) {
        let mut flags = TokenFlags::empty();
        if !prefix.is_empty() {
            flags |= TokenFlags::PREFIXED;
        }
        let first_prefix = prefix.to_string();
        let mut value = BytesMut::new();
        let mut unterminated = false;

        loop {
            // One quoted segment.
            let quote = match self.bump() {
                Some(q @ ('"' | '\'')) => q,
                _ => break,
            };
            loop {
                match self.first() {
                    None => {
                        unterminated = true;
                        flags |= TokenFlags::CORRUPT;
                        break;
                    }
                    Some(c) if c == quote => {
                        self.bump();
                        break;
                    }
                    Some('\n') => {
                        let at = self.pos as u32;
                        self.report.push(
                            Diagnostic::warning("string literal contains a literal newline")
                                .with_edit(Span::new(at, at + 1), "here", "\\n".to_string()),
                        );
                        value.put_u8(b'\n');
                        self.bump();
                    }
                    Some('\\') => self.scan_escape(&mut value, &mut flags),
                    Some(c) => {
                        let mut buf = [0u8; 4];
                        value.put_slice(c.encode_utf8(&mut buf).as_bytes());
                        self.bump();
                    }
                }
            }
            if unterminated {
                break;
            }

            // Implicit concatenation: probe past trivia for another
            // segment; rewind if there is none.
            let mark = self.pos;
            self.skip_fusion_trivia();
            match self.segment_prefix() {
                Some(next_prefix) => {
                    if next_prefix != first_prefix {
                        flags |= TokenFlags::MIXED_PREFIX;
                    }
                    if !next_prefix.is_empty() {
                        flags |= TokenFlags::PREFIXED;
                        self.pos += next_prefix.len();
                    }
                }
                None => {
                    self.pos = mark;
                    break;
                }
            }
        }

        let id = self.emit_flagged(TokenKind::Str, start, flags);
        let span = self.stream.get(id).span;
        self.stream.push_literal(id, LitValue::Bytes(value.freeze()));

        if unterminated {
            self.report.push(
                Diagnostic::error("unterminated string literal")
                    .with_span(span, "no closing quote before end of file"),
            );
        }
        if flags.contains(TokenFlags::MIXED_PREFIX) {
            // Conservative: a warning, not an error; known divergence.
            self.report.push(
                Diagnostic::warning(
                    "implicitly concatenated string literals use different quote prefixes",
                )
                .with_span(span, "mixed prefixes here"),
            );
        }
    }

    fn scan_escape(&mut self, value: &mut BytesMut, flags: &mut TokenFlags) {
        let escape_start = self.pos;
        self.bump(); // the backslash
        let span_here = |lexer: &Self| Span::new(escape_start as u32, lexer.pos as u32);

        let c = match self.bump() {
            Some(c) => c,
            None => {
                *flags |= TokenFlags::CORRUPT;
                self.report.push(
                    Diagnostic::error("truncated escape sequence")
                        .with_span(span_here(self), "file ends mid-escape"),
                );
                return;
            }
        };

        match c {
            'a' => value.put_u8(0x07),
            'b' => value.put_u8(0x08),
            'f' => value.put_u8(0x0C),
            'n' => value.put_u8(b'\n'),
            'r' => value.put_u8(b'\r'),
            't' => value.put_u8(b'\t'),
            'v' => value.put_u8(0x0B),
            '\\' => value.put_u8(b'\\'),
            '\'' => value.put_u8(b'\''),
            '"' => value.put_u8(b'"'),
            '?' => value.put_u8(b'?'),
            '0'..='7' => {
                let mut octal = c.to_digit(8).unwrap_or(0);
                let mut digits = 1;
                while digits < 3 {
                    match self.first().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            self.bump();
                            octal = octal * 8 + d;
                            digits += 1;
                        }
                        None => break,
                    }
                }
                if octal > 0xFF {
                    *flags |= TokenFlags::CORRUPT;
                    self.report.push(
                        Diagnostic::error("octal escape out of range")
                            .with_span(span_here(self), "the largest byte is `\\377`"),
                    );
                }
                value.put_u8(octal as u8);
                if octal == 0
                    && digits == 1
                    && self.first().is_some_and(|c| c.is_ascii_graphic())
                {
                    self.report.push(
                        Diagnostic::warning("NUL escape immediately before a printable character")
                            .with_span(span_here(self), "did you mean a longer octal escape?"),
                    );
                }
            }
            'x' | 'X' => {
                let mut hex = 0u32;
                let mut digits = 0;
                while digits < 2 {
                    match self.first().and_then(|c| c.to_digit(16)) {
                        Some(d) => {
                            self.bump();
                            hex = hex * 16 + d;
                            digits += 1;
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    *flags |= TokenFlags::CORRUPT;
                    self.report.push(
                        Diagnostic::error("truncated escape sequence")
                            .with_span(span_here(self), "`\\x` needs at least one hex digit"),
                    );
                } else {
                    value.put_u8(hex as u8);
                }
            }
            'u' => self.scan_unicode_escape(value, flags, escape_start, 4),
            'U' => self.scan_unicode_escape(value, flags, escape_start, 8),
            other => {
                *flags |= TokenFlags::CORRUPT;
                self.report.push(
                    Diagnostic::error(format!(
                        "unknown escape sequence `\\{}`",
                        other.escape_debug()
                    ))
                    .with_span(span_here(self), "not a recognized escape"),
                );
                let mut buf = [0u8; 4];
                value.put_slice(other.encode_utf8(&mut buf).as_bytes());
            }
        }
    }

    fn scan_unicode_escape(
        &mut self,
        value: &mut BytesMut,
        flags: &mut TokenFlags,
        escape_start: usize,
        want: usize,
    ) {
        let mut rune = 0u32;
        let mut digits = 0;
        while digits < want {
            match self.first().and_then(|c| c.to_digit(16)) {
                Some(d) => {
                    self.bump();
                    rune = rune * 16 + d;
                    digits += 1;
                }
                None => break,
            }
        }
        let span = Span::new(escape_start as u32, self.pos as u32);
        if digits != want {
            *flags |= TokenFlags::CORRUPT;
            self.report.push(
                Diagnostic::error("truncated escape sequence").with_span(
                    span,
                    format!("expected exactly {want} hex digits, found {digits}"),
                ),
            );
            return;
        }
        match char::from_u32(rune) {
            Some(c) => {
                let mut buf = [0u8; 4];
                value.put_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            None => {
                *flags |= TokenFlags::CORRUPT;
                self.report.push(
                    Diagnostic::error("escape is not a valid Unicode scalar value")
                        .with_span(span, "surrogates and values past U+10FFFF are not characters"),
                );
            }
        }
    }

    /// Advances over whitespace and comments between string segments.
    fn skip_fusion_trivia(&mut self) {
        loop {
            match self.first() {
                Some(c) if super::is_pattern_whitespace(c) => {
                    self.bump();
                }
                Some('/') if self.second() == Some('/') => {
                    self.eat_while(|c| c != '\n');
                }
                Some('/') if self.second() == Some('*') => {
                    self.bump();
                    self.bump();
                    while let Some(c) = self.bump() {
                        if c == '*' && self.eat('/') {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    /// If the cursor sits at the start of another string segment, returns
    /// its quote prefix (possibly empty). Does not consume.
    fn segment_prefix(&self) -> Option<String> {
        let rest = self.rest();
        if rest.starts_with('"') || rest.starts_with('\'') {
            return Some(String::new());
        }
        for prefix in ["rb", "br", "r", "b"] {
            if let Some(after) = rest.strip_prefix(prefix) {
                if after.starts_with('"') || after.starts_with('\'') {
                    return Some(prefix.to_string());
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::super::lex;
    use crate::report::{Report, Severity};
    use crate::token::{LitValue, TokenKind};

    fn value_of(text: &str) -> (Option<bytes::Bytes>, Vec<crate::report::Diagnostic>) {
        let report = Report::new();
        let lexed = lex(text.as_bytes(), &report);
        let token = lexed
            .stream
            .iter()
            .find(|(_, t)| t.kind == TokenKind::Str)
            .map(|(id, _)| id);
        let bytes = token.and_then(|id| match lexed.stream.literal(id) {
            Some(LitValue::Bytes(b)) => Some(b.clone()),
            _ => None,
        });
        (bytes, report.to_vec())
    }

    #[test]
    fn plain_strings() {
        let (value, diags) = value_of(r#""hello""#);
        assert_eq!(value.unwrap().as_ref(), b"hello");
        assert!(diags.is_empty());
        let (value, _) = value_of("'single'");
        assert_eq!(value.unwrap().as_ref(), b"single");
    }

    #[test]
    fn simple_escapes() {
        let (value, diags) = value_of(r#""a\tb\n\\\"\'""#);
        assert_eq!(value.unwrap().as_ref(), b"a\tb\n\\\"'");
        assert!(diags.is_empty());
    }

    #[test]
    fn octal_and_hex_escapes() {
        let (value, _) = value_of(r#""\101\x42\X43""#);
        assert_eq!(value.unwrap().as_ref(), b"ABC");
    }

    #[test]
    fn octal_out_of_range() {
        let (_, diags) = value_of(r#""\777""#);
        assert!(diags[0].message.contains("out of range"));
    }

    #[test]
    fn unicode_escapes() {
        let (value, diags) = value_of(r#""A\U0001F600""#);
        assert_eq!(value.unwrap().as_ref(), "A😀".as_bytes());
        assert!(diags.is_empty());
    }

    #[test]
    fn surrogate_is_rejected() {
        let (_, diags) = value_of(r#""\uD800""#);
        assert!(diags[0].message.contains("Unicode scalar"));
    }

    #[test]
    fn truncated_unicode() {
        let (_, diags) = value_of(r#""\u00""#);
        assert!(diags[0].message.contains("truncated"));
    }

    #[test]
    fn unknown_escape_recovers() {
        let (value, diags) = value_of(r#""a\qb""#);
        assert_eq!(value.unwrap().as_ref(), b"aqb");
        assert!(diags[0].message.contains("unknown escape sequence `\\q`"));
    }

    #[test]
    fn unterminated() {
        let (_, diags) = value_of(r#""never ends"#);
        assert!(diags[0].message.contains("unterminated string"));
    }

    #[test]
    fn adjacent_literals_fuse() {
        let text = "\"foo\" /* gap */ 'bar'";
        let report = Report::new();
        let lexed = lex(text.as_bytes(), &report);
        let strings: Vec<_> = lexed
            .stream
            .iter()
            .filter(|(_, t)| t.kind == TokenKind::Str)
            .collect();
        assert_eq!(strings.len(), 1);
        match lexed.stream.literal(strings[0].0) {
            Some(LitValue::Bytes(b)) => assert_eq!(b.as_ref(), b"foobar"),
            other => panic!("expected bytes, got {other:?}"),
        }
    }

    #[test]
    fn fusion_does_not_eat_following_tokens() {
        let text = "\"a\" ; \"b\"";
        let report = Report::new();
        let lexed = lex(text.as_bytes(), &report);
        let kinds: Vec<_> = lexed
            .stream
            .iter()
            .filter(|(_, t)| !t.kind.is_skippable())
            .map(|(_, t)| t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![TokenKind::Str, TokenKind::Punct, TokenKind::Str]
        );
    }

    #[test]
    fn mixed_prefix_warns() {
        let (value, diags) = value_of("r\"a\" \"b\"");
        assert_eq!(value.unwrap().as_ref(), b"ab");
        let warn = diags
            .iter()
            .find(|d| d.message.contains("different quote prefixes"))
            .unwrap();
        assert_eq!(warn.severity, Severity::Warning);
    }

    #[test]
    fn newline_in_string_warns() {
        let (value, diags) = value_of("\"a\nb\"");
        assert_eq!(value.unwrap().as_ref(), b"a\nb");
        assert!(diags[0].message.contains("literal newline"));
        assert_eq!(diags[0].severity, Severity::Warning);
    }
}
