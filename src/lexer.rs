//! Tokenization: byte stream in, token tree out.
//!
//! Lexing runs in three steps. A prelude pass rejects inputs no lexer
//! should touch (oversized files, UTF-16, binary data). The main pass
//! walks runes and classifies each token by its leading rune, with the
//! number and string sub-lexers in [`number`] and [`string`]. A final
//! fusion pass links matched delimiter pairs into the token tree and
//! diagnoses the unmatched ones.

mod number;
mod string;

use std::sync::Arc;

use unicode_xid::UnicodeXID;

use crate::report::{Diagnostic, Report};
use crate::span::Span;
use crate::token::{Token, TokenFlags, TokenId, TokenKind, TokenStream};

/// Files of 2 GiB or more are refused outright; spans are 32-bit.
const MAX_FILE_LEN: usize = 2 * 1024 * 1024 * 1024;

/// Fraction of invalid UTF-8 bytes above which a file is presumed binary.
const BINARY_THRESHOLD: f64 = 0.20;

/// The result of lexing one file: the validated text and its tokens.
///
/// When the prelude rejects the input, `text` is empty and the stream has
/// no tokens; the rejection reason is in the report.
pub struct Lexed {
    pub text: Arc<str>,
    pub stream: TokenStream,
}

/// Tokenizes `bytes`, accumulating diagnostics into `report`.
pub fn lex(bytes: &[u8], report: &Report) -> Lexed {
    let text = match prelude(bytes, report) {
        Some(text) => text,
        None => {
            return Lexed {
                text: Arc::from(""),
                stream: TokenStream::new(0),
            }
        }
    };

    let mut lexer = Lexer {
        text,
        pos: 0,
        stream: TokenStream::new(text.len() as u32),
        report,
    };
    lexer.run();
    lexer.fuse_delimiters();
    Lexed {
        text: Arc::from(text),
        stream: lexer.stream,
    }
}

/// Pre-tokenization sanity checks from §intake: size, UTF-16, binary
/// content, stray invalid bytes.
fn prelude<'a>(bytes: &'a [u8], report: &Report) -> Option<&'a str> {
    if bytes.len() >= MAX_FILE_LEN {
        report.push(Diagnostic::error(format!(
            "file is too large ({} bytes); the limit is 2 GiB",
            bytes.len()
        )));
        return None;
    }

    let utf16_bom = bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF]);
    let leading_nul = bytes.iter().take(2).any(|&b| b == 0);
    if utf16_bom || (bytes.len() >= 2 && leading_nul) {
        report.push(
            Diagnostic::error("file appears to be UTF-16 encoded")
                .help("re-encode the file as UTF-8"),
        );
        return None;
    }

    // Count invalid bytes without allocating: std's validator reports
    // error offsets, which we use to hop over each bad run.
    let mut invalid = 0usize;
    let mut first_bad = None;
    let mut rest = bytes;
    let mut offset = 0usize;
    loop {
        match std::str::from_utf8(rest) {
            Ok(_) => break,
            Err(err) => {
                let valid = err.valid_up_to();
                let bad = err.error_len().unwrap_or(rest.len() - valid);
                if first_bad.is_none() {
                    first_bad = Some(offset + valid);
                }
                invalid += bad;
                offset += valid + bad;
                rest = &rest[valid + bad..];
            }
        }
    }

    if invalid > 0 {
        if !bytes.is_empty() && invalid as f64 / bytes.len() as f64 > BINARY_THRESHOLD {
            report.push(Diagnostic::error(
                "file does not appear to be text; most of it is not valid UTF-8",
            ));
        } else {
            let at = first_bad.unwrap_or(0);
            report.push(
                Diagnostic::error(format!("invalid UTF-8 byte at offset {at}"))
                    .note("Protobuf source files must be UTF-8 encoded"),
            );
        }
        return None;
    }

    // Already validated above.
    Some(std::str::from_utf8(bytes).ok()?)
}

pub(crate) struct Lexer<'a> {
    text: &'a str,
    pos: usize,
    stream: TokenStream,
    report: &'a Report,
}

impl<'a> Lexer<'a> {
    fn run(&mut self) {
        if self.text.starts_with('\u{FEFF}') {
            // A leading BOM is stripped without comment; it still owns its
            // bytes in the stream so tokenization round-trips.
            self.pos = '\u{FEFF}'.len_utf8();
            self.emit(TokenKind::Unrecognized, 0);
        }

        while let Some(c) = self.first() {
            let start = self.pos;
            match c {
                c if is_pattern_whitespace(c) => self.lex_whitespace(start),
                '/' if self.second() == Some('/') => self.lex_line_comment(start),
                '/' if self.second() == Some('*') => self.lex_block_comment(start),
                '*' if self.second() == Some('/') => {
                    self.bump();
                    self.bump();
                    self.emit(TokenKind::Unrecognized, start);
                    self.report.push(
                        Diagnostic::error("`*/` outside of a block comment")
                            .with_span(self.span_from(start), "no comment is open here"),
                    );
                }
                '"' | '\'' => self.lex_string(start, ""),
                '.' if self.second().is_some_and(|c| c.is_ascii_digit()) => {
                    self.lex_number(start)
                }
                c if c.is_ascii_digit() => self.lex_number(start),
                '_' => self.lex_ident(start),
                c if c.is_xid_start() => self.lex_ident(start),
                c if is_punct_start(c) => self.lex_punct(start, c),
                c => {
                    self.bump();
                    self.emit(TokenKind::Unrecognized, start);
                    self.report.push(
                        Diagnostic::error(format!("unrecognized character `{}`", c.escape_debug()))
                            .with_span(self.span_from(start), "cannot start any token"),
                    );
                }
            }
        }
    }

    // Rune helpers.

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn first(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn second(&self) -> Option<char> {
        let mut chars = self.rest().chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.first()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.first() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_while(&mut self, mut pred: impl FnMut(char) -> bool) {
        while let Some(c) = self.first() {
            if !pred(c) {
                break;
            }
            self.bump();
        }
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start as u32, self.pos as u32)
    }

    fn emit(&mut self, kind: TokenKind, start: usize) -> TokenId {
        self.stream.push(Token::new(kind, self.span_from(start)))
    }

    fn emit_flagged(&mut self, kind: TokenKind, start: usize, flags: TokenFlags) -> TokenId {
        let id = self.emit(kind, start);
        self.stream.get_mut(id).flags = flags;
        id
    }

    // Simple token classes.

    fn lex_whitespace(&mut self, start: usize) {
        self.eat_while(is_pattern_whitespace);
        self.emit(TokenKind::Space, start);
    }

    fn lex_line_comment(&mut self, start: usize) {
        self.eat_while(|c| c != '\n');
        self.emit(TokenKind::Comment, start);
    }

    fn lex_block_comment(&mut self, start: usize) {
        self.bump();
        self.bump();
        let mut closed = false;
        while let Some(c) = self.bump() {
            if c == '*' && self.eat('/') {
                closed = true;
                break;
            }
        }
        self.emit(TokenKind::Comment, start);
        if !closed {
            self.report.push(
                Diagnostic::error("unterminated block comment")
                    .with_span(Span::new(start as u32, start as u32 + 2), "opened here")
                    .help("add a closing `*/`"),
            );
        }
    }

    fn lex_punct(&mut self, start: usize, c: char) {
        self.bump();
        // Two-rune operators; everything else is a single rune.
        let pair = matches!(
            (c, self.first()),
            ('&', Some('&'))
                | ('|', Some('|'))
                | ('=', Some('='))
                | ('!', Some('='))
                | ('<', Some('='))
                | ('>', Some('='))
        );
        if pair {
            self.bump();
        }
        self.emit(TokenKind::Punct, start);
    }

    fn lex_ident(&mut self, start: usize) {
        self.bump();
        self.eat_while(|c| c == '_' || c.is_xid_continue());
        let text = &self.text[start..self.pos];

        // Short string prefixes re-enter string lexing.
        if matches!(text, "r" | "b" | "rb" | "br") && matches!(self.first(), Some('"' | '\'')) {
            self.lex_string(start, text);
            return;
        }

        let id = self.emit(TokenKind::Ident, start);
        if !text.is_ascii() {
            let span = self.stream.get(id).span;
            self.report.push(
                Diagnostic::error("non-ASCII identifier")
                    .with_span(span, "identifiers must be ASCII")
                    .note("Protobuf identifiers match `[A-Za-z_][A-Za-z0-9_]*`"),
            );
        }
    }

    /// Links matched delimiters into the token tree and diagnoses the
    /// rest. Angle brackets double as comparison operators, so an
    /// unmatched `<` or `>` silently stays a leaf.
    fn fuse_delimiters(&mut self) {
        let mut opens: Vec<(u32, char)> = Vec::new();
        let mut fixups: Vec<(u32, u32)> = Vec::new();
        let mut index = 0u32;

        while index < self.stream.len() {
            let id = TokenId::from_index(index);
            let token = *self.stream.get(id);
            index += 1;
            if token.kind != TokenKind::Punct || token.span.len() != 1 {
                continue;
            }
            let c = match token.span.text(self.text).chars().next() {
                Some(c) => c,
                None => continue,
            };
            match c {
                '(' | '[' | '{' | '<' => opens.push((id.index(), c)),
                ')' | ']' | '}' | '>' => {
                    self.fuse_close(&mut opens, &mut fixups, id.index(), c)
                }
                _ => {}
            }
        }

        // Whatever is still open gets a diagnostic and a synthetic
        // zero-length close at EOF, innermost first so nesting stays
        // well-formed.
        while let Some((open_index, open)) = opens.pop() {
            if open == '<' {
                continue;
            }
            let close = closing_of(open);
            let open_span = self.stream.get(TokenId::from_index(open_index)).span;
            self.report.push(
                Diagnostic::error(format!("encountered unmatched `{open}`"))
                    .with_span(open_span, "this delimiter is never closed")
                    .help(format!("add a closing `{close}`")),
            );
            let eof = self.stream.eof_span();
            let close_id = self.stream.push(Token::new(TokenKind::Punct, eof));
            fixups.push((open_index, close_id.index()));
        }

        for (open, close) in fixups {
            let offset = (close - open) as i32;
            self.stream.get_mut(TokenId::from_index(open)).fuse = offset;
            self.stream.get_mut(TokenId::from_index(close)).fuse = -offset;
        }
    }

    fn fuse_close(
        &mut self,
        opens: &mut Vec<(u32, char)>,
        fixups: &mut Vec<(u32, u32)>,
        close_index: u32,
        close: char,
    ) {
        loop {
            match opens.last().copied() {
                Some((open_index, open)) if closing_of(open) == close => {
                    opens.pop();
                    fixups.push((open_index, close_index));
                    return;
                }
                Some((open_index, open)) => {
                    // `{ [ }` style mismatch: if the closer matches an
                    // enclosing opener, the top opener is the unterminated
                    // one. Angle openers are demoted without comment.
                    let encloses = opens
                        .iter()
                        .rev()
                        .skip(1)
                        .any(|&(_, o)| closing_of(o) == close);
                    if !encloses {
                        if close != '>' {
                            let span = self.stream.get(TokenId::from_index(close_index)).span;
                            self.report.push(
                                Diagnostic::error(format!("encountered unmatched `{close}`"))
                                    .with_span(span, "no matching opening delimiter"),
                            );
                        }
                        return;
                    }
                    opens.pop();
                    if open != '<' {
                        let open_span = self.stream.get(TokenId::from_index(open_index)).span;
                        self.report.push(
                            Diagnostic::error(format!("encountered unmatched `{open}`"))
                                .with_span(open_span, "this delimiter is never closed")
                                .help(format!(
                                    "did you forget a `{}` before this point?",
                                    closing_of(open)
                                )),
                        );
                    }
                }
                None => {
                    if close != '>' {
                        let span = self.stream.get(TokenId::from_index(close_index)).span;
                        self.report.push(
                            Diagnostic::error(format!("encountered unmatched `{close}`"))
                                .with_span(span, "no matching opening delimiter"),
                        );
                    }
                    return;
                }
            }
        }
    }
}

fn closing_of(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        '{' => '}',
        '<' => '>',
        _ => unreachable!("not an opening delimiter"),
    }
}

/// Unicode `Pattern_White_Space`, the whitespace class used for token
/// separation.
fn is_pattern_whitespace(c: char) -> bool {
    matches!(
        c,
        '\u{0009}'..='\u{000D}'
            | '\u{0020}'
            | '\u{0085}'
            | '\u{200E}'
            | '\u{200F}'
            | '\u{2028}'
            | '\u{2029}'
    )
}

fn is_punct_start(c: char) -> bool {
    matches!(
        c,
        ';' | ','
            | ':'
            | '+'
            | '-'
            | '*'
            | '/'
            | '%'
            | '?'
            | '<'
            | '>'
            | '='
            | '!'
            | '.'
            | '&'
            | '|'
            | '('
            | ')'
            | '['
            | ']'
            | '{'
            | '}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Cursor;

    fn lex_ok(text: &str) -> TokenStream {
        let report = Report::new();
        let lexed = lex(text.as_bytes(), &report);
        assert!(!report.has_errors(), "unexpected errors: {report:?}");
        lexed.stream
    }

    fn kinds(stream: &TokenStream) -> Vec<TokenKind> {
        stream.iter().map(|(_, t)| t.kind).collect()
    }

    #[test]
    fn roundtrip_simple() {
        let text = "syntax = \"proto3\";\nmessage M { int32 x = 1; }\n";
        let stream = lex_ok(text);
        let rebuilt: String = stream
            .iter()
            .map(|(id, _)| stream.text_of(id, text))
            .collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn classifies_leading_runes() {
        let stream = lex_ok("foo // c\n/* b */ 12 \"s\" ;");
        assert_eq!(
            kinds(&stream),
            vec![
                TokenKind::Ident,
                TokenKind::Space,
                TokenKind::Comment,
                TokenKind::Space,
                TokenKind::Comment,
                TokenKind::Space,
                TokenKind::Number,
                TokenKind::Space,
                TokenKind::Str,
                TokenKind::Space,
                TokenKind::Punct,
            ]
        );
    }

    #[test]
    fn fuses_matched_delimiters() {
        let text = "{ ( ) [ ] }";
        let stream = lex_ok(text);
        let braces: Vec<(u32, i32)> = stream
            .iter()
            .filter(|(_, t)| t.fuse != 0)
            .map(|(id, t)| (id.index(), t.fuse))
            .collect();
        for &(index, fuse) in &braces {
            let other = stream.get(TokenId::from_index((index as i32 + fuse) as u32));
            assert_eq!(other.fuse, -fuse);
        }
        // Outer braces wrap everything.
        let open = stream.iter().find(|(_, t)| t.fuse > 0).unwrap();
        assert_eq!(open.1.fuse, 10);
    }

    #[test]
    fn unmatched_open_gets_synthetic_close() {
        let text = "message M { int32 x = 1;";
        let report = Report::new();
        let lexed = lex(text.as_bytes(), &report);
        let diags = report.to_vec();
        assert!(diags.iter().any(|d| d.message.contains("unmatched `{`")));
        // The synthetic close is a zero-length token at EOF fused to the
        // brace.
        let (close_id, close) = lexed.stream.iter().last().unwrap();
        assert!(close.span.is_empty());
        assert!(close.fuse < 0);
        let open = lexed.stream.get(TokenId::from_index(
            (close_id.index() as i32 + close.fuse) as u32,
        ));
        assert_eq!(open.span.text(text), "{");
    }

    #[test]
    fn mismatched_pair_heuristic() {
        let report = Report::new();
        lex("{ [ } ]".as_bytes(), &report);
        let diags = report.to_vec();
        assert!(diags
            .iter()
            .any(|d| d.message.contains("unmatched `[`")), "{diags:?}");
    }

    #[test]
    fn lone_angles_are_silent() {
        lex_ok("a < b ; c > d");
    }

    #[test]
    fn utf16_is_rejected() {
        let report = Report::new();
        let lexed = lex(&[0xFF, 0xFE, 0x41, 0x00], &report);
        assert!(lexed.stream.is_empty());
        assert!(report.to_vec()[0].message.contains("UTF-16"));
    }

    #[test]
    fn mostly_binary_is_rejected() {
        let report = Report::new();
        let bytes: Vec<u8> = (0..100).map(|i| if i % 2 == 0 { 0xC0 } else { b'a' }).collect();
        lex(&bytes, &report);
        assert!(report.to_vec()[0].message.contains("not appear to be text"));
    }

    #[test]
    fn sparse_invalid_byte_is_pinpointed() {
        let report = Report::new();
        let mut bytes = b"syntax = \"proto3\"; // a perfectly normal file".to_vec();
        bytes.push(0xC0);
        lex(&bytes, &report);
        let message = &report.to_vec()[0].message;
        assert!(message.contains("invalid UTF-8 byte at offset 45"), "{message}");
    }

    #[test]
    fn bom_is_stripped_into_a_token() {
        let text = "\u{FEFF}message";
        let stream = lex_ok(text);
        let (first_id, first) = stream.iter().next().unwrap();
        assert_eq!(first.kind, TokenKind::Unrecognized);
        assert_eq!(stream.text_of(first_id, text), "\u{FEFF}");
        let mut cursor = Cursor::over(&stream);
        assert_eq!(cursor.next().unwrap().1.kind, TokenKind::Ident);
    }

    #[test]
    fn stray_close_comment_is_diagnosed() {
        let report = Report::new();
        lex("a */ b".as_bytes(), &report);
        assert!(report.to_vec()[0].message.contains("`*/`"));
    }
}
