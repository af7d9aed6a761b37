//! Tokens, token trees, and cursors.
//!
//! The lexer produces a flat [`TokenStream`] in source order. Matched
//! delimiter pairs are *fused* after emission: the opener stores the
//! positive distance to its closer and the closer stores the negation, so
//! the flat stream doubles as a tree without any extra allocation. A
//! [`Cursor`] walking the stream steps over a fused group in one `next`
//! call and can descend into it with [`Cursor::children`].

use bitflags::bitflags;
use bytes::Bytes;
use rustc_hash::FxHashMap;

use crate::span::Span;

/// Lexeme classification.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum TokenKind {
    Space,
    Comment,
    Ident,
    Str,
    Number,
    Punct,
    Unrecognized,
}

impl TokenKind {
    /// Whitespace, comments, and already-diagnosed unrecognized tokens
    /// are skipped by parsing cursors.
    pub fn is_skippable(self) -> bool {
        matches!(
            self,
            TokenKind::Space | TokenKind::Comment | TokenKind::Unrecognized
        )
    }
}

bitflags! {
    /// Literal metadata recorded by the lexer.
    #[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
    pub struct TokenFlags: u16 {
        /// The literal contained `_` separators.
        const SEPARATORS = 1 << 0;
        const BASE_HEX = 1 << 1;
        const BASE_OCT = 1 << 2;
        const BASE_BIN = 1 << 3;
        /// `0777`-style octal without an `0o` prefix.
        const LEGACY_OCT = 1 << 4;
        const FLOAT = 1 << 5;
        /// String carried a quote prefix such as `r` or `rb`.
        const PREFIXED = 1 << 6;
        /// Fused string segments disagreed on their quote prefix.
        const MIXED_PREFIX = 1 << 7;
        /// The token was recovered from malformed input.
        const CORRUPT = 1 << 8;
    }
}

/// One token. Sixteen bytes; literal payloads live in a side table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub flags: TokenFlags,
    /// Tree offset: `k > 0` on an opener whose closer sits `k` tokens
    /// later, `-k` on that closer, `0` on leaves.
    pub fuse: i32,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Token {
        Token {
            kind,
            flags: TokenFlags::empty(),
            fuse: 0,
            span,
        }
    }

    pub fn is_group_open(&self) -> bool {
        self.fuse > 0
    }
}

/// A dense token id within one file's stream. Zero denotes absence.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct TokenId(u32);

impl TokenId {
    pub const NONE: TokenId = TokenId(0);

    pub fn from_index(index: u32) -> TokenId {
        TokenId(index + 1)
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// The stream index. Panics on `NONE`.
    pub fn index(self) -> u32 {
        assert!(self.0 != 0, "dereferenced absent token id");
        self.0 - 1
    }
}

/// Interpreted literal contents.
#[derive(Clone, Debug, PartialEq)]
pub enum LitValue {
    Int(u64),
    /// Digits of an integer too large for `u64`, kept verbatim so later
    /// stages can report the precise value.
    Big(Box<str>),
    Float(f64),
    /// Decoded string contents. Protobuf strings are byte strings; UTF-8
    /// is not guaranteed after escape processing.
    Bytes(Bytes),
}

impl LitValue {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            LitValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// A token produced by a rewrite rather than by lexing: it has text but
/// no source offsets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticToken {
    pub kind: TokenKind,
    pub text: String,
}

/// The complete lexed form of one file.
#[derive(Debug, Default)]
pub struct TokenStream {
    tokens: Vec<Token>,
    literals: FxHashMap<u32, LitValue>,
    synthetics: Vec<SyntheticToken>,
    /// Total text length; the anchor for end-of-file spans.
    eof: u32,
}

impl TokenStream {
    pub fn new(eof: u32) -> TokenStream {
        TokenStream {
            eof,
            ..TokenStream::default()
        }
    }

    pub fn len(&self) -> u32 {
        self.tokens.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn eof_span(&self) -> Span {
        Span::empty(self.eof)
    }

    pub fn push(&mut self, token: Token) -> TokenId {
        let id = TokenId::from_index(self.tokens.len() as u32);
        self.tokens.push(token);
        id
    }

    pub fn push_literal(&mut self, id: TokenId, value: LitValue) {
        self.literals.insert(id.index(), value);
    }

    pub fn push_synthetic(&mut self, token: SyntheticToken) -> u32 {
        self.synthetics.push(token);
        self.synthetics.len() as u32 - 1
    }

    pub fn get(&self, id: TokenId) -> &Token {
        &self.tokens[id.index() as usize]
    }

    pub(crate) fn get_mut(&mut self, id: TokenId) -> &mut Token {
        &mut self.tokens[id.index() as usize]
    }

    pub fn literal(&self, id: TokenId) -> Option<&LitValue> {
        self.literals.get(&id.index())
    }

    pub fn synthetic(&self, index: u32) -> &SyntheticToken {
        &self.synthetics[index as usize]
    }

    /// All tokens in source order.
    pub fn iter(&self) -> impl Iterator<Item = (TokenId, &Token)> {
        self.tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (TokenId::from_index(i as u32), t))
    }

    /// The source text of a natural token.
    pub fn text_of<'a>(&self, id: TokenId, source: &'a str) -> &'a str {
        self.get(id).span.text(source)
    }
}

/// A saved cursor position for backtracking.
#[derive(Copy, Clone, Debug)]
pub struct Mark(u32);

/// Which stream a cursor walks.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum CursorKind {
    Natural,
    Synthetic,
}

/// A bounded walk over a token stream or one fused group within it.
#[derive(Clone)]
pub struct Cursor<'a> {
    stream: &'a TokenStream,
    kind: CursorKind,
    pos: u32,
    end: u32,
}

impl<'a> Cursor<'a> {
    /// A cursor over the whole natural stream.
    pub fn over(stream: &'a TokenStream) -> Cursor<'a> {
        Cursor {
            stream,
            kind: CursorKind::Natural,
            pos: 0,
            end: stream.len(),
        }
    }

    /// A cursor over the synthetic stream.
    pub fn synthetic(stream: &'a TokenStream) -> Cursor<'a> {
        Cursor {
            stream,
            kind: CursorKind::Synthetic,
            pos: 0,
            end: stream.synthetics.len() as u32,
        }
    }

    /// A cursor over the children of the fused group opened at `open`.
    ///
    /// Panics if `open` is not a group opener.
    pub fn children(stream: &'a TokenStream, open: TokenId) -> Cursor<'a> {
        let token = stream.get(open);
        assert!(token.fuse > 0, "cursor into a non-group token");
        Cursor {
            stream,
            kind: CursorKind::Natural,
            pos: open.index() + 1,
            end: open.index() + token.fuse as u32,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.kind == CursorKind::Synthetic
    }

    pub fn stream(&self) -> &'a TokenStream {
        self.stream
    }

    pub fn mark(&self) -> Mark {
        Mark(self.pos)
    }

    pub fn rewind(&mut self, mark: Mark) {
        self.pos = mark.0;
    }

    /// The absolute stream index of the next raw token.
    pub fn offset(&self) -> u32 {
        self.pos
    }

    /// True when no non-skippable tokens remain.
    pub fn at_end(&self) -> bool {
        self.clone().peek().is_none()
    }

    /// The span just past the cursor's bound, for diagnostics anchored at
    /// "here".
    pub fn end_span(&self) -> Span {
        if self.end == self.stream.len() {
            self.stream.eof_span()
        } else {
            Span::empty(self.stream.tokens[self.end as usize].span.start)
        }
    }

    /// Next raw token (including whitespace and comments), consuming it.
    /// A fused group is consumed whole; its opener is returned.
    pub fn next_raw(&mut self) -> Option<(TokenId, &'a Token)> {
        debug_assert_eq!(self.kind, CursorKind::Natural);
        if self.pos >= self.end {
            return None;
        }
        let id = TokenId::from_index(self.pos);
        let token = &self.stream.tokens[self.pos as usize];
        self.pos += if token.fuse > 0 {
            token.fuse as u32 + 1
        } else {
            1
        };
        Some((id, token))
    }

    /// Next non-skippable token, consuming it and anything skippable
    /// before it.
    pub fn next(&mut self) -> Option<(TokenId, &'a Token)> {
        loop {
            let (id, token) = self.next_raw()?;
            if !token.kind.is_skippable() {
                return Some((id, token));
            }
        }
    }

    /// Next non-skippable token without consuming anything.
    pub fn peek(&self) -> Option<(TokenId, &'a Token)> {
        let mut probe = self.clone();
        probe.next()
    }

    /// Source text of the next non-skippable token.
    pub fn peek_text(&self, source: &'a str) -> Option<&'a str> {
        self.peek().map(|(_, t)| t.span.text(source))
    }

    /// True if the next non-skippable token's text equals `text`.
    pub fn at(&self, source: &str, text: &str) -> bool {
        self.peek_text(source) == Some(text)
    }

    /// Next synthetic token.
    pub fn next_synthetic(&mut self) -> Option<&'a SyntheticToken> {
        debug_assert_eq!(self.kind, CursorKind::Synthetic);
        if self.pos >= self.end {
            return None;
        }
        let token = &self.stream.synthetics[self.pos as usize];
        self.pos += 1;
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_of(kinds: &[(TokenKind, u32, u32)]) -> TokenStream {
        let mut stream = TokenStream::new(kinds.last().map_or(0, |k| k.2));
        for &(kind, start, end) in kinds {
            stream.push(Token::new(kind, Span::new(start, end)));
        }
        stream
    }

    #[test]
    fn cursor_skips_skippables() {
        let stream = stream_of(&[
            (TokenKind::Space, 0, 1),
            (TokenKind::Ident, 1, 4),
            (TokenKind::Comment, 4, 10),
            (TokenKind::Punct, 10, 11),
        ]);
        let mut cursor = Cursor::over(&stream);
        let (_, first) = cursor.next().unwrap();
        assert_eq!(first.kind, TokenKind::Ident);
        let (_, second) = cursor.next().unwrap();
        assert_eq!(second.kind, TokenKind::Punct);
        assert!(cursor.next().is_none());
    }

    #[test]
    fn cursor_steps_over_groups() {
        // ident ( ident ) ident
        let mut stream = stream_of(&[
            (TokenKind::Ident, 0, 1),
            (TokenKind::Punct, 1, 2),
            (TokenKind::Ident, 2, 3),
            (TokenKind::Punct, 3, 4),
            (TokenKind::Ident, 4, 5),
        ]);
        stream.get_mut(TokenId::from_index(1)).fuse = 2;
        stream.get_mut(TokenId::from_index(3)).fuse = -2;

        let mut cursor = Cursor::over(&stream);
        cursor.next().unwrap();
        let (open, token) = cursor.next().unwrap();
        assert!(token.is_group_open());
        let (_, tail) = cursor.next().unwrap();
        assert_eq!(tail.span, Span::new(4, 5));

        let mut inner = Cursor::children(&stream, open);
        let (_, child) = inner.next().unwrap();
        assert_eq!(child.span, Span::new(2, 3));
        assert!(inner.next().is_none());
    }

    #[test]
    fn mark_rewind() {
        let stream = stream_of(&[(TokenKind::Ident, 0, 1), (TokenKind::Ident, 1, 2)]);
        let mut cursor = Cursor::over(&stream);
        let mark = cursor.mark();
        cursor.next().unwrap();
        cursor.next().unwrap();
        assert!(cursor.at_end());
        cursor.rewind(mark);
        assert_eq!(cursor.next().unwrap().1.span, Span::new(0, 1));
    }

    #[test]
    fn synthetic_stream_is_distinct() {
        let mut stream = TokenStream::new(0);
        stream.push_synthetic(SyntheticToken {
            kind: TokenKind::Punct,
            text: ";".to_string(),
        });
        let mut cursor = Cursor::synthetic(&stream);
        assert!(cursor.is_synthetic());
        assert_eq!(cursor.next_synthetic().unwrap().text, ";");
        assert!(cursor.next_synthetic().is_none());
    }
}
