//! `SourceCodeInfo` synthesis: spans, paths, and comment attribution.
//!
//! Comments attach to tokens by position: a contiguous run of comments
//! immediately above a token, with no blank line in between, is its
//! *leading* comment; a comment beginning on the same line the token
//! ends on is its *trailing* comment; earlier runs separated by blank
//! lines are *detached* comments.

use protolith::context::FileContext;
use protolith::span::Span;
use protolith::token::TokenKind;

/// Comments attributed to one source element.
#[derive(Debug, Default, Clone)]
pub struct Comments {
    pub leading_detached: Vec<String>,
    pub leading: Option<String>,
    pub trailing: Option<String>,
}

/// Precomputed comment attribution for one file.
pub struct CommentMap {
    /// `(token start offset, comments-before)` for every non-trivia
    /// token that had any.
    leading: Vec<(u32, Comments)>,
    /// `(token end offset, trailing text)`.
    trailing: Vec<(u32, String)>,
}

impl CommentMap {
    pub fn build(cx: &FileContext) -> CommentMap {
        let text = cx.text();
        let mut leading = Vec::new();
        let mut trailing = Vec::new();

        // Comment runs accumulated since the last non-trivia token,
        // split whenever whitespace carries a blank line.
        let mut runs: Vec<Vec<Span>> = Vec::new();
        let mut open_run: Vec<Span> = Vec::new();
        let mut previous_end: Option<u32> = None;

        for (_, token) in cx.stream().iter() {
            match token.kind {
                TokenKind::Comment => {
                    // A comment on the same line as the previous token's
                    // end trails that token.
                    if let Some(end) = previous_end {
                        if cx.line_col(end).0 == cx.line_col(token.span.start).0 {
                            trailing.push((end, comment_text(token.span, text)));
                            previous_end = None;
                            continue;
                        }
                    }
                    open_run.push(token.span);
                }
                TokenKind::Space => {
                    let blank = token.span.text(text).matches('\n').count() >= 2;
                    if blank && !open_run.is_empty() {
                        runs.push(std::mem::take(&mut open_run));
                    }
                }
                TokenKind::Unrecognized => {}
                _ => {
                    if !open_run.is_empty() || !runs.is_empty() {
                        let mut comments = Comments::default();
                        if !open_run.is_empty() {
                            comments.leading = Some(join_run(&open_run, text));
                        }
                        comments.leading_detached =
                            runs.iter().map(|run| join_run(run, text)).collect();
                        leading.push((token.span.start, comments));
                        runs.clear();
                        open_run.clear();
                    }
                    previous_end = Some(token.span.end);
                }
            }
        }

        CommentMap { leading, trailing }
    }

    /// Comments leading the token that starts at `offset`.
    pub fn leading_at(&self, offset: u32) -> Comments {
        self.leading
            .iter()
            .find(|(at, _)| *at == offset)
            .map(|(_, comments)| comments.clone())
            .unwrap_or_default()
    }

    /// The trailing comment of the token ending at `offset`.
    pub fn trailing_at(&self, offset: u32) -> Option<String> {
        self.trailing
            .iter()
            .find(|(at, _)| *at == offset)
            .map(|(_, text)| text.clone())
    }
}

fn join_run(run: &[Span], text: &str) -> String {
    let mut out = String::new();
    for span in run {
        out.push_str(&comment_text(*span, text));
    }
    out
}

/// Strips comment markers the way protoc does: `//` plus one space, or
/// the `/* */` frame. Every line of the result ends in a newline.
fn comment_text(span: Span, text: &str) -> String {
    let raw = span.text(text);
    if let Some(line) = raw.strip_prefix("//") {
        let line = line.strip_prefix(' ').unwrap_or(line);
        let mut out = line.to_string();
        out.push('\n');
        return out;
    }
    let body = raw
        .strip_prefix("/*")
        .map(|b| b.strip_suffix("*/").unwrap_or(b))
        .unwrap_or(raw);
    let mut out = body.trim().to_string();
    out.push('\n');
    out
}

/// A `SourceCodeInfo.Location` span: `[startLine, startCol, endLine,
/// endCol]`, collapsed to three elements when start and end share a
/// line. All zero-indexed.
pub fn location_span(cx: &FileContext, span: Span) -> Vec<i32> {
    let (start_line, start_col) = cx.line_col(span.start);
    let (end_line, end_col) = cx.line_col(span.end);
    if start_line == end_line {
        vec![start_line as i32, start_col as i32, end_col as i32]
    } else {
        vec![
            start_line as i32,
            start_col as i32,
            end_line as i32,
            end_col as i32,
        ]
    }
}
