//! Number literal lexing and interpretation.
//!
//! Accepted shapes: decimal and hex integers, legacy `0777` octal, floats
//! with `.` and `e` exponents, and hex floats with `p` binary exponents.
//! `0o` octal and `0b` binary are recognized but rejected with suggested
//! rewrites, since Protobuf itself accepts neither. `_` separators lex
//! but warn.

use crate::report::Diagnostic;
use crate::token::{LitValue, TokenFlags, TokenKind};

use super::Lexer;

#[derive(Copy, Clone, PartialEq)]
enum Base {
    Dec,
    Hex,
    Oct,
    Bin,
}

impl Base {
    fn radix(self) -> u32 {
        match self {
            Base::Dec => 10,
            Base::Hex => 16,
            Base::Oct => 8,
            Base::Bin => 2,
        }
    }
}

impl<'a> Lexer<'a> {
    pub(super) fn lex_number(&mut self, start: usize) {
        let mut flags = TokenFlags::empty();
        let mut float = false;
        let mut base = Base::Dec;
        let mut exponent_missing_digits = false;

        if self.first() == Some('0') {
            match self.second() {
                Some('x' | 'X') => {
                    base = Base::Hex;
                    flags |= TokenFlags::BASE_HEX;
                }
                Some('o' | 'O') => {
                    base = Base::Oct;
                    flags |= TokenFlags::BASE_OCT;
                }
                Some('b' | 'B') => {
                    base = Base::Bin;
                    flags |= TokenFlags::BASE_BIN;
                }
                _ => {}
            }
            if base != Base::Dec {
                self.bump();
                self.bump();
            }
        }

        match base {
            Base::Dec => {
                self.eat_number_digits(10, &mut flags);
                if self.first() == Some('.')
                    && self.second().map_or(true, |c| !is_path_continue(c))
                {
                    self.bump();
                    float = true;
                    self.eat_number_digits(10, &mut flags);
                }
                if matches!(self.first(), Some('e' | 'E')) && self.exponent_follows() {
                    self.bump();
                    if matches!(self.first(), Some('+' | '-')) {
                        self.bump();
                    }
                    float = true;
                    if !self.eat_number_digits(10, &mut flags) {
                        exponent_missing_digits = true;
                    }
                }
            }
            Base::Hex => {
                self.eat_number_digits(16, &mut flags);
                if self.first() == Some('.') {
                    self.bump();
                    float = true;
                    self.eat_number_digits(16, &mut flags);
                }
                if matches!(self.first(), Some('p' | 'P')) {
                    self.bump();
                    if matches!(self.first(), Some('+' | '-')) {
                        self.bump();
                    }
                    float = true;
                    if !self.eat_number_digits(10, &mut flags) {
                        exponent_missing_digits = true;
                    }
                }
            }
            Base::Oct | Base::Bin => {
                // Over-read decimal digits so `0o778` is one bad token,
                // not a number and a half.
                self.eat_number_digits(10, &mut flags);
            }
        }

        if float {
            flags |= TokenFlags::FLOAT;
        }
        let digits_end = self.pos;

        // Trailing identifier characters are an invalid suffix, captured
        // into the token for recovery.
        let mut suffix = None;
        if self
            .first()
            .is_some_and(|c| c == '_' || unicode_xid::UnicodeXID::is_xid_continue(c))
        {
            let suffix_start = self.pos;
            self.eat_while(|c| c == '_' || unicode_xid::UnicodeXID::is_xid_continue(c));
            suffix = Some(self.text[suffix_start..self.pos].to_string());
            flags |= TokenFlags::CORRUPT;
        }

        let id = self.emit_flagged(TokenKind::Number, start, flags);
        let span = self.stream.get(id).span;
        let digits = &self.text[start..digits_end];

        if let Some(suffix) = suffix {
            self.report.push(
                Diagnostic::error(format!("invalid suffix `{suffix}` on number literal"))
                    .with_span(span, "numbers cannot end in identifier characters"),
            );
        }
        if exponent_missing_digits {
            self.report.push(
                Diagnostic::error("exponent has no digits").with_span(span, "in this literal"),
            );
        }
        if flags.contains(TokenFlags::SEPARATORS) {
            self.report.push(
                Diagnostic::warning("`_` separators in number literals are not standard Protobuf")
                    .with_span(span, "written here"),
            );
        }

        let cleaned: String = digits.chars().filter(|&c| c != '_').collect();
        match base {
            Base::Bin => {
                let mut diag = Diagnostic::error("unsupported base for integer literal")
                    .with_span(span, "binary literals are not Protobuf");
                if let Ok(value) = u128::from_str_radix(&cleaned[2..], 2) {
                    diag = Diagnostic::error("unsupported base for integer literal").with_edit(
                        span,
                        "binary literals are not Protobuf",
                        format!("{value:#x}"),
                    );
                    if let Ok(value) = u64::try_from(value) {
                        self.stream.push_literal(id, LitValue::Int(value));
                    }
                }
                self.report.push(diag);
            }
            Base::Oct => {
                let rewrite = format!("0{}", &cleaned[2..]);
                self.report.push(
                    Diagnostic::error("Protobuf octal literals use a plain leading zero")
                        .with_edit(span, "`0o` is not Protobuf", rewrite),
                );
                self.interpret_int(id, &cleaned[2..], Base::Oct, span);
            }
            Base::Hex if float => self.interpret_hex_float(id, &cleaned, span),
            Base::Hex => self.interpret_int(id, &cleaned[2..], Base::Hex, span),
            Base::Dec if float => match cleaned.parse::<f64>() {
                Ok(value) => self.stream.push_literal(id, LitValue::Float(value)),
                Err(_) => self.report.push(
                    Diagnostic::error("invalid float literal").with_span(span, "cannot be parsed"),
                ),
            },
            Base::Dec => {
                if cleaned.len() > 1 && cleaned.starts_with('0') {
                    self.stream.get_mut(id).flags |= TokenFlags::LEGACY_OCT;
                    self.interpret_int(id, &cleaned[1..], Base::Oct, span);
                } else {
                    self.interpret_int(id, &cleaned, Base::Dec, span);
                }
            }
        }
    }

    fn interpret_int(&mut self, id: crate::token::TokenId, digits: &str, base: Base, span: crate::span::Span) {
        if digits.is_empty() {
            self.report.push(
                Diagnostic::error("number literal has no digits").with_span(span, "here"),
            );
            return;
        }
        if base == Base::Oct && digits.chars().any(|c| !('0'..='7').contains(&c)) {
            self.report.push(
                Diagnostic::error("invalid digit in octal literal")
                    .with_span(span, "octal digits are `0` through `7`"),
            );
            return;
        }
        match u64::from_str_radix(digits, base.radix()) {
            Ok(value) => self.stream.push_literal(id, LitValue::Int(value)),
            Err(err) if matches!(err.kind(), std::num::IntErrorKind::PosOverflow) => {
                // Arbitrary-precision fallback: keep the digits; whoever
                // consumes the value decides whether it is in range.
                self.stream
                    .push_literal(id, LitValue::Big(digits.into()));
            }
            Err(_) => self.report.push(
                Diagnostic::error("invalid number literal").with_span(span, "cannot be parsed"),
            ),
        }
    }

    /// Hex float: mantissa in base 16, binary exponent after `p`. The
    /// mantissa accumulates in `f64`; rounding at extreme exponents
    /// follows the platform, overflow saturates to infinity.
    fn interpret_hex_float(&mut self, id: crate::token::TokenId, cleaned: &str, span: crate::span::Span) {
        let body = &cleaned[2..];
        let (mantissa_text, exp_text) = match body.find(['p', 'P']) {
            Some(at) => (&body[..at], Some(&body[at + 1..])),
            None => (body, None),
        };
        if exp_text.is_none() {
            self.report.push(
                Diagnostic::error("hexadecimal float literals require a `p` exponent")
                    .with_span(span, "no binary exponent"),
            );
        }

        let mut mantissa = 0f64;
        let mut frac_digits = 0i32;
        let mut seen_point = false;
        for c in mantissa_text.chars() {
            if c == '.' {
                seen_point = true;
                continue;
            }
            let digit = match c.to_digit(16) {
                Some(d) => d,
                None => continue,
            };
            mantissa = mantissa * 16.0 + digit as f64;
            if seen_point {
                frac_digits += 1;
            }
        }

        let exp: i32 = exp_text
            .and_then(|e| e.parse::<i32>().ok())
            .unwrap_or(0);
        let value = mantissa * 2f64.powi(exp.saturating_sub(4 * frac_digits).clamp(-2000, 2000));
        self.stream.push_literal(id, LitValue::Float(value));
    }

    /// Consumes a run of digits and separators in `radix`; true if any
    /// digit was seen.
    fn eat_number_digits(&mut self, radix: u32, flags: &mut TokenFlags) -> bool {
        let mut any = false;
        while let Some(c) = self.first() {
            if c == '_' {
                *flags |= TokenFlags::SEPARATORS;
                self.bump();
            } else if c.is_digit(radix) {
                any = true;
                self.bump();
            } else {
                break;
            }
        }
        any
    }

    /// True when `e`/`E` at the cursor begins an exponent rather than an
    /// adjoining identifier.
    fn exponent_follows(&self) -> bool {
        let mut chars = self.rest().chars();
        chars.next();
        match chars.next() {
            Some('+' | '-') => chars.next().is_some_and(|c| c.is_ascii_digit()),
            Some(c) => c.is_ascii_digit(),
            None => false,
        }
    }
}

/// A `.` immediately followed by an identifier is a path, not a float.
fn is_path_continue(c: char) -> bool {
    c == '_' || unicode_xid::UnicodeXID::is_xid_start(c)
}

#[cfg(test)]
mod tests {
    use super::super::lex;
    use crate::report::Report;
    use crate::token::{LitValue, TokenFlags, TokenKind};

    fn lit_of(text: &str) -> (Option<LitValue>, Vec<crate::report::Diagnostic>) {
        let report = Report::new();
        let lexed = lex(text.as_bytes(), &report);
        let number = lexed
            .stream
            .iter()
            .find(|(_, t)| t.kind == TokenKind::Number)
            .map(|(id, _)| id);
        (
            number.and_then(|id| lexed.stream.literal(id).cloned()),
            report.to_vec(),
        )
    }

    #[test]
    fn plain_integers() {
        assert_eq!(lit_of("42").0, Some(LitValue::Int(42)));
        assert_eq!(lit_of("0").0, Some(LitValue::Int(0)));
        assert_eq!(lit_of("0xFF").0, Some(LitValue::Int(255)));
        assert_eq!(lit_of("0777").0, Some(LitValue::Int(0o777)));
    }

    #[test]
    fn legacy_octal_bad_digit() {
        let (value, diags) = lit_of("089");
        assert_eq!(value, None);
        assert!(diags[0].message.contains("octal"));
    }

    #[test]
    fn rejects_0o_with_rewrite() {
        let (value, diags) = lit_of("0o777");
        assert_eq!(value, Some(LitValue::Int(0o777)));
        let edit = &diags[0].snippets[0].edits[0];
        assert_eq!(edit.replace, "0777");
    }

    #[test]
    fn rejects_binary_with_hex_rewrite() {
        let (value, diags) = lit_of("0b1010");
        assert_eq!(value, Some(LitValue::Int(10)));
        assert!(diags[0].message.contains("unsupported base"));
        assert_eq!(diags[0].snippets[0].edits[0].replace, "0xa");
    }

    #[test]
    fn floats() {
        assert_eq!(lit_of("1.5").0, Some(LitValue::Float(1.5)));
        assert_eq!(lit_of(".25").0, Some(LitValue::Float(0.25)));
        assert_eq!(lit_of("2e3").0, Some(LitValue::Float(2000.0)));
        assert_eq!(lit_of("1e-2").0, Some(LitValue::Float(0.01)));
    }

    #[test]
    fn float_overflow_is_infinite() {
        match lit_of("1e999").0 {
            Some(LitValue::Float(f)) => assert!(f.is_infinite()),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn hex_floats() {
        assert_eq!(lit_of("0x1p4").0, Some(LitValue::Float(16.0)));
        assert_eq!(lit_of("0x1.8p1").0, Some(LitValue::Float(3.0)));
    }

    #[test]
    fn huge_integer_falls_back_to_digits() {
        let (value, diags) = lit_of("99999999999999999999999999");
        assert_eq!(
            value,
            Some(LitValue::Big("99999999999999999999999999".into()))
        );
        assert!(diags.is_empty());
    }

    #[test]
    fn separators_warn() {
        let (value, diags) = lit_of("1_000_000");
        assert_eq!(value, Some(LitValue::Int(1_000_000)));
        assert!(diags[0].message.contains("not standard Protobuf"));
        assert_eq!(diags[0].severity, crate::report::Severity::Warning);
    }

    #[test]
    fn invalid_suffix() {
        let (_, diags) = lit_of("10abc");
        assert!(diags[0].message.contains("invalid suffix `abc`"));
    }

    #[test]
    fn separator_flag_recorded() {
        let report = Report::new();
        let lexed = lex("1_0".as_bytes(), &report);
        let (_, token) = lexed
            .stream
            .iter()
            .find(|(_, t)| t.kind == TokenKind::Number)
            .unwrap();
        assert!(token.flags.contains(TokenFlags::SEPARATORS));
    }
}
