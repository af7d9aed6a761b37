//! Syntax and edition modes.

use std::fmt;

/// Editions this build knows about.
pub const KNOWN_EDITIONS: &[u16] = &[2023];

/// Which grammar and semantics a file opted into.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum SyntaxMode {
    Proto2,
    Proto3,
    Edition(u16),
}

impl SyntaxMode {
    pub fn is_editions(self) -> bool {
        matches!(self, SyntaxMode::Edition(_))
    }

    /// Parses the value of a `syntax = "..."` declaration.
    pub fn from_syntax_value(value: &str) -> Option<SyntaxMode> {
        match value {
            "proto2" => Some(SyntaxMode::Proto2),
            "proto3" => Some(SyntaxMode::Proto3),
            _ => None,
        }
    }

    /// Parses the value of an `edition = "..."` declaration.
    pub fn from_edition_value(value: &str) -> Option<SyntaxMode> {
        let year: u16 = value.parse().ok()?;
        KNOWN_EDITIONS
            .contains(&year)
            .then_some(SyntaxMode::Edition(year))
    }
}

impl Default for SyntaxMode {
    /// Files with no syntax declaration are proto2, with a warning.
    fn default() -> Self {
        SyntaxMode::Proto2
    }
}

impl fmt::Display for SyntaxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxMode::Proto2 => f.write_str("proto2"),
            SyntaxMode::Proto3 => f.write_str("proto3"),
            SyntaxMode::Edition(year) => write!(f, "edition {year}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_values() {
        assert_eq!(
            SyntaxMode::from_syntax_value("proto2"),
            Some(SyntaxMode::Proto2)
        );
        assert_eq!(
            SyntaxMode::from_syntax_value("proto3"),
            Some(SyntaxMode::Proto3)
        );
        assert_eq!(SyntaxMode::from_syntax_value("proto4"), None);
        assert_eq!(
            SyntaxMode::from_edition_value("2023"),
            Some(SyntaxMode::Edition(2023))
        );
        assert_eq!(SyntaxMode::from_edition_value("1999"), None);
        assert_eq!(SyntaxMode::from_edition_value("soon"), None);
    }
}
