//! Option evaluation and editions feature resolution.
//!
//! Option values are constant-folded against their target's expected
//! type, producing [`Value`] trees. Feature options (`features.*`)
//! additionally update the scope's [`FeatureSet`], which replaces the
//! old syntax-mode special cases under editions.

use crate::ast::{ExprAny, ExprKind, Path, PathName};
use crate::context::FileContext;
use crate::intern::{Interner, Name};
use crate::report::{Diagnostic, Report};
use crate::span::Span;
use crate::syntax::SyntaxMode;

use super::symbol::{SymbolKind, SymbolTable};
use super::types::{ElemType, Scalar};
use super::value::Value;

/// One evaluated option.
#[derive(Clone, Debug)]
pub struct OptionValue {
    /// The option name as written (joined path text), interned.
    pub name: Name,
    pub value: Value,
    pub span: Span,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FieldPresence {
    Explicit,
    Implicit,
    LegacyRequired,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum EnumOpenness {
    Open,
    Closed,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RepeatedEncoding {
    Packed,
    Expanded,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum MessageEncoding {
    LengthPrefixed,
    Delimited,
}

/// The resolved feature set of one scope. Children start from their
/// parent's set and apply their own overrides.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct FeatureSet {
    pub field_presence: FieldPresence,
    pub enum_type: EnumOpenness,
    pub repeated_field_encoding: RepeatedEncoding,
    pub message_encoding: MessageEncoding,
}

impl FeatureSet {
    /// The per-mode defaults that editions replace with explicit
    /// features.
    pub fn defaults(mode: SyntaxMode) -> FeatureSet {
        match mode {
            SyntaxMode::Proto2 => FeatureSet {
                field_presence: FieldPresence::Explicit,
                enum_type: EnumOpenness::Closed,
                repeated_field_encoding: RepeatedEncoding::Expanded,
                message_encoding: MessageEncoding::LengthPrefixed,
            },
            SyntaxMode::Proto3 => FeatureSet {
                field_presence: FieldPresence::Implicit,
                enum_type: EnumOpenness::Open,
                repeated_field_encoding: RepeatedEncoding::Packed,
                message_encoding: MessageEncoding::LengthPrefixed,
            },
            SyntaxMode::Edition(_) => FeatureSet {
                field_presence: FieldPresence::Explicit,
                enum_type: EnumOpenness::Open,
                repeated_field_encoding: RepeatedEncoding::Packed,
                message_encoding: MessageEncoding::LengthPrefixed,
            },
        }
    }
}

/// What kind of declaration an option is attached to.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum OptionTarget {
    File,
    Message,
    Field,
    Enum,
    EnumValue,
    Service,
    Method,
    Oneof,
    Range,
}

/// What a builtin option's value must fold to.
#[derive(Copy, Clone, Debug)]
enum Expected {
    Bool,
    String,
    Ident(&'static [&'static str]),
}

fn builtin(target: OptionTarget, name: &str) -> Option<Expected> {
    use Expected::*;
    let found = match (target, name) {
        (OptionTarget::File, "java_package") => String,
        (OptionTarget::File, "java_outer_classname") => String,
        (OptionTarget::File, "java_multiple_files") => Bool,
        (OptionTarget::File, "go_package") => String,
        (OptionTarget::File, "csharp_namespace") => String,
        (OptionTarget::File, "objc_class_prefix") => String,
        (OptionTarget::File, "php_namespace") => String,
        (OptionTarget::File, "ruby_package") => String,
        (OptionTarget::File, "swift_prefix") => String,
        (OptionTarget::File, "cc_enable_arenas") => Bool,
        (OptionTarget::File, "optimize_for") => Ident(&["SPEED", "CODE_SIZE", "LITE_RUNTIME"]),
        (OptionTarget::Message, "message_set_wire_format") => Bool,
        (OptionTarget::Message, "no_standard_descriptor_accessor") => Bool,
        (OptionTarget::Message, "map_entry") => Bool,
        (OptionTarget::Field, "packed") => Bool,
        (OptionTarget::Field, "lazy") => Bool,
        (OptionTarget::Field, "unverified_lazy") => Bool,
        (OptionTarget::Field, "weak") => Bool,
        (OptionTarget::Field, "json_name") => String,
        (OptionTarget::Field, "ctype") => Ident(&["STRING", "CORD", "STRING_PIECE"]),
        (OptionTarget::Field, "jstype") => Ident(&["JS_NORMAL", "JS_STRING", "JS_NUMBER"]),
        (OptionTarget::Field, "retention") => {
            Ident(&["RETENTION_UNKNOWN", "RETENTION_RUNTIME", "RETENTION_SOURCE"])
        }
        (OptionTarget::Enum, "allow_alias") => Bool,
        (OptionTarget::Method, "idempotency_level") => {
            Ident(&["IDEMPOTENCY_UNKNOWN", "NO_SIDE_EFFECTS", "IDEMPOTENT"])
        }
        (OptionTarget::Range, "declaration") => return None,
        (_, "deprecated") => Bool,
        _ => return None,
    };
    Some(found)
}

/// Everything option evaluation needs from the surrounding build.
pub(crate) struct OptionEnv<'a> {
    pub cx: &'a FileContext,
    pub interner: &'a Interner,
    pub report: &'a Report,
    pub syntax: SyntaxMode,
    /// For resolving custom (extension) option names; absent while the
    /// imported table is still being built.
    pub symbols: Option<&'a SymbolTable>,
    pub scope: String,
}

impl<'a> OptionEnv<'a> {
    /// Evaluates one `name = value` option against `target`, updating
    /// `features` when the option is a feature override.
    pub fn evaluate(
        &self,
        target: OptionTarget,
        key: &Path,
        value: Option<ExprAny>,
        features: &mut FeatureSet,
    ) -> Option<OptionValue> {
        let name_text = self.cx.path_text(key);
        let span = key.span;
        let value = value?;

        // `features.x = Y` and `features = { x: Y }`.
        if first_ident(self.cx, key) == Some("features") {
            self.evaluate_features(key, value, features);
            let folded = self.fold(value, None)?;
            return Some(OptionValue {
                name: self.interner.intern(&name_text),
                value: folded,
                span,
            });
        }

        if key.has_extension() {
            return self.evaluate_custom(&name_text, key, value);
        }

        let expected = if key.components.len() == 1 {
            match first_ident(self.cx, key).and_then(|n| builtin(target, n)) {
                Some(expected) => Some(expected),
                None => {
                    self.report.push(
                        Diagnostic::error(format!("unknown option `{name_text}`"))
                            .with_span(span, "not a known option for this target")
                            .help("custom options are written in parentheses: `(my.option)`"),
                    );
                    None
                }
            }
        } else {
            self.report.push(
                Diagnostic::error(format!("unknown option `{name_text}`"))
                    .with_span(span, "builtin options take a single name"),
            );
            None
        };

        let folded = self.fold(value, expected)?;
        Some(OptionValue {
            name: self.interner.intern(&name_text),
            value: folded,
            span,
        })
    }

    fn evaluate_custom(
        &self,
        name_text: &str,
        key: &Path,
        value: ExprAny,
    ) -> Option<OptionValue> {
        if let Some(symbols) = self.symbols {
            // The first component must name an extension; members past
            // it drill into the extension's message type, which we fold
            // structurally.
            if let Some(PathName::Extension(inner)) = key.components.first().map(|c| &c.name) {
                let inner = self.cx.ast.path(*inner);
                let inner_text = self.cx.path_text(inner);
                let trimmed = inner_text.trim_start_matches('.');
                let resolution = super::resolve::resolve_name(
                    symbols,
                    self.interner,
                    &self.scope,
                    trimmed,
                    inner.leading_dot.is_some(),
                    |s| s.kind == SymbolKind::Extension,
                );
                match resolution {
                    super::resolve::Resolution::Found(_) => {}
                    super::resolve::Resolution::WrongKind(symbol) => {
                        self.report.push(
                            Diagnostic::error(format!(
                                "`{inner_text}` is a {}, not an extension",
                                symbol.kind.describe()
                            ))
                            .with_span(inner.span, "cannot be used as an option"),
                        );
                        return None;
                    }
                    super::resolve::Resolution::NotFound => {
                        self.report.push(
                            Diagnostic::error(format!("unknown option `{name_text}`"))
                                .with_span(inner.span, "no such extension"),
                        );
                        return None;
                    }
                }
            }
        }
        let folded = self.fold(value, None)?;
        Some(OptionValue {
            name: self.interner.intern(name_text),
            value: folded,
            span: key.span,
        })
    }

    fn evaluate_features(&self, key: &Path, value: ExprAny, features: &mut FeatureSet) {
        if !self.syntax.is_editions() {
            self.report.push(
                Diagnostic::error("features are an editions mechanism")
                    .with_span(key.span, "used here")
                    .help(format!("this file uses {}", self.syntax)),
            );
            return;
        }
        match key.components.len() {
            1 => {
                // `features = { field_presence: IMPLICIT, ... }`
                let dict = match self.cx.ast.dict(value) {
                    Some(dict) => dict,
                    None => {
                        self.report.push(
                            Diagnostic::error("`features` takes a message value")
                                .with_span(self.cx.expr_span(value), "expected `{ ... }`"),
                        );
                        return;
                    }
                };
                for entry in &dict.entries {
                    let Some(field) = self.cx.ast.field_expr(*entry) else {
                        continue;
                    };
                    let name = match self.expr_ident(field.key) {
                        Some(name) => name.to_string(),
                        None => continue,
                    };
                    if let Some(value) = field.value {
                        self.apply_feature(&name, value, features);
                    }
                }
            }
            2 => {
                let field = self
                    .cx
                    .path_idents(key)
                    .and_then(|parts| parts.get(1).map(|s| s.to_string()));
                if let Some(field) = field {
                    self.apply_feature(&field, value, features);
                }
            }
            _ => self.report.push(
                Diagnostic::error("unknown feature")
                    .with_span(key.span, "features have a single field name"),
            ),
        }
    }

    fn apply_feature(&self, field: &str, value: ExprAny, features: &mut FeatureSet) {
        let span = self.cx.expr_span(value);
        let ident = self.expr_ident(value);
        macro_rules! pick {
            ($($text:literal => $value:expr),+ $(,)?) => {
                match ident {
                    $(Some($text) => { $value; true })+
                    _ => false,
                }
            };
        }
        let ok = match field {
            "field_presence" => pick! {
                "EXPLICIT" => features.field_presence = FieldPresence::Explicit,
                "IMPLICIT" => features.field_presence = FieldPresence::Implicit,
                "LEGACY_REQUIRED" => features.field_presence = FieldPresence::LegacyRequired,
            },
            "enum_type" => pick! {
                "OPEN" => features.enum_type = EnumOpenness::Open,
                "CLOSED" => features.enum_type = EnumOpenness::Closed,
            },
            "repeated_field_encoding" => pick! {
                "PACKED" => features.repeated_field_encoding = RepeatedEncoding::Packed,
                "EXPANDED" => features.repeated_field_encoding = RepeatedEncoding::Expanded,
            },
            "message_encoding" => pick! {
                "LENGTH_PREFIXED" => features.message_encoding = MessageEncoding::LengthPrefixed,
                "DELIMITED" => features.message_encoding = MessageEncoding::Delimited,
            },
            "utf8_validation" | "json_format" => true,
            _ => {
                self.report.push(
                    Diagnostic::error(format!("unknown feature `{field}`"))
                        .with_span(span, "not a known feature"),
                );
                return;
            }
        };
        if !ok {
            self.report.push(
                Diagnostic::error(format!("invalid value for feature `{field}`"))
                    .with_span(span, "not one of the feature's values"),
            );
        }
    }

    /// Folds `expr` to a [`Value`]. With an expectation the fold also
    /// type-checks; without one it is shape-directed.
    fn fold(&self, expr: ExprAny, expected: Option<Expected>) -> Option<Value> {
        let span = self.cx.expr_span(expr);
        match expected {
            Some(Expected::Bool) => match self.expr_ident(expr) {
                Some("true") => Some(Value::Bool(true)),
                Some("false") => Some(Value::Bool(false)),
                _ => {
                    self.mismatch(span, "`true` or `false`");
                    None
                }
            },
            Some(Expected::String) => match self.cx.string_value(expr) {
                Some(bytes) => Some(Value::String(bytes)),
                None => {
                    self.mismatch(span, "a string");
                    None
                }
            },
            Some(Expected::Ident(allowed)) => match self.expr_ident(expr) {
                Some(ident) if allowed.contains(&ident) => {
                    Some(Value::EnumValue(self.interner.intern(ident)))
                }
                _ => {
                    self.mismatch(span, &format!("one of {}", allowed.join(", ")));
                    None
                }
            },
            None => self.fold_shape(expr),
        }
    }

    fn fold_shape(&self, expr: ExprAny) -> Option<Value> {
        let span = self.cx.expr_span(expr);
        match expr.kind() {
            ExprKind::Literal | ExprKind::Prefixed => {
                if let Some(value) = self.cx.int_value(expr) {
                    return Some(if value < 0 {
                        Value::Int(value as i64)
                    } else if let Ok(value) = u64::try_from(value) {
                        Value::Uint(value)
                    } else {
                        Value::Int(value as i64)
                    });
                }
                if let Some(value) = self.cx.float_value(expr) {
                    return Some(Value::Float(value));
                }
                if let Some(bytes) = self.cx.string_value(expr) {
                    return Some(Value::String(bytes));
                }
                self.mismatch(span, "a constant");
                None
            }
            ExprKind::Path => {
                let ident = self.expr_ident(expr)?;
                match ident {
                    "true" => Some(Value::Bool(true)),
                    "false" => Some(Value::Bool(false)),
                    "inf" | "nan" => self.cx.float_value(expr).map(Value::Float),
                    other => Some(Value::EnumValue(self.interner.intern(other))),
                }
            }
            ExprKind::Dict => {
                let dict = self.cx.ast.dict(expr)?;
                let mut fields = Vec::new();
                for entry in &dict.entries {
                    let Some(field) = self.cx.ast.field_expr(*entry) else {
                        let span = self.cx.expr_span(*entry);
                        self.report.push(
                            Diagnostic::error("expected a `key: value` entry")
                                .with_span(span, "bare value in message literal"),
                        );
                        continue;
                    };
                    let name = match self.expr_ident(field.key) {
                        Some(name) => self.interner.intern(name),
                        None => {
                            let span = self.cx.expr_span(field.key);
                            self.report.push(
                                Diagnostic::error("message literal keys must be field names")
                                    .with_span(span, "not a field name"),
                            );
                            continue;
                        }
                    };
                    if let Some(value) = field.value.and_then(|v| self.fold_shape(v)) {
                        fields.push((name, value));
                    }
                }
                Some(Value::Message(fields))
            }
            ExprKind::Array => {
                let array = self.cx.ast.array(expr)?;
                let values = array
                    .elems
                    .iter()
                    .filter_map(|e| self.fold_shape(*e))
                    .collect();
                Some(Value::Array(values))
            }
            ExprKind::Range | ExprKind::Field => {
                self.mismatch(span, "a constant");
                None
            }
            ExprKind::Error => None,
        }
    }

    /// Folds a `default = ...` value against the field's element type.
    pub fn fold_default(&self, elem: &ElemType, expr: ExprAny) -> Option<Value> {
        let span = self.cx.expr_span(expr);
        match elem {
            ElemType::Scalar(scalar) => self.fold_scalar(*scalar, expr),
            ElemType::Map(_) => {
                self.report.push(
                    Diagnostic::error("map fields cannot have a default value")
                        .with_span(span, "remove the default"),
                );
                None
            }
            ElemType::Named(_) => {
                // Message defaults are illegal; enum defaults fold to the
                // value name and are checked against the enum later.
                match self.expr_ident(expr) {
                    Some(ident) => Some(Value::EnumValue(self.interner.intern(ident))),
                    None => {
                        self.report.push(
                            Diagnostic::error("default value must be an enum value name")
                                .with_span(span, "message fields cannot have defaults"),
                        );
                        None
                    }
                }
            }
        }
    }

    pub(crate) fn fold_scalar(&self, scalar: Scalar, expr: ExprAny) -> Option<Value> {
        let span = self.cx.expr_span(expr);
        match scalar {
            Scalar::Bool => self.fold(expr, Some(Expected::Bool)),
            Scalar::String => match self.cx.string_value(expr) {
                Some(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(_) => Some(Value::String(bytes)),
                    Err(_) => {
                        self.report.push(
                            Diagnostic::error("string default is not valid UTF-8")
                                .with_span(span, "invalid bytes"),
                        );
                        None
                    }
                },
                None => {
                    self.mismatch(span, "a string");
                    None
                }
            },
            Scalar::Bytes => match self.cx.string_value(expr) {
                Some(bytes) => Some(Value::String(bytes)),
                None => {
                    self.mismatch(span, "a bytes literal");
                    None
                }
            },
            Scalar::Float | Scalar::Double => match self.cx.float_value(expr) {
                Some(value) => Some(Value::Float(value)),
                None => {
                    self.mismatch(span, "a number");
                    None
                }
            },
            scalar if scalar.is_integral() => {
                let value = match self.cx.int_value(expr) {
                    Some(value) => value,
                    None => {
                        self.mismatch(span, "an integer");
                        return None;
                    }
                };
                let fits = match scalar {
                    Scalar::Int32 | Scalar::Sint32 | Scalar::Sfixed32 => {
                        i32::try_from(value).is_ok()
                    }
                    Scalar::Uint32 | Scalar::Fixed32 => u32::try_from(value).is_ok(),
                    Scalar::Uint64 | Scalar::Fixed64 => u64::try_from(value).is_ok(),
                    _ => i64::try_from(value).is_ok(),
                };
                if !fits {
                    self.report.push(
                        Diagnostic::error(format!(
                            "value {value} is out of range for {}",
                            scalar.name()
                        ))
                        .with_span(span, "does not fit"),
                    );
                    return None;
                }
                Some(if scalar.is_unsigned() {
                    Value::Uint(value as u64)
                } else {
                    Value::Int(value as i64)
                })
            }
            _ => {
                self.mismatch(span, "a constant");
                None
            }
        }
    }

    fn mismatch(&self, span: Span, wanted: &str) {
        self.report.push(
            Diagnostic::error("option value has the wrong type")
                .with_span(span, format!("expected {wanted}")),
        );
    }

    /// The single identifier of a path expression, if that is what
    /// `expr` is.
    fn expr_ident(&self, expr: ExprAny) -> Option<&str> {
        let path = self.cx.ast.expr_path(expr)?;
        let path = self.cx.ast.path(path.path);
        let token = path.as_single_ident()?;
        Some(self.cx.token_text(token))
    }
}

/// The first plain identifier of a path.
fn first_ident<'a>(cx: &'a FileContext, path: &Path) -> Option<&'a str> {
    match path.components.first().map(|c| &c.name)? {
        PathName::Ident(token) => Some(cx.token_text(*token)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_defaults_per_mode() {
        let proto2 = FeatureSet::defaults(SyntaxMode::Proto2);
        assert_eq!(proto2.field_presence, FieldPresence::Explicit);
        assert_eq!(proto2.enum_type, EnumOpenness::Closed);
        assert_eq!(proto2.repeated_field_encoding, RepeatedEncoding::Expanded);

        let proto3 = FeatureSet::defaults(SyntaxMode::Proto3);
        assert_eq!(proto3.field_presence, FieldPresence::Implicit);
        assert_eq!(proto3.enum_type, EnumOpenness::Open);

        let editions = FeatureSet::defaults(SyntaxMode::Edition(2023));
        assert_eq!(editions.field_presence, FieldPresence::Explicit);
        assert_eq!(editions.enum_type, EnumOpenness::Open);
        assert_eq!(editions.message_encoding, MessageEncoding::LengthPrefixed);
    }

    #[test]
    fn builtin_tables() {
        assert!(builtin(OptionTarget::File, "java_package").is_some());
        assert!(builtin(OptionTarget::Field, "packed").is_some());
        assert!(builtin(OptionTarget::Enum, "allow_alias").is_some());
        assert!(builtin(OptionTarget::Message, "deprecated").is_some());
        assert!(builtin(OptionTarget::File, "packed").is_none());
        assert!(builtin(OptionTarget::Field, "allow_alias").is_none());
    }
}
