//! `FileDescriptorProto` emission from protolith IR.
//!
//! This crate is the descriptor-producing collaborator of the compiler
//! core: it walks a finalized [`FileIr`] and builds the corresponding
//! `prost_types::FileDescriptorProto`, including `SourceCodeInfo` with
//! span and comment attribution, ready to serialize with `prost` or
//! hand to any consumer of descriptor sets.

mod source_info;

pub use source_info::{location_span, CommentMap, Comments};

use heck::ToLowerCamelCase;
use heck::ToUpperCamelCase;
use prost_types::descriptor_proto::{ExtensionRange, ReservedRange};
use prost_types::enum_descriptor_proto::EnumReservedRange;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::source_code_info::Location;
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumOptions, EnumValueDescriptorProto,
    FieldDescriptorProto, FieldOptions, FileDescriptorProto, FileOptions, MessageOptions,
    MethodDescriptorProto, OneofDescriptorProto, ServiceDescriptorProto, SourceCodeInfo,
};
use protolith::intern::Interner;
use protolith::ir::{
    ElemType, FileIr, ImportKind, Member, MemberKind, Method, Presence, Scalar, Service,
    TypeDef, TypeDefKind, Value,
};
use protolith::span::Span;
use protolith::SyntaxMode;

// Field numbers inside descriptor.proto, used for location paths.
const FILE_PACKAGE: i32 = 2;
const FILE_DEPENDENCY: i32 = 3;
const FILE_MESSAGE: i32 = 4;
const FILE_ENUM: i32 = 5;
const FILE_SERVICE: i32 = 6;
const FILE_EXTENSION: i32 = 7;
const FILE_SYNTAX: i32 = 12;
const MSG_FIELD: i32 = 2;
const MSG_NESTED: i32 = 3;
const MSG_ENUM: i32 = 4;
const MSG_EXT_RANGE: i32 = 5;
const MSG_EXTENSION: i32 = 6;
const MSG_ONEOF: i32 = 8;
const MSG_RESERVED_RANGE: i32 = 9;
const MSG_RESERVED_NAME: i32 = 10;
const ENUM_VALUE: i32 = 2;
const ENUM_RESERVED_RANGE: i32 = 4;
const ENUM_RESERVED_NAME: i32 = 5;
const SVC_METHOD: i32 = 2;

/// Builds the descriptor for one compiled file.
pub fn file_descriptor(file: &FileIr, interner: &Interner) -> FileDescriptorProto {
    log::debug!("emitting descriptor for {}", interner.resolve(file.path));
    Generator {
        file,
        interner,
        comments: CommentMap::build(&file.cx),
        locations: Vec::new(),
    }
    .generate()
}

struct Generator<'a> {
    file: &'a FileIr,
    interner: &'a Interner,
    comments: CommentMap,
    locations: Vec<Location>,
}

impl<'a> Generator<'a> {
    fn generate(mut self) -> FileDescriptorProto {
        let file = self.file;
        let mut out = FileDescriptorProto {
            name: Some(self.interner.resolve(file.path).to_string()),
            ..Default::default()
        };

        // Whole-file location: empty path, full span.
        self.locations.push(Location {
            path: Vec::new(),
            span: location_span(&file.cx, file.cx.root.span),
            ..Default::default()
        });

        if file.package != protolith::intern::Name::EMPTY {
            out.package = Some(self.interner.resolve(file.package).to_string());
        }
        out.syntax = match file.syntax {
            SyntaxMode::Proto2 => None,
            SyntaxMode::Proto3 => Some("proto3".to_string()),
            SyntaxMode::Edition(_) => Some("editions".to_string()),
        };

        // Direct dependencies only; transitive entries are bookkeeping.
        for (index, import) in file
            .imports
            .iter()
            .filter(|i| {
                matches!(
                    i.kind,
                    ImportKind::Regular | ImportKind::Public | ImportKind::Weak
                )
            })
            .enumerate()
        {
            out.dependency
                .push(self.interner.resolve(import.path).to_string());
            self.add_location(vec![FILE_DEPENDENCY, index as i32], import.span);
            match import.kind {
                ImportKind::Public => out.public_dependency.push(index as i32),
                ImportKind::Weak => out.weak_dependency.push(index as i32),
                _ => {}
            }
        }

        self.add_decl_locations(FILE_PACKAGE, FILE_SYNTAX);

        for ptr in &file.types {
            let type_def = file.type_def(*ptr);
            match type_def.kind {
                TypeDefKind::Message => {
                    let path = vec![FILE_MESSAGE, out.message_type.len() as i32];
                    let message = self.message(type_def, &path);
                    out.message_type.push(message);
                }
                TypeDefKind::Enum => {
                    let path = vec![FILE_ENUM, out.enum_type.len() as i32];
                    let descriptor = self.enumeration(type_def, &path);
                    out.enum_type.push(descriptor);
                }
            }
        }

        for (index, ptr) in file.extensions.iter().enumerate() {
            let member = file.member(*ptr);
            let path = vec![FILE_EXTENSION, index as i32];
            if let Some(field) = self.field(member, None, &path) {
                out.extension.push(field);
            }
        }

        for (index, service) in file.services.iter().enumerate() {
            let path = vec![FILE_SERVICE, index as i32];
            out.service.push(self.service(service, &path));
        }

        out.options = self.file_options();
        out.source_code_info = Some(SourceCodeInfo {
            location: std::mem::take(&mut self.locations),
        });
        out
    }

    /// Locations for the package and syntax declarations, read off the
    /// syntax tree.
    fn add_decl_locations(&mut self, package_field: i32, syntax_field: i32) {
        let cx = &self.file.cx;
        for decl in &cx.root.decls {
            if let Some(package) = cx.ast.package(*decl) {
                self.add_location(vec![package_field], package.span);
            } else if let Some(syntax) = cx.ast.syntax(*decl) {
                self.add_location(vec![syntax_field], syntax.span);
            }
        }
    }

    fn message(&mut self, type_def: &TypeDef, path: &[i32]) -> DescriptorProto {
        self.add_location(path.to_vec(), type_def.span);
        let file = self.file;
        let mut out = DescriptorProto {
            name: Some(self.interner.resolve(type_def.name).to_string()),
            ..Default::default()
        };

        for ptr in &type_def.members {
            let member = file.member(*ptr);
            let field_path = push_path(path, MSG_FIELD, out.field.len());
            if let Some(mut field) = self.field(member, Some(type_def), &field_path) {
                // Map fields synthesize their entry message.
                if let Some(entry) = self.map_entry(member, type_def) {
                    let entry_name = format!(
                        ".{}.{}",
                        self.interner.resolve(type_def.fqn),
                        entry.name()
                    );
                    field.type_name = Some(entry_name);
                    field.set_type(Type::Message);
                    out.nested_type.push(entry);
                }
                out.field.push(field);
            }
        }

        for ptr in &type_def.oneofs {
            let oneof = file.oneof(*ptr);
            let oneof_path = push_path(path, MSG_ONEOF, out.oneof_decl.len());
            self.add_location(oneof_path, oneof.span);
            out.oneof_decl.push(OneofDescriptorProto {
                name: Some(self.interner.resolve(oneof.name).to_string()),
                options: None,
            });
        }

        for ptr in &type_def.nested {
            let nested = file.type_def(*ptr);
            match nested.kind {
                TypeDefKind::Message => {
                    let nested_path = push_path(path, MSG_NESTED, out.nested_type.len());
                    let descriptor = self.message(nested, &nested_path);
                    out.nested_type.push(descriptor);
                }
                TypeDefKind::Enum => {
                    let nested_path = push_path(path, MSG_ENUM, out.enum_type.len());
                    let descriptor = self.enumeration(nested, &nested_path);
                    out.enum_type.push(descriptor);
                }
            }
        }

        for ptr in &type_def.extensions {
            let member = file.member(*ptr);
            let ext_path = push_path(path, MSG_EXTENSION, out.extension.len());
            if let Some(field) = self.field(member, None, &ext_path) {
                out.extension.push(field);
            }
        }

        for (index, range) in type_def.extension_ranges.iter().enumerate() {
            self.add_location(push_path(path, MSG_EXT_RANGE, index), range.span);
            out.extension_range.push(ExtensionRange {
                start: Some(range.lo),
                end: Some(range.hi.saturating_add(1)),
                options: None,
            });
        }
        for (index, range) in type_def.reserved_ranges.iter().enumerate() {
            self.add_location(push_path(path, MSG_RESERVED_RANGE, index), range.span);
            out.reserved_range.push(ReservedRange {
                start: Some(range.lo),
                end: Some(range.hi.saturating_add(1)),
            });
        }
        for (index, name) in type_def.reserved_names.iter().enumerate() {
            self.add_location(push_path(path, MSG_RESERVED_NAME, index), type_def.span);
            out.reserved_name.push(self.interner.resolve(*name).to_string());
        }

        out.options = self.message_options(type_def);
        out
    }

    fn enumeration(&mut self, type_def: &TypeDef, path: &[i32]) -> EnumDescriptorProto {
        self.add_location(path.to_vec(), type_def.span);
        let file = self.file;
        let mut out = EnumDescriptorProto {
            name: Some(self.interner.resolve(type_def.name).to_string()),
            ..Default::default()
        };

        for (index, ptr) in type_def.members.iter().enumerate() {
            let member = file.member(*ptr);
            self.add_location(push_path(path, ENUM_VALUE, index), member.span);
            out.value.push(EnumValueDescriptorProto {
                name: Some(self.interner.resolve(member.name).to_string()),
                number: member.tag.map(|tag| tag as i32),
                options: None,
            });
        }
        for (index, range) in type_def.reserved_ranges.iter().enumerate() {
            self.add_location(push_path(path, ENUM_RESERVED_RANGE, index), range.span);
            out.reserved_range.push(EnumReservedRange {
                start: Some(range.lo),
                // Enum reserved ranges are inclusive, unlike messages'.
                end: Some(range.hi),
            });
        }
        for (index, name) in type_def.reserved_names.iter().enumerate() {
            self.add_location(push_path(path, ENUM_RESERVED_NAME, index), type_def.span);
            out.reserved_name.push(self.interner.resolve(*name).to_string());
        }

        out.options = self.enum_options(type_def);
        out
    }

    fn field(
        &mut self,
        member: &Member,
        container: Option<&TypeDef>,
        path: &[i32],
    ) -> Option<FieldDescriptorProto> {
        self.add_location(path.to_vec(), member.span);
        let name = self.interner.resolve(member.name).to_string();
        let mut out = FieldDescriptorProto {
            name: Some(name.clone()),
            number: member.tag.map(|tag| tag as i32),
            json_name: Some(name.to_lower_camel_case()),
            ..Default::default()
        };

        out.set_label(match member.presence {
            Presence::Repeated => Label::Repeated,
            Presence::Required => Label::Required,
            _ => Label::Optional,
        });

        match member.elem {
            Some(ElemType::Scalar(scalar)) => out.set_type(scalar_type(scalar)?),
            Some(ElemType::Named(reference)) => {
                let target = self.file.resolve_type_ref(reference)?;
                out.type_name = Some(format!(".{}", self.interner.resolve(target.fqn)));
                out.set_type(match target.kind {
                    TypeDefKind::Message if target.is_group => Type::Group,
                    TypeDefKind::Message => Type::Message,
                    TypeDefKind::Enum => Type::Enum,
                });
            }
            // Map fields are patched by the caller once the entry
            // message exists.
            Some(ElemType::Map(_)) => {}
            None => return None,
        }

        if member.kind == MemberKind::Extension {
            let target = member
                .container
                .and_then(|reference| self.file.resolve_type_ref(reference))?;
            out.extendee = Some(format!(".{}", self.interner.resolve(target.fqn)));
        }

        if let Some(oneof) = member.oneof {
            let index = container.and_then(|c| {
                c.oneofs.iter().position(|candidate| *candidate == oneof)
            });
            out.oneof_index = index.map(|i| i as i32);
        }

        if let Some(default) = &member.default {
            out.default_value = Some(render_default(default, self.interner));
        }
        if self.file.syntax == SyntaxMode::Proto3
            && member.presence == Presence::Explicit
            && member.oneof.is_none()
            && !matches!(member.elem, Some(ElemType::Named(_)))
        {
            out.proto3_optional = Some(true);
        }

        out.options = self.field_options(member);
        Some(out)
    }

    /// The synthesized `FooEntry` message behind `map<K, V> foo`.
    fn map_entry(&mut self, member: &Member, container: &TypeDef) -> Option<DescriptorProto> {
        let ElemType::Map(key) = member.elem? else {
            return None;
        };
        let value = member.map_value?;
        let entry_name = format!(
            "{}Entry",
            self.interner.resolve(member.name).to_upper_camel_case()
        );

        let mut key_field = FieldDescriptorProto {
            name: Some("key".to_string()),
            number: Some(1),
            json_name: Some("key".to_string()),
            ..Default::default()
        };
        key_field.set_label(Label::Optional);
        key_field.set_type(scalar_type(key)?);

        let mut value_field = FieldDescriptorProto {
            name: Some("value".to_string()),
            number: Some(2),
            json_name: Some("value".to_string()),
            ..Default::default()
        };
        value_field.set_label(Label::Optional);
        match value {
            ElemType::Scalar(scalar) => value_field.set_type(scalar_type(scalar)?),
            ElemType::Named(reference) => {
                let target = self.file.resolve_type_ref(reference)?;
                value_field.type_name =
                    Some(format!(".{}", self.interner.resolve(target.fqn)));
                value_field.set_type(match target.kind {
                    TypeDefKind::Message => Type::Message,
                    TypeDefKind::Enum => Type::Enum,
                });
            }
            ElemType::Map(_) => return None,
        }

        let _ = container;
        Some(DescriptorProto {
            name: Some(entry_name),
            field: vec![key_field, value_field],
            options: Some(MessageOptions {
                map_entry: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn service(&mut self, service: &Service, path: &[i32]) -> ServiceDescriptorProto {
        self.add_location(path.to_vec(), service.span);
        let mut out = ServiceDescriptorProto {
            name: Some(self.interner.resolve(service.name).to_string()),
            ..Default::default()
        };
        for (index, method) in service.methods.iter().enumerate() {
            self.add_location(push_path(path, SVC_METHOD, index), method.span);
            out.method.push(self.method(method));
        }
        out
    }

    fn method(&mut self, method: &Method) -> MethodDescriptorProto {
        let type_name = |elem: &Option<ElemType>| -> Option<String> {
            match elem {
                Some(ElemType::Named(reference)) => self
                    .file
                    .resolve_type_ref(*reference)
                    .map(|target| format!(".{}", self.interner.resolve(target.fqn))),
                _ => None,
            }
        };
        MethodDescriptorProto {
            name: Some(self.interner.resolve(method.name).to_string()),
            input_type: method.input.as_ref().and_then(|t| type_name(&t.elem)),
            output_type: method.output.as_ref().and_then(|t| type_name(&t.elem)),
            options: None,
            client_streaming: method
                .input
                .as_ref()
                .map(|t| t.streaming)
                .filter(|streaming| *streaming),
            server_streaming: method
                .output
                .as_ref()
                .map(|t| t.streaming)
                .filter(|streaming| *streaming),
        }
    }

    // Option projections: the well-known names the descriptor format
    // models as concrete fields.

    fn file_options(&self) -> Option<FileOptions> {
        let mut out = FileOptions::default();
        let mut any = false;
        for option in &self.file.options {
            let name = self.interner.resolve(option.name);
            // Custom and codegen options not modeled as concrete
            // descriptor fields are dropped here.
            let matched = match (&*name, &option.value) {
                ("java_package", Value::String(v)) => {
                    out.java_package = Some(String::from_utf8_lossy(v).into_owned());
                    true
                }
                ("java_outer_classname", Value::String(v)) => {
                    out.java_outer_classname = Some(String::from_utf8_lossy(v).into_owned());
                    true
                }
                ("java_multiple_files", Value::Bool(v)) => {
                    out.java_multiple_files = Some(*v);
                    true
                }
                ("go_package", Value::String(v)) => {
                    out.go_package = Some(String::from_utf8_lossy(v).into_owned());
                    true
                }
                ("csharp_namespace", Value::String(v)) => {
                    out.csharp_namespace = Some(String::from_utf8_lossy(v).into_owned());
                    true
                }
                ("cc_enable_arenas", Value::Bool(v)) => {
                    out.cc_enable_arenas = Some(*v);
                    true
                }
                ("deprecated", Value::Bool(v)) => {
                    out.deprecated = Some(*v);
                    true
                }
                _ => false,
            };
            any |= matched;
        }
        any.then_some(out)
    }

    fn message_options(&self, type_def: &TypeDef) -> Option<MessageOptions> {
        let mut out = MessageOptions::default();
        let mut any = false;
        for option in &type_def.options {
            let name = self.interner.resolve(option.name);
            match (&*name, &option.value) {
                ("message_set_wire_format", Value::Bool(v)) => {
                    out.message_set_wire_format = Some(*v);
                    any = true;
                }
                ("deprecated", Value::Bool(v)) => {
                    out.deprecated = Some(*v);
                    any = true;
                }
                _ => {}
            }
        }
        any.then_some(out)
    }

    fn field_options(&self, member: &Member) -> Option<FieldOptions> {
        let mut out = FieldOptions::default();
        let mut any = false;
        for option in &member.options {
            let name = self.interner.resolve(option.name);
            match (&*name, &option.value) {
                ("packed", Value::Bool(v)) => {
                    out.packed = Some(*v);
                    any = true;
                }
                ("deprecated", Value::Bool(v)) => {
                    out.deprecated = Some(*v);
                    any = true;
                }
                ("lazy", Value::Bool(v)) => {
                    out.lazy = Some(*v);
                    any = true;
                }
                _ => {}
            }
        }
        any.then_some(out)
    }

    fn enum_options(&self, type_def: &TypeDef) -> Option<EnumOptions> {
        let mut out = EnumOptions::default();
        let mut any = false;
        for option in &type_def.options {
            let name = self.interner.resolve(option.name);
            match (&*name, &option.value) {
                ("allow_alias", Value::Bool(v)) => {
                    out.allow_alias = Some(*v);
                    any = true;
                }
                ("deprecated", Value::Bool(v)) => {
                    out.deprecated = Some(*v);
                    any = true;
                }
                _ => {}
            }
        }
        any.then_some(out)
    }

    fn add_location(&mut self, path: Vec<i32>, span: Span) {
        let comments = self.comments.leading_at(span.start);
        let trailing = self.comments.trailing_at(span.end);
        self.locations.push(Location {
            path,
            span: location_span(&self.file.cx, span),
            leading_comments: comments.leading,
            trailing_comments: trailing,
            leading_detached_comments: comments.leading_detached,
        });
    }
}

fn push_path(path: &[i32], field: i32, index: usize) -> Vec<i32> {
    let mut out = path.to_vec();
    out.push(field);
    out.push(index as i32);
    out
}

fn scalar_type(scalar: Scalar) -> Option<Type> {
    Some(match scalar {
        Scalar::Int32 => Type::Int32,
        Scalar::Int64 => Type::Int64,
        Scalar::Uint32 => Type::Uint32,
        Scalar::Uint64 => Type::Uint64,
        Scalar::Sint32 => Type::Sint32,
        Scalar::Sint64 => Type::Sint64,
        Scalar::Fixed32 => Type::Fixed32,
        Scalar::Fixed64 => Type::Fixed64,
        Scalar::Sfixed32 => Type::Sfixed32,
        Scalar::Sfixed64 => Type::Sfixed64,
        Scalar::Float => Type::Float,
        Scalar::Double => Type::Double,
        Scalar::Bool => Type::Bool,
        Scalar::String => Type::String,
        Scalar::Bytes => Type::Bytes,
        _ => return None,
    })
}

fn render_default(value: &Value, interner: &Interner) -> String {
    match value {
        Value::Bool(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Uint(v) => v.to_string(),
        Value::Float(v) => {
            if v.is_infinite() {
                if *v > 0.0 { "inf" } else { "-inf" }.to_string()
            } else if v.is_nan() {
                "nan".to_string()
            } else {
                v.to_string()
            }
        }
        Value::String(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Value::EnumValue(name) => interner.resolve(*name).to_string(),
        Value::Message(_) | Value::Array(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use protolith::{MapOpener, Session};

    fn compile_one(text: &str) -> (FileDescriptorProto, Session) {
        let opener = MapOpener::new().add("test.proto", text.to_string().into_bytes());
        let session = Session::new(Box::new(opener));
        let result = session.compile(&["test.proto"]);
        assert!(
            !result.has_errors(),
            "unexpected errors: {:#?}",
            result.diagnostics
        );
        let file = result.files[0].as_ref().unwrap().clone();
        let descriptor = file_descriptor(&file, session.interner());
        (descriptor, session)
    }

    #[test]
    fn minimal_message() {
        let (descriptor, _session) = compile_one(
            "syntax = \"proto3\";\npackage demo;\nmessage M { string s = 1; }\n",
        );
        assert_eq!(descriptor.name.as_deref(), Some("test.proto"));
        assert_eq!(descriptor.package.as_deref(), Some("demo"));
        assert_eq!(descriptor.syntax.as_deref(), Some("proto3"));
        let message = &descriptor.message_type[0];
        assert_eq!(message.name.as_deref(), Some("M"));
        let field = &message.field[0];
        assert_eq!(field.name.as_deref(), Some("s"));
        assert_eq!(field.number, Some(1));
        assert_eq!(field.r#type(), Type::String);
        assert_eq!(field.json_name.as_deref(), Some("s"));
    }

    #[test]
    fn nested_types_and_type_names() {
        let (descriptor, _) = compile_one(
            "syntax = \"proto3\";\npackage demo;\nmessage Outer { message Inner { int32 x = 1; } Inner inner = 1; }\n",
        );
        let outer = &descriptor.message_type[0];
        assert_eq!(outer.nested_type[0].name.as_deref(), Some("Inner"));
        let field = &outer.field[0];
        assert_eq!(field.r#type(), Type::Message);
        assert_eq!(field.type_name.as_deref(), Some(".demo.Outer.Inner"));
    }

    #[test]
    fn map_fields_synthesize_entries() {
        let (descriptor, _) = compile_one(
            "syntax = \"proto3\";\nmessage M { map<string, int64> counts = 1; }\n",
        );
        let message = &descriptor.message_type[0];
        let field = &message.field[0];
        assert_eq!(field.label(), Label::Repeated);
        assert_eq!(field.r#type(), Type::Message);
        assert_eq!(field.type_name.as_deref(), Some(".M.CountsEntry"));
        let entry = &message.nested_type[0];
        assert_eq!(entry.name.as_deref(), Some("CountsEntry"));
        assert_eq!(entry.options.as_ref().unwrap().map_entry, Some(true));
        assert_eq!(entry.field[0].name.as_deref(), Some("key"));
        assert_eq!(entry.field[1].r#type(), Type::Int64);
    }

    #[test]
    fn services_and_streaming() {
        let (descriptor, _) = compile_one(
            "syntax = \"proto3\";\npackage rpc;\nmessage Req {}\nmessage Resp {}\nservice Svc { rpc Watch (Req) returns (stream Resp); }\n",
        );
        let service = &descriptor.service[0];
        assert_eq!(service.name.as_deref(), Some("Svc"));
        let method = &service.method[0];
        assert_eq!(method.input_type.as_deref(), Some(".rpc.Req"));
        assert_eq!(method.output_type.as_deref(), Some(".rpc.Resp"));
        assert_eq!(method.client_streaming, None);
        assert_eq!(method.server_streaming, Some(true));
    }

    #[test]
    fn reserved_ranges_are_exclusive_for_messages() {
        let (descriptor, _) = compile_one(
            "syntax = \"proto2\";\nmessage M { reserved 5, 10 to 20; extensions 100 to max; optional int32 x = 1; }\n",
        );
        let message = &descriptor.message_type[0];
        assert_eq!(message.reserved_range[0].start, Some(5));
        assert_eq!(message.reserved_range[0].end, Some(6));
        assert_eq!(message.reserved_range[1].end, Some(21));
        assert_eq!(message.extension_range[0].start, Some(100));
        assert_eq!(message.extension_range[0].end, Some(536_870_912));
    }

    #[test]
    fn comments_attach_to_locations() {
        let text = "syntax = \"proto3\";\n\n// Detached block.\n\n// Leading comment.\nmessage M { int32 x = 1; } // Trailing.\n";
        let (descriptor, _) = compile_one(text);
        let info = descriptor.source_code_info.as_ref().unwrap();
        let message_location = info
            .location
            .iter()
            .find(|l| l.path == vec![FILE_MESSAGE, 0])
            .unwrap();
        assert_eq!(
            message_location.leading_comments.as_deref(),
            Some("Leading comment.\n")
        );
        assert_eq!(
            message_location.leading_detached_comments,
            vec!["Detached block.\n".to_string()]
        );
        assert_eq!(
            message_location.trailing_comments.as_deref(),
            Some("Trailing.\n")
        );
    }

    #[test]
    fn default_values_render() {
        let (descriptor, _) = compile_one(
            "syntax = \"proto2\";\nmessage M { optional int32 x = 1 [default = -7]; optional string s = 2 [default = \"hi\"]; }\n",
        );
        let message = &descriptor.message_type[0];
        assert_eq!(message.field[0].default_value.as_deref(), Some("-7"));
        assert_eq!(message.field[1].default_value.as_deref(), Some("hi"));
    }

    #[test]
    fn descriptor_is_encodable() {
        use prost::Message;
        let (descriptor, _) = compile_one(
            "syntax = \"proto3\";\npackage wire;\nmessage M { int32 x = 1; }\n",
        );
        let bytes = descriptor.encode_to_vec();
        assert!(!bytes.is_empty());
        let decoded = FileDescriptorProto::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.package.as_deref(), Some("wire"));
        assert_eq!(decoded.message_type[0].name.as_deref(), Some("M"));
    }

    #[test]
    fn span_shapes() {
        let (descriptor, _) = compile_one("syntax = \"proto3\";\nmessage M {\n  int32 x = 1;\n}\n");
        let info = descriptor.source_code_info.as_ref().unwrap();
        let message_location = info
            .location
            .iter()
            .find(|l| l.path == vec![FILE_MESSAGE, 0])
            .unwrap();
        // Multi-line element: four-element span.
        assert_eq!(message_location.span.len(), 4);
        let field_location = info
            .location
            .iter()
            .find(|l| l.path == vec![FILE_MESSAGE, 0, MSG_FIELD, 0])
            .unwrap();
        // Single-line element: three-element span.
        assert_eq!(field_location.span.len(), 3);
    }
}
