use crate::ast;
use crate::facts::ArgumentFact;
use crate::facts::Definition;
use crate::facts::DefinitionKind;
use crate::facts::FieldFact;
use crate::facts::SchemaFacts;
use crate::loc::Span;
use crate::profile::LanguageProfile;
use crate::source::SchemaSource;
use crate::type_expr::TypeExpr;
use std::collections::HashMap;
use std::collections::HashSet;
use thiserror::Error;

const CONNECTION_SUFFIX: &str = "Connection";

/// One linear pass over the parsed document: classify root/object/relay
/// definitions, synthesize connection definitions, and validate every
/// type reference. Reference errors are accumulated across the whole
/// pass and reported together.
pub fn analyze(
    document: &ast::Document,
    source: &SchemaSource,
    profile: &LanguageProfile,
) -> Result<SchemaFacts, AnalyzeErrors> {
    Analyzer::new(source, profile).run(document)
}

struct Analyzer<'a> {
    source: &'a SchemaSource,
    profile: &'a LanguageProfile,
    /// Names of every definition literally present in the source,
    /// collected up front so forward references resolve.
    named: HashSet<String>,
    seen_definitions: HashMap<String, Span>,
    seen_connections: HashSet<String>,
    /// `*Connection` references deferred until every object has had its
    /// connections synthesized: (referencing definition, type name, span).
    pending_connection_refs: Vec<(String, String, Span)>,
    errors: Vec<AnalyzeError>,
}

impl<'a> Analyzer<'a> {
    fn new(source: &'a SchemaSource, profile: &'a LanguageProfile) -> Self {
        Self {
            source,
            profile,
            named: HashSet::new(),
            seen_definitions: HashMap::new(),
            seen_connections: HashSet::new(),
            pending_connection_refs: vec![],
            errors: vec![],
        }
    }

    fn run(mut self, document: &ast::Document) -> Result<SchemaFacts, AnalyzeErrors> {
        for def in &document.definitions {
            if let ast::Definition::TypeDefinition(type_def) = def {
                self.named.insert(type_def_name(type_def).to_string());
            }
        }

        let spans = self.definition_spans(document);
        let mut facts = SchemaFacts::default();

        for (def, span) in document.definitions.iter().zip(spans) {
            let ast::Definition::TypeDefinition(type_def) = def else {
                continue;
            };
            self.visit_type_def(&mut facts, type_def, span);
        }
        self.check_pending_connections();

        if self.errors.is_empty() {
            Ok(facts)
        } else {
            Err(AnalyzeErrors {
                errors: self.errors,
            })
        }
    }

    fn visit_type_def(
        &mut self,
        facts: &mut SchemaFacts,
        type_def: &ast::TypeDefinition,
        span: Span,
    ) {
        let name = type_def_name(type_def);
        if let Some(&first) = self.seen_definitions.get(name) {
            self.errors.push(AnalyzeError::DuplicateTypeDefinition {
                type_name: name.to_string(),
                first,
                second: span,
            });
            return;
        }
        self.seen_definitions.insert(name.to_string(), span);

        let def = match type_def {
            ast::TypeDefinition::Object(obj) => self.object_def(obj, span),
            ast::TypeDefinition::Interface(iface) => self.interface_def(iface, span),
            ast::TypeDefinition::Enum(enum_def) => self.enum_def(enum_def, span),
            ast::TypeDefinition::InputObject(input) => self.input_object_def(input, span),
            ast::TypeDefinition::Scalar(scalar) => self.scalar_def(scalar, span),
            ast::TypeDefinition::Union(union_def) => self.union_def(union_def, span),
        };

        let connections =
            if def.kind == DefinitionKind::Object {
                self.synthesize_connections(&def)
            } else {
                vec![]
            };

        let is_root = self.profile.is_root(&def.name);
        let name = def.name.clone();
        facts.push(def);
        if is_root {
            facts.mark_root(&name);
        }
        for connection in connections {
            facts.push(connection);
        }
    }

    /// One synthesized definition per distinct `*Connection` type name,
    /// no matter how many fields reference it.
    fn synthesize_connections(&mut self, def: &Definition) -> Vec<Definition> {
        let mut synthesized = vec![];
        for field in &def.fields {
            let type_name = field.type_text.as_str();
            if !type_name.ends_with(CONNECTION_SUFFIX)
                || self.seen_connections.contains(type_name)
            {
                continue;
            }
            self.seen_connections.insert(type_name.to_string());

            let node_type = type_name
                .strip_suffix(CONNECTION_SUFFIX)
                .unwrap_or_default();
            let type_span = self.field_type_span(field.span);
            if node_type.is_empty() || !self.named.contains(node_type) {
                self.errors.push(AnalyzeError::UndefinedConnectionNodeType {
                    connection: type_name.to_string(),
                    node_type: node_type.to_string(),
                    span: type_span,
                });
                continue;
            }

            let mut connection = Definition::new(
                type_name.to_string(),
                DefinitionKind::Connection,
                type_span,
            );
            connection.node_type = Some(node_type.to_string());
            synthesized.push(connection);
        }
        synthesized
    }

    fn object_def(&mut self, obj: &ast::ObjectType, span: Span) -> Definition {
        let mut def = self.base_def(&obj.name, DefinitionKind::Object, obj.position, span);
        def.implements = obj.implements_interfaces.clone();
        def.fields = self.field_facts(&obj.name, &obj.fields, span);
        def
    }

    fn interface_def(&mut self, iface: &ast::InterfaceType, span: Span) -> Definition {
        let mut def = self.base_def(&iface.name, DefinitionKind::Interface, iface.position, span);
        def.fields = self.field_facts(&iface.name, &iface.fields, span);
        def
    }

    fn enum_def(&mut self, enum_def: &ast::EnumType, span: Span) -> Definition {
        let mut def = self.base_def(&enum_def.name, DefinitionKind::Enum, enum_def.position, span);
        def.values = enum_def.values.iter().map(|v| v.name.clone()).collect();
        def
    }

    fn input_object_def(&mut self, input: &ast::InputObjectType, span: Span) -> Definition {
        let mut def = self.base_def(&input.name, DefinitionKind::InputObject, input.position, span);
        def.fields = self.input_field_facts(&input.name, &input.fields, span);
        def
    }

    fn scalar_def(&mut self, scalar: &ast::ScalarType, span: Span) -> Definition {
        self.base_def(&scalar.name, DefinitionKind::Scalar, scalar.position, span)
    }

    fn union_def(&mut self, union_def: &ast::UnionType, span: Span) -> Definition {
        let mut def = self.base_def(&union_def.name, DefinitionKind::Union, union_def.position, span);
        def.members = union_def.types.clone();
        for member in &def.members {
            self.check_reference(&def.name, member, span);
        }
        def
    }

    fn base_def(
        &mut self,
        name: &str,
        kind: DefinitionKind,
        pos: ast::Pos,
        span: Span,
    ) -> Definition {
        let mut def = Definition::new(name.to_string(), kind, span);
        if let Some(offset) = self.source.offset_of(pos) {
            def.description = self.source.doc_comment(offset);
        }
        def
    }

    fn field_facts(
        &mut self,
        owner: &str,
        fields: &[ast::Field],
        owner_span: Span,
    ) -> Vec<FieldFact> {
        let starts: Vec<Option<usize>> = fields
            .iter()
            .map(|f| self.source.offset_of(f.position))
            .collect();

        fields
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                let span = self.member_span(&starts, idx, owner_span);
                let field_type_text = type_text(&field.field_type);
                self.check_reference(owner, &field_type_text, span);

                let arguments = field
                    .arguments
                    .iter()
                    .map(|arg| {
                        let arg_type = type_text(&arg.value_type);
                        self.check_reference(owner, &arg_type, span);
                        ArgumentFact {
                            name: arg.name.clone(),
                            type_text: arg_type,
                            default: arg.default_value.as_ref().map(value_text),
                        }
                    })
                    .collect();

                FieldFact {
                    name: field.name.clone(),
                    type_text: field_type_text,
                    span,
                    description: starts[idx]
                        .map(|offset| self.source.doc_comment(offset))
                        .unwrap_or_default(),
                    arguments,
                }
            })
            .collect()
    }

    fn input_field_facts(
        &mut self,
        owner: &str,
        fields: &[ast::InputValue],
        owner_span: Span,
    ) -> Vec<FieldFact> {
        let starts: Vec<Option<usize>> = fields
            .iter()
            .map(|f| self.source.offset_of(f.position))
            .collect();

        fields
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                let span = self.member_span(&starts, idx, owner_span);
                let field_type_text = type_text(&field.value_type);
                self.check_reference(owner, &field_type_text, span);

                FieldFact {
                    name: field.name.clone(),
                    type_text: field_type_text,
                    span,
                    description: starts[idx]
                        .map(|offset| self.source.doc_comment(offset))
                        .unwrap_or_default(),
                    arguments: vec![],
                }
            })
            .collect()
    }

    /// Span of member `idx`: from its own start to the next member's
    /// start, or to the owner's closing brace for the last member,
    /// trailing whitespace trimmed.
    fn member_span(&self, starts: &[Option<usize>], idx: usize, owner_span: Span) -> Span {
        let start = starts[idx].unwrap_or(owner_span.start);
        let end = starts
            .get(idx + 1)
            .and_then(|next| *next)
            .unwrap_or_else(|| owner_span.end.saturating_sub(1).max(start));
        let text = self.source.raw_text(Span::new(start, end));
        Span::new(start, start + text.trim_end().len())
    }

    /// Span of the type-reference text within a field, found by
    /// skipping the field name and any argument list.
    fn field_type_span(&self, field_span: Span) -> Span {
        let text = self.source.raw_text(field_span);
        let mut depth = 0usize;
        for (idx, ch) in text.char_indices() {
            match ch {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ':' if depth == 0 => {
                    let rest = &text[idx + 1..];
                    let lead = rest.len() - rest.trim_start().len();
                    let start = field_span.start + idx + 1 + lead;
                    return Span::new(start, start + rest.trim().len());
                },
                _ => {},
            }
        }
        field_span
    }

    /// A type reference resolves when its innermost name is a profile
    /// scalar, a literal definition, or a connection that some object
    /// field caused the analyzer to synthesize. Connection references
    /// are deferred and swept after the full pass.
    fn check_reference(&mut self, referenced_by: &str, type_text: &str, span: Span) {
        let name = match TypeExpr::parse(type_text) {
            Ok(expr) => expr.named_type().to_string(),
            Err(_) => {
                self.errors.push(AnalyzeError::MalformedTypeReference {
                    referenced_by: referenced_by.to_string(),
                    type_text: type_text.to_string(),
                    span,
                });
                return;
            },
        };

        if self.profile.scalar(&name).is_some() || self.named.contains(&name) {
            return;
        }
        if let Some(base) = name.strip_suffix(CONNECTION_SUFFIX)
            && !base.is_empty()
            && self.named.contains(base)
        {
            self.pending_connection_refs.push((
                referenced_by.to_string(),
                name,
                span,
            ));
            return;
        }

        self.errors.push(AnalyzeError::UndefinedTypeReference {
            type_name: name,
            referenced_by: referenced_by.to_string(),
            span,
        });
    }

    /// Synthesis only runs for object fields, so a connection reference
    /// held by an interface, input object, or argument is valid only if
    /// some object field produced the same connection.
    fn check_pending_connections(&mut self) {
        let pending = std::mem::take(&mut self.pending_connection_refs);
        for (referenced_by, type_name, span) in pending {
            if !self.seen_connections.contains(&type_name) {
                self.errors.push(AnalyzeError::UndefinedTypeReference {
                    type_name,
                    referenced_by,
                    span,
                });
            }
        }
    }

    /// Byte spans of every top-level definition: from its own start to
    /// the next definition's start (or end of text), with trailing
    /// whitespace and trailing comment lines excluded.
    fn definition_spans(&self, document: &ast::Document) -> Vec<Span> {
        let starts: Vec<usize> = document
            .definitions
            .iter()
            .map(|def| {
                self.source
                    .offset_of(definition_pos(def))
                    .unwrap_or(self.source.text().len())
            })
            .collect();

        starts
            .iter()
            .enumerate()
            .map(|(idx, &start)| {
                let end = starts
                    .get(idx + 1)
                    .copied()
                    .unwrap_or(self.source.text().len());
                Span::new(start, start + trim_definition_tail(self.source.raw_text(Span::new(start, end))))
            })
            .collect()
    }
}

fn type_def_name(type_def: &ast::TypeDefinition) -> &str {
    match type_def {
        ast::TypeDefinition::Object(def) => &def.name,
        ast::TypeDefinition::Interface(def) => &def.name,
        ast::TypeDefinition::Enum(def) => &def.name,
        ast::TypeDefinition::InputObject(def) => &def.name,
        ast::TypeDefinition::Scalar(def) => &def.name,
        ast::TypeDefinition::Union(def) => &def.name,
    }
}

fn definition_pos(def: &ast::Definition) -> ast::Pos {
    use graphql_parser::schema::Definition;
    match def {
        Definition::SchemaDefinition(d) => d.position,
        Definition::TypeDefinition(type_def) => match type_def {
            ast::TypeDefinition::Object(d) => d.position,
            ast::TypeDefinition::Interface(d) => d.position,
            ast::TypeDefinition::Enum(d) => d.position,
            ast::TypeDefinition::InputObject(d) => d.position,
            ast::TypeDefinition::Scalar(d) => d.position,
            ast::TypeDefinition::Union(d) => d.position,
        },
        Definition::TypeExtension(ext) => {
            use graphql_parser::schema::TypeExtension;
            match ext {
                TypeExtension::Object(d) => d.position,
                TypeExtension::Interface(d) => d.position,
                TypeExtension::Enum(d) => d.position,
                TypeExtension::InputObject(d) => d.position,
                TypeExtension::Scalar(d) => d.position,
                TypeExtension::Union(d) => d.position,
            }
        },
        Definition::DirectiveDefinition(d) => d.position,
    }
}

/// Length of `text` once trailing whitespace and trailing `#` comment
/// lines (which document the next definition) are dropped.
fn trim_definition_tail(text: &str) -> usize {
    let mut trimmed = text.trim_end();
    loop {
        let Some(newline) = trimmed.rfind('\n') else {
            break;
        };
        if trimmed[newline..].trim_start().starts_with('#') {
            trimmed = trimmed[..newline].trim_end();
        } else {
            break;
        }
    }
    trimmed.len()
}

fn type_text(ty: &ast::Type) -> String {
    match ty {
        ast::Type::NamedType(name) => name.clone(),
        ast::Type::ListType(inner) => format!("[{}]", type_text(inner)),
        ast::Type::NonNullType(inner) => format!("{}!", type_text(inner)),
    }
}

fn value_text(value: &graphql_parser::query::Value<'static, String>) -> String {
    use graphql_parser::query::Value;
    match value {
        Value::Variable(name) => format!("${name}"),
        Value::Int(num) => num
            .as_i64()
            .map(|n| n.to_string())
            .unwrap_or_default(),
        Value::Float(num) => num.to_string(),
        Value::String(text) => format!("{text:?}"),
        Value::Boolean(val) => val.to_string(),
        Value::Null => "null".to_string(),
        Value::Enum(name) => name.clone(),
        Value::List(items) => format!(
            "[{}]",
            items.iter().map(value_text).collect::<Vec<_>>().join(", "),
        ),
        Value::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(key, val)| format!("{key}: {}", value_text(val)))
                .collect::<Vec<_>>()
                .join(", "),
        ),
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AnalyzeError {
    #[error(
        "connection type `{connection}` refers to undefined node type \
        `{node_type}` (at {span})"
    )]
    UndefinedConnectionNodeType {
        connection: String,
        node_type: String,
        span: Span,
    },

    #[error("`{referenced_by}` references undefined type `{type_name}` (at {span})")]
    UndefinedTypeReference {
        type_name: String,
        referenced_by: String,
        span: Span,
    },

    #[error("`{referenced_by}` has a malformed type reference `{type_text}` (at {span})")]
    MalformedTypeReference {
        referenced_by: String,
        type_text: String,
        span: Span,
    },

    #[error("type `{type_name}` is defined more than once (at {first} and {second})")]
    DuplicateTypeDefinition {
        type_name: String,
        first: Span,
        second: Span,
    },
}

#[derive(Debug, Error, PartialEq)]
#[error(
    "encountered the following errors while analyzing the schema:\n\n{}",
    errors.iter()
        .map(|e| format!("  * {e}"))
        .collect::<Vec<_>>()
        .join("\n"),
)]
pub struct AnalyzeErrors {
    pub errors: Vec<AnalyzeError>,
}
