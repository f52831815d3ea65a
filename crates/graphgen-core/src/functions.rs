use crate::emitter;
use crate::facts::SchemaFacts;
use crate::loc::Span;
use crate::profile::LanguageProfile;
use crate::resolver::TypeClass;
use crate::resolver::TypeResolver;
use crate::source::SchemaSource;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;
use tera::Tera;
use tera::Value;

const CONNECTION_SUFFIX: &str = "Connection";

/// The callable surface exposed to templates. One instance per run;
/// registering on a `Tera` engine only clones `Arc`s, so every
/// generation unit gets its own engine over the same shared read-only
/// state.
///
/// In the base registration the file-splitting primitives
/// (`start_file`, `end_file`, `render_partial`) are inert no-ops;
/// sharing the base engine can never leak one unit's file operations
/// into another. Each unit re-registers them on its own engine.
#[derive(Clone)]
pub struct TemplateFunctions {
    facts: Arc<SchemaFacts>,
    source: Arc<SchemaSource>,
    profile: Arc<LanguageProfile>,
    fragments: Arc<Tera>,
}

impl TemplateFunctions {
    pub fn new(
        facts: Arc<SchemaFacts>,
        source: Arc<SchemaSource>,
        profile: Arc<LanguageProfile>,
        fragments: Arc<Tera>,
    ) -> Self {
        Self {
            facts,
            source,
            profile,
            fragments,
        }
    }

    pub fn register_base(&self, tera: &mut Tera) {
        self.register_common(tera);
        tera.register_function("start_file", |_: &HashMap<String, Value>| {
            Ok(Value::String(String::new()))
        });
        tera.register_function("end_file", |_: &HashMap<String, Value>| {
            Ok(Value::String(String::new()))
        });
        tera.register_function("render_partial", |_: &HashMap<String, Value>| {
            Ok(Value::String(String::new()))
        });
    }

    /// Per-unit bindings: `start_file`/`end_file` splice the control
    /// markers this unit's emitter consumes, and `render_partial`
    /// renders against the unit's own engine (reached through `slot`,
    /// which the unit fills once its engine is fully built).
    pub fn register_unit(&self, tera: &mut Tera, slot: Arc<OnceLock<Arc<Tera>>>) {
        self.register_common(tera);

        tera.register_function("start_file", |args: &HashMap<String, Value>| {
            let path = str_arg(args, "path")?;
            Ok(Value::String(emitter::start_file_marker(&path)))
        });

        tera.register_function("end_file", |_: &HashMap<String, Value>| {
            Ok(Value::String(emitter::end_file_marker()))
        });

        let functions = self.clone();
        tera.register_function("render_partial", move |args: &HashMap<String, Value>| {
            let name = str_arg(args, "name")?;
            let engine = slot
                .get()
                .ok_or_else(|| tera::Error::msg("render_partial is not bound yet"))?;

            let mut context = facts_context(&functions.facts);
            if let Some(node) = args.get("with") {
                context.insert("node", node);
            }
            engine.render(&name, &context)
                .map(Value::String)
                .map_err(|err| {
                    tera::Error::msg(format!("partial `{name}` failed to render: {err}"))
                })
        });
    }

    fn register_common(&self, tera: &mut Tera) {
        let functions = self.clone();
        tera.register_function("native_type", move |args: &HashMap<String, Value>| {
            let type_text = str_arg(args, "type")?;
            let package = opt_str_arg(args, "package")?;
            functions
                .resolver()
                .render_text(TypeClass::Native, &type_text, package.as_deref())
                .map(Value::String)
                .map_err(|err| tera::Error::msg(err.to_string()))
        });

        let functions = self.clone();
        tera.register_function("schema_type", move |args: &HashMap<String, Value>| {
            let type_text = str_arg(args, "type")?;
            functions
                .resolver()
                .render_text(TypeClass::Schema, &type_text, None)
                .map(Value::String)
                .map_err(|err| tera::Error::msg(err.to_string()))
        });

        let functions = self.clone();
        tera.register_function("raw_text", move |args: &HashMap<String, Value>| {
            let span = span_arg(args)?;
            Ok(Value::String(functions.source.raw_text(span).to_string()))
        });

        let functions = self.clone();
        tera.register_function("doc_comment", move |args: &HashMap<String, Value>| {
            let span = span_arg(args)?;
            tera::to_value(functions.source.doc_comment(span.start)).map_err(Into::into)
        });

        let functions = self.clone();
        tera.register_function("is_root", move |args: &HashMap<String, Value>| {
            let name = str_arg(args, "name")?;
            Ok(Value::Bool(functions.profile.is_root(&name)))
        });

        let functions = self.clone();
        tera.register_function("definition_kind", move |args: &HashMap<String, Value>| {
            let name = str_arg(args, "name")?;
            let def = functions.facts.lookup(&name).ok_or_else(|| {
                tera::Error::msg(format!("type with name `{name}` is not defined"))
            })?;
            Ok(Value::String(def.kind.as_str().to_string()))
        });

        tera.register_function(
            "is_relay_connection",
            |args: &HashMap<String, Value>| {
                let type_text = str_arg(args, "type")?;
                Ok(Value::Bool(type_text.ends_with(CONNECTION_SUFFIX)))
            },
        );

        tera.register_function("is_relay_node", |args: &HashMap<String, Value>| {
            let interfaces = args
                .get("interfaces")
                .and_then(Value::as_array)
                .ok_or_else(|| tera::Error::msg("`interfaces` must be an array"))?;
            Ok(Value::Bool(
                interfaces.iter().any(|val| val.as_str() == Some("Node")),
            ))
        });

        tera.register_function("public_name", |args: &HashMap<String, Value>| {
            let name = str_arg(args, "name")?;
            Ok(Value::String(capitalize(&name)))
        });

        tera.register_function("private_name", |args: &HashMap<String, Value>| {
            let name = str_arg(args, "name")?;
            Ok(Value::String(decapitalize(&name)))
        });

        tera.register_function("has_prefix", |args: &HashMap<String, Value>| {
            let value = str_arg(args, "value")?;
            let prefix = str_arg(args, "prefix")?;
            Ok(Value::Bool(value.starts_with(&prefix)))
        });

        tera.register_function("has_suffix", |args: &HashMap<String, Value>| {
            let value = str_arg(args, "value")?;
            let suffix = str_arg(args, "suffix")?;
            Ok(Value::Bool(value.ends_with(&suffix)))
        });

        let functions = self.clone();
        tera.register_function("config", move |_: &HashMap<String, Value>| {
            tera::to_value(&functions.profile.config).map_err(Into::into)
        });
    }

    fn resolver(&self) -> TypeResolver<'_> {
        TypeResolver::new(&self.facts, &self.profile, &self.fragments)
    }
}

/// Entry-point template context: the classified definition sets, ready
/// for `{% for def in definitions %}`-style traversal.
pub fn facts_context(facts: &SchemaFacts) -> tera::Context {
    let mut context = tera::Context::new();
    context.insert("definitions", facts.definitions());
    context.insert(
        "roots",
        &facts.root_definitions().collect::<Vec<_>>(),
    );
    context.insert(
        "objects",
        &facts.object_definitions().collect::<Vec<_>>(),
    );
    context.insert(
        "relay_nodes",
        &facts.relay_node_definitions().collect::<Vec<_>>(),
    );
    context.insert(
        "connections",
        &facts.connection_definitions().collect::<Vec<_>>(),
    );
    context
}

fn str_arg(args: &HashMap<String, Value>, name: &str) -> tera::Result<String> {
    args.get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| tera::Error::msg(format!("`{name}` argument must be a string")))
}

fn opt_str_arg(args: &HashMap<String, Value>, name: &str) -> tera::Result<Option<String>> {
    match args.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| tera::Error::msg(format!("`{name}` argument must be a string"))),
    }
}

/// Extracts the `span` of the node passed as the `node` argument.
fn span_arg(args: &HashMap<String, Value>) -> tera::Result<Span> {
    let node = args
        .get("node")
        .ok_or_else(|| tera::Error::msg("`node` argument is required"))?;
    let span = node
        .get("span")
        .ok_or_else(|| tera::Error::msg("`node` argument has no span"))?;
    tera::from_value(span.clone())
        .map_err(|_| tera::Error::msg("`node` argument has a malformed span"))
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer;
    use crate::ast;

    fn setup(schema: &str) -> (TemplateFunctions, Arc<SchemaFacts>) {
        let source = Arc::new(SchemaSource::from_str(schema.to_string()));
        let document = ast::parse(source.text()).unwrap();
        let profile: Arc<LanguageProfile> = Arc::new(
            serde_yaml::from_str(concat!(
                "scalars: {String: string, Int: int, ID: string}\n",
                "roots: [Query]\n",
                "config: {package: generated}\n",
            ))
            .unwrap(),
        );
        let facts = Arc::new(analyzer::analyze(&document, &source, &profile).unwrap());

        let mut fragments = Tera::default();
        fragments.autoescape_on(vec![]);
        fragments
            .add_raw_templates(vec![
                ("NativeNamed", "{{ name }}"),
                ("NativeObject", "*{{ name }}"),
                ("NativeNonNull", "{{ type }}"),
                ("NativeList", "[]{{ type }}"),
                ("SchemaNamed", "{{ name }}"),
                ("SchemaObject", "{{ name }}"),
                ("SchemaNonNull", "{{ type }}!"),
                ("SchemaList", "[{{ type }}]"),
            ])
            .unwrap();

        let functions = TemplateFunctions::new(
            facts.clone(),
            source,
            profile,
            Arc::new(fragments),
        );
        (functions, facts)
    }

    fn render_one(
        functions: &TemplateFunctions,
        facts: &SchemaFacts,
        template: &str,
    ) -> String {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_template("t", template).unwrap();
        functions.register_base(&mut tera);
        tera.render("t", &facts_context(facts)).unwrap()
    }

    #[test]
    fn type_functions_are_callable_from_templates() {
        let (functions, facts) = setup(concat!(
            "type Query { todos: [Todo!]! }\n",
            "type Todo { id: ID! }\n",
        ));
        let out = render_one(
            &functions,
            &facts,
            "{{ native_type(type=\"[Todo!]!\") }}|{{ schema_type(type=\"ID\") }}",
        );
        assert_eq!(out, "[]*Todo|ID");
    }

    #[test]
    fn predicates_and_helpers() {
        let (functions, facts) = setup(concat!(
            "type Query { todos: TodoConnection }\n",
            "type Todo { id: ID! }\n",
        ));
        let out = render_one(
            &functions,
            &facts,
            concat!(
                "{{ is_root(name=\"Query\") }},",
                "{{ is_root(name=\"Todo\") }},",
                "{{ is_relay_connection(type=\"TodoConnection\") }},",
                "{{ is_relay_node(interfaces=[\"Node\"]) }},",
                "{{ public_name(name=\"viewer\") }},",
                "{{ definition_kind(name=\"Todo\") }}",
            ),
        );
        assert_eq!(out, "true,false,true,true,Viewer,Object");
    }

    #[test]
    fn string_helpers_for_template_authors() {
        let (functions, facts) = setup("type Query { id: ID }\n");
        let out = render_one(
            &functions,
            &facts,
            concat!(
                "{{ private_name(name=\"TodoState\") }},",
                "{{ has_prefix(value=\"TodoConnection\", prefix=\"Todo\") }},",
                "{{ has_suffix(value=\"TodoConnection\", suffix=\"Edge\") }}",
            ),
        );
        assert_eq!(out, "todoState,true,false");
    }

    #[test]
    fn config_map_passes_through_verbatim() {
        let (functions, facts) = setup("type Query { id: ID }\n");
        let out = render_one(
            &functions,
            &facts,
            "{% set cfg = config() %}{{ cfg.package }}",
        );
        assert_eq!(out, "generated");
    }

    #[test]
    fn doc_comment_and_raw_text_use_node_spans() {
        let (functions, facts) = setup(concat!(
            "# The root query type.\n",
            "type Query { id: ID }\n",
        ));
        let out = render_one(
            &functions,
            &facts,
            concat!(
                "{% for def in definitions %}",
                "{% for line in doc_comment(node=def) %}// {{ line }}\n{% endfor %}",
                "{{ raw_text(node=def) }}",
                "{% endfor %}",
            ),
        );
        assert_eq!(out, "// The root query type.\ntype Query { id: ID }");
    }

    #[test]
    fn base_file_primitives_are_inert() {
        let (functions, facts) = setup("type Query { id: ID }\n");
        let out = render_one(
            &functions,
            &facts,
            "a{{ start_file(path=\"x.go\") }}b{{ end_file() }}c{{ render_partial(name=\"t\") }}",
        );
        assert_eq!(out, "abc");
    }

    #[test]
    fn unit_file_primitives_emit_markers() {
        let (functions, facts) = setup("type Query { id: ID }\n");
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_template("t", "{{ start_file(path=\"x.go\") }}body{{ end_file() }}")
            .unwrap();
        let slot = Arc::new(OnceLock::new());
        functions.register_unit(&mut tera, slot.clone());
        let tera = Arc::new(tera);
        let _ = slot.set(tera.clone());

        let out = tera.render("t", &facts_context(&facts)).unwrap();
        assert_eq!(
            out,
            format!("{}body{}", emitter::start_file_marker("x.go"), emitter::end_file_marker()),
        );
    }

    #[test]
    fn undefined_type_lookup_fails_the_render() {
        let (functions, facts) = setup("type Query { id: ID }\n");
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_template("t", "{{ native_type(type=\"Ghost\") }}")
            .unwrap();
        functions.register_base(&mut tera);

        let err = tera.render("t", &facts_context(&facts)).unwrap_err();
        let mut message = err.to_string();
        let mut cause: &dyn std::error::Error = &err;
        while let Some(next) = cause.source() {
            message.push_str(&format!(": {next}"));
            cause = next;
        }
        assert!(message.contains("Ghost"));
    }
}
