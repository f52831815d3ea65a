//! Runs the bundled Go language profile against a small schema and
//! checks the generated sources end to end.

use graphgen_core::ast;
use graphgen_core::profile::LanguageProfile;
use graphgen_core::source::SchemaSource;
use graphgen_core::templates::TemplateSet;
use graphgen_core::Generator;
use std::path::Path;
use std::path::PathBuf;

const SCHEMA: &str = r#"
# A single todo item.
type Todo implements Node {
  id: ID!
  title: String
  state: TodoState
}

enum TodoState {
  OPEN
  DONE
}

interface Node {
  id: ID!
}

type Query {
  todos: TodoConnection
  node(id: ID!): Node
}
"#;

fn go_profile_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../languages/go")
}

fn generator() -> Generator {
    let source = SchemaSource::from_str(SCHEMA);
    let document = ast::parse(source.text()).unwrap();
    let profile = LanguageProfile::from_file(go_profile_dir().join("config.yaml")).unwrap();
    let templates = TemplateSet::load(go_profile_dir()).unwrap();
    Generator::new(source, &document, profile, templates).unwrap()
}

#[tokio::test]
async fn generates_definitions_and_adapters() {
    let out = tempfile::tempdir().unwrap();
    let summary = generator().generate(out.path()).await.unwrap();

    let mut files = summary.files.clone();
    files.sort();
    assert_eq!(
        files,
        vec![PathBuf::from("adapters.go"), PathBuf::from("definitions.go")],
    );
    assert!(summary.total_lines > 0);

    let definitions =
        std::fs::read_to_string(out.path().join("definitions.go")).unwrap();
    assert!(definitions.starts_with("// Code generated by graphgen. DO NOT EDIT."));
    assert!(definitions.contains("package generated"));

    // Object with its doc comment, json tags, and resolved field types.
    assert!(definitions.contains("// A single todo item."));
    assert!(definitions.contains("type Todo struct {"));
    assert!(definitions.contains("\tId string `json:\"id\"`"));
    assert!(definitions.contains("\tTitle string `json:\"title\"`"));
    assert!(definitions.contains("\tState TodoState `json:\"state\"`"));

    // Enum values become typed string constants.
    assert!(definitions.contains("type TodoState string"));
    assert!(definitions.contains("\tTodoStateOPEN TodoState = \"OPEN\""));
    assert!(definitions.contains("\tTodoStateDONE TodoState = \"DONE\""));

    // Interfaces render as Go interfaces with getters.
    assert!(definitions.contains("type Node interface {"));
    assert!(definitions.contains("\tGetId() string"));

    // The synthesized connection paginates over its node type.
    assert!(definitions.contains("type TodoConnection struct {"));
    assert!(definitions.contains("Edges      []*Todo `json:\"edges\"`"));

    // The object referencing the connection uses the pointer form.
    assert!(definitions.contains("\tTodos *TodoConnection `json:\"todos\"`"));

    let adapters = std::fs::read_to_string(out.path().join("adapters.go")).unwrap();
    assert!(adapters.contains("type Adapter interface {"));
    assert!(adapters.contains("\tQuery() QueryAdapter"));
    assert!(adapters.contains("type QueryAdapter interface {"));
    assert!(adapters.contains("\tTodos() (*TodoConnection, error)"));
    assert!(adapters.contains("\tNode(id string) (Node, error)"));
}

#[tokio::test]
async fn generation_is_deterministic() {
    let out_a = tempfile::tempdir().unwrap();
    let out_b = tempfile::tempdir().unwrap();
    let a = generator().generate(out_a.path()).await.unwrap();
    let b = generator().generate(out_b.path()).await.unwrap();

    assert_eq!(a.total_lines, b.total_lines);
    for path in &a.files {
        assert_eq!(
            std::fs::read(out_a.path().join(path)).unwrap(),
            std::fs::read(out_b.path().join(path)).unwrap(),
        );
    }
}
