use crate::analyzer;
use crate::analyzer::AnalyzeErrors;
use crate::ast;
use crate::emitter::EmitError;
use crate::emitter::EmittedFile;
use crate::emitter::FileEmitter;
use crate::facts::SchemaFacts;
use crate::formatter::CodeFormatter;
use crate::functions::facts_context;
use crate::functions::TemplateFunctions;
use crate::profile::LanguageProfile;
use crate::source::SchemaSource;
use crate::templates::TemplateError;
use crate::templates::TemplateSet;
use std::collections::HashSet;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

type Result<T> = std::result::Result<T, GenerateError>;

#[derive(Clone, Debug, PartialEq)]
pub struct GenerateSummary {
    pub total_lines: usize,
    /// Paths written, relative to the output directory.
    pub files: Vec<PathBuf>,
}

/// Owns one generator run: analyzes the schema once, then executes one
/// concurrent generation unit per configured top-level template.
pub struct Generator {
    facts: Arc<SchemaFacts>,
    profile: Arc<LanguageProfile>,
    templates: Arc<TemplateSet>,
    functions: TemplateFunctions,
}

impl Generator {
    pub fn new(
        source: SchemaSource,
        document: &ast::Document,
        profile: LanguageProfile,
        templates: TemplateSet,
    ) -> Result<Self> {
        let facts = Arc::new(analyzer::analyze(document, &source, &profile)?);
        let profile = Arc::new(profile);
        let fragments = Arc::new(templates.build_engine()?);
        let functions = TemplateFunctions::new(
            facts.clone(),
            Arc::new(source),
            profile.clone(),
            fragments,
        );

        Ok(Self {
            facts,
            profile,
            templates: Arc::new(templates),
            functions,
        })
    }

    pub fn facts(&self) -> &SchemaFacts {
        &self.facts
    }

    /// Runs every configured top-level template concurrently, then
    /// writes all emitted files under `out_dir`. Returns the aggregate
    /// newline-terminated line count across all formatted output.
    pub async fn generate(&self, out_dir: &Path) -> Result<GenerateSummary> {
        for name in &self.profile.templates {
            if !self.templates.contains(name) {
                return Err(GenerateError::MissingEntryTemplate {
                    name: name.clone(),
                });
            }
        }

        // The line-count aggregator is the one piece of genuine
        // synchronization: a single consumer draining partial counts,
        // ended by the channel closing once every unit has reported.
        let (count_tx, mut count_rx) = mpsc::unbounded_channel::<usize>();
        let aggregator = tokio::spawn(async move {
            let mut total = 0;
            while let Some(lines) = count_rx.recv().await {
                total += lines;
            }
            total
        });

        let mut units: JoinSet<Result<Vec<EmittedFile>>> = JoinSet::new();
        for name in &self.profile.templates {
            units.spawn(run_unit(
                name.clone(),
                self.functions.clone(),
                self.templates.clone(),
                self.facts.clone(),
                CodeFormatter::from_config(&self.profile.formatter),
                count_tx.clone(),
            ));
        }
        drop(count_tx);

        let mut emitted = vec![];
        while let Some(joined) = units.join_next().await {
            let files = joined.map_err(|err| GenerateError::UnitFailed {
                message: err.to_string(),
            })??;
            emitted.extend(files);
        }

        let total_lines = aggregator
            .await
            .map_err(|err| GenerateError::UnitFailed {
                message: err.to_string(),
            })?;

        // Units never touch the filesystem themselves. All writes
        // happen here, after the join barrier, so overlapping target
        // paths are a detectable error instead of a silent race.
        let mut seen: HashSet<PathBuf> = HashSet::new();
        for file in &emitted {
            if file.path.is_absolute()
                || file.path.components().any(|c| matches!(c, Component::ParentDir))
            {
                return Err(GenerateError::UnsafeOutputPath {
                    path: file.path.clone(),
                });
            }
            if !seen.insert(file.path.clone()) {
                return Err(GenerateError::ConflictingOutputPath {
                    path: file.path.clone(),
                });
            }
        }

        let mut files = vec![];
        for file in emitted {
            let target = out_dir.join(&file.path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|err| GenerateError::WriteFailed {
                        path: target.clone(),
                        err,
                    })?;
            }
            tokio::fs::write(&target, &file.bytes)
                .await
                .map_err(|err| GenerateError::WriteFailed {
                    path: target.clone(),
                    err,
                })?;
            log::debug!("wrote {} ({} lines)", target.display(), file.lines);
            files.push(file.path);
        }

        Ok(GenerateSummary { total_lines, files })
    }
}

/// One generation unit: its own engine with freshly bound file
/// primitives, its own emitter, one entry-point template execution.
async fn run_unit(
    name: String,
    functions: TemplateFunctions,
    templates: Arc<TemplateSet>,
    facts: Arc<SchemaFacts>,
    formatter: CodeFormatter,
    count_tx: mpsc::UnboundedSender<usize>,
) -> Result<Vec<EmittedFile>> {
    let mut engine = templates.build_engine()?;
    let slot = Arc::new(OnceLock::new());
    functions.register_unit(&mut engine, slot.clone());
    let engine = Arc::new(engine);
    let _ = slot.set(engine.clone());

    let rendered = engine
        .render(&name, &facts_context(&facts))
        .map_err(|err| GenerateError::TemplateRender {
            template: name.clone(),
            err: Box::new(err),
        })?;

    let mut emitter = FileEmitter::new();
    emitter.consume(&rendered, &formatter).await?;
    let (files, lines) = emitter.finish()?;
    log::debug!("unit `{name}` emitted {} files ({lines} lines)", files.len());

    // Receiver only closes after every sender is dropped; a failed
    // send means the whole run is already being torn down.
    let _ = count_tx.send(lines);
    Ok(files)
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Analyze(#[from] AnalyzeErrors),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("no entry-point template named `{name}` exists in the language template set")]
    MissingEntryTemplate {
        name: String,
    },

    #[error("template `{template}` failed to render: {err}")]
    TemplateRender {
        template: String,
        err: Box<tera::Error>,
    },

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error("generation unit failed: {message}")]
    UnitFailed {
        message: String,
    },

    #[error("two generation units emitted the same output path {path:?}")]
    ConflictingOutputPath {
        path: PathBuf,
    },

    #[error("emitted output path {path:?} escapes the output directory")]
    UnsafeOutputPath {
        path: PathBuf,
    },

    #[error("failed to write {path:?}: {err}")]
    WriteFailed {
        path: PathBuf,
        err: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(templates: &[&str]) -> LanguageProfile {
        let mut profile: LanguageProfile = serde_yaml::from_str(concat!(
            "scalars: {String: string, Int: int, ID: string}\n",
            "roots: [Query]\n",
            "config: {package: generated}\n",
        ))
        .unwrap();
        profile.templates = templates.iter().map(|s| s.to_string()).collect();
        profile
    }

    fn fragment_sources() -> Vec<(&'static str, &'static str)> {
        vec![
            ("NativeNamed", "{{ name }}"),
            ("NativeObject", "*{{ name }}"),
            ("NativeConnection", "*{{ name }}"),
            ("NativeNonNull", "{{ type }}"),
            ("NativeList", "[]{{ type }}"),
            ("SchemaNamed", "{{ name }}"),
            ("SchemaObject", "{{ name }}"),
            ("SchemaNonNull", "{{ type }}!"),
            ("SchemaList", "[{{ type }}]"),
        ]
    }

    fn generator(
        schema: &str,
        profile: LanguageProfile,
        entries: Vec<(&str, &str)>,
    ) -> Generator {
        let source = SchemaSource::from_str(schema.to_string());
        let document = ast::parse(source.text()).unwrap();
        let mut sources = fragment_sources();
        sources.extend(entries);
        Generator::new(source, &document, profile, TemplateSet::from_sources(sources))
            .unwrap()
    }

    #[tokio::test]
    async fn generates_files_from_one_entry_template() {
        let out = tempfile::tempdir().unwrap();
        let generator = generator(
            "type Query { todos: [Todo!]! }\ntype Todo { id: ID!, title: String }\n",
            profile(&["definitions"]),
            vec![(
                "definitions",
                concat!(
                    "{{ start_file(path=\"definitions.go\") }}",
                    "package generated\n",
                    "{% for def in objects %}",
                    "type {{ public_name(name=def.name) }} struct {\n",
                    "{% for field in def.fields %}",
                    "    {{ public_name(name=field.name) }} {{ native_type(type=field.type_text) }}\n",
                    "{% endfor %}",
                    "}\n",
                    "{% endfor %}",
                    "{{ end_file() }}",
                ),
            )],
        );

        let summary = generator.generate(out.path()).await.unwrap();
        assert_eq!(summary.files, vec![PathBuf::from("definitions.go")]);

        let written =
            std::fs::read_to_string(out.path().join("definitions.go")).unwrap();
        assert!(written.contains("type Query struct {"));
        assert!(written.contains("    Todos []*Todo\n"));
        assert!(written.contains("    Title string\n"));
        assert_eq!(
            summary.total_lines,
            written.matches('\n').count(),
        );
    }

    #[tokio::test]
    async fn one_traversal_can_emit_nested_files() {
        let out = tempfile::tempdir().unwrap();
        let generator = generator(
            "type Query { todo: Todo }\ntype Todo { id: ID! }\n",
            profile(&["split"]),
            vec![(
                "split",
                concat!(
                    "{{ start_file(path=\"outer.go\") }}outer\n",
                    "{% for def in objects %}",
                    "{{ start_file(path=\"types/\" ~ def.name ~ \".go\") }}",
                    "// {{ def.name }}\n",
                    "{{ end_file() }}",
                    "{% endfor %}",
                    "{{ end_file() }}",
                ),
            )],
        );

        let summary = generator.generate(out.path()).await.unwrap();
        assert_eq!(summary.files.len(), 3);
        assert!(out.path().join("types/Query.go").is_file());
        assert!(out.path().join("types/Todo.go").is_file());
        assert_eq!(
            std::fs::read_to_string(out.path().join("outer.go")).unwrap(),
            "outer\n",
        );
    }

    #[tokio::test]
    async fn units_run_for_each_configured_template() {
        let out = tempfile::tempdir().unwrap();
        let generator = generator(
            "type Query { id: ID }\n",
            profile(&["defs", "adapters"]),
            vec![
                ("defs", "{{ start_file(path=\"defs.go\") }}defs\n{{ end_file() }}"),
                ("adapters", "{{ start_file(path=\"adapters.go\") }}adp\n{{ end_file() }}"),
            ],
        );

        let summary = generator.generate(out.path()).await.unwrap();
        assert_eq!(summary.total_lines, 2);
        assert!(out.path().join("defs.go").is_file());
        assert!(out.path().join("adapters.go").is_file());
    }

    #[tokio::test]
    async fn overlapping_output_paths_are_rejected() {
        let out = tempfile::tempdir().unwrap();
        let generator = generator(
            "type Query { id: ID }\n",
            profile(&["a", "b"]),
            vec![
                ("a", "{{ start_file(path=\"same.go\") }}a\n{{ end_file() }}"),
                ("b", "{{ start_file(path=\"same.go\") }}b\n{{ end_file() }}"),
            ],
        );

        let err = generator.generate(out.path()).await.unwrap_err();
        assert!(matches!(
            err,
            GenerateError::ConflictingOutputPath { path } if path == PathBuf::from("same.go"),
        ));
        assert!(!out.path().join("same.go").exists());
    }

    #[tokio::test]
    async fn escaping_output_paths_are_rejected() {
        let out = tempfile::tempdir().unwrap();
        let generator = generator(
            "type Query { id: ID }\n",
            profile(&["sneaky"]),
            vec![(
                "sneaky",
                "{{ start_file(path=\"../escape.go\") }}x\n{{ end_file() }}",
            )],
        );

        let err = generator.generate(out.path()).await.unwrap_err();
        assert!(matches!(err, GenerateError::UnsafeOutputPath { .. }));
    }

    #[tokio::test]
    async fn missing_entry_template_is_an_error() {
        let out = tempfile::tempdir().unwrap();
        let generator = generator(
            "type Query { id: ID }\n",
            profile(&["nonexistent"]),
            vec![("defs", "x")],
        );

        let err = generator.generate(out.path()).await.unwrap_err();
        assert!(matches!(
            err,
            GenerateError::MissingEntryTemplate { name } if name == "nonexistent",
        ));
    }

    #[tokio::test]
    async fn unclosed_file_fails_the_run() {
        let out = tempfile::tempdir().unwrap();
        let generator = generator(
            "type Query { id: ID }\n",
            profile(&["broken"]),
            vec![("broken", "{{ start_file(path=\"x.go\") }}never closed")],
        );

        let err = generator.generate(out.path()).await.unwrap_err();
        assert!(matches!(
            err,
            GenerateError::Emit(EmitError::UnclosedFile { .. }),
        ));
    }

    #[tokio::test]
    async fn render_partial_composes_with_file_markers() {
        let out = tempfile::tempdir().unwrap();
        let generator = generator(
            "type Query { id: ID }\ntype Todo { id: ID! }\n",
            profile(&["main"]),
            vec![
                (
                    "main",
                    concat!(
                        "{{ start_file(path=\"all.go\") }}",
                        "{% for def in objects %}{{ render_partial(name=\"one\", with=def) }}{% endfor %}",
                        "{{ end_file() }}",
                    ),
                ),
                ("one", "type {{ node.name }}\n"),
            ],
        );

        let summary = generator.generate(out.path()).await.unwrap();
        assert_eq!(summary.total_lines, 2);
        assert_eq!(
            std::fs::read_to_string(out.path().join("all.go")).unwrap(),
            "type Query\ntype Todo\n",
        );
    }

    #[tokio::test]
    async fn analysis_errors_surface_before_any_unit_runs() {
        let source = SchemaSource::from_str("type Query { ghost: Ghost }\n");
        let document = ast::parse(source.text()).unwrap();
        let err = Generator::new(
            source,
            &document,
            profile(&["defs"]),
            TemplateSet::from_sources(fragment_sources()),
        )
        .map(|_| ())
        .unwrap_err();

        assert!(err.to_string().contains("Ghost"));
    }
}
