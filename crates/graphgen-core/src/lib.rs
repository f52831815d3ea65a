pub mod analyzer;
pub mod ast;
pub mod emitter;
pub mod facts;
pub mod formatter;
pub mod functions;
pub mod loc;
pub mod orchestrator;
pub mod profile;
pub mod resolver;
pub mod source;
pub mod templates;
pub mod type_expr;

pub use analyzer::AnalyzeError;
pub use analyzer::AnalyzeErrors;
pub use emitter::EmittedFile;
pub use emitter::FileEmitter;
pub use facts::Definition;
pub use facts::DefinitionKind;
pub use facts::SchemaFacts;
pub use formatter::CodeFormatter;
pub use loc::Span;
pub use orchestrator::GenerateError;
pub use orchestrator::GenerateSummary;
pub use orchestrator::Generator;
pub use profile::LanguageProfile;
pub use profile::ProjectConfig;
pub use resolver::TypeClass;
pub use resolver::TypeResolver;
pub use source::SchemaSource;
pub use templates::TemplateSet;
pub use type_expr::TypeExpr;
