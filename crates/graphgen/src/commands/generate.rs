use crate::output_utils;
use crate::Cli;
use crate::CommandResult;
use crate::RunnableCommand;
use anyhow::Context;
use graphgen_core::ast;
use graphgen_core::profile::LanguageProfile;
use graphgen_core::profile::ProjectConfig;
use graphgen_core::source::SchemaSource;
use graphgen_core::templates::TemplateSet;
use graphgen_core::GenerateSummary;
use graphgen_core::Generator;
use std::path::Path;
use std::path::PathBuf;

const LANGUAGES_DIR: &str = "languages";
const PROFILE_FILE: &str = "config.yaml";

#[derive(Debug, clap::Args)]
pub(crate) struct GenerateCmd {
    #[arg(
        default_value="graphgen.yaml",
        help="Path to the project config file. Schema, language, and output \
             paths in the config are resolved relative to its directory.",
        long,
        short='c',
    )]
    config: PathBuf,

    #[arg(
        help="Write generated files under this directory instead of the \
             output directory named in the project config.",
        long,
        short='o',
    )]
    output: Option<PathBuf>,
}

#[inherent::inherent]
impl RunnableCommand for GenerateCmd {
    pub async fn run(self, _cli: Cli) -> CommandResult {
        match self.generate().await {
            Ok(summary) => {
                let mut listing = String::new();
                for path in &summary.files {
                    listing.push_str(&format!("  * {}\n", path.display()));
                }
                CommandResult::stdout(format_args!(
                    "{} Generated {} lines of code:\n{listing}",
                    output_utils::GREEN_CHECK,
                    summary.total_lines,
                ))
            },

            Err(e) => CommandResult::stderr(format_args!(
                "{} Generation failed: {e:#}",
                output_utils::RED_X,
            )),
        }
    }
}

impl GenerateCmd {
    async fn generate(&self) -> anyhow::Result<GenerateSummary> {
        let base_dir = self.config.parent().unwrap_or(Path::new("")).to_path_buf();
        let config = ProjectConfig::from_file(&self.config)
            .with_context(|| format!("loading project config {:?}", self.config))?;

        let schema_paths: Vec<PathBuf> = config
            .schemas
            .iter()
            .map(|path| base_dir.join(path))
            .collect();
        log::debug!("Combining {} schema files...", schema_paths.len());
        let source = SchemaSource::from_files(&schema_paths)?;
        let document = ast::parse(source.text())
            .context("parsing combined schema text")?;

        let lang_dir = base_dir.join(LANGUAGES_DIR).join(&config.language);
        let profile = LanguageProfile::from_file(lang_dir.join(PROFILE_FILE))
            .with_context(|| format!("loading language profile `{}`", config.language))?;
        let templates = TemplateSet::load(&lang_dir)?;

        let generator = Generator::new(source, &document, profile, templates)?;
        log::debug!(
            "Schema analyzed: {} definitions.",
            generator.facts().definitions().len(),
        );

        let out_dir = self
            .output
            .clone()
            .unwrap_or_else(|| base_dir.join(&config.output));
        let summary = generator.generate(&out_dir).await?;
        Ok(summary)
    }
}
