use crate::output_utils;
use crate::Cli;
use crate::CommandResult;
use crate::RunnableCommand;
use anyhow::Context;
use graphgen_core::ast;
use graphgen_core::profile::LanguageProfile;
use graphgen_core::profile::ProjectConfig;
use graphgen_core::source::SchemaSource;
use graphgen_core::SchemaFacts;
use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, clap::Args)]
pub(crate) struct CheckCmd {
    #[arg(
        default_value="graphgen.yaml",
        help="Path to the project config file.",
        long,
        short='c',
    )]
    config: PathBuf,
}

#[inherent::inherent]
impl RunnableCommand for CheckCmd {
    pub async fn run(self, _cli: Cli) -> CommandResult {
        match self.check().await {
            Ok(facts) => CommandResult::stdout(format_args!(
                concat!(
                    "{} Schema checked successfully:\n",
                    "  * {} type definitions.\n",
                    "  * {} operation roots.\n",
                    "  * {} relay node types.\n",
                    "  * {} connection types.",
                ),
                output_utils::GREEN_CHECK,
                facts.definitions().len(),
                facts.root_definitions().count(),
                facts.relay_node_definitions().count(),
                facts.connection_definitions().count(),
            )),

            Err(e) => CommandResult::stderr(format_args!(
                "{} Schema check failed: {e:#}",
                output_utils::RED_X,
            )),
        }
    }
}

impl CheckCmd {
    async fn check(&self) -> anyhow::Result<SchemaFacts> {
        let base_dir = self.config.parent().unwrap_or(Path::new("")).to_path_buf();
        let config = ProjectConfig::from_file(&self.config)
            .with_context(|| format!("loading project config {:?}", self.config))?;

        let schema_paths: Vec<PathBuf> = config
            .schemas
            .iter()
            .map(|path| base_dir.join(path))
            .collect();
        let source = SchemaSource::from_files(&schema_paths)?;
        let document = ast::parse(source.text())
            .context("parsing combined schema text")?;

        let profile_path = base_dir
            .join("languages")
            .join(&config.language)
            .join("config.yaml");
        let profile = LanguageProfile::from_file(profile_path)
            .with_context(|| format!("loading language profile `{}`", config.language))?;

        let facts = graphgen_core::analyzer::analyze(&document, &source, &profile)?;
        Ok(facts)
    }
}
