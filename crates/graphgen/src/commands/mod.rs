mod check;
mod generate;

use crate::Cli;
use crate::CommandResult;
use check::CheckCmd;
use generate::GenerateCmd;

#[derive(Debug, clap::Parser)]
#[command(name = "graphgen")]
pub(crate) enum CommandEnum {
    Check(Box<CheckCmd>),
    Generate(Box<GenerateCmd>),
}
impl CommandEnum {
    pub(crate) async fn run(self, cli: Cli) -> CommandResult {
        match self {
            Self::Check(cmd) => cmd.run(cli).await,
            Self::Generate(cmd) => cmd.run(cli).await,
        }
    }
}
