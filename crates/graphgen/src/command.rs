use crate::Cli;
use crate::CommandResult;

/// One executable subcommand. Implemented with `#[inherent::inherent]`
/// so the dispatch enum can call `run` without importing the trait.
pub(crate) trait RunnableCommand: std::fmt::Debug {
    async fn run(self, cli: Cli) -> CommandResult;
}
