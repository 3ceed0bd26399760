//! Command dispatcher that routes parsed clap commands to their handlers.

mod returns;
mod summary;

use anyhow::Result;

use crate::cli::Commands;

/// Route a parsed command to its handler
pub fn dispatch_command(command: &Commands, json_output: bool) -> Result<()> {
    match command {
        Commands::Summary {
            ledger,
            config,
            end,
            export,
        } => summary::dispatch_summary(
            ledger,
            config.as_deref(),
            end.as_deref(),
            export.as_deref(),
            json_output,
        ),
        Commands::Returns(args) => returns::dispatch_returns(args, json_output),
    }
}
