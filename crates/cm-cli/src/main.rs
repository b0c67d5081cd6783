//! colmig CLI - versioned collection-schema migrations for SQLite

use clap::Parser;
use std::process::ExitCode;

mod cli;
mod commands;
mod context;
mod logging;

use cli::Cli;
use commands::{common, create, down, history_sync, status, up};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _logger = logging::init(cli.global.verbose);

    let result = match &cli.command {
        cli::Commands::Up(args) => up::execute(args, &cli.global).await,
        cli::Commands::Down(args) => down::execute(args, &cli.global).await,
        cli::Commands::Status(args) => status::execute(args, &cli.global).await,
        cli::Commands::Create(args) => create::execute(args, &cli.global).await,
        cli::Commands::HistorySync => history_sync::execute(&cli.global).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let failure = common::Failure::classify(&err);
            eprintln!("ERROR {}: {}", failure.kind, failure.details);
            ExitCode::from(failure.exit_code)
        }
    }
}
