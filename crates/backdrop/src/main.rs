//! Entry point wiring the CLI to either the render loop or the offline
//! `check` command.

mod check;
mod cli;
mod run;

use std::process::ExitCode;

use cli::Command;

fn main() -> ExitCode {
    let cli = cli::parse();
    run::initialise_tracing();

    let result = match cli.command {
        Some(Command::Check(args)) => check::run_check(&args),
        None => run::run(cli.run),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
