//! rpc: Discord rich presence from the terminal.
//!
//! ## Subcommands
//!
//! - `run` (default): keep the presence alive in the foreground
//! - `setup` / `reset`: interactive configuration
//! - `detach`, `status`, `stop`: manage the background instance
//! - `daemon`: the background instance itself (spawned internally)

mod background;
mod daemon;
mod error;
mod foreground;
mod format;
mod logging;
mod setup;

use clap::{Parser, Subcommand};
use std::io;
use std::process::ExitCode;

use simplerpc_core::{BackgroundSupervisor, EnvFileStore, Paths};

use crate::error::CliError;
use crate::logging::LogTarget;

#[derive(Parser)]
#[command(name = "rpc")]
#[command(about = "Discord rich presence from the terminal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep the presence alive in this terminal (default)
    Run,

    /// Run the setup wizard
    Setup,

    /// Delete the configuration and run the setup wizard
    Reset,

    /// Run in the background
    Detach,

    /// Check whether a background process is running
    Status,

    /// Stop the background process
    Stop,

    /// Background instance (spawned by `detach`)
    #[command(hide = true)]
    Daemon,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);

    let paths = match Paths::resolve() {
        Ok(paths) => paths,
        Err(err) => {
            eprintln!("Error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let target = match command {
        Commands::Daemon => LogTarget::Daemon,
        _ => LogTarget::Foreground,
    };
    let _logging_guard = logging::init(&paths.log_dir(), target);

    match execute(command, &paths) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %err, "Command failed");
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn execute(command: Commands, paths: &Paths) -> Result<bool, CliError> {
    let mut stdout = io::stdout();
    match command {
        Commands::Run => foreground::run(paths).map(|_| true),
        Commands::Setup | Commands::Reset => {
            let mut store = EnvFileStore::load(paths.config_file())?;
            let reset = matches!(command, Commands::Reset);
            setup::run(&mut store, reset, io::stdin().lock(), &mut stdout)?;
            Ok(true)
        }
        Commands::Detach => {
            let config = EnvFileStore::load(paths.config_file())?
                .snapshot()
                .with_env_overrides();
            background::detach(&BackgroundSupervisor::new(paths.clone()), &config, &mut stdout)
        }
        Commands::Status => background::status(&BackgroundSupervisor::new(paths.clone()), &mut stdout),
        Commands::Stop => background::stop(&BackgroundSupervisor::new(paths.clone()), &mut stdout),
        Commands::Daemon => daemon::run(paths).map(|_| true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["rpc"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn daemon_is_hidden_but_parses() {
        let cli = Cli::try_parse_from(["rpc", "daemon"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Daemon)));

        let help = Cli::command().render_help().to_string();
        assert!(!help.contains("daemon"));
        assert!(help.contains("detach"));
    }
}
