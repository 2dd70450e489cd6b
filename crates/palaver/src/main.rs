// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Palaver - real-time chat relay with presence and typing.
//!
//! This is the binary entry point: `serve` runs the relay, `client` runs a
//! bridge client on the terminal, `config` prints the effective settings.

mod client;
mod serve;
mod shutdown;

use std::path::PathBuf;
use std::process::ExitCode;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand, ValueEnum};
use palaver_config::PalaverConfig;
use palaver_core::{PalaverError, Sender, SessionId};

/// Palaver - real-time chat relay.
#[derive(Parser, Debug)]
#[command(name = "palaver", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Which side of the conversation the terminal client speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    Visitor,
    Admin,
}

impl From<Role> for Sender {
    fn from(role: Role) -> Self {
        match role {
            Role::Visitor => Sender::Visitor,
            Role::Admin => Sender::Admin,
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the relay server.
    Serve,
    /// Join a session from the terminal; stdin lines are sent as messages.
    Client {
        /// Session to join.
        #[arg(long)]
        session: u64,
        #[arg(long, value_enum, default_value_t = Role::Visitor)]
        role: Role,
    },
    /// Print the effective configuration with secrets redacted.
    Config,
}

fn load(path: Option<&PathBuf>) -> Option<PalaverConfig> {
    let loaded = match path {
        Some(path) => palaver_config::load_and_validate_path(path),
        None => palaver_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => Some(config),
        Err(errors) => {
            palaver_config::render_errors(&errors);
            None
        }
    }
}

/// TOML rendering of `config` with bearer credentials replaced.
fn render_config(config: &PalaverConfig) -> Result<String, PalaverError> {
    toml::to_string_pretty(&config.redacted())
        .map_err(|e| PalaverError::Internal(format!("failed to render config: {e}")))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(config) = load(cli.config.as_ref()) else {
        return ExitCode::FAILURE;
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Client { session, role }) => {
            client::run_client(config, SessionId(session), role.into()).await
        }
        Some(Commands::Config) => render_config(&config).map(|rendered| print!("{rendered}")),
        None => {
            println!("palaver: use --help for available commands");
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("palaver: {e}");
            ExitCode::FAILURE
        }
    }
}
