//! CLI command definitions and dispatch.

pub mod discover;
pub mod ns;
pub mod provision;

use clap::{Parser, Subcommand};

/// nstun: TUN devices for network namespaces.
#[derive(Parser, Debug)]
#[command(name = nstun_common::constants::APP_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create and configure a TUN device inside a network namespace.
    Provision(provision::ProvisionArgs),
    /// List network namespaces owned by containers.
    Discover(discover::DiscoverArgs),
    /// Print the identity of a network namespace.
    Ns(ns::NsArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Provision(args) => provision::execute(args),
        Command::Discover(args) => discover::execute(&args),
        Command::Ns(args) => ns::execute(&args),
    }
}
