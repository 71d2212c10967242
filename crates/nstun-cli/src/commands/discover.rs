//! `nstun discover`: List container network namespaces.

use anyhow::Context;
use clap::Args;

use crate::output;

/// Arguments for the `discover` command.
#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Print only the pids, one per line.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Executes the `discover` command.
///
/// # Errors
///
/// Returns an error if `/proc` cannot be scanned.
pub fn execute(args: &DiscoverArgs) -> anyhow::Result<()> {
    let found = nstun_core::namespace::discover().context("scanning /proc")?;

    if args.quiet {
        for ns in &found {
            println!("{}", ns.pid);
        }
        return Ok(());
    }

    if found.is_empty() {
        println!("No container namespaces found.");
        return Ok(());
    }

    println!("{}", output::namespace_header());
    for ns in &found {
        println!("{}", output::namespace_row(ns));
    }
    Ok(())
}
