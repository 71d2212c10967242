//! `nstun ns`: Print a network namespace identity.

use anyhow::Context;
use clap::Args;
use nstun_core::namespace::NamespaceRef;

/// Arguments for the `ns` command.
#[derive(Args, Debug)]
pub struct NsArgs {
    /// Process whose namespace to inspect (defaults to this process).
    #[arg(long)]
    pub pid: Option<u32>,
}

/// Executes the `ns` command.
///
/// # Errors
///
/// Returns an error if the namespace cannot be opened.
pub fn execute(args: &NsArgs) -> anyhow::Result<()> {
    let ns = match args.pid {
        Some(pid) => NamespaceRef::of_pid(pid).with_context(|| format!("opening namespace of pid {pid}"))?,
        None => NamespaceRef::current().context("opening own namespace")?,
    };
    println!("{}", ns.id()?);
    Ok(())
}
