//! `nstun provision`: Create a TUN device inside a network namespace.

use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use nstun_common::config::TunConfig;
use nstun_core::namespace::NamespaceRef;
use nstun_runtime::{CancelToken, Provisioner, handoff};

use crate::output::{self, BOLD, DIM, GREEN, RESET};

/// Arguments for the `provision` command.
#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// Namespace file to create the device in (e.g. `/run/netns/NAME`).
    #[arg(long, conflicts_with = "pid")]
    pub netns: Option<PathBuf>,

    /// Process whose network namespace receives the device.
    #[arg(long)]
    pub pid: Option<u32>,

    /// IPv6 address to assign.
    #[arg(long)]
    pub address: String,

    /// Link MTU.
    #[arg(long)]
    pub mtu: Option<u32>,

    /// Interface name.
    #[arg(long)]
    pub name: Option<String>,

    /// Bound on the wait for the device handle, in milliseconds.
    #[arg(long, env = "NSTUN_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// JSON configuration file.
    #[arg(long, env = "NSTUN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Unix socket to hand the device descriptor to.
    #[arg(long)]
    pub send_to: Option<PathBuf>,

    /// Exit right after provisioning instead of holding the device.
    #[arg(short, long)]
    pub detach: bool,
}

impl ProvisionArgs {
    /// Builds the effective configuration: file (or defaults), then flags.
    fn tun_config(&self) -> anyhow::Result<TunConfig> {
        let mut config = match &self.config {
            Some(path) => TunConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => TunConfig::default(),
        };
        if let Some(mtu) = self.mtu {
            config.mtu = mtu;
        }
        if let Some(name) = &self.name {
            config.interface_name.clone_from(name);
        }
        if let Some(ms) = self.timeout_ms {
            config.transfer_timeout_ms = Some(ms);
        }
        Ok(config)
    }

    fn namespace(&self) -> anyhow::Result<Option<NamespaceRef>> {
        if let Some(path) = &self.netns {
            return Ok(Some(
                NamespaceRef::open(path).with_context(|| format!("opening {}", path.display()))?,
            ));
        }
        self.pid
            .map(|pid| {
                NamespaceRef::of_pid(pid).with_context(|| format!("opening namespace of pid {pid}"))
            })
            .transpose()
    }
}

/// Executes the `provision` command.
///
/// # Errors
///
/// Returns an error if the configuration, the namespace or the
/// provisioning itself fails.
pub fn execute(args: ProvisionArgs) -> anyhow::Result<()> {
    let config = args.tun_config()?;
    let namespace = args.namespace()?;

    let stop = CancelToken::new();
    let trigger = stop.clone();
    ctrlc::set_handler(move || trigger.cancel())
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    let device = Provisioner::new(config)
        .provision_cancellable(namespace.as_ref(), &args.address, &stop)
        .context("provisioning TUN device")?;

    eprintln!(
        "  {GREEN}{BOLD}{}{RESET} ready in {} {DIM}(fd {}, {}){RESET}",
        device.name(),
        output::target_label(args.netns.as_deref(), args.pid),
        device.as_raw_fd(),
        args.address,
    );

    let _session = match &args.send_to {
        Some(path) => {
            let stream = handoff::send_to_socket(path, &device)
                .with_context(|| format!("handing device to {}", path.display()))?;
            eprintln!("  Handed to {BOLD}{}{RESET}", path.display());
            Some(stream)
        }
        None => None,
    };

    if args.detach {
        return Ok(());
    }

    eprintln!("  Press {BOLD}Ctrl+C{RESET} to release the device...");
    while !stop.is_cancelled() {
        std::thread::sleep(Duration::from_millis(250));
    }
    tracing::info!(name = %device.name(), "releasing device");
    drop(device);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> ProvisionArgs {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: ProvisionArgs,
        }

        let mut argv = vec!["provision", "--address", "fc00::1"];
        argv.extend_from_slice(extra);
        Wrapper::try_parse_from(argv).map(|w| w.args).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn flags_override_defaults() {
        let config = args(&["--mtu", "1280", "--name", "tun7", "--timeout-ms", "500"])
            .tun_config()
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(config.mtu, 1280);
        assert_eq!(config.interface_name, "tun7");
        assert_eq!(config.transfer_timeout_ms, Some(500));
        assert_eq!(config.prefix_len, TunConfig::default().prefix_len);
    }

    #[test]
    fn no_target_means_own_namespace() {
        assert!(args(&[]).namespace().unwrap_or_else(|e| panic!("{e}")).is_none());
    }

    #[test]
    fn missing_config_file_is_reported() {
        let result = args(&["--config", "/nonexistent/nstun.json"]).tun_config();
        assert!(result.is_err());
    }
}
