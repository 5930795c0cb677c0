//! `tinybox network` — Manage container networks.

use clap::{Args, Subcommand};
use tinybox_common::constants;
use tinybox_net::controller::NetworkController;

/// Arguments for the `network` command.
#[derive(Args, Debug)]
pub struct NetworkArgs {
    /// Network subcommand to execute.
    #[command(subcommand)]
    pub command: NetworkCommand,
}

/// Network subcommands.
#[derive(Subcommand, Debug)]
pub enum NetworkCommand {
    /// Create a container network.
    Create {
        /// Network driver name.
        #[arg(long, default_value = constants::DRIVER_BRIDGE)]
        driver: String,
        /// Subnet in CIDR notation.
        #[arg(long)]
        subnet: Option<String>,
        /// Network name.
        name: Option<String>,
    },
    /// List the existing container networks.
    List,
    /// Delete a container network.
    Delete {
        /// Network name.
        name: Option<String>,
    },
}

/// Executes the `network` command.
///
/// # Errors
///
/// Returns an error if the subcommand fails.
pub fn execute(args: NetworkArgs) -> anyhow::Result<()> {
    let controller = NetworkController::default();
    match args.command {
        NetworkCommand::Create {
            driver,
            subnet,
            name,
        } => {
            let Some(name) = name else {
                anyhow::bail!("missing network name");
            };
            let Some(subnet) = subnet else {
                anyhow::bail!("missing subnet");
            };
            let network = controller
                .create_network(&driver, &subnet, &name)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            tracing::info!(network = %network.name, "network created");
            Ok(())
        }
        NetworkCommand::List => {
            let networks = controller.list_networks().map_err(|e| anyhow::anyhow!("{e}"))?;
            println!(
                "{:<15} {:<18} {:<15} {:<8}",
                "NAME", "SUBNET", "GATEWAY", "DRIVER"
            );
            for network in &networks {
                println!(
                    "{:<15} {:<18} {:<15} {:<8}",
                    network.name,
                    network.subnet,
                    network.gateway.ip(),
                    network.driver
                );
            }
            Ok(())
        }
        NetworkCommand::Delete { name } => {
            let Some(name) = name else {
                anyhow::bail!("missing network name");
            };
            controller
                .delete_network(&name)
                .map_err(|e| anyhow::anyhow!("{e}"))
        }
    }
}
