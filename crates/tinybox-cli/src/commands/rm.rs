//! `tinybox rm` — Remove a stopped container.

use clap::Args;
use tinybox_net::controller::NetworkController;
use tinybox_runtime::lifecycle::remove_container;
use tinybox_runtime::metadata::MetadataStore;

/// Arguments for the `rm` command.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Container name.
    pub name: Option<String>,
}

/// Executes the `rm` command.
///
/// # Errors
///
/// Returns an error if the container is unknown or still running.
pub fn execute(args: RmArgs) -> anyhow::Result<()> {
    let Some(name) = args.name else {
        anyhow::bail!("missing container name");
    };
    let root_dir = std::env::current_dir()?;
    let store = MetadataStore::default();
    let controller = NetworkController::default();
    remove_container(&store, &controller, &root_dir, &name).map_err(|e| anyhow::anyhow!("{e}"))
}
