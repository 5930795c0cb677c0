//! `tinybox stop` — Stop a running container.

use clap::Args;
use tinybox_runtime::lifecycle::stop_container;
use tinybox_runtime::metadata::MetadataStore;

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Container name.
    pub name: Option<String>,
}

/// Executes the `stop` command.
///
/// # Errors
///
/// Returns an error if the container is unknown or signaling fails.
pub fn execute(args: StopArgs) -> anyhow::Result<()> {
    let Some(name) = args.name else {
        anyhow::bail!("missing container name");
    };
    let store = MetadataStore::default();
    stop_container(&store, &name).map_err(|e| anyhow::anyhow!("{e}"))
}
