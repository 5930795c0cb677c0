//! `tinybox logs` — Print the logs of a container.

use clap::Args;
use tinybox_runtime::metadata::MetadataStore;

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Container name.
    pub name: Option<String>,
}

/// Executes the `logs` command.
///
/// # Errors
///
/// Returns an error if the container or its log file is missing.
pub fn execute(args: LogsArgs) -> anyhow::Result<()> {
    let Some(name) = args.name else {
        anyhow::bail!("missing container name");
    };
    let store = MetadataStore::default();
    let logs = store.read_log(&name).map_err(|e| anyhow::anyhow!("{e}"))?;
    print!("{logs}");
    Ok(())
}
