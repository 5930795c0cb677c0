//! `tinybox commit` — Package a container's filesystem into an image.

use clap::Args;
use tinybox_runtime::lifecycle::commit_container;

/// Arguments for the `commit` command.
#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Container name; the image lands in `<name>.tar`.
    pub name: Option<String>,
}

/// Executes the `commit` command.
///
/// # Errors
///
/// Returns an error if the archiver fails.
pub fn execute(args: CommitArgs) -> anyhow::Result<()> {
    let Some(name) = args.name else {
        anyhow::bail!("missing container name");
    };
    let root_dir = std::env::current_dir()?;
    commit_container(&root_dir, &name).map_err(|e| anyhow::anyhow!("{e}"))
}
