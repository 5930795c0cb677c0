//! `tinybox exec` — Execute a command inside a running container.

use clap::Args;
use tinybox_common::constants;
use tinybox_runtime::metadata::MetadataStore;

/// Arguments for the `exec` command.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Container name followed by the command to execute.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Executes the `exec` command.
///
/// # Errors
///
/// Returns an error if the container is missing, not running, or the
/// re-exec fails.
pub fn execute(args: ExecArgs) -> anyhow::Result<()> {
    // The re-exec'ed child is captured by the pre-main constructor; this
    // branch is only reached if the constructor declined to run.
    if std::env::var(constants::ENV_NSENTER_PID).is_ok() {
        tracing::info!("nsenter callback reached command handling");
        return Ok(());
    }

    if args.args.len() < 2 {
        anyhow::bail!("missing container name or command");
    }
    let name = &args.args[0];
    let command = &args.args[1..];

    let store = MetadataStore::default();
    let code = tinybox_runtime::exec::exec_container(&store, name, command)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
