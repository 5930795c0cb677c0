//! `tinybox init` — Internal container init stage.

/// Executes the `init` command inside the freshly created namespaces.
///
/// # Errors
///
/// Returns an error if container initialization fails; on success the
/// process is replaced by the user command and never returns.
pub fn execute() -> anyhow::Result<()> {
    tracing::info!("init stage entered");
    tinybox_runtime::init::run_container_init().map_err(|e| anyhow::anyhow!("{e}"))
}
