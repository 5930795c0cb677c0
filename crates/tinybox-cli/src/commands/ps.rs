//! `tinybox ps` — List all containers.

use tinybox_runtime::metadata::MetadataStore;

/// Executes the `ps` command.
///
/// Renders every container record sorted by ascending create time.
///
/// # Errors
///
/// Returns an error if the metadata root cannot be read.
pub fn execute() -> anyhow::Result<()> {
    let store = MetadataStore::default();
    let containers = store.list().map_err(|e| anyhow::anyhow!("{e}"))?;

    println!(
        "{:<12} {:<15} {:<8} {:<10} {:<24} {:<26} {:<20}",
        "ID", "NAME", "PID", "STATUS", "COMMAND", "CREATED", "IP(s)"
    );
    for c in &containers {
        println!(
            "{:<12} {:<15} {:<8} {:<10} {:<24} {:<26} {:<20}",
            c.id,
            c.name,
            c.pid,
            c.status,
            c.command,
            c.create_time.to_rfc3339(),
            c.ip_nets()
        );
    }
    Ok(())
}
