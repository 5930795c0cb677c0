//! `tinybox run` — Create and run a container.

use std::collections::BTreeMap;

use clap::Args;
use tinybox_common::constants;
use tinybox_common::types::ResourceConfig;
use tinybox_runtime::metadata::MetadataStore;
use tinybox_runtime::process::{run_container, RunConfig};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Enable tty: wire the container to the current terminal.
    #[arg(long = "it")]
    pub tty: bool,

    /// Detach: leave the container running in the background.
    #[arg(short = 'd')]
    pub detach: bool,

    /// Container name.
    #[arg(long, default_value = "")]
    pub name: String,

    /// Memory limit (e.g. "100m").
    #[arg(long)]
    pub mem: Option<String>,

    /// CPU set limit.
    #[arg(long = "cpu-set")]
    pub cpu_set: Option<String>,

    /// CPU share limit.
    #[arg(long = "cpu-share")]
    pub cpu_share: Option<String>,

    /// Image tar file name, relative to the current directory.
    #[arg(long = "image-tar", default_value = constants::DEFAULT_IMAGE_TAR)]
    pub image_tar: String,

    /// Bind volume, hostPath:containerPath. May be repeated.
    #[arg(short = 'v')]
    pub volumes: Vec<String>,

    /// Environment variable for the container. May be repeated.
    #[arg(short = 'e')]
    pub envs: Vec<String>,

    /// Network to attach the container to.
    #[arg(long)]
    pub network: Option<String>,

    /// Port mapping, hostPort:containerPort. May be repeated.
    #[arg(short = 'p')]
    pub ports: Vec<String>,

    /// Command to run as the container's init process.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Executes the `run` command.
///
/// # Errors
///
/// Returns an error if the arguments are invalid or construction fails.
pub fn execute(args: RunArgs) -> anyhow::Result<()> {
    if args.command.is_empty() {
        anyhow::bail!("missing container command");
    }
    let port_mappings = parse_port_mappings(&args.ports)?;

    tracing::info!(
        command = ?args.command,
        name = %args.name,
        tty = args.tty,
        detach = args.detach,
        "run requested"
    );

    let config = RunConfig {
        tty: args.tty,
        detach: args.detach,
        name: args.name,
        image_tar: args.image_tar,
        network: args.network,
        envs: args.envs,
        args: args.command,
        volumes: args.volumes,
        port_mappings,
        resources: ResourceConfig {
            memory_limit: args.mem,
            cpu_share: args.cpu_share,
            cpu_set: args.cpu_set,
        },
    };

    let store = MetadataStore::default();
    run_container(&store, &config).map_err(|e| anyhow::anyhow!("{e}"))
}

/// Parses `hostPort:containerPort` mappings, rejecting duplicates of the
/// host port.
fn parse_port_mappings(specs: &[String]) -> anyhow::Result<BTreeMap<u16, u16>> {
    let mut mappings = BTreeMap::new();
    for spec in specs {
        let Some((host, container)) = spec.split_once(':') else {
            anyhow::bail!("invalid port mapping: {spec}");
        };
        let host: u16 = host
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid host port in port mappings: {host}"))?;
        let container: u16 = container
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid container port in port mappings: {container}"))?;
        if mappings.insert(host, container).is_some() {
            anyhow::bail!("duplicate host port in port mappings: {host}");
        }
    }
    Ok(mappings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_mappings_parse_and_collect() {
        let mappings =
            parse_port_mappings(&["8080:80".into(), "8443:443".into()]).expect("parse");
        assert_eq!(mappings.get(&8080), Some(&80));
        assert_eq!(mappings.get(&8443), Some(&443));
    }

    #[test]
    fn malformed_port_mapping_is_rejected() {
        assert!(parse_port_mappings(&["8080".into()]).is_err());
        assert!(parse_port_mappings(&["abc:80".into()]).is_err());
        assert!(parse_port_mappings(&["8080:def".into()]).is_err());
    }

    #[test]
    fn duplicate_host_port_is_rejected() {
        let err = parse_port_mappings(&["8080:80".into(), "8080:81".into()]).unwrap_err();
        assert!(err.to_string().contains("duplicate host port"));
    }
}
