//! NAT egress rules via the external `iptables` binary.
//!
//! Container subnets get a single MASQUERADE rule on the nat table's
//! POSTROUTING chain, matching traffic leaving the subnet through any
//! interface other than its own bridge.

use std::process::Command;

use ipnetwork::Ipv4Network;
use tinybox_common::error::{Result, TinyboxError};

/// Appends the MASQUERADE rule for a subnet.
///
/// # Errors
///
/// Returns an error if `iptables` cannot be spawned or reports failure.
pub fn append_masquerade(subnet: &Ipv4Network, bridge: &str) -> Result<()> {
    run_iptables(&masquerade_args("-A", subnet, bridge))
}

/// Deletes the MASQUERADE rule for a subnet.
///
/// # Errors
///
/// Returns an error if `iptables` cannot be spawned or reports failure.
pub fn delete_masquerade(subnet: &Ipv4Network, bridge: &str) -> Result<()> {
    run_iptables(&masquerade_args("-D", subnet, bridge))
}

/// `-t nat <action> POSTROUTING -s <subnet> ! -o <bridge> -j MASQUERADE`
fn masquerade_args(action: &str, subnet: &Ipv4Network, bridge: &str) -> Vec<String> {
    vec![
        "-t".into(),
        "nat".into(),
        action.into(),
        "POSTROUTING".into(),
        "-s".into(),
        subnet.to_string(),
        "!".into(),
        "-o".into(),
        bridge.into(),
        "-j".into(),
        "MASQUERADE".into(),
    ]
}

fn run_iptables(args: &[String]) -> Result<()> {
    let output = Command::new("iptables")
        .args(args)
        .output()
        .map_err(|e| TinyboxError::Io {
            path: "iptables".into(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(TinyboxError::Syscall {
            message: format!(
                "iptables {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    tracing::debug!(args = %args.join(" "), "iptables rule applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masquerade_rule_shape() {
        let subnet: Ipv4Network = "192.168.0.0/24".parse().unwrap();
        let args = masquerade_args("-A", &subnet, "br0");
        assert_eq!(
            args,
            [
                "-t",
                "nat",
                "-A",
                "POSTROUTING",
                "-s",
                "192.168.0.0/24",
                "!",
                "-o",
                "br0",
                "-j",
                "MASQUERADE"
            ]
        );
    }

    #[test]
    fn delete_uses_matching_rule() {
        let subnet: Ipv4Network = "10.0.0.0/16".parse().unwrap();
        let add = masquerade_args("-A", &subnet, "tb0");
        let del = masquerade_args("-D", &subnet, "tb0");
        assert_eq!(add[2], "-A");
        assert_eq!(del[2], "-D");
        assert_eq!(add[3..], del[3..]);
    }
}
