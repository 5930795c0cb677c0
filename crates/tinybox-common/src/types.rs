//! Domain types shared across the tinybox workspace.
//!
//! These are the records persisted to disk between command invocations;
//! the on-disk JSON is the authoritative store, so every type here
//! round-trips through serde without loss.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The init process is alive.
    Running,
    /// The container was stopped via `stop`.
    Stopped,
    /// The init process terminated on its own.
    Exited,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Exited => write!(f, "exited"),
        }
    }
}

/// Resource limits applied through the cgroup subsystems.
///
/// Values are passed through verbatim to the corresponding control files
/// (e.g. `"100m"` for the memory limit).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceConfig {
    /// Memory limit written to `memory.limit_in_bytes`.
    pub memory_limit: Option<String>,
    /// CPU share weight.
    pub cpu_share: Option<String>,
    /// CPU set (e.g. `"0-1"`).
    pub cpu_set: Option<String>,
}

/// The two ends of a veth pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VethDevice {
    /// Host-side interface name (attached to the bridge).
    pub name: String,
    /// Peer name; the peer is moved into the container's netns.
    pub peer_name: String,
}

/// One attachment of a container to a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// `"<containerID>-<networkName>"`.
    pub id: String,
    /// The veth pair backing this endpoint.
    pub device: VethDevice,
    /// Container-side address.
    #[serde(rename = "ipAddress")]
    pub ip: Ipv4Addr,
    /// MAC of the container-side peer.
    pub mac: String,
    /// Name of the network this endpoint attaches to.
    pub network: String,
    /// Gateway address inside the subnet.
    #[serde(rename = "gatewayIP")]
    pub gateway_ip: Ipv4Addr,
    /// The network's subnet.
    pub subnet: Ipv4Network,
}

impl Endpoint {
    /// Builds the endpoint id for a container attached to a network.
    #[must_use]
    pub fn generate_id(container_id: &str, network_name: &str) -> String {
        format!("{container_id}-{network_name}")
    }

    /// Renders the container-side address with the subnet's prefix length.
    #[must_use]
    pub fn ip_net(&self) -> String {
        format!("{}/{}", self.ip, self.subnet.prefix())
    }
}

/// Persistent record of one container.
///
/// Created when a container starts, removed on `rm`. Invariant: `pid` is
/// nonzero iff `status == Running`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerMetadata {
    /// PID of the init process; 0 once stopped.
    pub pid: i32,
    /// Opaque random identifier.
    pub id: String,
    /// Human-readable name; unique under the metadata root.
    pub name: String,
    /// Space-joined command line the container was started with.
    pub command: String,
    /// Creation timestamp.
    pub create_time: DateTime<Utc>,
    /// Current lifecycle status.
    pub status: Status,
    /// `"hostPath:containerPath"` bind volumes, in mount order.
    #[serde(default)]
    pub volumes: Vec<String>,
    /// Attached network endpoints.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    /// Host port to container port mapping.
    #[serde(default)]
    pub port_mappings: BTreeMap<u16, u16>,
}

impl ContainerMetadata {
    /// Renders all endpoint addresses, `;`-joined, or `"null"` when the
    /// container is not attached to any network.
    #[must_use]
    pub fn ip_nets(&self) -> String {
        if self.endpoints.is_empty() {
            return "null".into();
        }
        self.endpoints
            .iter()
            .map(Endpoint::ip_net)
            .collect::<Vec<_>>()
            .join(";")
    }
}
