//! Network persistence and the container connect/disconnect flow.
//!
//! Networks live as one JSON file each under the networks directory; the
//! on-disk records are the authoritative store across command
//! invocations. The controller orchestrates IPAM, the driver, and the
//! in-netns interface configuration.

use std::fs::File;
use std::net::Ipv4Addr;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use tinybox_common::constants;
use tinybox_common::error::{Result, TinyboxError};
use tinybox_common::types::Endpoint;
use tinybox_common::util;

use crate::bridge::driver_for;
use crate::ipam::Ipam;
use crate::netlink::{self, RouteSocket};
use crate::netns::{netns_path, NetnsGuard};

/// A named L2 domain backed by a bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Network (and bridge device) name.
    pub name: String,
    /// Driver name; only `"bridge"` is supported.
    pub driver: String,
    /// The network's subnet.
    pub subnet: Ipv4Network,
    /// Gateway address with the subnet's prefix; assigned to the bridge.
    pub gateway: Ipv4Network,
}

/// Orchestrates network lifecycle and container attachment.
pub struct NetworkController {
    networks_dir: PathBuf,
    ipam: Ipam,
}

impl Default for NetworkController {
    fn default() -> Self {
        Self::new(constants::DEFAULT_NETWORK_DIR, Ipam::default())
    }
}

impl NetworkController {
    /// Creates a controller over the given networks directory and IPAM.
    #[must_use]
    pub fn new(networks_dir: impl Into<PathBuf>, ipam: Ipam) -> Self {
        Self {
            networks_dir: networks_dir.into(),
            ipam,
        }
    }

    /// Creates and persists a network: allocates the gateway (always the
    /// subnet's first address), brings up the bridge, and installs the
    /// MASQUERADE rule.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` for a duplicate name, `InvalidArgument`
    /// for a malformed subnet, or any driver/IPAM failure.
    pub fn create_network(&self, driver_name: &str, subnet: &str, name: &str) -> Result<Network> {
        if self.network_path(name).exists() {
            return Err(TinyboxError::AlreadyExists {
                kind: "network",
                id: name.to_string(),
            });
        }
        let driver = driver_for(driver_name)?;

        let parsed: Ipv4Network = subnet.parse().map_err(|e| TinyboxError::InvalidArgument {
            message: format!("invalid subnet {subnet:?}: {e}"),
        })?;
        let subnet = masked(&parsed)?;

        let gateway_ip = self.ipam.allocate(&subnet)?;
        let gateway = Ipv4Network::new(gateway_ip, subnet.prefix()).map_err(|e| {
            TinyboxError::InvalidArgument {
                message: format!("invalid gateway for {subnet}: {e}"),
            }
        })?;
        tracing::info!(network = %name, %gateway_ip, "gateway allocated");

        driver.create_network(name, subnet, gateway)?;

        let network = Network {
            name: name.to_string(),
            driver: driver.name().to_string(),
            subnet,
            gateway,
        };
        self.save_network(&network)?;
        tracing::info!(network = %name, "network saved");
        Ok(network)
    }

    /// Lists all persisted networks, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the networks directory or a record is
    /// unreadable.
    pub fn list_networks(&self) -> Result<Vec<Network>> {
        if !self.networks_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.networks_dir).map_err(|e| TinyboxError::Io {
            path: self.networks_dir.clone(),
            source: e,
        })?;

        let mut networks = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TinyboxError::Io {
                path: self.networks_dir.clone(),
                source: e,
            })?;
            if entry.path().is_dir() {
                continue;
            }
            networks.push(self.read_network(&entry.file_name().to_string_lossy())?);
        }
        networks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(networks)
    }

    /// Deletes a network: removes the NAT rule and the bridge, releases
    /// the gateway, and drops the persisted record and bitmap entry.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown network or any teardown failure.
    pub fn delete_network(&self, name: &str) -> Result<()> {
        let network = self.read_network(name)?;
        let driver = driver_for(&network.driver)?;

        driver.delete_network(&network)?;
        self.ipam.release(&network.subnet, network.gateway.ip())?;
        self.ipam.remove_subnet(&network.subnet)?;
        self.remove_network(name)?;
        tracing::info!(network = %name, "network deleted");
        Ok(())
    }

    /// Attaches a container to a network and configures the container
    /// side of the veth pair inside its netns.
    ///
    /// On any failure after the address allocation, the address is
    /// released before returning.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown network, `ResourceExhausted`
    /// when the subnet is full, or any device/netns failure.
    pub fn connect(&self, network_name: &str, container_id: &str, pid: i32) -> Result<Endpoint> {
        let network = self.read_network(network_name)?;
        let ip = self.ipam.allocate(&network.subnet)?;
        tracing::info!(container = %container_id, %ip, network = %network_name, "container address allocated");

        match connect_endpoint(&network, container_id, pid, ip) {
            Ok(endpoint) => Ok(endpoint),
            Err(e) => {
                if let Err(release_err) = self.ipam.release(&network.subnet, ip) {
                    tracing::warn!(%ip, error = %release_err, "failed to release address after connect failure");
                }
                Err(e)
            }
        }
    }

    /// Detaches a container: releases every endpoint's address. The veth
    /// devices die with the container's netns.
    ///
    /// # Errors
    ///
    /// Returns the first release failure.
    pub fn disconnect(&self, endpoints: &[Endpoint]) -> Result<()> {
        for endpoint in endpoints {
            self.ipam.release(&endpoint.subnet, endpoint.ip)?;
            tracing::info!(endpoint = %endpoint.id, ip = %endpoint.ip, "endpoint released");
        }
        Ok(())
    }

    /// Reads one persisted network record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no record exists under the given name.
    pub fn read_network(&self, name: &str) -> Result<Network> {
        let path = self.network_path(name);
        let body = match std::fs::read_to_string(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TinyboxError::NotFound {
                    kind: "network",
                    id: name.to_string(),
                });
            }
            Err(e) => return Err(TinyboxError::Io { path, source: e }),
        };
        Ok(serde_json::from_str(&body)?)
    }

    fn save_network(&self, network: &Network) -> Result<()> {
        util::ensure_directory(&self.networks_dir)?;
        let path = self.network_path(&network.name);
        let body = serde_json::to_string(network)?;
        std::fs::write(&path, body).map_err(|e| TinyboxError::Io { path, source: e })
    }

    fn remove_network(&self, name: &str) -> Result<()> {
        let path = self.network_path(name);
        std::fs::remove_file(&path).map_err(|e| TinyboxError::Io { path, source: e })
    }

    fn network_path(&self, name: &str) -> PathBuf {
        self.networks_dir.join(name)
    }
}

/// Creates the endpoint devices and configures the container side.
fn connect_endpoint(
    network: &Network,
    container_id: &str,
    pid: i32,
    ip: Ipv4Addr,
) -> Result<Endpoint> {
    let driver = driver_for(&network.driver)?;
    let id = Endpoint::generate_id(container_id, &network.name);
    let device = driver.connect(network, &id)?;

    let ns_path = netns_path(pid);
    let ns_file = File::open(&ns_path).map_err(|e| TinyboxError::Io {
        path: ns_path,
        source: e,
    })?;

    let mut sock = RouteSocket::new()?;
    sock.set_link_netns(&device.peer_name, ns_file.as_raw_fd())?;

    let addr = Ipv4Network::new(ip, network.subnet.prefix()).map_err(|e| {
        TinyboxError::InvalidArgument {
            message: format!("invalid container address {ip}: {e}"),
        }
    })?;

    let mac = {
        let _guard = NetnsGuard::enter(&ns_file)?;
        // The socket must be created after entering: a netlink socket
        // stays bound to the netns it was opened in.
        let mut inner = RouteSocket::new()?;
        inner.set_interface_ip(&device.peer_name, addr)?;
        inner.set_link_up(&device.peer_name)?;
        inner.set_link_up("lo")?;
        inner.add_default_route(network.gateway.ip(), &device.peer_name)?;
        netlink::hardware_addr(&device.peer_name)?
    };
    drop(ns_file);

    tracing::info!(endpoint = %id, %ip, %mac, "container network configured");
    Ok(Endpoint {
        id,
        device,
        ip,
        mac,
        network: network.name.clone(),
        gateway_ip: network.gateway.ip(),
        subnet: network.subnet,
    })
}

/// Normalizes a subnet to its masked network address.
fn masked(subnet: &Ipv4Network) -> Result<Ipv4Network> {
    Ipv4Network::new(subnet.network(), subnet.prefix()).map_err(|e| {
        TinyboxError::InvalidArgument {
            message: format!("invalid subnet {subnet}: {e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_controller(dir: &std::path::Path) -> NetworkController {
        NetworkController::new(
            dir.join("networks"),
            Ipam::new(dir.join("subnets.json")),
        )
    }

    fn sample_network() -> Network {
        Network {
            name: "br0".into(),
            driver: "bridge".into(),
            subnet: "192.168.0.0/24".parse().unwrap(),
            gateway: "192.168.0.1/24".parse().unwrap(),
        }
    }

    #[test]
    fn network_record_roundtrips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let controller = test_controller(dir.path());

        controller.save_network(&sample_network()).expect("save");
        let read = controller.read_network("br0").expect("read");
        assert_eq!(read, sample_network());
    }

    #[test]
    fn unknown_network_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let controller = test_controller(dir.path());
        let err = controller.read_network("nope").unwrap_err();
        assert!(matches!(err, TinyboxError::NotFound { .. }));
    }

    #[test]
    fn list_is_sorted_by_name_and_tolerates_missing_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let controller = test_controller(dir.path());
        assert!(controller.list_networks().expect("empty").is_empty());

        let mut b = sample_network();
        b.name = "beta".into();
        let mut a = sample_network();
        a.name = "alpha".into();
        controller.save_network(&b).expect("save");
        controller.save_network(&a).expect("save");

        let names: Vec<String> = controller
            .list_networks()
            .expect("list")
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, ["alpha", "beta"]);
    }

    #[test]
    fn duplicate_create_is_rejected_before_touching_devices() {
        let dir = tempfile::tempdir().expect("tempdir");
        let controller = test_controller(dir.path());
        controller.save_network(&sample_network()).expect("save");

        let err = controller
            .create_network("bridge", "192.168.0.0/24", "br0")
            .unwrap_err();
        assert!(matches!(err, TinyboxError::AlreadyExists { .. }));
    }

    #[test]
    fn disconnect_releases_every_endpoint_address() {
        let dir = tempfile::tempdir().expect("tempdir");
        let controller = test_controller(dir.path());
        let subnet: Ipv4Network = "192.168.0.0/24".parse().unwrap();

        // Simulate gateway + two container allocations.
        controller.ipam.allocate(&subnet).expect("gateway");
        let ip1 = controller.ipam.allocate(&subnet).expect("c1");
        let ip2 = controller.ipam.allocate(&subnet).expect("c2");

        let endpoint = |ip| Endpoint {
            id: "cid-br0".into(),
            device: tinybox_common::types::VethDevice {
                name: "cid-b".into(),
                peer_name: "vp-cid-b".into(),
            },
            ip,
            mac: "aa:bb:cc:dd:ee:ff".into(),
            network: "br0".into(),
            gateway_ip: "192.168.0.1".parse().unwrap(),
            subnet,
        };
        controller
            .disconnect(&[endpoint(ip1), endpoint(ip2)])
            .expect("disconnect");

        // Both addresses are allocatable again, lowest first.
        assert_eq!(controller.ipam.allocate(&subnet).expect("realloc"), ip1);
        assert_eq!(controller.ipam.allocate(&subnet).expect("realloc"), ip2);
    }

    #[test]
    fn network_json_shape() {
        let json = serde_json::to_value(sample_network()).expect("serialize");
        assert_eq!(json["name"], "br0");
        assert_eq!(json["driver"], "bridge");
        assert_eq!(json["subnet"], "192.168.0.0/24");
        assert_eq!(json["gateway"], "192.168.0.1/24");
    }
}
