//! The bridge network driver.
//!
//! A network is a Linux bridge carrying the gateway address; containers
//! attach through veth pairs whose host side is enslaved to the bridge.

use ipnetwork::Ipv4Network;
use tinybox_common::constants;
use tinybox_common::error::{Result, TinyboxError};
use tinybox_common::types::VethDevice;

use crate::controller::Network;
use crate::iptables;
use crate::netlink::{self, RouteSocket};

/// How many characters of the endpoint id name the host-side veth.
const VETH_NAME_LEN: usize = 5;

/// A network driver: owns the lifecycle of the underlying L2 devices.
pub trait Driver: std::fmt::Debug {
    /// Driver name as stored in the network record.
    fn name(&self) -> &'static str;

    /// Brings up the network's device and NAT rules.
    ///
    /// # Errors
    ///
    /// Returns an error if device or firewall configuration fails.
    fn create_network(&self, name: &str, subnet: Ipv4Network, gateway: Ipv4Network) -> Result<()>;

    /// Tears down the network's device and NAT rules.
    ///
    /// # Errors
    ///
    /// Returns an error if device or firewall teardown fails.
    fn delete_network(&self, network: &Network) -> Result<()>;

    /// Creates the veth pair for an endpoint and attaches the host side.
    ///
    /// # Errors
    ///
    /// Returns an error if device creation or attachment fails.
    fn connect(&self, network: &Network, endpoint_id: &str) -> Result<VethDevice>;
}

/// Resolves a driver by name.
///
/// # Errors
///
/// Returns `NotFound` for an unsupported driver name.
pub fn driver_for(name: &str) -> Result<Box<dyn Driver>> {
    if name == constants::DRIVER_BRIDGE {
        Ok(Box::new(BridgeDriver))
    } else {
        Err(TinyboxError::NotFound {
            kind: "network driver",
            id: name.to_string(),
        })
    }
}

/// The only supported driver.
#[derive(Debug)]
pub struct BridgeDriver;

impl BridgeDriver {
    /// Derives the veth pair names from an endpoint id.
    #[must_use]
    pub fn veth_names(endpoint_id: &str) -> VethDevice {
        let name: String = endpoint_id.chars().take(VETH_NAME_LEN).collect();
        VethDevice {
            peer_name: format!("vp-{name}"),
            name,
        }
    }
}

impl Driver for BridgeDriver {
    fn name(&self) -> &'static str {
        constants::DRIVER_BRIDGE
    }

    fn create_network(&self, name: &str, subnet: Ipv4Network, gateway: Ipv4Network) -> Result<()> {
        let mut sock = RouteSocket::new()?;
        if !netlink::link_exists(name) {
            sock.create_bridge(name)?;
        }
        sock.set_interface_ip(name, gateway)?;
        sock.set_link_up(name)?;
        iptables::append_masquerade(&subnet, name)?;
        tracing::info!(bridge = %name, %subnet, %gateway, "bridge network initialized");
        Ok(())
    }

    fn delete_network(&self, network: &Network) -> Result<()> {
        iptables::delete_masquerade(&network.subnet, &network.name)?;
        let mut sock = RouteSocket::new()?;
        sock.delete_link(&network.name)?;
        tracing::info!(bridge = %network.name, "bridge network deleted");
        Ok(())
    }

    fn connect(&self, network: &Network, endpoint_id: &str) -> Result<VethDevice> {
        let device = Self::veth_names(endpoint_id);
        let mut sock = RouteSocket::new()?;
        sock.create_veth(&device.name, &device.peer_name)?;
        sock.set_link_master(&device.name, &network.name)?;
        sock.set_link_up(&device.name)?;
        tracing::info!(
            veth = %device.name,
            peer = %device.peer_name,
            bridge = %network.name,
            "endpoint device attached"
        );
        Ok(device)
    }
}
