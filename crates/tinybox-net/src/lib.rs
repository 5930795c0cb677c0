//! # tinybox-net
//!
//! Container networking for the tinybox runtime:
//! - **netlink**: raw rtnetlink socket operations for links, addresses,
//!   and routes (bridge/veth creation, netns moves).
//! - **ipam**: per-subnet bitmap address allocator, persisted as JSON.
//! - **bridge**: the bridge network driver (the only driver).
//! - **controller**: network persistence and the container
//!   connect/disconnect orchestration.
//! - **netns**: RAII entry into a container's network namespace.
//! - **iptables**: MASQUERADE egress rules via the external `iptables`.

pub mod bridge;
pub mod controller;
pub mod ipam;
pub mod iptables;
pub mod netlink;
pub mod netns;
