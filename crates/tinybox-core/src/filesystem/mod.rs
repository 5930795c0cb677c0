//! Filesystem management for container isolation.
//!
//! Provides the overlayfs container workspace, bind-mounted volumes, and
//! `pivot_root` for root filesystem switching.

pub mod mount;
pub mod overlayfs;
pub mod pivot_root;
pub mod workspace;
