//! # tinybox-core
//!
//! Low-level Linux isolation primitives for the tinybox runtime.
//!
//! This crate provides safe abstractions over:
//! - **Cgroups v1**: the per-controller subsystem abstraction and the
//!   manager that fans operations across all registered subsystems.
//! - **Filesystem**: the overlayfs container workspace, bind-mounted
//!   volumes, and `pivot_root` for root filesystem switching.

pub mod cgroup;
pub mod filesystem;
