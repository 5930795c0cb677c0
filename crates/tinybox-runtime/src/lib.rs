//! # tinybox-runtime
//!
//! Container lifecycle for the tinybox runtime:
//! - **metadata**: the per-container JSON records under the metadata root.
//! - **process**: the parent-side construction path (clone into fresh
//!   namespaces, cgroups, network attach, the argv pipe handshake).
//! - **init**: the in-namespace initialization path that ends in `execv`.
//! - **exec** / **nsenter**: entering a running container's namespaces
//!   through the env-var protocol and a pre-main constructor.
//! - **lifecycle**: stop, rm, and commit over the on-disk state.

pub mod exec;
pub mod init;
pub mod lifecycle;
pub mod metadata;
pub mod nsenter;
pub mod process;
