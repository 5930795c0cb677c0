//! # tinybox — CLI
//!
//! A pedagogical container runtime: namespaces, cgroups v1, overlayfs
//! workspaces, and bridged networking, in one self-re-executing binary.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod commands;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    commands::execute(cli)
}
