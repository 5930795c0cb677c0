//! CLI command definitions and dispatch.

pub mod commit;
pub mod exec;
pub mod init;
pub mod logs;
pub mod network;
pub mod ps;
pub mod rm;
pub mod run;
pub mod stop;

use clap::{Parser, Subcommand};

/// tinybox — a pedagogical container runtime.
#[derive(Parser, Debug)]
#[command(name = "tinybox", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create and run a container with namespace and cgroup isolation.
    Run(run::RunArgs),
    /// Internal container init stage. Do not invoke directly.
    Init,
    /// Execute a command inside a running container.
    Exec(exec::ExecArgs),
    /// Package a container's filesystem into an image tarball.
    Commit(commit::CommitArgs),
    /// List all containers.
    Ps,
    /// Print the logs of a container.
    Logs(logs::LogsArgs),
    /// Stop a running container.
    Stop(stop::StopArgs),
    /// Remove a stopped container.
    Rm(rm::RmArgs),
    /// Manage container networks.
    Network(network::NetworkArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => run::execute(args),
        Command::Init => init::execute(),
        Command::Exec(args) => exec::execute(args),
        Command::Commit(args) => commit::execute(args),
        Command::Ps => ps::execute(),
        Command::Logs(args) => logs::execute(args),
        Command::Stop(args) => stop::execute(args),
        Command::Rm(args) => rm::execute(args),
        Command::Network(args) => network::execute(args),
    }
}
