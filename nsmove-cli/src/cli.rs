//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nsmove")]
#[command(about = "Move network interfaces between network namespaces", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Move an interface into a connection's namespace
    Request(RelocateArgs),

    /// Move an interface from a connection's namespace back home
    Close(RelocateArgs),

    /// Show network namespace information
    Namespaces {
        /// Process ID (default: current process)
        #[arg(short, long)]
        pid: Option<u32>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RelocateArgs {
    /// Connection ID
    #[arg(short, long)]
    pub id: String,

    /// Target namespace: a name under the netns directory, an absolute path or a file:// URL
    #[arg(short, long)]
    pub netns: String,

    /// Interface to move
    #[arg(long)]
    pub interface: String,

    /// Run as the client side of the connection
    #[arg(long)]
    pub client: bool,
}
