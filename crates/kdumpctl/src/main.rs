//! kdumpctl - Kernel crash dump control
//!
//! Shows crash dump status and manages captured dumps through kdumpd.

use anyhow::Result;
use clap::{Parser, Subcommand};
use kdumpctl::client::{discover_socket_path, KdumpdClient};
use kdumpctl::commands::{self, ConfigArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kdumpctl")]
#[command(about = "Kernel crash dump control", long_about = None)]
#[command(version = kdump_common::VERSION)]
struct Cli {
    /// kdumpd socket
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show kernel crash dump status and captured dumps
    Show,

    /// Show the kernel log of crash dumps (all when no index is given)
    Message {
        #[arg(value_name = "INDEX", allow_hyphen_values = true)]
        indices: Vec<String>,
    },

    /// Delete crash dumps (all when no index is given)
    Delete {
        #[arg(value_name = "INDEX", allow_hyphen_values = true)]
        indices: Vec<String>,
    },

    /// List crash dump indices accepted by message and delete
    Allowed,

    /// Change the kernel crash dump configuration
    Set(ConfigArgs),

    /// Validate a configuration change without applying it
    Check(ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let socket = discover_socket_path(cli.socket.as_deref());
    let mut client = KdumpdClient::connect(&socket).await?;

    match cli.command {
        Commands::Show => commands::show(&mut client).await,
        Commands::Message { indices } => commands::message(&mut client, &indices).await,
        Commands::Delete { indices } => commands::delete(&mut client, &indices).await,
        Commands::Allowed => commands::allowed(&mut client).await,
        Commands::Set(args) => commands::set(&mut client, &args).await,
        Commands::Check(args) => commands::check(&mut client, &args).await,
    }
}
