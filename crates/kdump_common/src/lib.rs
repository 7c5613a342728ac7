//! Shared types for the kernel crash dump daemon and its control CLI.
//!
//! Everything that crosses the daemon socket lives here: the desired
//! configuration document, the status snapshot and the JSON-RPC envelope.

pub mod config;
pub mod rpc;
pub mod status;

pub use config::{KdumpConfig, ReservedMemory};
pub use status::{CrashDmesg, CrashDumpEntry, KdumpStatus, ServiceState};

/// Daemon control socket
pub const SOCKET_PATH: &str = "/run/kdump/kdumpd.sock";

/// Workspace version, shared by daemon and CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
