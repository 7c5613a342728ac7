//! kdumpctl library - client and rendering for the kernel crash dump CLI.

pub mod client;
pub mod commands;
pub mod display;
