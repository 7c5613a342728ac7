//! kdumpd library - the crash dump reconciliation and inventory engine.
//!
//! Exposed as a library so the daemon shell and the tests share one engine.

pub mod atomic;
pub mod engine;
pub mod error;
pub mod facts;
pub mod inventory;
pub mod reservation;
pub mod rpc_server;
pub mod service;
pub mod settings;
pub mod store;

pub use engine::Engine;
pub use error::{KdumpError, Result};
pub use store::ConfigStore;
