//! gridhash
//!
//! A GPU-accelerated SHA-256 nonce search engine:
//! - one compute-grid lane per candidate window, many nonces per lane
//! - bounded dispatches with cooperative cancellation between them
//! - multi-channel result readback with a fixed host-side scan order
//! - every hit re-checked against a sequential reference digest
//! - lane-faithful CPU backend for machines without a usable adapter

pub mod block;
pub mod channel;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod kernel;
pub mod types;
pub mod verify;

pub use config::Config;
pub use engine::{SearchEngine, SearchStats};
pub use error::{Error, Result};
pub use types::*;

/// Application information
pub const APP_NAME: &str = "gridhash";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
