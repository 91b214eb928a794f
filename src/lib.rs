//! wax_relay - Periodic WAX Token & NFT Relay
//!
//! Watches one or more source accounts and forwards FWF/FWG/FWW tokens and
//! AtomicAssets NFTs to configured recipients through a logged-in browser
//! wallet.
//!
//! # Modules
//!
//! - [`config`] - YAML configuration and validation
//! - [`logging`] - tracing subscriber setup (stdout + rolling file)
//! - [`relay`] - chain queries, planning, signing and the scan loop

pub mod config;
pub mod logging;
pub mod relay;

// Convenient re-exports at crate root
pub use config::{AccountConfig, AppConfig, ScriptsConfig, WebDriverConfig};
pub use relay::{
    ChainQuery, LoopExit, RelayError, ScanController, ScanSettings, ScanStatus, SigningBridge,
};
