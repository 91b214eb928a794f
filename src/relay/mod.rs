//! Relay Engine
//!
//! Periodically moves fungible tokens (FWF/FWG/FWW) and AtomicAssets NFTs
//! from one WAX account to a configured list of recipients.
//!
//! # Cycle
//!
//! ```text
//! snapshot ─► plan ─► submit (one by one) ─► classify ─► Continue ─► wait ─┐
//!    ▲                                          │                         │
//!    │                                          └─► Stop (close signer)   │
//!    └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! 1. **Ordered pool**: recipients are served in configured order from one
//!    shared pool; a recipient never receives more than what is left
//! 2. **All-or-nothing tokens**: a recipient whose request for any token
//!    exceeds the pool gets no token transfer this cycle
//! 3. **Unique assets**: an asset id is planned for at most one recipient
//! 4. **Single submission**: the executor never retries; retrying is a
//!    whole new cycle with a fresh snapshot

pub mod bridge;
pub mod chain;
pub mod classifier;
pub mod controller;
pub mod error;
pub mod executor;
pub mod payload;
pub mod planner;
pub mod scripts;
pub mod types;
pub mod webdriver;

// Re-exports for convenience
pub use bridge::{BridgeError, BridgeReply, SigningBridge};
pub use chain::{ChainQuery, HttpChainClient, QueryRetry};
pub use classifier::{FailureClassifier, RunState, ScanStatus};
pub use controller::{CycleReport, LoopExit, ScanController, ScanSettings};
pub use error::RelayError;
pub use executor::{ContractPolicy, TransactionExecutor, TransactionRecord, TxOutcome};
pub use payload::TransactionPayload;
pub use planner::{AssetAllocation, TokenAllocation, plan_assets, plan_tokens};
pub use scripts::SignerScripts;
pub use types::{
    AssetCategory, AssetInventory, Holdings, RecipientRequest, Token, TokenBalance, TransferId,
    TransferPlan,
};
pub use webdriver::WebDriverBridge;
