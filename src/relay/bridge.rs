//! Signing Bridge
//!
//! The capability that turns a transaction description into a signed,
//! broadcast transaction. The relay core only sees this trait; the
//! browser-backed implementation lives in [`super::webdriver`].

use async_trait::async_trait;
use thiserror::Error;

use super::payload::TransactionPayload;

/// What the signer reported for one transaction
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeReply {
    /// `ok = true`: the signer's result object (contains `transaction_id`)
    Signed(serde_json::Value),
    /// `ok = false`: the signer's error text
    Rejected(String),
}

impl BridgeReply {
    #[inline]
    pub fn is_signed(&self) -> bool {
        matches!(self, BridgeReply::Signed(_))
    }

    /// On-chain transaction id of a signed reply
    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            BridgeReply::Signed(result) => result.get("transaction_id")?.as_str(),
            BridgeReply::Rejected(_) => None,
        }
    }
}

/// The bridge itself could not run the call
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Bridge transport failed: {0}")]
    Transport(String),

    #[error("Bridge session expired: {0}")]
    SessionExpired(String),

    #[error("Bridge unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SigningBridge: Send + Sync {
    /// Name for logging
    fn name(&self) -> &'static str;

    /// Make sure the in-page signer is loaded. Idempotent.
    async fn prepare(&self) -> Result<(), BridgeError>;

    /// Whether the signer still holds a logged-in wallet session
    async fn check_session(&self) -> Result<bool, BridgeError>;

    /// Sign and broadcast one transaction
    async fn execute(&self, payload: &TransactionPayload) -> Result<BridgeReply, BridgeError>;

    /// Release the underlying browser session
    async fn close(&self);
}

/// Scripted bridge for tests
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    pub struct MockBridge {
        /// Replies consumed in order; when empty every call signs
        script: Mutex<VecDeque<Result<BridgeReply, BridgeError>>>,
        payloads: Mutex<Vec<TransactionPayload>>,
        execute_count: AtomicUsize,
        prepare_count: AtomicUsize,
        logged_in: AtomicBool,
        closed: AtomicBool,
    }

    impl MockBridge {
        pub fn new() -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                payloads: Mutex::new(Vec::new()),
                execute_count: AtomicUsize::new(0),
                prepare_count: AtomicUsize::new(0),
                logged_in: AtomicBool::new(true),
                closed: AtomicBool::new(false),
            }
        }

        pub fn push_reply(&self, reply: Result<BridgeReply, BridgeError>) {
            self.script.lock().unwrap().push_back(reply);
        }

        pub fn reject_next(&self, error_text: &str) {
            self.push_reply(Ok(BridgeReply::Rejected(error_text.to_string())));
        }

        pub fn set_logged_in(&self, logged_in: bool) {
            self.logged_in.store(logged_in, Ordering::SeqCst);
        }

        pub fn execute_count(&self) -> usize {
            self.execute_count.load(Ordering::SeqCst)
        }

        pub fn prepare_count(&self) -> usize {
            self.prepare_count.load(Ordering::SeqCst)
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        pub fn payloads(&self) -> Vec<TransactionPayload> {
            self.payloads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SigningBridge for MockBridge {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn prepare(&self) -> Result<(), BridgeError> {
            self.prepare_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn check_session(&self) -> Result<bool, BridgeError> {
            Ok(self.logged_in.load(Ordering::SeqCst))
        }

        async fn execute(&self, payload: &TransactionPayload) -> Result<BridgeReply, BridgeError> {
            let n = self.execute_count.fetch_add(1, Ordering::SeqCst) + 1;
            self.payloads.lock().unwrap().push(payload.clone());

            match self.script.lock().unwrap().pop_front() {
                Some(reply) => reply,
                None => Ok(BridgeReply::Signed(
                    serde_json::json!({ "transaction_id": format!("tx-{}", n) }),
                )),
            }
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::relay::types::TransferPlan;

        fn payload() -> TransactionPayload {
            let plan = TransferPlan::Assets {
                to: "bob".into(),
                asset_ids: vec!["1".into()],
            };
            TransactionPayload::for_plan("src", &plan, "deposit", "relay")
        }

        #[tokio::test]
        async fn test_mock_bridge_script_then_default() {
            let bridge = MockBridge::new();
            bridge.reject_next("assertion failure");

            let first = bridge.execute(&payload()).await.unwrap();
            assert_eq!(first, BridgeReply::Rejected("assertion failure".into()));

            let second = bridge.execute(&payload()).await.unwrap();
            assert!(second.is_signed());
            assert_eq!(second.transaction_id(), Some("tx-2"));
            assert_eq!(bridge.execute_count(), 2);
            assert_eq!(bridge.payloads().len(), 2);
        }
    }
}
