//! Transaction Executor
//!
//! Submits one plan entry through the signing bridge, exactly once, and
//! turns whatever comes back into a typed [`TransactionRecord`].

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::bridge::{BridgeError, BridgeReply, SigningBridge};
use super::error::RelayError;
use super::payload::TransactionPayload;
use super::types::{TransferId, TransferPlan};

/// Rejections caused by CPU billing estimates; these are usually false
/// positives and clear up on their own.
pub const TRANSIENT_CPU_PATTERNS: [&str; 2] = [
    "is greater than the maximum billable",
    "estimated CPU time (0 us) is not less than the maximum billable CPU time for the transaction (0 us)",
];

/// Retry metadata stamped on contract errors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContractPolicy {
    /// Consecutive failing cycles tolerated; `None` is unlimited
    pub max_retries: Option<u32>,
    /// Substrings marking a rejection as fatal
    pub fatal_patterns: Vec<String>,
}

/// Outcome of one submission
#[derive(Debug, Clone, PartialEq)]
pub enum TxOutcome {
    /// Broadcast by the signer; `transaction_id` is `None` when the result
    /// object did not carry one
    Confirmed { transaction_id: Option<String> },
    Failed(RelayError),
}

/// One submitted transaction
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub id: TransferId,
    pub recipient: String,
    pub payload: TransactionPayload,
    pub outcome: TxOutcome,
}

impl TransactionRecord {
    #[inline]
    pub fn is_confirmed(&self) -> bool {
        matches!(self.outcome, TxOutcome::Confirmed { .. })
    }

    pub fn error(&self) -> Option<&RelayError> {
        match &self.outcome {
            TxOutcome::Failed(e) => Some(e),
            TxOutcome::Confirmed { .. } => None,
        }
    }
}

pub struct TransactionExecutor {
    bridge: Arc<dyn SigningBridge>,
    /// Source account (signs as `{from}@active`)
    from: String,
    token_memo: String,
    asset_memo: String,
    policy: ContractPolicy,
}

impl TransactionExecutor {
    pub fn new(
        bridge: Arc<dyn SigningBridge>,
        from: impl Into<String>,
        token_memo: impl Into<String>,
        asset_memo: impl Into<String>,
        policy: ContractPolicy,
    ) -> Self {
        Self {
            bridge,
            from: from.into(),
            token_memo: token_memo.into(),
            asset_memo: asset_memo.into(),
            policy,
        }
    }

    pub fn build_payload(&self, plan: &TransferPlan) -> TransactionPayload {
        TransactionPayload::for_plan(&self.from, plan, &self.token_memo, &self.asset_memo)
    }

    /// Submit `plan` once. Never retries.
    pub async fn submit(&self, plan: &TransferPlan) -> TransactionRecord {
        let id = TransferId::new();
        let payload = self.build_payload(plan);

        if plan.is_empty() {
            return TransactionRecord {
                id,
                recipient: plan.recipient().to_string(),
                payload,
                outcome: TxOutcome::Failed(RelayError::System(format!(
                    "refusing to submit empty {} plan",
                    plan.kind()
                ))),
            };
        }

        info!(transfer_id = %id, recipient = %plan.recipient(), plan = %plan, "Submitting transfer");
        debug!(transfer_id = %id, payload = %payload.to_json(), "Transaction payload");

        let outcome = match self.bridge.execute(&payload).await {
            Ok(reply @ BridgeReply::Signed(_)) => {
                let transaction_id = reply.transaction_id().map(str::to_string);
                match &transaction_id {
                    Some(tx_id) => info!(transfer_id = %id, tx_id = %tx_id, "Transact ok"),
                    None => warn!(transfer_id = %id, "Transact ok but the result has no transaction_id"),
                }
                debug!(transfer_id = %id, reply = ?reply, "Transact result");
                TxOutcome::Confirmed { transaction_id }
            }
            Ok(BridgeReply::Rejected(text)) => {
                let err = self.classify_rejection(&text);
                match &err {
                    RelayError::TransientContract { .. } => error!(
                        transfer_id = %id,
                        error = %text,
                        "Insufficient CPU reported, usually a false positive; will retry later"
                    ),
                    _ => error!(transfer_id = %id, error = %text, "Transact error"),
                }
                TxOutcome::Failed(err)
            }
            Err(bridge_err) => {
                error!(transfer_id = %id, error = %bridge_err, "Transact bridge error");
                TxOutcome::Failed(self.classify_bridge_error(bridge_err))
            }
        };

        TransactionRecord {
            id,
            recipient: plan.recipient().to_string(),
            payload,
            outcome,
        }
    }

    /// Classify an `ok = false` error text from the signer
    pub fn classify_rejection(&self, text: &str) -> RelayError {
        if TRANSIENT_CPU_PATTERNS.iter().any(|p| text.contains(p)) {
            return RelayError::TransientContract {
                message: text.to_string(),
            };
        }

        let fatal = self
            .policy
            .fatal_patterns
            .iter()
            .any(|p| !p.is_empty() && text.contains(p.as_str()));
        RelayError::TransactContract {
            message: text.to_string(),
            retry: !fatal,
            max_retries: self.policy.max_retries,
        }
    }

    /// Classify a failure to run the call at all
    pub fn classify_bridge_error(&self, err: BridgeError) -> RelayError {
        match err {
            BridgeError::Transport(msg) => RelayError::TransactContract {
                message: msg,
                retry: true,
                max_retries: self.policy.max_retries,
            },
            BridgeError::SessionExpired(msg) => RelayError::SessionExpired(msg),
            BridgeError::Unavailable(msg) => RelayError::Unrecoverable(msg),
        }
    }
}
