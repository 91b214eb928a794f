//! Scan Loop Controller
//!
//! Drives one source account: snapshot, plan, submit, classify, wait.
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌────────────┐
//! │ snapshot │──▶│   plan   │──▶│  submit  │──▶│  classify  │──▶ wait / stop
//! │ (chain)  │   │(planner) │   │(executor)│   │(classifier)│
//! └──────────┘   └──────────┘   └──────────┘   └────────────┘
//! ```
//!
//! Each cycle runs to completion before the next one starts. The only
//! cancellation point is the scheduled wait between cycles.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::bridge::SigningBridge;
use super::chain::ChainQuery;
use super::classifier::{FailureClassifier, RunState, ScanStatus};
use super::error::RelayError;
use super::executor::{ContractPolicy, TransactionExecutor, TransactionRecord, TxOutcome};
use super::planner::{plan_assets, plan_tokens};
use super::types::{AssetCategory, Holdings, RecipientRequest, TransferPlan};
use crate::config::AccountConfig;

/// Per-account loop settings
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub account: String,
    pub collection: String,
    pub categories: Vec<AssetCategory>,
    pub recipients: Vec<RecipientRequest>,
    pub scan_interval: Duration,
    /// Wait after a failed cycle
    pub min_scan_interval: Duration,
    /// Pause between chain requests and before each submission
    pub request_interval: Duration,
    pub token_memo: String,
    pub asset_memo: String,
    pub contract_policy: ContractPolicy,
    /// Run exactly one cycle
    pub run_once: bool,
}

impl ScanSettings {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            collection: "farmersworld".to_string(),
            categories: Vec::new(),
            recipients: Vec::new(),
            scan_interval: Duration::from_secs(3600),
            min_scan_interval: Duration::from_secs(60),
            request_interval: Duration::from_secs(2),
            token_memo: "deposit".to_string(),
            asset_memo: "deposit".to_string(),
            contract_policy: ContractPolicy::default(),
            run_once: false,
        }
    }

    pub fn from_config(config: &AccountConfig, run_once: bool) -> Self {
        Self {
            account: config.account.clone(),
            collection: config.collection.clone(),
            categories: config.asset_categories.clone(),
            recipients: config.recipients.clone(),
            scan_interval: config.scan_interval(),
            min_scan_interval: config.min_scan_interval(),
            request_interval: config.request_interval(),
            token_memo: config.token_memo.clone(),
            asset_memo: config.asset_memo.clone(),
            contract_policy: ContractPolicy {
                max_retries: config.max_contract_retries,
                fatal_patterns: config.fatal_contract_errors.clone(),
            },
            run_once,
        }
    }
}

/// What one cycle did
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub status: ScanStatus,
    pub next_scan_at: DateTime<Utc>,
    pub records: Vec<TransactionRecord>,
    /// Snapshot minus confirmed transfers
    pub remaining: Holdings,
    /// Recipients that got nothing this cycle
    pub not_operational: Vec<String>,
    pub error: Option<RelayError>,
}

/// Why the loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Classifier said stop; manual restart needed
    Stopped,
    /// `run_once` cycle finished
    Completed,
    /// Shutdown signal during the wait
    Interrupted,
}

pub struct ScanController {
    settings: ScanSettings,
    chain: Arc<dyn ChainQuery>,
    bridge: Arc<dyn SigningBridge>,
    executor: TransactionExecutor,
    classifier: FailureClassifier,
    state: RunState,
}

impl ScanController {
    pub fn new(
        settings: ScanSettings,
        chain: Arc<dyn ChainQuery>,
        bridge: Arc<dyn SigningBridge>,
    ) -> Self {
        let executor = TransactionExecutor::new(
            bridge.clone(),
            settings.account.clone(),
            settings.token_memo.clone(),
            settings.asset_memo.clone(),
            settings.contract_policy.clone(),
        );
        let classifier = FailureClassifier::new(settings.scan_interval, settings.min_scan_interval);

        Self {
            settings,
            chain,
            bridge,
            executor,
            classifier,
            state: RunState::new(Utc::now()),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Load the signer and confirm the wallet session is alive
    pub async fn prepare(&self) -> Result<(), RelayError> {
        info!(bridge = self.bridge.name(), "Preparing signer");
        self.bridge
            .prepare()
            .await
            .map_err(|e| self.executor.classify_bridge_error(e))?;

        let logged_in = self
            .bridge
            .check_session()
            .await
            .map_err(|e| self.executor.classify_bridge_error(e))?;
        if !logged_in {
            return Err(RelayError::SessionExpired(
                "wallet is not logged in".to_string(),
            ));
        }
        info!("Signer session is logged in");
        Ok(())
    }

    /// Run one full cycle and classify its outcome
    pub async fn scan_once(&mut self) -> CycleReport {
        info!(account = %self.settings.account, "Scan started");
        self.state.reset_cycle();

        let mut records = Vec::new();
        let mut remaining = Holdings::default();
        let error = self.run_cycle(&mut records, &mut remaining).await.err();

        let status = self
            .classifier
            .evaluate(error.as_ref(), &mut self.state, Utc::now());

        let mut not_operational: Vec<String> = self.state.not_operational.iter().cloned().collect();
        not_operational.sort();

        CycleReport {
            status,
            next_scan_at: self.state.next_scan_at,
            records,
            remaining,
            not_operational,
            error,
        }
    }

    async fn run_cycle(
        &mut self,
        records: &mut Vec<TransactionRecord>,
        holdings: &mut Holdings,
    ) -> Result<(), RelayError> {
        let recipients = &self.settings.recipients;
        let wants_tokens = recipients.iter().any(RecipientRequest::wants_tokens);
        let wants_assets = recipients.iter().any(RecipientRequest::wants_assets);

        if !wants_tokens && !wants_assets {
            info!("No recipient requests anything");
            return Ok(());
        }

        if wants_tokens {
            let balance = self.chain.fetch_balance(&self.settings.account).await?;
            info!(balance = %balance, "Account balance");
            holdings.tokens = Some(balance);
        }
        if wants_assets {
            if wants_tokens {
                tokio::time::sleep(self.settings.request_interval).await;
            }
            let inventory = self
                .chain
                .fetch_assets(
                    &self.settings.account,
                    &self.settings.collection,
                    &self.settings.categories,
                )
                .await?;
            info!(assets = %inventory, "Account assets");
            holdings.assets = Some(inventory);
        }

        let mut plans: Vec<TransferPlan> = Vec::new();
        if let Some(balance) = &holdings.tokens {
            let allocation = plan_tokens(balance, recipients);
            for skipped in allocation.skipped {
                self.state.not_operational.insert(skipped.recipient);
            }
            plans.extend(allocation.plans);
        }
        if let Some(inventory) = &holdings.assets {
            let allocation = plan_assets(inventory, recipients);
            for shortfall in allocation.shortfalls.iter().filter(|s| s.granted == 0) {
                self.state.not_operational.insert(shortfall.recipient.clone());
            }
            plans.extend(allocation.plans);
        }

        if plans.is_empty() {
            info!("Nothing to transfer this cycle");
            return Ok(());
        }

        for plan in &plans {
            tokio::time::sleep(self.settings.request_interval).await;

            let record = self.executor.submit(plan).await;
            if let TxOutcome::Failed(err) = &record.outcome {
                self.state.failure_count += 1;
                let err = err.clone();
                records.push(record);
                warn!(
                    code = err.code(),
                    pending = plans.len() - records.len(),
                    "Submission failed, aborting the rest of this cycle"
                );
                return Err(err);
            }

            self.state.success_count += 1;
            holdings.deduct(plan);
            records.push(record);
        }

        info!(
            success = self.state.success_count,
            failure = self.state.failure_count,
            "All transfers submitted"
        );
        Ok(())
    }

    /// Run cycles until stopped, interrupted or (with `run_once`) done.
    pub async fn run_forever(mut self, mut shutdown: watch::Receiver<bool>) -> LoopExit {
        if let Err(e) = self.prepare().await {
            error!(code = e.code(), error = %e, "Signer is not usable. Check the logs and restart manually");
            self.bridge.close().await;
            return LoopExit::Stopped;
        }

        loop {
            if *shutdown.borrow() {
                return LoopExit::Interrupted;
            }

            let report = self.scan_once().await;
            if report.status == ScanStatus::Stop {
                self.bridge.close().await;
                return LoopExit::Stopped;
            }
            if self.settings.run_once {
                info!("Single cycle finished");
                return LoopExit::Completed;
            }

            let wait = self.state.until_next_scan(Utc::now());
            info!(wait_secs = wait.as_secs(), next_scan_at = %report.next_scan_at, "Waiting for next scan");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {
                    info!("Shutdown requested");
                    return LoopExit::Interrupted;
                }
            }
        }
    }
}
