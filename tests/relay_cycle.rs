//! Full relay cycles through the public API, with an in-memory chain and a
//! scripted signer standing in for the RPC nodes and the browser.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::watch;

use wax_relay::relay::{
    AssetCategory, AssetInventory, BridgeError, BridgeReply, ChainQuery, LoopExit, RecipientRequest,
    RelayError, ScanController, ScanSettings, ScanStatus, SigningBridge, TokenBalance,
    TransactionPayload,
};

/// Chain whose balance follows the transfers the signer confirms
struct LedgerChain {
    balance: Mutex<TokenBalance>,
    assets: Mutex<Vec<(String, String)>>,
}

impl LedgerChain {
    fn new(balance: TokenBalance) -> Self {
        Self {
            balance: Mutex::new(balance),
            assets: Mutex::new(Vec::new()),
        }
    }

    fn add_asset(&self, template_id: &str, asset_id: &str) {
        self.assets
            .lock()
            .unwrap()
            .push((template_id.into(), asset_id.into()));
    }

    fn balance(&self) -> TokenBalance {
        *self.balance.lock().unwrap()
    }
}

#[async_trait]
impl ChainQuery for LedgerChain {
    async fn fetch_balance(&self, _account: &str) -> Result<TokenBalance, RelayError> {
        Ok(self.balance())
    }

    async fn fetch_assets(
        &self,
        _account: &str,
        _collection: &str,
        categories: &[AssetCategory],
    ) -> Result<AssetInventory, RelayError> {
        let mut inventory = AssetInventory::new(categories);
        for (template_id, asset_id) in self.assets.lock().unwrap().iter() {
            inventory.push(template_id, asset_id);
        }
        Ok(inventory)
    }
}

/// Signer that applies confirmed transfers to the chain
struct ApplyingSigner {
    chain: Arc<LedgerChain>,
    rejections: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
    closed: AtomicBool,
}

impl ApplyingSigner {
    fn new(chain: Arc<LedgerChain>) -> Self {
        Self {
            chain,
            rejections: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn reject_next(&self, text: &str) {
        self.rejections.lock().unwrap().push_back(text.into());
    }
}

#[async_trait]
impl SigningBridge for ApplyingSigner {
    fn name(&self) -> &'static str {
        "applying"
    }

    async fn prepare(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn check_session(&self) -> Result<bool, BridgeError> {
        Ok(true)
    }

    async fn execute(&self, payload: &TransactionPayload) -> Result<BridgeReply, BridgeError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(text) = self.rejections.lock().unwrap().pop_front() {
            return Ok(BridgeReply::Rejected(text));
        }

        let value = payload.to_json();
        let data = &value["actions"][0]["data"];
        if let Some(quantities) = data["quantities"].as_array() {
            let mut balance = self.chain.balance.lock().unwrap();
            for q in quantities {
                let (amount, symbol) = q.as_str().unwrap().split_once(' ').unwrap();
                let amount: Decimal = amount.parse().unwrap();
                match symbol {
                    "FWF" => balance.food -= amount,
                    "FWG" => balance.gold -= amount,
                    "FWW" => balance.wood -= amount,
                    other => panic!("unexpected symbol {}", other),
                }
            }
        }
        if let Some(ids) = data["asset_ids"].as_array() {
            let ids: Vec<&str> = ids.iter().map(|v| v.as_str().unwrap()).collect();
            self.chain
                .assets
                .lock()
                .unwrap()
                .retain(|(_, id)| !ids.contains(&id.as_str()));
        }

        Ok(BridgeReply::Signed(json!({ "transaction_id": format!("tx-{}", n) })))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn dec(v: i64) -> Decimal {
    Decimal::from(v)
}

fn settings(recipients: Vec<RecipientRequest>) -> ScanSettings {
    let mut s = ScanSettings::new("src.wam");
    s.categories = vec![
        AssetCategory::new("barley", "318606"),
        AssetCategory::new("corn", "318607"),
    ];
    s.recipients = recipients;
    s.scan_interval = Duration::ZERO;
    s.min_scan_interval = Duration::ZERO;
    s.request_interval = Duration::ZERO;
    s
}

#[tokio::test]
async fn test_pool_drains_over_cycles() {
    let chain = Arc::new(LedgerChain::new(TokenBalance::new(dec(100), dec(50), dec(0))));
    let signer = Arc::new(ApplyingSigner::new(chain.clone()));
    let mut ctl = ScanController::new(
        settings(vec![
            RecipientRequest::new("a.wam").with_tokens(dec(40), dec(10), dec(5)),
            RecipientRequest::new("b.wam").with_tokens(dec(30), dec(20), dec(0)),
        ]),
        chain.clone(),
        signer.clone(),
    );

    let first = ctl.scan_once().await;
    assert_eq!(first.status, ScanStatus::Continue);
    assert_eq!(first.records.len(), 1);
    assert_eq!(chain.balance(), TokenBalance::new(dec(70), dec(30), dec(0)));

    // second cycle re-reads the chain: A still lacks wood, B is served again
    let second = ctl.scan_once().await;
    assert_eq!(second.records.len(), 1);
    assert_eq!(second.records[0].recipient, "b.wam");
    assert_eq!(chain.balance(), TokenBalance::new(dec(40), dec(10), dec(0)));

    // third cycle: gold runs short for B as well
    let third = ctl.scan_once().await;
    assert!(third.records.is_empty());
    assert_eq!(
        third.not_operational,
        vec!["a.wam".to_string(), "b.wam".to_string()]
    );
    assert_eq!(signer.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_assets_and_tokens_in_one_cycle() {
    let chain = Arc::new(LedgerChain::new(TokenBalance::new(dec(10), dec(0), dec(0))));
    for (template, id) in [
        ("318606", "b1"),
        ("318607", "c1"),
        ("318606", "b2"),
        ("999999", "x1"),
    ] {
        chain.add_asset(template, id);
    }
    let signer = Arc::new(ApplyingSigner::new(chain.clone()));
    let mut ctl = ScanController::new(
        settings(vec![
            RecipientRequest::new("a.wam")
                .with_tokens(dec(10), dec(0), dec(0))
                .with_assets("barley", 1)
                .with_assets("corn", 1),
            RecipientRequest::new("b.wam").with_assets("barley", 3),
        ]),
        chain.clone(),
        signer.clone(),
    );

    let report = ctl.scan_once().await;

    assert_eq!(report.status, ScanStatus::Continue);
    assert!(report.error.is_none());
    // token plan for a, asset plans for a and b
    assert_eq!(report.records.len(), 3);
    let remaining = report.remaining.assets.unwrap();
    assert!(remaining.is_empty());
    assert_eq!(report.remaining.tokens.unwrap(), TokenBalance::default());

    let asset_payload = report.records[1].payload.to_json();
    assert_eq!(asset_payload["actions"][0]["account"], "atomicassets");
    assert_eq!(
        asset_payload["actions"][0]["data"]["asset_ids"],
        json!(["b1", "c1"])
    );
    assert_eq!(
        report.records[2].payload.to_json()["actions"][0]["data"]["asset_ids"],
        json!(["b2"])
    );
}

#[tokio::test]
async fn test_transient_then_recovery() {
    let chain = Arc::new(LedgerChain::new(TokenBalance::new(dec(20), dec(0), dec(0))));
    let signer = Arc::new(ApplyingSigner::new(chain.clone()));
    signer.reject_next(
        "estimated CPU time (0 us) is not less than the maximum billable CPU time for the transaction (0 us)",
    );
    let mut s = settings(vec![
        RecipientRequest::new("a.wam").with_tokens(dec(10), dec(0), dec(0)),
    ]);
    s.contract_policy.max_retries = Some(2);
    let mut ctl = ScanController::new(s, chain.clone(), signer.clone());

    let failed = ctl.scan_once().await;
    assert_eq!(failed.status, ScanStatus::Continue);
    assert_eq!(ctl.state().consecutive_contract_errors, 1);
    assert_eq!(chain.balance().food, dec(20));

    let recovered = ctl.scan_once().await;
    assert_eq!(recovered.status, ScanStatus::Continue);
    assert_eq!(ctl.state().consecutive_contract_errors, 0);
    assert_eq!(chain.balance().food, dec(10));
}

#[tokio::test]
async fn test_fatal_rejection_stops_loop() {
    let chain = Arc::new(LedgerChain::new(TokenBalance::new(dec(20), dec(0), dec(0))));
    let signer = Arc::new(ApplyingSigner::new(chain.clone()));
    signer.reject_next("assertion failure with message: to account does not exist");
    let mut s = settings(vec![
        RecipientRequest::new("gone.wam").with_tokens(dec(10), dec(0), dec(0)),
    ]);
    s.contract_policy.fatal_patterns = vec!["account does not exist".into()];
    let ctl = ScanController::new(s, chain.clone(), signer.clone());

    let (_tx, rx) = watch::channel(false);
    let exit = ctl.run_forever(rx).await;

    assert_eq!(exit, LoopExit::Stopped);
    assert!(signer.closed.load(Ordering::SeqCst));
    assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(chain.balance().food, dec(20));
}
