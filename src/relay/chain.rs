//! Chain Query Client
//!
//! Reads the source account's token balances from a WAX RPC node and its
//! NFTs from an AtomicAssets API. Transient failures (connect errors,
//! timeouts, HTTP 5xx) are retried with a fixed pause; anything else
//! surfaces on the first attempt.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::RelayError;
use super::payload::TOKEN_CONTRACT;
use super::types::{AssetCategory, AssetInventory, Token, TokenBalance};

/// Page size requested from the AtomicAssets API
pub const ASSET_PAGE_LIMIT: u32 = 1000;

/// Read-only view of the source account on chain
#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// Current FWF/FWG/FWW balances
    async fn fetch_balance(&self, account: &str) -> Result<TokenBalance, RelayError>;

    /// Owned NFTs in `collection`, bucketed into the given categories
    async fn fetch_assets(
        &self,
        account: &str,
        collection: &str,
        categories: &[AssetCategory],
    ) -> Result<AssetInventory, RelayError>;
}

/// Retry behaviour for chain queries
#[derive(Debug, Clone)]
pub struct QueryRetry {
    /// Total attempts including the first one
    pub attempts: u32,
    /// Fixed pause between attempts
    pub interval: Duration,
}

impl Default for QueryRetry {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_secs(1),
        }
    }
}

/// Failure of a single HTTP attempt
#[derive(Debug)]
enum AttemptError {
    /// Worth another attempt
    Transient(String),
    /// Server answered with a client error
    Rejected(String),
    /// Body could not be decoded
    Malformed(String),
}

impl From<AttemptError> for RelayError {
    fn from(e: AttemptError) -> Self {
        match e {
            AttemptError::Transient(msg) | AttemptError::Rejected(msg) => RelayError::Network(msg),
            AttemptError::Malformed(msg) => RelayError::Parse(msg),
        }
    }
}

#[derive(Serialize)]
struct CurrencyBalanceRequest<'a> {
    code: &'static str,
    account: &'a str,
    symbol: Option<&'a str>,
}

#[derive(Deserialize, Debug)]
struct AssetsResponse {
    data: Vec<AssetEntry>,
}

#[derive(Deserialize, Debug)]
struct AssetEntry {
    asset_id: String,
    #[serde(default)]
    template: Option<AssetTemplate>,
}

#[derive(Deserialize, Debug)]
struct AssetTemplate {
    template_id: String,
}

/// HTTP implementation of [`ChainQuery`]
pub struct HttpChainClient {
    client: reqwest::Client,
    rpc_domain: String,
    assets_domain: String,
    retry: QueryRetry,
}

impl HttpChainClient {
    pub fn new(
        rpc_domain: &str,
        assets_domain: &str,
        timeout: Duration,
        retry: QueryRetry,
    ) -> Result<Self, RelayError> {
        info!(rpc = rpc_domain, assets = assets_domain, "Initializing chain query client");

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| RelayError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            rpc_domain: rpc_domain.trim_end_matches('/').to_string(),
            assets_domain: assets_domain.trim_end_matches('/').to_string(),
            retry,
        })
    }

    fn balance_url(&self) -> String {
        format!("{}/v1/chain/get_currency_balance", self.rpc_domain)
    }

    fn assets_url(&self) -> String {
        format!("{}/atomicassets/v1/assets", self.assets_domain)
    }

    /// Run `op` until it succeeds, fails non-transiently, or attempts run out
    async fn with_retry<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T, RelayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Transient(msg)) if attempt < attempts => {
                    warn!(query = what, attempt, error = %msg, "Network error, retrying");
                    tokio::time::sleep(self.retry.interval).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn balance_attempt(&self, account: &str) -> Result<String, AttemptError> {
        let request = CurrencyBalanceRequest {
            code: TOKEN_CONTRACT,
            account,
            symbol: None,
        };
        let response = self
            .client
            .post(self.balance_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(format!("HTTP request failed: {}", e)))?;
        read_body(response).await
    }

    async fn assets_attempt(&self, account: &str, collection: &str) -> Result<String, AttemptError> {
        let limit = ASSET_PAGE_LIMIT.to_string();
        let response = self
            .client
            .get(self.assets_url())
            .query(&[
                ("limit", limit.as_str()),
                ("collection_name", collection),
                ("owner", account),
            ])
            .send()
            .await
            .map_err(|e| AttemptError::Transient(format!("HTTP request failed: {}", e)))?;
        read_body(response).await
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, AttemptError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AttemptError::Transient(format!("Failed to read response: {}", e)))?;

    if status.is_server_error() {
        return Err(AttemptError::Transient(format!("HTTP {}: {}", status, body)));
    }
    if !status.is_success() {
        return Err(AttemptError::Rejected(format!("HTTP {}: {}", status, body)));
    }
    Ok(body)
}

#[async_trait]
impl ChainQuery for HttpChainClient {
    async fn fetch_balance(&self, account: &str) -> Result<TokenBalance, RelayError> {
        let body = self
            .with_retry("get_currency_balance", || self.balance_attempt(account))
            .await?;
        debug!(body = %body, "get_currency_balance");
        parse_balance(&body)
    }

    async fn fetch_assets(
        &self,
        account: &str,
        collection: &str,
        categories: &[AssetCategory],
    ) -> Result<AssetInventory, RelayError> {
        let body = self
            .with_retry("atomicassets/assets", || {
                self.assets_attempt(account, collection)
            })
            .await?;
        debug!(bytes = body.len(), "atomicassets/assets");
        parse_assets(&body, categories)
    }
}

/// Parse a `get_currency_balance` body: `["12.0000 FWF", "3.5000 FWG"]`
pub fn parse_balance(body: &str) -> Result<TokenBalance, RelayError> {
    let entries: Vec<String> = serde_json::from_str(body)
        .map_err(|e| RelayError::Parse(format!("currency balance: {}", e)))?;

    let mut balance = TokenBalance::default();
    for entry in &entries {
        let mut parts = entry.split_whitespace();
        let (Some(amount), Some(symbol), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(RelayError::Parse(format!(
                "malformed balance entry: {:?}",
                entry
            )));
        };
        let Some(token) = Token::from_symbol(symbol) else {
            continue;
        };
        let amount = Decimal::from_str(amount)
            .map_err(|e| RelayError::Parse(format!("balance amount {:?}: {}", amount, e)))?;
        balance.set(token, amount);
    }
    Ok(balance)
}

/// Parse an AtomicAssets `/assets` body into an inventory
pub fn parse_assets(body: &str, categories: &[AssetCategory]) -> Result<AssetInventory, RelayError> {
    let response: AssetsResponse =
        serde_json::from_str(body).map_err(|e| RelayError::Parse(format!("assets: {}", e)))?;

    let mut inventory = AssetInventory::new(categories);
    for entry in &response.data {
        if let Some(template) = &entry.template {
            inventory.push(&template.template_id, &entry.asset_id);
        }
    }
    Ok(inventory)
}
