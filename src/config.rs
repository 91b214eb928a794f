use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use crate::relay::error::RelayError;
use crate::relay::types::{
    AssetCategory, RecipientRequest, TOKEN_PRECISION, Token, exceeds_precision,
};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default)]
    pub use_json: bool,
    /// hourly | daily | never
    #[serde(default = "default_rotation")]
    pub rotation: String,
    pub accounts: Vec<AccountConfig>,
    pub scripts: ScriptsConfig,
}

/// One source account and everything its loop needs
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccountConfig {
    pub account: String,
    pub rpc_domain: String,
    pub assets_domain: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    #[serde(default = "default_min_scan_interval_secs")]
    pub min_scan_interval_secs: u64,
    /// Pause between chain requests and between submissions; also the
    /// chain query retry interval
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Attempts per chain query, including the first
    #[serde(default = "default_request_retries")]
    pub request_retries: u32,
    /// Consecutive failing cycles before giving up; `~` is unlimited
    #[serde(default)]
    pub max_contract_retries: Option<u32>,
    #[serde(default)]
    pub fatal_contract_errors: Vec<String>,
    #[serde(default = "default_token_memo")]
    pub token_memo: String,
    #[serde(default = "default_asset_memo")]
    pub asset_memo: String,
    #[serde(default)]
    pub asset_categories: Vec<AssetCategory>,
    pub webdriver: WebDriverConfig,
    pub recipients: Vec<RecipientRequest>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WebDriverConfig {
    pub url: String,
    pub session_id: String,
    #[serde(default = "default_script_timeout_secs")]
    pub script_timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScriptsConfig {
    pub signer_library: String,
    pub glue: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "./logs".to_string()
}

fn default_log_file() -> String {
    "relay.log".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

fn default_collection() -> String {
    "farmersworld".to_string()
}

fn default_scan_interval_secs() -> u64 {
    3600
}

fn default_min_scan_interval_secs() -> u64 {
    60
}

fn default_request_interval_ms() -> u64 {
    2000
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_request_retries() -> u32 {
    5
}

fn default_token_memo() -> String {
    "deposit".to_string()
}

fn default_asset_memo() -> String {
    "deposit".to_string()
}

fn default_script_timeout_secs() -> u64 {
    60
}

impl AppConfig {
    /// Load `config/{env}.yaml`
    pub fn load(env: &str) -> Result<Self, RelayError> {
        Self::from_file(&format!("config/{}.yaml", env))
    }

    /// Load and validate configuration from a YAML file
    pub fn from_file(path: &str) -> Result<Self, RelayError> {
        let content = fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("Failed to read {}: {}", path, e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, RelayError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.accounts.is_empty() {
            return Err(RelayError::Config("no accounts configured".into()));
        }
        let mut seen = HashSet::new();
        for account in &self.accounts {
            account.validate()?;
            if !seen.insert(account.account.as_str()) {
                return Err(RelayError::Config(format!(
                    "account {} configured twice",
                    account.account
                )));
            }
        }
        Ok(())
    }

    /// Accounts to run, optionally narrowed to one name
    pub fn select_accounts(&self, only: Option<&str>) -> Result<Vec<AccountConfig>, RelayError> {
        match only {
            None => Ok(self.accounts.clone()),
            Some(name) => self
                .accounts
                .iter()
                .find(|a| a.account == name)
                .cloned()
                .map(|a| vec![a])
                .ok_or_else(|| RelayError::Config(format!("account {} is not configured", name))),
        }
    }
}

impl AccountConfig {
    pub fn validate(&self) -> Result<(), RelayError> {
        let fail = |msg: String| Err(RelayError::Config(format!("{}: {}", self.account, msg)));

        if self.account.trim().is_empty() {
            return Err(RelayError::Config("source account name is empty".into()));
        }
        if self.request_retries < 1 {
            return fail("request_retries must be at least 1".into());
        }
        if self.max_contract_retries == Some(0) {
            return fail("max_contract_retries must be at least 1 or ~".into());
        }

        let mut names = HashSet::new();
        for category in &self.asset_categories {
            if !names.insert(category.name.as_str()) {
                return fail(format!("asset category {} configured twice", category.name));
            }
        }

        for recipient in &self.recipients {
            if recipient.account.trim().is_empty() {
                return fail("recipient account name is empty".into());
            }
            if recipient.account == self.account {
                return fail(format!("recipient {} is the source account", recipient.account));
            }
            let requested = recipient.requested_tokens();
            if requested.has_negative() {
                return fail(format!("recipient {} requests a negative amount", recipient.account));
            }
            if let Some(token) = Token::ALL
                .into_iter()
                .find(|t| exceeds_precision(requested.get(*t)))
            {
                return fail(format!(
                    "recipient {} requests {} with more than {} decimals",
                    recipient.account,
                    token,
                    TOKEN_PRECISION
                ));
            }
            if let Some(unknown) = recipient.assets.keys().find(|k| !names.contains(k.as_str())) {
                return fail(format!(
                    "recipient {} requests unknown asset category {}",
                    recipient.account, unknown
                ));
            }
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn min_scan_interval(&self) -> Duration {
        Duration::from_secs(self.min_scan_interval_secs)
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl WebDriverConfig {
    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs)
    }
}
