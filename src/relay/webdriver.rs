//! WebDriver Signing Bridge
//!
//! Drives an already logged-in browser session over the W3C WebDriver
//! protocol. The session is created (and the wallet login completed)
//! outside this process; the bridge only injects the signer scripts,
//! runs `wax_login` / `wax_transact` in the page, and deletes the
//! session on shutdown.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::bridge::{BridgeError, BridgeReply, SigningBridge};
use super::payload::TransactionPayload;
use super::scripts::SignerScripts;

/// Extra HTTP headroom on top of the in-page script timeout
const HTTP_GRACE: Duration = Duration::from_secs(10);

#[derive(Deserialize, Debug)]
struct WireResponse {
    #[serde(default)]
    value: Value,
}

/// Signing bridge backed by a WebDriver session
pub struct WebDriverBridge {
    client: reqwest::Client,
    /// `{server}/session/{id}`
    session_url: String,
    rpc_domain: String,
    scripts: &'static SignerScripts,
    script_timeout: Duration,
}

impl WebDriverBridge {
    pub fn new(
        server_url: &str,
        session_id: &str,
        rpc_domain: &str,
        scripts: &'static SignerScripts,
        script_timeout: Duration,
    ) -> Result<Self, BridgeError> {
        info!(server = server_url, session = session_id, "Attaching to WebDriver session");

        let client = reqwest::Client::builder()
            .timeout(script_timeout + HTTP_GRACE)
            .no_proxy()
            .build()
            .map_err(|e| BridgeError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            session_url: format!("{}/session/{}", server_url.trim_end_matches('/'), session_id),
            rpc_domain: rpc_domain.to_string(),
            scripts,
            script_timeout,
        })
    }

    /// Run a synchronous script (returned promises are awaited by the driver)
    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value, BridgeError> {
        let response = self
            .client
            .post(format!("{}/execute/sync", self.session_url))
            .json(&json!({ "script": script, "args": args }))
            .send()
            .await
            .map_err(|e| BridgeError::Transport(format!("WebDriver request failed: {}", e)))?;

        let status = response.status();
        let body: WireResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::Transport(format!("Invalid WebDriver response: {}", e)))?;

        if status.is_success() {
            Ok(body.value)
        } else {
            Err(failure_from_value(&body.value))
        }
    }

    async fn set_script_timeout(&self) -> Result<(), BridgeError> {
        let response = self
            .client
            .post(format!("{}/timeouts", self.session_url))
            .json(&json!({ "script": self.script_timeout.as_millis() as u64 }))
            .send()
            .await
            .map_err(|e| BridgeError::Transport(format!("WebDriver request failed: {}", e)))?;

        if response.status().is_success() {
            return Ok(());
        }
        let body: WireResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::Transport(format!("Invalid WebDriver response: {}", e)))?;
        Err(failure_from_value(&body.value))
    }

    async fn ensure_injected(&self) -> Result<(), BridgeError> {
        let loaded = self
            .execute_script("return window.mywax != undefined;", Vec::new())
            .await?;
        if loaded.as_bool() == Some(true) {
            return Ok(());
        }

        debug!("Injecting signer scripts");
        self.execute_script(&self.scripts.library_injection(), Vec::new())
            .await?;
        self.execute_script(&self.scripts.glue_for(&self.rpc_domain), Vec::new())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SigningBridge for WebDriverBridge {
    fn name(&self) -> &'static str {
        "webdriver"
    }

    async fn prepare(&self) -> Result<(), BridgeError> {
        self.set_script_timeout().await?;
        self.ensure_injected().await
    }

    async fn check_session(&self) -> Result<bool, BridgeError> {
        self.ensure_injected().await?;
        let value = self
            .execute_script("return window.wax_login();", Vec::new())
            .await?;
        info!(reply = %value, "window.wax_login()");
        Ok(parse_login_reply(&value))
    }

    async fn execute(&self, payload: &TransactionPayload) -> Result<BridgeReply, BridgeError> {
        self.ensure_injected().await?;
        let value = self
            .execute_script(
                "return window.wax_transact(arguments[0]);",
                vec![payload.to_json()],
            )
            .await?;
        parse_transact_reply(value)
    }

    async fn close(&self) {
        info!("Closing WebDriver session");
        if let Err(e) = self.client.delete(&self.session_url).send().await {
            warn!(error = %e, "Failed to delete WebDriver session");
        }
    }
}

/// Map a WebDriver error object (`{"error", "message"}`) onto a bridge error
pub fn failure_from_value(value: &Value) -> BridgeError {
    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let message = value.get("message").and_then(Value::as_str).unwrap_or("");
    let detail = format!("{}: {}", error, message);

    match error {
        "invalid session id" => BridgeError::SessionExpired(detail),
        "no such window" => BridgeError::Unavailable(detail),
        _ => BridgeError::Transport(detail),
    }
}

/// `wax_login()` resolves to `[ok, userAccount]`
pub fn parse_login_reply(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.first().and_then(Value::as_bool).unwrap_or(false),
        Value::Bool(ok) => *ok,
        _ => false,
    }
}

/// `wax_transact()` resolves to `[ok, result]`; result is an error string when `ok` is false
pub fn parse_transact_reply(value: Value) -> Result<BridgeReply, BridgeError> {
    let mut items = match value {
        Value::Array(items) => items,
        other => {
            return Err(BridgeError::Transport(format!(
                "unexpected wax_transact reply: {}",
                other
            )));
        }
    };
    if items.len() != 2 {
        return Err(BridgeError::Transport(format!(
            "unexpected wax_transact reply length: {}",
            items.len()
        )));
    }
    let result = items.pop().unwrap_or(Value::Null);
    let ok = items.pop().and_then(|v| v.as_bool()).ok_or_else(|| {
        BridgeError::Transport("wax_transact reply has no success flag".to_string())
    })?;

    if ok {
        return Ok(BridgeReply::Signed(result));
    }
    let text = match result {
        Value::String(s) => s,
        other => other.to_string(),
    };
    Ok(BridgeReply::Rejected(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;

    static SCRIPTS: Lazy<SignerScripts> =
        Lazy::new(|| SignerScripts::from_sources("var waxjs = {};", ""));

    #[test]
    fn test_failure_classification() {
        let expired = json!({"error": "invalid session id", "message": "session deleted"});
        assert!(matches!(
            failure_from_value(&expired),
            BridgeError::SessionExpired(_)
        ));

        let closed = json!({"error": "no such window", "message": "target window already closed"});
        assert!(matches!(
            failure_from_value(&closed),
            BridgeError::Unavailable(_)
        ));

        let script = json!({"error": "javascript error", "message": "wax_transact is not a function"});
        assert_eq!(
            failure_from_value(&script),
            BridgeError::Transport("javascript error: wax_transact is not a function".into())
        );

        assert!(matches!(
            failure_from_value(&Value::Null),
            BridgeError::Transport(_)
        ));
    }

    #[test]
    fn test_parse_login_reply() {
        assert!(parse_login_reply(&json!([true, "src.wam"])));
        assert!(!parse_login_reply(&json!([false, "login failed"])));
        assert!(parse_login_reply(&json!(true)));
        assert!(!parse_login_reply(&Value::Null));
    }

    #[test]
    fn test_parse_transact_reply() {
        let signed = parse_transact_reply(json!([true, {"transaction_id": "ab12"}])).unwrap();
        assert_eq!(signed.transaction_id(), Some("ab12"));

        let rejected = parse_transact_reply(json!([
            false,
            "transaction net usage is too high"
        ]))
        .unwrap();
        assert_eq!(
            rejected,
            BridgeReply::Rejected("transaction net usage is too high".into())
        );

        let structured = parse_transact_reply(json!([false, {"code": 3080004}])).unwrap();
        assert_eq!(structured, BridgeReply::Rejected("{\"code\":3080004}".into()));

        assert!(parse_transact_reply(json!({"ok": true})).is_err());
        assert!(parse_transact_reply(json!([true])).is_err());
        assert!(parse_transact_reply(json!(["yes", {}])).is_err());
    }

    #[test]
    fn test_session_url() {
        let bridge = WebDriverBridge::new(
            "http://127.0.0.1:9515/",
            "f00d",
            "https://wax.greymass.com",
            &SCRIPTS,
            Duration::from_secs(60),
        )
        .unwrap();
        assert_eq!(bridge.session_url, "http://127.0.0.1:9515/session/f00d");
        assert_eq!(bridge.name(), "webdriver");
    }

    #[tokio::test]
    async fn test_unreachable_driver_is_transport_error() {
        let bridge = WebDriverBridge::new(
            "http://127.0.0.1:9",
            "f00d",
            "https://wax.greymass.com",
            &SCRIPTS,
            Duration::from_millis(100),
        )
        .unwrap();
        let err = bridge.prepare().await.unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
    }
}
