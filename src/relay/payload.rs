//! Transaction payloads handed to the signing bridge.
//!
//! Shape matches what the in-page signer passes to `api.transact`:
//! `{ actions: [{ account, name, authorization, data }] }`.

use serde::Serialize;

use super::types::TransferPlan;

/// Token contract and its batch transfer action
pub const TOKEN_CONTRACT: &str = "farmerstoken";
pub const TOKEN_ACTION: &str = "transfers";

/// NFT contract and its transfer action
pub const ASSET_CONTRACT: &str = "atomicassets";
pub const ASSET_ACTION: &str = "transfer";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionPayload {
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    pub account: String,
    pub name: String,
    pub authorization: Vec<Authorization>,
    pub data: ActionData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Authorization {
    pub actor: String,
    pub permission: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActionData {
    Tokens {
        from: String,
        to: String,
        quantities: Vec<String>,
        memo: String,
    },
    Assets {
        from: String,
        to: String,
        asset_ids: Vec<String>,
        memo: String,
    },
}

impl TransactionPayload {
    /// Single-action transfer signed with `from@active`
    pub fn for_plan(from: &str, plan: &TransferPlan, token_memo: &str, asset_memo: &str) -> Self {
        let (account, name, data) = match plan {
            TransferPlan::Tokens { to, amounts } => (
                TOKEN_CONTRACT,
                TOKEN_ACTION,
                ActionData::Tokens {
                    from: from.to_string(),
                    to: to.clone(),
                    quantities: amounts.quantities(),
                    memo: token_memo.to_string(),
                },
            ),
            TransferPlan::Assets { to, asset_ids } => (
                ASSET_CONTRACT,
                ASSET_ACTION,
                ActionData::Assets {
                    from: from.to_string(),
                    to: to.clone(),
                    asset_ids: asset_ids.clone(),
                    memo: asset_memo.to_string(),
                },
            ),
        };

        Self {
            actions: vec![Action {
                account: account.to_string(),
                name: name.to_string(),
                authorization: vec![Authorization {
                    actor: from.to_string(),
                    permission: "active".to_string(),
                }],
                data,
            }],
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        // Only strings and vectors of strings; serialization cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
