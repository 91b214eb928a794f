//! Allocation Planner
//!
//! Splits one balance/asset snapshot across the configured recipients.
//! Recipients are served strictly in configured order from a shared
//! pool; nothing is ever handed back to an earlier recipient.

use rust_decimal::Decimal;
use tracing::{debug, info};

use super::types::{AssetInventory, RecipientRequest, Token, TokenBalance, TransferPlan};

/// Recipient whose fungible request could not be covered
#[derive(Debug, Clone, PartialEq)]
pub struct Skipped {
    pub recipient: String,
    /// First under-funded token (food, wood, gold order)
    pub token: Token,
    pub available: Decimal,
    pub requested: Decimal,
}

/// Asset request served only partially
#[derive(Debug, Clone, PartialEq)]
pub struct Shortfall {
    pub recipient: String,
    pub category: String,
    pub requested: usize,
    pub granted: usize,
}

impl Shortfall {
    pub fn missing(&self) -> usize {
        self.requested - self.granted
    }
}

/// Result of fungible planning
#[derive(Debug, Clone, PartialEq)]
pub struct TokenAllocation {
    pub plans: Vec<TransferPlan>,
    pub skipped: Vec<Skipped>,
    /// Pool left after every granted plan
    pub remaining: TokenBalance,
}

/// Result of asset planning
#[derive(Debug, Clone, PartialEq)]
pub struct AssetAllocation {
    pub plans: Vec<TransferPlan>,
    pub shortfalls: Vec<Shortfall>,
    pub remaining: AssetInventory,
}

/// All-or-nothing fungible planning.
///
/// A recipient is granted its full request only if every token is covered
/// by what is left in the pool; otherwise it gets nothing this cycle and
/// planning moves on to the next recipient.
pub fn plan_tokens(balance: &TokenBalance, recipients: &[RecipientRequest]) -> TokenAllocation {
    let mut pool = *balance;
    let mut plans = Vec::new();
    let mut skipped = Vec::new();

    for recipient in recipients {
        let need = recipient.tokens();
        if need.is_zero() {
            continue;
        }

        if let Some(token) = pool.first_shortfall(&need) {
            info!(
                recipient = %recipient.account,
                token = %token,
                available = %pool.get(token),
                requested = %need.get(token),
                "Insufficient {} for recipient, skipping",
                token
            );
            skipped.push(Skipped {
                recipient: recipient.account.clone(),
                token,
                available: pool.get(token),
                requested: need.get(token),
            });
            continue;
        }

        pool.deduct(&need);
        debug!(recipient = %recipient.account, granted = %need, remaining = %pool, "Tokens allocated");
        plans.push(TransferPlan::Tokens {
            to: recipient.account.clone(),
            amounts: need,
        });
    }

    TokenAllocation {
        plans,
        skipped,
        remaining: pool,
    }
}

/// First-in-first-served asset planning.
///
/// Each recipient takes up to its requested count from the front of each
/// category; a short category is drained and the gap recorded.
pub fn plan_assets(inventory: &AssetInventory, recipients: &[RecipientRequest]) -> AssetAllocation {
    let mut pool = inventory.clone();
    let categories: Vec<String> = pool.categories().map(|c| c.name.clone()).collect();
    let mut plans = Vec::new();
    let mut shortfalls = Vec::new();

    for recipient in recipients {
        if !recipient.wants_assets() {
            continue;
        }

        let mut asset_ids = Vec::new();
        for category in &categories {
            let requested = recipient.requested_assets(category);
            if requested == 0 {
                continue;
            }

            let taken = pool.take_front(category, requested);
            if taken.len() < requested {
                info!(
                    recipient = %recipient.account,
                    category = %category,
                    requested,
                    granted = taken.len(),
                    "Not enough {}, transferring all {} left",
                    category,
                    taken.len()
                );
                shortfalls.push(Shortfall {
                    recipient: recipient.account.clone(),
                    category: category.clone(),
                    requested,
                    granted: taken.len(),
                });
            } else {
                debug!(recipient = %recipient.account, category = %category, count = requested, "Assets allocated");
            }
            asset_ids.extend(taken);
        }

        if asset_ids.is_empty() {
            info!(recipient = %recipient.account, "Nothing to transfer");
            continue;
        }
        plans.push(TransferPlan::Assets {
            to: recipient.account.clone(),
            asset_ids,
        });
    }

    AssetAllocation {
        plans,
        shortfalls,
        remaining: pool,
    }
}
