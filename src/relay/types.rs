//! Relay Core Types
//!
//! Balances, inventories, recipient requests and the plans/records that
//! flow through one scan cycle.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Decimal places used by every fungible token on the wire ("40.0000 FWF")
pub const TOKEN_PRECISION: u32 = 4;

/// Local correlation id for one submitted transaction (ULID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId(ulid::Ulid);

impl TransferId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Fungible token kinds held by the source account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    Food,
    Gold,
    Wood,
}

impl Token {
    /// Wire order used when building transfer quantities
    pub const ALL: [Token; 3] = [Token::Food, Token::Gold, Token::Wood];

    /// Order in which requirements are checked during planning
    pub const CHECK_ORDER: [Token; 3] = [Token::Food, Token::Wood, Token::Gold];

    /// On-chain symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Token::Food => "FWF",
            Token::Gold => "FWG",
            Token::Wood => "FWW",
        }
    }

    /// Case-insensitive symbol lookup
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.to_ascii_uppercase().as_str() {
            "FWF" => Some(Token::Food),
            "FWG" => Some(Token::Gold),
            "FWW" => Some(Token::Wood),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Token::Food => "food",
            Token::Gold => "gold",
            Token::Wood => "wood",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Render a token quantity the way the token contract expects it
pub fn format_quantity(amount: Decimal, token: Token) -> String {
    let mut scaled = truncate_quantity(amount);
    scaled.rescale(TOKEN_PRECISION);
    format!("{} {}", scaled, token.symbol())
}

/// Drop digits the token contract cannot represent. Never rounds up.
pub fn truncate_quantity(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(TOKEN_PRECISION, RoundingStrategy::ToZero)
}

/// Whether `amount` carries more decimal places than the token contract accepts
pub fn exceeds_precision(amount: Decimal) -> bool {
    amount.normalize().scale() > TOKEN_PRECISION
}

/// Fungible balances (also used for requested and granted quantities)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    #[serde(default)]
    pub food: Decimal,
    #[serde(default)]
    pub gold: Decimal,
    #[serde(default)]
    pub wood: Decimal,
}

impl TokenBalance {
    pub fn new(food: Decimal, gold: Decimal, wood: Decimal) -> Self {
        Self { food, gold, wood }
    }

    #[inline]
    pub fn get(&self, token: Token) -> Decimal {
        match token {
            Token::Food => self.food,
            Token::Gold => self.gold,
            Token::Wood => self.wood,
        }
    }

    pub fn set(&mut self, token: Token, amount: Decimal) {
        match token {
            Token::Food => self.food = amount,
            Token::Gold => self.gold = amount,
            Token::Wood => self.wood = amount,
        }
    }

    pub fn is_zero(&self) -> bool {
        Token::ALL.iter().all(|t| self.get(*t).is_zero())
    }

    pub fn has_negative(&self) -> bool {
        Token::ALL.iter().any(|t| self.get(*t).is_sign_negative())
    }

    /// First token (in check order) where `need` exceeds this balance
    pub fn first_shortfall(&self, need: &TokenBalance) -> Option<Token> {
        Token::CHECK_ORDER
            .into_iter()
            .find(|t| self.get(*t) < need.get(*t))
    }

    /// Deduct `amount` from every token. Callers check `first_shortfall` first.
    pub fn deduct(&mut self, amount: &TokenBalance) {
        for token in Token::ALL {
            self.set(token, self.get(token) - amount.get(token));
        }
    }

    /// Non-zero quantities in wire format, food/gold/wood order
    pub fn quantities(&self) -> Vec<String> {
        Token::ALL
            .into_iter()
            .filter(|t| truncate_quantity(self.get(*t)) > Decimal::ZERO)
            .map(|t| format_quantity(self.get(t), t))
            .collect()
    }
}

impl fmt::Display for TokenBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FWF={} FWG={} FWW={}",
            self.food, self.gold, self.wood
        )
    }
}

/// NFT category, identified on chain by its template id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCategory {
    /// Name used by recipient requests (e.g. "barley")
    pub name: String,
    pub template_id: String,
}

impl AssetCategory {
    pub fn new(name: impl Into<String>, template_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template_id: template_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CategoryStock {
    category: AssetCategory,
    asset_ids: VecDeque<String>,
}

/// Owned asset ids grouped by category, in query order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetInventory {
    stocks: Vec<CategoryStock>,
    seen: HashSet<String>,
}

impl AssetInventory {
    /// Empty inventory tracking the given categories (config order)
    pub fn new(categories: &[AssetCategory]) -> Self {
        Self {
            stocks: categories
                .iter()
                .map(|c| CategoryStock {
                    category: c.clone(),
                    asset_ids: VecDeque::new(),
                })
                .collect(),
            seen: HashSet::new(),
        }
    }

    /// Record an owned asset. Returns false for untracked templates and duplicates.
    pub fn push(&mut self, template_id: &str, asset_id: &str) -> bool {
        let Some(stock) = self
            .stocks
            .iter_mut()
            .find(|s| s.category.template_id == template_id)
        else {
            return false;
        };
        if !self.seen.insert(asset_id.to_string()) {
            return false;
        }
        stock.asset_ids.push_back(asset_id.to_string());
        true
    }

    pub fn categories(&self) -> impl Iterator<Item = &AssetCategory> {
        self.stocks.iter().map(|s| &s.category)
    }

    /// Remaining count for a category (by name)
    pub fn count(&self, name: &str) -> usize {
        self.stock(name).map(|s| s.asset_ids.len()).unwrap_or(0)
    }

    pub fn ids(&self, name: &str) -> Vec<String> {
        self.stock(name)
            .map(|s| s.asset_ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.stocks.iter().map(|s| s.asset_ids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Take up to `n` ids from the front of a category
    pub fn take_front(&mut self, name: &str, n: usize) -> Vec<String> {
        let Some(stock) = self.stocks.iter_mut().find(|s| s.category.name == name) else {
            return Vec::new();
        };
        let n = n.min(stock.asset_ids.len());
        stock.asset_ids.drain(..n).collect()
    }

    /// Drop specific ids wherever they are (confirmed transfers)
    pub fn remove_ids(&mut self, ids: &[String]) {
        let gone: HashSet<&String> = ids.iter().collect();
        for stock in &mut self.stocks {
            stock.asset_ids.retain(|id| !gone.contains(id));
        }
    }

    fn stock(&self, name: &str) -> Option<&CategoryStock> {
        self.stocks.iter().find(|s| s.category.name == name)
    }
}

impl fmt::Display for AssetInventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .stocks
            .iter()
            .map(|s| format!("{}={}", s.category.name, s.asset_ids.len()))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// One configured recipient and what it should receive each cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientRequest {
    pub account: String,
    #[serde(default)]
    pub food: Decimal,
    #[serde(default)]
    pub gold: Decimal,
    #[serde(default)]
    pub wood: Decimal,
    /// Requested count per asset category name
    #[serde(default)]
    pub assets: BTreeMap<String, usize>,
}

impl RecipientRequest {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            food: Decimal::ZERO,
            gold: Decimal::ZERO,
            wood: Decimal::ZERO,
            assets: BTreeMap::new(),
        }
    }

    pub fn with_tokens(mut self, food: Decimal, gold: Decimal, wood: Decimal) -> Self {
        self.food = food;
        self.gold = gold;
        self.wood = wood;
        self
    }

    pub fn with_assets(mut self, category: impl Into<String>, count: usize) -> Self {
        self.assets.insert(category.into(), count);
        self
    }

    /// Requested amounts at wire precision; what gets planned is what gets sent
    pub fn tokens(&self) -> TokenBalance {
        TokenBalance::new(
            truncate_quantity(self.food),
            truncate_quantity(self.gold),
            truncate_quantity(self.wood),
        )
    }

    /// Amounts exactly as configured
    pub fn requested_tokens(&self) -> TokenBalance {
        TokenBalance::new(self.food, self.gold, self.wood)
    }

    pub fn wants_tokens(&self) -> bool {
        !self.tokens().is_zero()
    }

    pub fn wants_assets(&self) -> bool {
        self.assets.values().any(|n| *n > 0)
    }

    pub fn requested_assets(&self, category: &str) -> usize {
        self.assets.get(category).copied().unwrap_or(0)
    }
}

/// What one recipient is actually granted this cycle
#[derive(Debug, Clone, PartialEq)]
pub enum TransferPlan {
    Tokens { to: String, amounts: TokenBalance },
    Assets { to: String, asset_ids: Vec<String> },
}

impl TransferPlan {
    pub fn recipient(&self) -> &str {
        match self {
            TransferPlan::Tokens { to, .. } | TransferPlan::Assets { to, .. } => to,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TransferPlan::Tokens { amounts, .. } => amounts.is_zero(),
            TransferPlan::Assets { asset_ids, .. } => asset_ids.is_empty(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransferPlan::Tokens { .. } => "tokens",
            TransferPlan::Assets { .. } => "assets",
        }
    }
}

impl fmt::Display for TransferPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferPlan::Tokens { to, amounts } => write!(f, "{} -> {}", amounts, to),
            TransferPlan::Assets { to, asset_ids } => {
                write!(f, "{} assets -> {}", asset_ids.len(), to)
            }
        }
    }
}

/// Current holdings of the source account within one cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Holdings {
    pub tokens: Option<TokenBalance>,
    pub assets: Option<AssetInventory>,
}

impl Holdings {
    /// Remove a confirmed transfer from the pool
    pub fn deduct(&mut self, plan: &TransferPlan) {
        match plan {
            TransferPlan::Tokens { amounts, .. } => {
                if let Some(tokens) = self.tokens.as_mut() {
                    tokens.deduct(amounts);
                }
            }
            TransferPlan::Assets { asset_ids, .. } => {
                if let Some(assets) = self.assets.as_mut() {
                    assets.remove_ids(asset_ids);
                }
            }
        }
    }
}
