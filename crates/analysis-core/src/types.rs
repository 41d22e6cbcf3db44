use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{address, currency, AnalysisError};

/// Issued token identity: issuer account + currency code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId {
    pub issuer: String,
    pub currency: String,
}

impl TokenId {
    /// Construct without validation (tests, trusted callers).
    pub fn new(issuer: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            currency: currency.into(),
        }
    }

    /// Validate the issuer address and the currency code.
    ///
    /// Hex currencies are normalised to uppercase.
    pub fn parse(issuer: &str, currency_code: &str) -> Result<Self, AnalysisError> {
        let issuer = issuer.trim();
        let code = currency_code.trim();

        if !address::is_valid_account(issuer) {
            return Err(AnalysisError::MalformedInput(format!(
                "invalid issuer address: {}",
                issuer
            )));
        }

        let currency = if currency::is_currency_hex(code) {
            code.to_uppercase()
        } else if currency::is_standard_code(code) {
            code.to_string()
        } else {
            return Err(AnalysisError::MalformedInput(format!(
                "currency must be a 3-character code or 40 hex digits: {}",
                code
            )));
        };

        Ok(Self::new(issuer, currency))
    }

    /// `{issuer}_{currency}`, the key used by the primary market-data provider
    pub fn identifier(&self) -> String {
        format!("{}_{}", self.issuer, self.currency)
    }

    /// Display symbol (decoded when the currency is a hex code)
    pub fn symbol(&self) -> String {
        currency::display_symbol(&self.currency)
    }

    pub fn as_asset(&self) -> Asset {
        Asset::issued(&self.currency, &self.issuer)
    }
}

/// Ledger amount descriptor as used by order-book and AMM queries.
/// The native asset carries no issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl Asset {
    pub fn xrp() -> Self {
        Self {
            currency: "XRP".to_string(),
            issuer: None,
        }
    }

    pub fn issued(currency: &str, issuer: &str) -> Self {
        Self {
            currency: currency.to_string(),
            issuer: Some(issuer.to_string()),
        }
    }

    pub fn is_xrp(&self) -> bool {
        self.issuer.is_none() && self.currency.eq_ignore_ascii_case("XRP")
    }

    /// Parse a `counter` query parameter: `xrp` (or absent) means the native
    /// asset, anything else is read as a JSON asset object. Unparseable input
    /// falls back to the native asset.
    pub fn from_counter_param(param: Option<&str>) -> Self {
        match param.map(str::trim) {
            None | Some("") => Self::xrp(),
            Some(p) if p.eq_ignore_ascii_case("xrp") => Self::xrp(),
            Some(p) => serde_json::from_str(p).unwrap_or_else(|_| Self::xrp()),
        }
    }
}

/// Which market-data provider produced a [`TokenInfo`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Primary,
    Secondary,
}

/// Normalised token market data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub issuer: String,
    pub currency: String,
    pub name: Option<String>,
    pub holders: Option<u64>,
    pub usd: Option<f64>,
    pub market_cap: Option<f64>,
    pub change_24h: Option<f64>,
    /// Content hash keying the provider's image and sparkline endpoints
    #[serde(default)]
    pub md5: Option<String>,
    pub source: DataSource,
    /// Provider-specific fields kept verbatim
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

/// Raw `AccountRoot` fields returned by `account_info`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountRoot {
    pub account: String,
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub transfer_rate: Option<u64>,
    #[serde(default)]
    pub tick_size: Option<u32>,
    #[serde(default)]
    pub owner_count: Option<u64>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub regular_key: Option<String>,
}

pub const LSF_DEFAULT_RIPPLE: u32 = 0x0080_0000;
pub const LSF_GLOBAL_FREEZE: u32 = 0x0040_0000;
pub const LSF_NO_FREEZE: u32 = 0x0020_0000;
pub const LSF_DISABLE_MASTER: u32 = 0x0010_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerFlags {
    pub default_ripple: bool,
    pub global_freeze: bool,
    pub no_freeze: bool,
    pub master_disabled: bool,
}

impl IssuerFlags {
    pub fn from_bits(flags: u32) -> Self {
        Self {
            default_ripple: flags & LSF_DEFAULT_RIPPLE != 0,
            global_freeze: flags & LSF_GLOBAL_FREEZE != 0,
            no_freeze: flags & LSF_NO_FREEZE != 0,
            master_disabled: flags & LSF_DISABLE_MASTER != 0,
        }
    }
}

/// Decoded issuer account state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuerSummary {
    pub account: String,
    pub flags: IssuerFlags,
    pub transfer_rate: Option<u64>,
    pub tick_size: Option<u32>,
    pub owner_count: Option<u64>,
    pub domain: Option<String>,
    pub regular_key_set: bool,
}

impl From<&AccountRoot> for IssuerSummary {
    fn from(root: &AccountRoot) -> Self {
        let domain = root
            .domain
            .as_deref()
            .and_then(|h| hex::decode(h).ok())
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

        Self {
            account: root.account.clone(),
            flags: IssuerFlags::from_bits(root.flags),
            transfer_rate: root.transfer_rate,
            tick_size: root.tick_size,
            owner_count: root.owner_count,
            domain,
            regular_key_set: root.regular_key.is_some(),
        }
    }
}

/// One entry of an `account_lines` page, seen from the queried account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustLine {
    pub account: String,
    pub balance: String,
    pub currency: String,
    #[serde(default)]
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountLinesPage {
    #[serde(default)]
    pub lines: Vec<TrustLine>,
    /// Opaque continuation token; absent on the last page
    #[serde(default)]
    pub marker: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderRecord {
    pub account: String,
    pub balance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Concentration {
    pub top10_pct: f64,
    pub top50_pct: f64,
}

/// Whether `total_holders` was counted on-ledger or borrowed from a
/// market-data provider after an empty scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HolderCountSource {
    Exact,
    Estimated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderReport {
    pub total_holders: u64,
    pub total_balance: f64,
    pub concentration: Concentration,
    /// Ranked descending by balance, truncated to the requested limit
    pub top: Vec<HolderRecord>,
    pub holder_count_source: HolderCountSource,
    pub pages: u32,
}

/// Raw `book_offers` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookOffer {
    #[serde(rename = "Account", default)]
    pub account: Option<String>,
    #[serde(rename = "TakerGets")]
    pub taker_gets: serde_json::Value,
    #[serde(rename = "TakerPays")]
    pub taker_pays: serde_json::Value,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub owner_funds: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookEntry {
    pub price: Option<f64>,
    pub taker_gets: serde_json::Value,
    pub taker_pays: serde_json::Value,
    pub funded: Option<String>,
}

impl From<BookOffer> for OrderBookEntry {
    fn from(offer: BookOffer) -> Self {
        Self {
            price: offer.quality.as_deref().and_then(|q| q.parse().ok()),
            taker_gets: offer.taker_gets,
            taker_pays: offer.taker_pays,
            funded: offer.owner_funds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub bids: Vec<OrderBookEntry>,
    pub asks: Vec<OrderBookEntry>,
}

/// Which lookup produced a [`PoolInfo`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolSource {
    AmmInfo,
    LedgerEntry,
}

/// Resolved AMM pool state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub source: PoolSource,
    /// Resolved with (counter asset, asset) argument order
    pub reversed: bool,
    pub account: Option<String>,
    pub amount: Option<serde_json::Value>,
    pub amount2: Option<serde_json::Value>,
    pub lp_token: Option<serde_json::Value>,
    pub trading_fee: Option<u32>,
    #[serde(default)]
    pub vote_slots: Vec<serde_json::Value>,
}

/// Outcome of pool resolution. Absence of a pool is a normal result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PoolResolution {
    Found(PoolInfo),
    NoPool { message: String },
}

impl PoolResolution {
    pub fn pool(&self) -> Option<&PoolInfo> {
        match self {
            PoolResolution::Found(info) => Some(info),
            PoolResolution::NoPool { .. } => None,
        }
    }
}

/// Unified token report assembled by the orchestrator. Every field is
/// independently nullable; a branch failure never fails the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub token: Option<TokenInfo>,
    pub issuer: Option<IssuerSummary>,
    pub holders: Option<HolderReport>,
    pub orderbook: Option<OrderBookSnapshot>,
    pub amm: Option<PoolResolution>,
    pub sparkline: Option<serde_json::Value>,
    pub ai: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl AnalysisReport {
    pub fn empty() -> Self {
        Self {
            token: None,
            issuer: None,
            holders: None,
            orderbook: None,
            amm: None,
            sparkline: None,
            ai: None,
            generated_at: Utc::now(),
        }
    }

    /// True when no branch produced data. A `NoPool` answer carries none.
    pub fn is_empty(&self) -> bool {
        self.token.is_none()
            && self.issuer.is_none()
            && self.holders.is_none()
            && self.orderbook.is_none()
            && self.amm.as_ref().and_then(PoolResolution::pool).is_none()
            && self.sparkline.is_none()
    }
}

/// One turn of a follow-up conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    /// `ai` for assistant turns, anything else is treated as the user
    pub from: String,
    pub text: String,
}
