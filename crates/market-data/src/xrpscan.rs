//! Secondary market-data provider, keyed by `{symbol}.{issuer}`.
//!
//! Also exposes passthroughs for the issuer account views the secondary
//! provider offers (obligations, assets, transactions).

use analysis_core::{
    currency, AnalysisError, AnalysisResult, DataSource, MarketDataProvider, TokenId, TokenInfo,
};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};

use crate::{count, endpoint, get_json, http_client, number, MarketDataConfig};

/// Issuer account views available for passthrough
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountView {
    Obligations,
    Assets,
    Transactions,
}

impl AccountView {
    fn segment(self) -> &'static str {
        match self {
            AccountView::Obligations => "obligations",
            AccountView::Assets => "assets",
            AccountView::Transactions => "transactions",
        }
    }
}

#[derive(Clone)]
pub struct XrpScanClient {
    client: Client,
    base_url: String,
}

impl XrpScanClient {
    pub fn new(config: &MarketDataConfig) -> Self {
        Self {
            client: http_client(config.timeout),
            base_url: config.xrpscan_base.clone(),
        }
    }

    /// Token endpoint for the pair, or `None` when the currency does not
    /// decode to a non-empty symbol.
    pub fn token_url(&self, token: &TokenId) -> AnalysisResult<Option<Url>> {
        let symbol = currency::display_symbol(&token.currency);
        if symbol.is_empty() {
            return Ok(None);
        }
        let key = format!("{}.{}", symbol, token.issuer);
        endpoint(&self.base_url, &["token", &key]).map(Some)
    }

    pub async fn token_raw(&self, token: &TokenId) -> AnalysisResult<Value> {
        let url = self.token_url(token)?.ok_or_else(|| {
            AnalysisError::MalformedInput(format!(
                "currency {} has no decodable symbol",
                token.currency
            ))
        })?;
        get_json(&self.client, url, "xrpscan.token").await
    }

    pub async fn account_raw(
        &self,
        issuer: &str,
        view: AccountView,
        params: &[(&str, String)],
    ) -> AnalysisResult<Value> {
        let mut url = endpoint(&self.base_url, &["account", issuer, view.segment()])?;
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        get_json(&self.client, url, "xrpscan.account").await
    }
}

/// Normalise a secondary token document into the shared shape
pub fn normalize(token: &TokenId, symbol: &str, doc: &Value) -> TokenInfo {
    TokenInfo {
        issuer: token.issuer.clone(),
        currency: token.currency.clone(),
        name: Some(symbol.to_string()),
        holders: count(doc.get("holders")),
        usd: number(doc.get("price")),
        market_cap: number(doc.get("marketcap")),
        change_24h: None,
        md5: None,
        source: DataSource::Secondary,
        details: json!({
            "blackholed": doc.get("blackholed").cloned().unwrap_or(Value::Null),
            "amms": doc.get("amms").cloned().unwrap_or(Value::Null),
            "metrics": doc.get("metrics").cloned().unwrap_or(Value::Null),
        }),
    }
}

#[async_trait]
impl MarketDataProvider for XrpScanClient {
    fn name(&self) -> &'static str {
        "xrpscan"
    }

    async fn token_info(&self, token: &TokenId) -> AnalysisResult<Option<TokenInfo>> {
        let url = match self.token_url(token)? {
            Some(url) => url,
            None => {
                tracing::debug!(currency = %token.currency, "xrpscan.token.skipped");
                return Ok(None);
            }
        };

        let doc = get_json(&self.client, url, "xrpscan.token").await?;
        let symbol = currency::display_symbol(&token.currency);
        let info = normalize(token, &symbol, &doc);
        tracing::info!(holders = ?info.holders, usd = ?info.usd, "xrpscan.token.ok");
        Ok(Some(info))
    }
}
