//! Primary market-data provider, keyed by `{issuer}_{currencyHex}`.

use analysis_core::{AnalysisResult, DataSource, MarketDataProvider, TokenId, TokenInfo};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::{count, endpoint, get_json, http_client, number, MarketDataConfig};

#[derive(Clone)]
pub struct XrplToClient {
    client: Client,
    base_url: String,
    image_base: String,
}

impl XrplToClient {
    pub fn new(config: &MarketDataConfig) -> Self {
        Self {
            client: http_client(config.timeout),
            base_url: config.xrplto_base.clone(),
            image_base: config.xrplto_image_base.clone(),
        }
    }

    /// Unmodified token document for an identifier
    pub async fn token_raw(&self, identifier: &str) -> AnalysisResult<Value> {
        let url = endpoint(&self.base_url, &["token", identifier])?;
        get_json(&self.client, url, "xrplto.token").await
    }

    /// Unmodified sparkline document
    pub async fn sparkline_raw(&self, md5: &str) -> AnalysisResult<Value> {
        let url = endpoint(&self.base_url, &["sparkline", md5])?;
        get_json(&self.client, url, "xrplto.sparkline").await
    }

    /// Where the provider serves the token's image
    pub fn image_url(&self, md5: &str) -> AnalysisResult<String> {
        endpoint(&self.image_base, &[md5]).map(|u| u.to_string())
    }
}

/// Normalise a `{"token": {...}}` document. `None` when the payload carries
/// no token object.
pub fn normalize(token: &TokenId, doc: &Value) -> Option<TokenInfo> {
    let t = doc.get("token").filter(|t| t.is_object())?;

    Some(TokenInfo {
        issuer: token.issuer.clone(),
        currency: token.currency.clone(),
        name: t
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| Some(token.symbol()).filter(|s| !s.is_empty())),
        holders: count(t.get("holders")),
        usd: number(t.get("usd")),
        market_cap: number(t.get("marketcap")),
        change_24h: number(t.get("pro24h")),
        md5: t.get("md5").and_then(|v| v.as_str()).map(str::to_string),
        source: DataSource::Primary,
        details: t.clone(),
    })
}

#[async_trait]
impl MarketDataProvider for XrplToClient {
    fn name(&self) -> &'static str {
        "xrpl.to"
    }

    async fn token_info(&self, token: &TokenId) -> AnalysisResult<Option<TokenInfo>> {
        let doc = self.token_raw(&token.identifier()).await?;
        let info = normalize(token, &doc);
        tracing::info!(
            identifier = %token.identifier(),
            has_token = info.is_some(),
            holders = ?info.as_ref().and_then(|i| i.holders),
            "xrplto.token.ok"
        );
        Ok(info)
    }

    async fn sparkline(&self, md5: &str) -> AnalysisResult<Option<Value>> {
        // missing history is not an error for callers
        match self.sparkline_raw(md5).await {
            Ok(doc) => {
                let points = doc
                    .pointer("/data/prices")
                    .and_then(|p| p.as_array())
                    .map_or(0, |a| a.len());
                tracing::info!(points, "xrplto.sparkline.ok");
                Ok(Some(doc))
            }
            Err(e) => {
                tracing::debug!(error = %e, "xrplto.sparkline.unavailable");
                Ok(None)
            }
        }
    }
}
