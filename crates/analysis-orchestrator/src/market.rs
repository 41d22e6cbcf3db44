use analysis_core::{MarketDataProvider, TokenId, TokenInfo};
use serde_json::Value;
use std::sync::Arc;

/// Market-data providers tried in order; the first one with data wins.
#[derive(Clone)]
pub struct MarketDataChain {
    providers: Vec<Arc<dyn MarketDataProvider>>,
}

impl MarketDataChain {
    pub fn new(providers: Vec<Arc<dyn MarketDataProvider>>) -> Self {
        Self { providers }
    }

    pub fn primary(&self) -> Option<&Arc<dyn MarketDataProvider>> {
        self.providers.first()
    }

    /// `None` only when every provider failed or had nothing.
    pub async fn fetch_token_info(&self, token: &TokenId) -> Option<TokenInfo> {
        for provider in &self.providers {
            match provider.token_info(token).await {
                Ok(Some(info)) => return Some(info),
                Ok(None) => {
                    tracing::info!(provider = provider.name(), "market.token.empty");
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "market.token.error");
                }
            }
        }
        None
    }

    pub async fn fetch_sparkline(&self, md5: &str) -> Option<Value> {
        for provider in &self.providers {
            match provider.sparkline(md5).await {
                Ok(Some(points)) => return Some(points),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "market.sparkline.error");
                }
            }
        }
        None
    }
}
