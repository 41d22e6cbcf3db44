use async_trait::async_trait;
use serde_json::Value;

use crate::{
    AccountLinesPage, AccountRoot, AnalysisResult, Asset, BookOffer, ChatTurn, TokenId, TokenInfo,
};

/// Read-only ledger queries used by the analysis pipeline
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Whether the underlying node connection is currently established
    fn is_connected(&self) -> bool;

    async fn account_info(&self, account: &str) -> AnalysisResult<AccountRoot>;

    /// One page of trust lines; pass the previous page's marker to continue
    async fn account_lines(
        &self,
        account: &str,
        limit: u32,
        marker: Option<Value>,
    ) -> AnalysisResult<AccountLinesPage>;

    async fn book_offers(
        &self,
        taker_gets: &Asset,
        taker_pays: &Asset,
        limit: u32,
    ) -> AnalysisResult<Vec<BookOffer>>;

    /// `amm_info` result object for the pair, as returned by the node
    async fn amm_info(&self, asset: &Asset, asset2: &Asset) -> AnalysisResult<Value>;

    /// `ledger_entry` result object for the AMM node of the pair
    async fn amm_ledger_entry(&self, asset: &Asset, asset2: &Asset) -> AnalysisResult<Value>;
}

/// A third-party token market-data source
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the provider answered but has nothing for the token
    async fn token_info(&self, token: &TokenId) -> AnalysisResult<Option<TokenInfo>>;

    /// Price history keyed by the token's content hash
    async fn sparkline(&self, _md5: &str) -> AnalysisResult<Option<Value>> {
        Ok(None)
    }
}

/// Natural-language summarisation of an assembled report
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// `Ok(None)` when the service is disabled or produced no content
    async fn summarize(&self, report: &Value) -> AnalysisResult<Option<String>>;

    async fn follow_up(
        &self,
        report: &Value,
        history: &[ChatTurn],
        question: &str,
    ) -> AnalysisResult<String>;
}
