//! In-memory doubles for the ledger, market-data and summariser seams.

use analysis_core::{
    AccountLinesPage, AccountRoot, AnalysisError, AnalysisResult, Asset, BookOffer, ChatTurn,
    DataSource, LedgerApi, MarketDataProvider, Summarizer, TokenId, TokenInfo, TrustLine,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const ISSUER: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";
pub const USD_HEX: &str = "5553440000000000000000000000000000000000";

pub fn line(account: &str, balance: &str, currency: &str) -> TrustLine {
    TrustLine {
        account: account.to_string(),
        balance: balance.to_string(),
        currency: currency.to_string(),
        limit: None,
    }
}

pub fn offer(quality: &str) -> BookOffer {
    BookOffer {
        account: Some("rMaker".to_string()),
        taker_gets: json!("1000000"),
        taker_pays: json!({"currency": "USD", "issuer": ISSUER, "value": "1"}),
        quality: Some(quality.to_string()),
        owner_funds: None,
    }
}

pub fn token_info(source: DataSource, holders: Option<u64>, md5: Option<&str>) -> TokenInfo {
    TokenInfo {
        issuer: ISSUER.to_string(),
        currency: USD_HEX.to_string(),
        name: Some("USD".to_string()),
        holders,
        usd: Some(1.0),
        market_cap: None,
        change_24h: None,
        md5: md5.map(str::to_string),
        source,
        details: Value::Null,
    }
}

fn down() -> AnalysisError {
    AnalysisError::Connection("ledger unreachable".into())
}

/// Ledger double. Pages are chained through integer markers; pool lookups
/// answer from `pools` keyed by `amm_info`, `amm_info_rev`, `ledger_entry`
/// or `ledger_entry_rev`.
#[derive(Default)]
pub struct FakeLedger {
    pub offline: bool,
    pub account: Option<AccountRoot>,
    pub pages: Vec<Vec<TrustLine>>,
    pub bids: Vec<BookOffer>,
    pub asks: Vec<BookOffer>,
    pub pools: HashMap<&'static str, Value>,
    pub pool_error: Option<AnalysisError>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeLedger {
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) -> AnalysisResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.offline {
            Err(down())
        } else {
            Ok(())
        }
    }

    fn pool(&self, label: &'static str) -> AnalysisResult<Value> {
        self.record(label.to_string())?;
        match self.pools.get(label) {
            Some(value) => Ok(value.clone()),
            None => Err(self
                .pool_error
                .clone()
                .unwrap_or_else(|| AnalysisError::Ledger("actNotFound: Account not found.".into()))),
        }
    }
}

#[async_trait]
impl LedgerApi for FakeLedger {
    fn is_connected(&self) -> bool {
        !self.offline
    }

    async fn account_info(&self, account: &str) -> AnalysisResult<AccountRoot> {
        self.record(format!("account_info:{}", account))?;
        self.account
            .clone()
            .ok_or_else(|| AnalysisError::Ledger("actNotFound: Account not found.".into()))
    }

    async fn account_lines(
        &self,
        _account: &str,
        _limit: u32,
        marker: Option<Value>,
    ) -> AnalysisResult<AccountLinesPage> {
        let index = marker.as_ref().and_then(Value::as_u64).unwrap_or(0) as usize;
        self.record(format!("account_lines:{}", index))?;
        let lines = self.pages.get(index).cloned().unwrap_or_default();
        let marker = (index + 1 < self.pages.len()).then(|| json!(index + 1));
        Ok(AccountLinesPage { lines, marker })
    }

    async fn book_offers(
        &self,
        taker_gets: &Asset,
        _taker_pays: &Asset,
        _limit: u32,
    ) -> AnalysisResult<Vec<BookOffer>> {
        if taker_gets.is_xrp() {
            self.record("book_offers:asks".into())?;
            Ok(self.asks.clone())
        } else {
            self.record("book_offers:bids".into())?;
            Ok(self.bids.clone())
        }
    }

    async fn amm_info(&self, asset: &Asset, _asset2: &Asset) -> AnalysisResult<Value> {
        self.pool(if asset.is_xrp() { "amm_info_rev" } else { "amm_info" })
    }

    async fn amm_ledger_entry(&self, asset: &Asset, _asset2: &Asset) -> AnalysisResult<Value> {
        self.pool(if asset.is_xrp() {
            "ledger_entry_rev"
        } else {
            "ledger_entry"
        })
    }
}

pub struct FakeProvider {
    pub name: &'static str,
    pub result: AnalysisResult<Option<TokenInfo>>,
    pub sparkline: Option<Value>,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl FakeProvider {
    pub fn returning(name: &'static str, result: AnalysisResult<Option<TokenInfo>>) -> Self {
        Self {
            name,
            result,
            sparkline: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for FakeProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn token_info(&self, _token: &TokenId) -> AnalysisResult<Option<TokenInfo>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }

    async fn sparkline(&self, _md5: &str) -> AnalysisResult<Option<Value>> {
        Ok(self.sparkline.clone())
    }
}

pub struct FakeSummarizer {
    pub reply: AnalysisResult<String>,
    pub seen_history: Mutex<Vec<ChatTurn>>,
}

impl FakeSummarizer {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            seen_history: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: Err(AnalysisError::Upstream("Status: 500".into())),
            seen_history: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, _report: &Value) -> AnalysisResult<Option<String>> {
        self.reply.clone().map(Some)
    }

    async fn follow_up(
        &self,
        report: &Value,
        history: &[ChatTurn],
        question: &str,
    ) -> AnalysisResult<String> {
        *self.seen_history.lock().unwrap() = history.to_vec();
        let reply = self.reply.clone()?;
        Ok(format!(
            "{} | {} | issuer={}",
            reply,
            question,
            report["issuer"].is_object()
        ))
    }
}
