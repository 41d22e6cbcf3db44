use analysis_core::{
    AnalysisError, AnalysisReport, AnalysisResult, Asset, ChatTurn, HolderReport, IssuerSummary,
    LedgerApi, MarketDataProvider, OrderBookSnapshot, PoolResolution, Summarizer, TokenId,
    TokenInfo,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod cache;
pub mod holders;
pub mod market;
pub mod orderbook;
pub mod pools;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::ResultCache;
pub use holders::HolderScanner;
pub use market::MarketDataChain;
pub use orderbook::fetch_order_book;
pub use pools::{PoolLookup, PoolResolver};

/// Holders ranked in a full analysis
pub const ANALYZE_HOLDER_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Wall-clock budget for each analysis branch
    pub branch_timeout: Duration,
    pub holder_limit: usize,
    pub book_limit: u32,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        let branch_secs = std::env::var("BRANCH_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        Self {
            branch_timeout: Duration::from_secs(branch_secs),
            holder_limit: ANALYZE_HOLDER_LIMIT,
            book_limit: orderbook::BOOK_LIMIT,
            cache_capacity: cache::DEFAULT_CAPACITY,
            cache_ttl: cache::DEFAULT_TTL,
        }
    }
}

pub struct AnalysisOrchestrator {
    ledger: Arc<dyn LedgerApi>,
    market: MarketDataChain,
    holders: HolderScanner,
    pools: PoolResolver,
    /// Optional natural-language summariser; reports are complete without it
    summarizer: Option<Arc<dyn Summarizer>>,
    /// Holder scans per (issuer, currency, limit)
    holder_cache: ResultCache<HolderReport>,
    /// Issuer account summaries per issuer
    issuer_cache: ResultCache<IssuerSummary>,
    config: AnalyzerConfig,
}

impl AnalysisOrchestrator {
    /// `providers` are tried in order; the first also backs the holder-count
    /// estimate and the sparkline.
    pub fn new(
        ledger: Arc<dyn LedgerApi>,
        providers: Vec<Arc<dyn MarketDataProvider>>,
        config: AnalyzerConfig,
    ) -> Self {
        let market = MarketDataChain::new(providers);
        let holders = HolderScanner::new(ledger.clone(), market.primary().cloned());

        Self {
            pools: PoolResolver::new(ledger.clone()),
            holder_cache: ResultCache::new(config.cache_capacity, config.cache_ttl),
            issuer_cache: ResultCache::new(config.cache_capacity, config.cache_ttl),
            ledger,
            market,
            holders,
            summarizer: None,
            config,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Whether the ledger connection is currently established
    pub fn ledger_ready(&self) -> bool {
        self.ledger.is_connected()
    }

    pub async fn token_info(&self, token: &TokenId) -> Option<TokenInfo> {
        self.market.fetch_token_info(token).await
    }

    /// Issuer account flags and settings (cached)
    pub async fn issuer_summary(&self, issuer: &str) -> AnalysisResult<IssuerSummary> {
        let ledger = self.ledger.clone();
        let account = issuer.to_string();
        self.issuer_cache
            .compute_and_cache(&format!("issuer_summary:{}", issuer), move || async move {
                let root = ledger.account_info(&account).await?;
                let summary = IssuerSummary::from(&root);
                tracing::info!(
                    issuer = %account,
                    flags = root.flags,
                    domain = ?summary.domain,
                    "issuer.summary.ok"
                );
                Ok(summary)
            })
            .await
    }

    /// Holder distribution for a token (cached)
    pub async fn scan_holders(
        &self,
        issuer: &str,
        currency: &str,
        limit: usize,
    ) -> AnalysisResult<HolderReport> {
        let scanner = self.holders.clone();
        let issuer = issuer.to_string();
        let currency = currency.to_uppercase();
        let key = format!("holders:{}:{}:{}", issuer, currency, limit);
        self.holder_cache
            .compute_and_cache(&key, move || async move {
                scanner.scan_holders(&issuer, &currency, limit).await
            })
            .await
    }

    pub async fn order_book(&self, token: &TokenId, counter: &Asset) -> AnalysisResult<OrderBookSnapshot> {
        fetch_order_book(
            self.ledger.as_ref(),
            &token.as_asset(),
            counter,
            self.config.book_limit,
        )
        .await
    }

    /// Pool for the pair; an unreachable ledger also resolves to `NoPool`
    pub async fn resolve_pool(&self, asset: &Asset, counter: &Asset) -> PoolResolution {
        self.pools.resolve_pool(asset, counter).await
    }

    /// Assemble the full report for a token.
    ///
    /// Only an invalid identifier is an error. Every branch runs once under
    /// its own time budget and a failed branch leaves its field empty.
    pub async fn analyze(&self, issuer: &str, currency: &str) -> AnalysisResult<AnalysisReport> {
        let token = TokenId::parse(issuer, currency)?;
        let started = Instant::now();
        tracing::info!(issuer = %token.issuer, currency = %token.currency, "analyze.start");

        let asset = token.as_asset();
        let counter = Asset::xrp();
        let budget = self.config.branch_timeout;

        let (token_info, issuer_summary, holders, orderbook, amm) = tokio::join!(
            settle("token", budget, async { Ok(self.token_info(&token).await) }),
            settle("issuer", budget, self.issuer_summary(&token.issuer)),
            settle(
                "holders",
                budget,
                self.scan_holders(&token.issuer, &token.currency, self.config.holder_limit),
            ),
            settle("orderbook", budget, self.order_book(&token, &counter)),
            settle("amm", budget, async { Ok(self.resolve_pool(&asset, &counter).await) }),
        );

        let mut report = AnalysisReport::empty();
        report.token = absorb("token", token_info).flatten();
        report.issuer = absorb("issuer", issuer_summary);
        report.holders = absorb("holders", holders);
        report.orderbook = absorb("orderbook", orderbook);
        report.amm = absorb("amm", amm);

        if let Some(md5) = report.token.as_ref().and_then(|t| t.md5.clone()) {
            let sparkline = settle("sparkline", budget, async {
                Ok(self.market.fetch_sparkline(&md5).await)
            })
            .await;
            report.sparkline = absorb("sparkline", sparkline).flatten();
        }

        tracing::info!(
            issuer = %token.issuer,
            currency = %token.currency,
            md5_present = report.token.as_ref().is_some_and(|t| t.md5.is_some()),
            token_source = ?report.token.as_ref().map(|t| t.source),
            holders_total = ?report.holders.as_ref().map(|h| h.total_holders),
            bids = ?report.orderbook.as_ref().map(|o| o.bids.len()),
            asks = ?report.orderbook.as_ref().map(|o| o.asks.len()),
            amm_present = report.amm.as_ref().is_some_and(|a| a.pool().is_some()),
            duration_ms = started.elapsed().as_millis() as u64,
            "analyze.summary"
        );

        report.ai = self.summarize(&report).await;
        Ok(report)
    }

    async fn summarize(&self, report: &AnalysisReport) -> Option<String> {
        let summarizer = self.summarizer.as_ref()?;
        let data = match serde_json::to_value(report) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, "ai.serialize_error");
                return None;
            }
        };
        let outcome = settle("ai", self.config.branch_timeout, summarizer.summarize(&data)).await;
        absorb("ai", outcome).flatten()
    }

    /// Follow-up question about a token, answered over a fresh report.
    pub async fn ask(
        &self,
        issuer: &str,
        currency: &str,
        question: &str,
        history: &[ChatTurn],
    ) -> AnalysisResult<String> {
        let summarizer = self
            .summarizer
            .as_ref()
            .ok_or_else(|| AnalysisError::Upstream("summarizer is not configured".to_string()))?;

        let started = Instant::now();
        let data = match self.analyze(issuer, currency).await {
            Ok(report) => serde_json::to_value(&report)
                .map_err(|e| AnalysisError::InvalidData(e.to_string()))?,
            Err(e) => {
                tracing::warn!(error = %e, "ask.analyze_error");
                json!({})
            }
        };

        let answer = summarizer.follow_up(&data, history, question).await?;
        tracing::info!(duration_ms = started.elapsed().as_millis() as u64, "ask.ok");
        Ok(answer)
    }
}

/// Run one branch under the budget; overrunning counts as a failure.
async fn settle<T>(
    branch: &'static str,
    budget: Duration,
    work: impl Future<Output = AnalysisResult<T>>,
) -> AnalysisResult<T> {
    match tokio::time::timeout(budget, work).await {
        Ok(outcome) => outcome,
        Err(_) => Err(AnalysisError::Timeout(format!(
            "{} branch exceeded {}ms",
            branch,
            budget.as_millis()
        ))),
    }
}

fn absorb<T>(branch: &'static str, outcome: AnalysisResult<T>) -> Option<T> {
    match outcome {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(branch, error = %e, "analyze.branch_failed");
            None
        }
    }
}
