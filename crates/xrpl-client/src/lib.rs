use analysis_core::{
    AccountLinesPage, AccountRoot, AnalysisError, AnalysisResult, Asset, BookOffer, LedgerApi,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

pub mod connection;
pub mod websocket;

pub use connection::LedgerConnection;

pub const DEFAULT_RPC_URL: &str = "wss://xrplcluster.com";

#[derive(Debug, Clone)]
pub struct XrplConfig {
    pub rpc_url: String,
    /// Applies to the connect handshake and to every single request
    pub request_timeout: Duration,
}

impl Default for XrplConfig {
    fn default() -> Self {
        Self {
            rpc_url: std::env::var("XRPL_RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string()),
            request_timeout: Duration::from_secs(20),
        }
    }
}

/// Read-only ledger client. Every query verifies the connection first, so a
/// dropped socket is transparently re-established on the next call.
pub struct XrplClient {
    connection: LedgerConnection,
}

impl XrplClient {
    pub fn new(config: XrplConfig) -> Self {
        Self {
            connection: LedgerConnection::new(config.rpc_url, config.request_timeout),
        }
    }

    pub fn url(&self) -> &str {
        self.connection.url()
    }

    pub fn is_ready(&self) -> bool {
        self.connection.is_ready()
    }

    pub async fn ensure_connected(&self) -> AnalysisResult<()> {
        self.connection.ensure_connected().await.map(|_| ())
    }

    async fn query(&self, payload: Value) -> AnalysisResult<Value> {
        let command = payload["command"].as_str().unwrap_or("unknown").to_string();
        let started = Instant::now();
        let result = self.connection.request(payload).await;
        tracing::debug!(
            command = %command,
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "xrpl.request"
        );
        result
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> AnalysisResult<T> {
    serde_json::from_value(value)
        .map_err(|e| AnalysisError::InvalidData(format!("{}: {}", what, e)))
}

#[async_trait]
impl LedgerApi for XrplClient {
    fn is_connected(&self) -> bool {
        self.is_ready()
    }

    async fn account_info(&self, account: &str) -> AnalysisResult<AccountRoot> {
        let mut result = self
            .query(json!({
                "command": "account_info",
                "account": account,
                "ledger_index": "validated",
            }))
            .await?;
        let data = result
            .get_mut("account_data")
            .map(Value::take)
            .unwrap_or(Value::Null);
        decode(data, "account_info.account_data")
    }

    async fn account_lines(
        &self,
        account: &str,
        limit: u32,
        marker: Option<Value>,
    ) -> AnalysisResult<AccountLinesPage> {
        let mut payload = json!({
            "command": "account_lines",
            "account": account,
            "ledger_index": "validated",
            "limit": limit,
        });
        if let Some(marker) = marker {
            payload["marker"] = marker;
        }
        let result = self.query(payload).await?;
        decode(result, "account_lines")
    }

    async fn book_offers(
        &self,
        taker_gets: &Asset,
        taker_pays: &Asset,
        limit: u32,
    ) -> AnalysisResult<Vec<BookOffer>> {
        let mut result = self
            .query(json!({
                "command": "book_offers",
                "ledger_index": "validated",
                "taker_gets": taker_gets,
                "taker_pays": taker_pays,
                "limit": limit,
            }))
            .await?;
        match result.get_mut("offers") {
            Some(offers) => decode(offers.take(), "book_offers.offers"),
            None => Ok(Vec::new()),
        }
    }

    async fn amm_info(&self, asset: &Asset, asset2: &Asset) -> AnalysisResult<Value> {
        self.query(json!({
            "command": "amm_info",
            "asset": asset,
            "asset2": asset2,
        }))
        .await
    }

    async fn amm_ledger_entry(&self, asset: &Asset, asset2: &Asset) -> AnalysisResult<Value> {
        self.query(json!({
            "command": "ledger_entry",
            "amm": { "asset": asset, "asset2": asset2 },
            "ledger_index": "validated",
        }))
        .await
    }
}
