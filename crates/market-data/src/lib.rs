use analysis_core::{AnalysisError, AnalysisResult};
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::{Duration, Instant};

pub mod xrplto;
pub mod xrpscan;

pub use xrplto::XrplToClient;
pub use xrpscan::XrpScanClient;

pub const XRPLTO_BASE: &str = "https://api.xrpl.to/api";
pub const XRPLTO_IMAGE_BASE: &str = "https://s1.xrpl.to/token";
pub const XRPSCAN_BASE: &str = "https://api.xrpscan.com/api/v1";

/// Endpoints and timeouts for the market-data providers
#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    pub xrplto_base: String,
    pub xrplto_image_base: String,
    pub xrpscan_base: String,
    pub timeout: Duration,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        let timeout_secs = std::env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15);

        Self {
            xrplto_base: std::env::var("XRPLTO_BASE").unwrap_or_else(|_| XRPLTO_BASE.to_string()),
            xrplto_image_base: std::env::var("XRPLTO_IMAGE_BASE")
                .unwrap_or_else(|_| XRPLTO_IMAGE_BASE.to_string()),
            xrpscan_base: std::env::var("XRPSCAN_BASE")
                .unwrap_or_else(|_| XRPSCAN_BASE.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

pub(crate) fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// `base` with each segment appended, percent-encoded.
pub(crate) fn endpoint(base: &str, segments: &[&str]) -> AnalysisResult<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| AnalysisError::InvalidData(format!("bad base url {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| AnalysisError::InvalidData(format!("base url cannot take a path: {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// GET a JSON document. Non-success statuses become [`AnalysisError::Upstream`].
pub(crate) async fn get_json(client: &Client, url: Url, label: &str) -> AnalysisResult<Value> {
    let started = Instant::now();
    tracing::debug!(url = %url, "{}.fetch.start", label);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AnalysisError::Upstream(format!("{}: {}", label, e)))?;

    let status = response.status();
    tracing::debug!(
        status = status.as_u16(),
        duration_ms = started.elapsed().as_millis() as u64,
        "{}.fetch.end",
        label
    );

    if !status.is_success() {
        return Err(AnalysisError::Upstream(format!("{} HTTP {}", label, status)));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| AnalysisError::Upstream(format!("{}: invalid JSON: {}", label, e)))
}

/// Numbers from provider payloads arrive as either JSON numbers or strings.
pub(crate) fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn count(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_encodes_segments() {
        let url = endpoint("https://api.example.com/api/v1", &["token", "USD.rAbc"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/api/v1/token/USD.rAbc");

        let url = endpoint("https://api.example.com/api/", &["token", "a b/c"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/api/token/a%20b%2Fc");
    }

    #[test]
    fn test_lenient_numbers() {
        assert_eq!(number(Some(&json!(1.5))), Some(1.5));
        assert_eq!(number(Some(&json!("2.25"))), Some(2.25));
        assert_eq!(number(Some(&json!(null))), None);
        assert_eq!(number(None), None);
        assert_eq!(count(Some(&json!(42))), Some(42));
        assert_eq!(count(Some(&json!("17"))), Some(17));
        assert_eq!(count(Some(&json!("n/a"))), None);
    }
}
