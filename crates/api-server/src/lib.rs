use analysis_core::{AnalysisError, LedgerApi, MarketDataProvider};
use analysis_orchestrator::{AnalysisOrchestrator, AnalyzerConfig};
use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use market_data::{MarketDataConfig, XrpScanClient, XrplToClient};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use summary_client::{SummaryClient, SummaryConfig};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xrpl_client::{XrplClient, XrplConfig};

pub mod log_buffer;
mod onchain_routes;
mod provider_routes;
pub mod request_id;

pub use log_buffer::LogBuffer;

pub const DEFAULT_PORT: u16 = 4000;

/// Entries returned by `/api/logs` when no limit is given
const DEFAULT_LOG_LIMIT: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub xrplto: Arc<XrplToClient>,
    pub xrpscan: Arc<XrpScanClient>,
    pub rpc_url: String,
    pub logs: LogBuffer,
}

/// Envelope for every JSON response
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(data: Option<T>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data,
            error: Some(error.into()),
        }
    }
}

/// Handler error carrying the status to answer with
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// Status for a failed core operation
pub fn status_for(err: &AnalysisError) -> StatusCode {
    match err {
        AnalysisError::MalformedInput(_) => StatusCode::BAD_REQUEST,
        AnalysisError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
        AnalysisError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let error = err.into();
        let status = error
            .downcast_ref::<AnalysisError>()
            .map(status_for)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self { status, error }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = format!("{:#}", self.error);
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), error = %message, "request.failed");
        } else {
            tracing::warn!(status = self.status.as_u16(), error = %message, "request.rejected");
        }
        (self.status, Json(ApiResponse::<()>::failure(None, message))).into_response()
    }
}

/// Process configuration, read from the environment (and `.env`)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub xrpl: XrplConfig,
    pub market: MarketDataConfig,
    pub analyzer: AnalyzerConfig,
    pub summary: SummaryConfig,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a port number, got {:?}", raw))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            xrpl: XrplConfig::default(),
            market: MarketDataConfig::default(),
            analyzer: AnalyzerConfig::default(),
            summary: SummaryConfig::default(),
        })
    }
}

/// Wire the orchestrator and provider clients around a ledger handle.
pub fn build_state(config: &ServerConfig, ledger: Arc<dyn LedgerApi>, logs: LogBuffer) -> AppState {
    let xrplto = Arc::new(XrplToClient::new(&config.market));
    let xrpscan = Arc::new(XrpScanClient::new(&config.market));
    let providers = vec![
        xrplto.clone() as Arc<dyn MarketDataProvider>,
        xrpscan.clone(),
    ];

    let mut orchestrator = AnalysisOrchestrator::new(ledger, providers, config.analyzer.clone());
    let summary = SummaryClient::new(config.summary.clone());
    if summary.is_enabled() {
        orchestrator = orchestrator.with_summarizer(Arc::new(summary));
    } else {
        tracing::info!("ai.disabled");
    }

    AppState {
        orchestrator: Arc::new(orchestrator),
        xrplto,
        xrpscan,
        rpc_url: config.xrpl.rpc_url.clone(),
        logs,
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub xrpl: bool,
    pub rpc_url: String,
}

async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    Json(ApiResponse::success(HealthStatus {
        status: "ok",
        xrpl: state.orchestrator.ledger_ready(),
        rpc_url: state.rpc_url.clone(),
    }))
}

#[derive(Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub limit: Option<String>,
}

/// Unparsable or zero limits fall back to the default; capped at the buffer size
fn log_limit(requested: Option<&str>, capacity: usize) -> usize {
    requested
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .min(capacity)
}

async fn recent_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Json<ApiResponse<Vec<Value>>> {
    let limit = log_limit(query.limit.as_deref(), state.logs.capacity());
    Json(ApiResponse::success(state.logs.recent(limit)))
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/logs", get(recent_logs))
        .merge(onchain_routes::onchain_routes())
        .merge(provider_routes::provider_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(request_id::make_request_span))
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
}

fn init_tracing(logs: LogBuffer) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(json_logging.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logging).then(tracing_subscriber::fmt::layer))
        .with(logs)
        .init();
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let logs = LogBuffer::default();
    init_tracing(logs.clone());

    let config = ServerConfig::from_env()?;
    let ledger = Arc::new(XrplClient::new(config.xrpl.clone()));
    let state = build_state(&config, ledger.clone(), logs);

    // queries reconnect on demand, so a failed warm-up is not fatal
    tokio::spawn(async move {
        if let Err(e) = ledger.ensure_connected().await {
            tracing::warn!(url = %ledger.url(), error = %e, "xrpl.initial_connect_failed");
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(port = config.port, rpc_url = %config.xrpl.rpc_url, "server.start");

    axum::serve(listener, app(state)).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use analysis_core::{AccountLinesPage, AccountRoot, AnalysisResult, Asset, BookOffer};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    pub const ISSUER: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";

    /// Answers every query with an empty ledger, or fails them all when offline
    pub struct StubLedger {
        pub offline: bool,
    }

    impl StubLedger {
        fn check(&self) -> AnalysisResult<()> {
            if self.offline {
                Err(AnalysisError::Connection("ledger unreachable".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl LedgerApi for StubLedger {
        fn is_connected(&self) -> bool {
            !self.offline
        }

        async fn account_info(&self, account: &str) -> AnalysisResult<AccountRoot> {
            self.check()?;
            Ok(AccountRoot {
                account: account.to_string(),
                ..Default::default()
            })
        }

        async fn account_lines(
            &self,
            _account: &str,
            _limit: u32,
            _marker: Option<Value>,
        ) -> AnalysisResult<AccountLinesPage> {
            self.check()?;
            Ok(AccountLinesPage::default())
        }

        async fn book_offers(&self, _: &Asset, _: &Asset, _: u32) -> AnalysisResult<Vec<BookOffer>> {
            self.check()?;
            Ok(Vec::new())
        }

        async fn amm_info(&self, _: &Asset, _: &Asset) -> AnalysisResult<Value> {
            self.check()?;
            Err(AnalysisError::Ledger("actNotFound: Account not found.".into()))
        }

        async fn amm_ledger_entry(&self, _: &Asset, _: &Asset) -> AnalysisResult<Value> {
            self.check()?;
            Err(AnalysisError::Ledger("entryNotFound".into()))
        }
    }

    /// Router over a stub ledger; provider endpoints point at a closed port
    pub fn test_app(offline: bool) -> Router {
        app(test_state(offline))
    }

    pub fn test_state(offline: bool) -> AppState {
        let config = ServerConfig {
            port: 0,
            xrpl: XrplConfig {
                rpc_url: "ws://127.0.0.1:9".into(),
                request_timeout: Duration::from_secs(1),
            },
            market: MarketDataConfig {
                xrplto_base: "http://127.0.0.1:9/api".into(),
                xrplto_image_base: "https://img.example.com/token".into(),
                xrpscan_base: "http://127.0.0.1:9/api/v1".into(),
                timeout: Duration::from_secs(1),
            },
            analyzer: AnalyzerConfig {
                branch_timeout: Duration::from_secs(5),
                ..AnalyzerConfig::default()
            },
            summary: SummaryConfig {
                api_key: String::new(),
                base_url: "http://127.0.0.1:9".into(),
                model: "test".into(),
                timeout: Duration::from_secs(1),
            },
        };
        build_state(&config, Arc::new(StubLedger { offline }), LogBuffer::new(50))
    }

    pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn fetch(app: Router, uri: &str) -> (StatusCode, Value) {
        send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }
}
