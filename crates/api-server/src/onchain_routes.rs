//! Analysis and on-ledger query routes.

use analysis_core::{
    address, AnalysisReport, Asset, ChatTurn, HolderReport, IssuerSummary, OrderBookSnapshot,
    PoolInfo, PoolResolution, TokenId,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{ApiResponse, AppError, AppState};

/// Holder endpoint bounds
const DEFAULT_HOLDER_LIMIT: usize = 200;
const MAX_HOLDER_LIMIT: usize = 1000;

#[derive(Deserialize)]
pub struct HoldersQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct CounterQuery {
    #[serde(default)]
    pub counter: Option<String>,
}

#[derive(Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub history: Value,
}

#[derive(Serialize)]
pub struct AskResponse {
    pub answer: String,
}

pub fn onchain_routes() -> Router<AppState> {
    Router::new()
        .route("/api/analyze/:issuer/:currency", get(analyze))
        .route("/api/ask", post(ask))
        .route("/api/onchain/issuer/:issuer/summary", get(issuer_summary))
        .route("/api/onchain/token/:issuer/:currency/holders", get(holders))
        .route("/api/onchain/token/:issuer/:currency/orderbook", get(orderbook))
        .route("/api/onchain/token/:issuer/:currency/amm", get(amm))
}

fn holder_limit(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_HOLDER_LIMIT)
        .clamp(1, MAX_HOLDER_LIMIT)
}

/// Chat turns with a text body; anything else in the history is skipped
fn chat_history(raw: &Value) -> Vec<ChatTurn> {
    raw.as_array()
        .map(|turns| {
            turns
                .iter()
                .filter_map(|turn| {
                    let text = turn.get("text")?.as_str()?;
                    let from = turn.get("from").and_then(Value::as_str).unwrap_or("user");
                    Some(ChatTurn {
                        from: from.to_string(),
                        text: text.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

async fn analyze(
    State(state): State<AppState>,
    Path((issuer, currency)): Path<(String, String)>,
) -> Result<Json<ApiResponse<AnalysisReport>>, AppError> {
    let report = state.orchestrator.analyze(&issuer, &currency).await?;
    Ok(Json(ApiResponse::success(report)))
}

async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<ApiResponse<AskResponse>>, AppError> {
    if request.issuer.trim().is_empty()
        || request.currency.trim().is_empty()
        || request.question.trim().is_empty()
    {
        return Err(AppError::bad_request(
            "issuer, currency, and question are required",
        ));
    }

    let history = chat_history(&request.history);
    let answer = state
        .orchestrator
        .ask(&request.issuer, &request.currency, &request.question, &history)
        .await?;
    Ok(Json(ApiResponse::success(AskResponse { answer })))
}

async fn issuer_summary(
    State(state): State<AppState>,
    Path(issuer): Path<String>,
) -> Result<Json<ApiResponse<IssuerSummary>>, AppError> {
    if !address::is_valid_account(&issuer) {
        return Err(AppError::bad_request(format!("invalid issuer address: {}", issuer)));
    }
    let summary = state.orchestrator.issuer_summary(&issuer).await?;
    Ok(Json(ApiResponse::success(summary)))
}

async fn holders(
    State(state): State<AppState>,
    Path((issuer, currency)): Path<(String, String)>,
    Query(query): Query<HoldersQuery>,
) -> Result<Json<ApiResponse<HolderReport>>, AppError> {
    let token = TokenId::parse(&issuer, &currency)?;
    let report = state
        .orchestrator
        .scan_holders(&token.issuer, &token.currency, holder_limit(query.limit))
        .await?;
    Ok(Json(ApiResponse::success(report)))
}

async fn orderbook(
    State(state): State<AppState>,
    Path((issuer, currency)): Path<(String, String)>,
    Query(query): Query<CounterQuery>,
) -> Result<Json<ApiResponse<OrderBookSnapshot>>, AppError> {
    let token = TokenId::parse(&issuer, &currency)?;
    let counter = Asset::from_counter_param(query.counter.as_deref());
    let snapshot = state.orchestrator.order_book(&token, &counter).await?;
    Ok(Json(ApiResponse::success(snapshot)))
}

async fn amm(
    State(state): State<AppState>,
    Path((issuer, currency)): Path<(String, String)>,
    Query(query): Query<CounterQuery>,
) -> Result<Response, AppError> {
    let token = TokenId::parse(&issuer, &currency)?;
    let counter = Asset::from_counter_param(query.counter.as_deref());

    match state.orchestrator.resolve_pool(&token.as_asset(), &counter).await {
        PoolResolution::Found(pool) => Ok(Json(ApiResponse::<PoolInfo>::success(pool)).into_response()),
        PoolResolution::NoPool { message } => Ok((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::failure(
                Some(json!({ "no_pool": true, "message": message })),
                "no_pool",
            )),
        )
            .into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use axum::body::Body;
    use axum::http::Request;

    #[test]
    fn test_holder_limit_bounds() {
        assert_eq!(holder_limit(None), 200);
        assert_eq!(holder_limit(Some(0)), 1);
        assert_eq!(holder_limit(Some(50)), 50);
        assert_eq!(holder_limit(Some(5000)), 1000);
    }

    #[test]
    fn test_chat_history_skips_bad_turns() {
        let raw = json!([
            {"from": "user", "text": "hi"},
            {"from": "ai"},
            {"text": "no sender"},
            "junk",
            {"from": "ai", "text": "hello"}
        ]);
        let turns = chat_history(&raw);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].from, "user");
        assert_eq!(turns[2].from, "ai");
        assert!(chat_history(&json!({"not": "a list"})).is_empty());
    }

    #[tokio::test]
    async fn test_analyze_rejects_bad_identifier() {
        let (status, body) = fetch(test_app(false), "/api/analyze/nope/USD").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("invalid issuer"));
    }

    #[tokio::test]
    async fn test_analyze_with_everything_down_is_still_a_report() {
        let uri = format!("/api/analyze/{}/USD", ISSUER);
        let (status, body) = fetch(test_app(true), &uri).await;
        assert_eq!(status, StatusCode::OK);
        let data = &body["data"];
        for field in ["token", "issuer", "holders", "orderbook", "sparkline", "ai"] {
            assert!(data[field].is_null(), "{} should be null", field);
        }
        assert_eq!(data["amm"]["status"], "no_pool");
        assert!(data["generated_at"].is_string());
    }

    #[tokio::test]
    async fn test_missing_pool_is_404() {
        let uri = format!("/api/onchain/token/{}/USD/amm?counter=xrp", ISSUER);
        let (status, body) = fetch(test_app(false), &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "no_pool");
        assert_eq!(body["data"]["no_pool"], true);
        assert!(body["data"]["message"].as_str().unwrap().contains("actNotFound"));
    }

    #[tokio::test]
    async fn test_pool_lookup_on_unreachable_ledger_is_404() {
        let uri = format!("/api/onchain/token/{}/USD/amm", ISSUER);
        let (status, body) = fetch(test_app(true), &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "no_pool");
        assert_eq!(body["data"]["no_pool"], true);
        assert!(body["data"]["message"].as_str().unwrap().contains("ledger unreachable"));
    }

    #[tokio::test]
    async fn test_unreachable_ledger_is_503() {
        let uri = format!("/api/onchain/token/{}/USD/orderbook", ISSUER);
        let (status, body) = fetch(test_app(true), &uri).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);

        let uri = format!("/api/onchain/issuer/{}/summary", ISSUER);
        let (status, _) = fetch(test_app(true), &uri).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_issuer_summary_and_empty_book() {
        let uri = format!("/api/onchain/issuer/{}/summary", ISSUER);
        let (status, body) = fetch(test_app(false), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["account"], ISSUER);
        assert_eq!(body["data"]["flags"]["global_freeze"], false);

        let uri = format!("/api/onchain/token/{}/USD/orderbook?counter=not-json", ISSUER);
        let (status, body) = fetch(test_app(false), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["bids"], json!([]));
        assert_eq!(body["data"]["asks"], json!([]));
    }

    #[tokio::test]
    async fn test_holders_on_empty_ledger() {
        let uri = format!("/api/onchain/token/{}/USD/holders?limit=10", ISSUER);
        let (status, body) = fetch(test_app(false), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_holders"], 0);
        assert_eq!(body["data"]["holder_count_source"], "exact");
        assert_eq!(body["data"]["top"], json!([]));
    }

    #[tokio::test]
    async fn test_ask_requires_fields() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/ask")
            .header("content-type", "application/json")
            .body(Body::from(json!({"issuer": ISSUER, "currency": "USD"}).to_string()))
            .unwrap();
        let (status, body) = send(test_app(false), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("required"));
    }
}
