//! Market-data provider passthrough routes.

use analysis_core::{address, TokenId};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use market_data::xrpscan::AccountView;
use serde::Deserialize;
use serde_json::Value;

use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub marker: Option<String>,
}

pub fn provider_routes() -> Router<AppState> {
    Router::new()
        .route("/api/token/:identifier", get(token))
        .route("/api/sparkline/:md5", get(sparkline))
        .route("/api/image/:md5", get(image))
        .route("/api/xrpscan/token/:issuer/:currency", get(xrpscan_token))
        .route("/api/xrpscan/account/:issuer/obligations", get(obligations))
        .route("/api/xrpscan/account/:issuer/assets", get(assets))
        .route("/api/xrpscan/account/:issuer/transactions", get(transactions))
}

fn require_account(issuer: &str) -> Result<(), AppError> {
    if address::is_valid_account(issuer) {
        Ok(())
    } else {
        Err(AppError::bad_request(format!("invalid issuer address: {}", issuer)))
    }
}

async fn token(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    if !identifier.contains('_') {
        return Err(AppError::bad_request(
            "identifier must look like {issuer}_{currency}",
        ));
    }
    let doc = state.xrplto.token_raw(&identifier).await?;
    Ok(Json(ApiResponse::success(doc)))
}

async fn sparkline(
    State(state): State<AppState>,
    Path(md5): Path<String>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let doc = state.xrplto.sparkline_raw(&md5).await?;
    Ok(Json(ApiResponse::success(doc)))
}

async fn image(State(state): State<AppState>, Path(md5): Path<String>) -> Result<Response, AppError> {
    let location = state.xrplto.image_url(&md5)?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

async fn xrpscan_token(
    State(state): State<AppState>,
    Path((issuer, currency)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let token = TokenId::parse(&issuer, &currency)?;
    let doc = state.xrpscan.token_raw(&token).await?;
    Ok(Json(ApiResponse::success(doc)))
}

async fn account_view(
    state: &AppState,
    issuer: &str,
    view: AccountView,
    params: &[(&str, String)],
) -> Result<Json<ApiResponse<Value>>, AppError> {
    require_account(issuer)?;
    let doc = state.xrpscan.account_raw(issuer, view, params).await?;
    Ok(Json(ApiResponse::success(doc)))
}

async fn obligations(
    State(state): State<AppState>,
    Path(issuer): Path<String>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    account_view(&state, &issuer, AccountView::Obligations, &[]).await
}

async fn assets(
    State(state): State<AppState>,
    Path(issuer): Path<String>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    account_view(&state, &issuer, AccountView::Assets, &[]).await
}

async fn transactions(
    State(state): State<AppState>,
    Path(issuer): Path<String>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let mut params = Vec::new();
    if let Some(limit) = query.limit {
        params.push(("limit", limit.to_string()));
    }
    if let Some(marker) = query.marker.filter(|m| !m.is_empty()) {
        params.push(("marker", marker));
    }
    account_view(&state, &issuer, AccountView::Transactions, &params).await
}
