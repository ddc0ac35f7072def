use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use lead_exchange::marketplace::{
    cost, marketplace_router, BudgetBracket, Marketplace, MarketplaceStore, NotificationPublisher,
    Urgency,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct ClaimCostRequest {
    pub(crate) budget_bracket: BudgetBracket,
    pub(crate) urgency: Urgency,
    #[serde(default)]
    pub(crate) verified: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ClaimCostResponse {
    pub(crate) budget_bracket: BudgetBracket,
    pub(crate) urgency: Urgency,
    pub(crate) verified: bool,
    pub(crate) base_cost: u64,
    pub(crate) credits: u64,
}

pub(crate) fn with_marketplace_routes<S, N>(marketplace: Arc<Marketplace<S, N>>) -> axum::Router
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    marketplace_router(marketplace)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/pricing/claim-cost",
            axum::routing::post(claim_cost_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Previews what a claim would cost before a lead is posted.
pub(crate) async fn claim_cost_endpoint(
    Json(payload): Json<ClaimCostRequest>,
) -> Json<ClaimCostResponse> {
    let ClaimCostRequest {
        budget_bracket,
        urgency,
        verified,
    } = payload;

    Json(ClaimCostResponse {
        budget_bracket,
        urgency,
        verified,
        base_cost: cost::base_cost(budget_bracket),
        credits: cost::cost(budget_bracket, urgency, verified),
    })
}
