use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::claims::ClaimError;
use super::domain::{ClaimId, LeadId, ProfessionalId, QuoteId};
use super::leads::{LeadError, NewLead};
use super::ledger::{export_transactions_csv, LedgerError, PurchaseConfirmation};
use super::quotes::{QuoteError, QuoteSubmission};
use super::repository::{MarketplaceStore, NotificationPublisher, RepositoryError};
use super::service::Marketplace;

const DEFAULT_CANCEL_REASON: &str = "cancelled by homeowner";
const DEFAULT_DECLINE_REASON: &str = "declined by homeowner";
const DEFAULT_REFUND_REASON: &str = "administrative refund";

/// Router builder exposing the lead marketplace and credit ledger over HTTP.
pub fn marketplace_router<S, N>(marketplace: Arc<Marketplace<S, N>>) -> Router
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route("/api/v1/leads", post(post_lead_handler::<S, N>))
        .route("/api/v1/leads/:lead_id", get(lead_handler::<S, N>))
        .route(
            "/api/v1/leads/:lead_id/claims",
            post(claim_handler::<S, N>).get(lead_claims_handler::<S, N>),
        )
        .route(
            "/api/v1/leads/:lead_id/quotes",
            post(submit_quote_handler::<S, N>).get(lead_quotes_handler::<S, N>),
        )
        .route("/api/v1/leads/:lead_id/cancel", post(cancel_handler::<S, N>))
        .route(
            "/api/v1/leads/:lead_id/direct/decline",
            post(decline_direct_handler::<S, N>),
        )
        .route(
            "/api/v1/leads/:lead_id/direct/convert",
            post(convert_direct_handler::<S, N>),
        )
        .route("/api/v1/quotes/:quote_id", get(quote_handler::<S, N>))
        .route(
            "/api/v1/quotes/:quote_id/accept",
            post(accept_quote_handler::<S, N>),
        )
        .route(
            "/api/v1/quotes/:quote_id/decline",
            post(decline_quote_handler::<S, N>),
        )
        .route(
            "/api/v1/claims/:claim_id/refund",
            post(refund_handler::<S, N>),
        )
        .route("/api/v1/purchases", post(purchase_handler::<S, N>))
        .route(
            "/api/v1/professionals/:professional_id/balance",
            get(balance_handler::<S, N>),
        )
        .route(
            "/api/v1/professionals/:professional_id/transactions",
            get(transactions_handler::<S, N>),
        )
        .route(
            "/api/v1/professionals/:professional_id/transactions/export",
            get(export_handler::<S, N>),
        )
        .route(
            "/api/v1/professionals/:professional_id/credits/grant",
            post(grant_handler::<S, N>),
        )
        .route(
            "/api/v1/professionals/:professional_id/credits/deduct",
            post(deduct_handler::<S, N>),
        )
        .route(
            "/api/v1/professionals/:professional_id/reconcile",
            post(reconcile_handler::<S, N>),
        )
        .route(
            "/api/v1/professionals/:professional_id/verification",
            put(verification_handler::<S, N>),
        )
        .route(
            "/api/v1/professionals/:professional_id/hold/release",
            post(release_hold_handler::<S, N>),
        )
        .with_state(marketplace)
}

type SharedMarketplace<S, N> = State<Arc<Marketplace<S, N>>>;

/// Claim body. Any client-sent `verified` flag is ignored; pricing uses the stored record.
#[derive(Debug, Deserialize)]
pub(crate) struct ClaimRequest {
    pub professional_id: ProfessionalId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerificationRequest {
    pub verified: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuoteRequest {
    pub professional_id: ProfessionalId,
    #[serde(flatten)]
    pub submission: QuoteSubmission,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReasonRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DirectDeclineRequest {
    pub professional_id: ProfessionalId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreditAdjustmentRequest {
    pub amount: u64,
    #[serde(default)]
    pub note: Option<String>,
}

pub(crate) async fn post_lead_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    axum::Json(request): axum::Json<NewLead>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    match marketplace.post_lead(request) {
        Ok(lead) => (StatusCode::CREATED, axum::Json(lead)).into_response(),
        Err(error) => lead_error(error),
    }
}

pub(crate) async fn lead_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(lead_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    match marketplace.lead(&LeadId(lead_id)) {
        Ok(lead) => (StatusCode::OK, axum::Json(lead)).into_response(),
        Err(error) => lead_error(error),
    }
}

pub(crate) async fn claim_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(lead_id): Path<String>,
    axum::Json(request): axum::Json<ClaimRequest>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    match marketplace.claim_lead_as(&LeadId(lead_id), &request.professional_id) {
        Ok(receipt) => (StatusCode::CREATED, axum::Json(receipt)).into_response(),
        Err(error) => claim_error(error),
    }
}

pub(crate) async fn lead_claims_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(lead_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    match marketplace.claims_for_lead(&LeadId(lead_id)) {
        Ok(claims) => (StatusCode::OK, axum::Json(claims)).into_response(),
        Err(error) => claim_error(error),
    }
}

pub(crate) async fn submit_quote_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(lead_id): Path<String>,
    axum::Json(request): axum::Json<QuoteRequest>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    match marketplace.submit_quote(
        &LeadId(lead_id),
        &request.professional_id,
        request.submission,
    ) {
        Ok(quote) => (StatusCode::CREATED, axum::Json(quote)).into_response(),
        Err(error) => quote_error(error),
    }
}

pub(crate) async fn lead_quotes_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(lead_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    match marketplace.quotes_for_lead(&LeadId(lead_id)) {
        Ok(quotes) => (StatusCode::OK, axum::Json(quotes)).into_response(),
        Err(error) => quote_error(error),
    }
}

pub(crate) async fn cancel_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(lead_id): Path<String>,
    axum::Json(request): axum::Json<ReasonRequest>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    let reason = request
        .reason
        .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());
    match marketplace.cancel_lead(&LeadId(lead_id), &reason) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => lead_error(error),
    }
}

pub(crate) async fn decline_direct_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(lead_id): Path<String>,
    axum::Json(request): axum::Json<DirectDeclineRequest>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    match marketplace.decline_direct_lead(&LeadId(lead_id), &request.professional_id) {
        Ok(lead) => (StatusCode::OK, axum::Json(lead)).into_response(),
        Err(error) => lead_error(error),
    }
}

pub(crate) async fn convert_direct_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(lead_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    match marketplace.convert_direct_lead(&LeadId(lead_id)) {
        Ok(lead) => (StatusCode::OK, axum::Json(lead)).into_response(),
        Err(error) => lead_error(error),
    }
}

pub(crate) async fn quote_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(quote_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    match marketplace.quote(&QuoteId(quote_id)) {
        Ok(quote) => (StatusCode::OK, axum::Json(quote)).into_response(),
        Err(error) => quote_error(error),
    }
}

pub(crate) async fn accept_quote_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(quote_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    match marketplace.accept_quote(&QuoteId(quote_id)) {
        Ok(quote) => (StatusCode::OK, axum::Json(quote)).into_response(),
        Err(error) => quote_error(error),
    }
}

pub(crate) async fn decline_quote_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(quote_id): Path<String>,
    axum::Json(request): axum::Json<ReasonRequest>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    let reason = request
        .reason
        .unwrap_or_else(|| DEFAULT_DECLINE_REASON.to_string());
    match marketplace.decline_quote(&QuoteId(quote_id), &reason) {
        Ok(quote) => (StatusCode::OK, axum::Json(quote)).into_response(),
        Err(error) => quote_error(error),
    }
}

pub(crate) async fn refund_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(claim_id): Path<String>,
    axum::Json(request): axum::Json<ReasonRequest>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    let reason = request
        .reason
        .unwrap_or_else(|| DEFAULT_REFUND_REASON.to_string());
    match marketplace.refund_claim(&ClaimId(claim_id), &reason) {
        Ok(claim) => (StatusCode::OK, axum::Json(claim)).into_response(),
        Err(error) => claim_error(error),
    }
}

pub(crate) async fn purchase_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    axum::Json(purchase): axum::Json<PurchaseConfirmation>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    match marketplace.record_purchase(purchase) {
        Ok(receipt) if receipt.duplicate => (StatusCode::OK, axum::Json(receipt)).into_response(),
        Ok(receipt) => (StatusCode::CREATED, axum::Json(receipt)).into_response(),
        Err(error) => ledger_error(error),
    }
}

pub(crate) async fn balance_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(professional_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    match marketplace.balance(&ProfessionalId(professional_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => ledger_error(error),
    }
}

pub(crate) async fn transactions_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(professional_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    match marketplace.transactions(&ProfessionalId(professional_id)) {
        Ok(entries) => (StatusCode::OK, axum::Json(entries)).into_response(),
        Err(error) => ledger_error(error),
    }
}

pub(crate) async fn export_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(professional_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    let entries = match marketplace.transactions(&ProfessionalId(professional_id)) {
        Ok(entries) => entries,
        Err(error) => return ledger_error(error),
    };
    let mut buffer = Vec::new();
    match export_transactions_csv(&entries, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            buffer,
        )
            .into_response(),
        Err(error) => error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            "ExportFailed",
            error.to_string(),
        ),
    }
}

pub(crate) async fn grant_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(professional_id): Path<String>,
    axum::Json(request): axum::Json<CreditAdjustmentRequest>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    let professional_id = ProfessionalId(professional_id);
    let note = request.note.unwrap_or_else(|| "manual grant".to_string());
    match marketplace.grant_free_credits(&professional_id, request.amount, &note) {
        Ok(total) => balance_total(&professional_id, total),
        Err(error) => ledger_error(error),
    }
}

pub(crate) async fn deduct_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(professional_id): Path<String>,
    axum::Json(request): axum::Json<CreditAdjustmentRequest>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    let professional_id = ProfessionalId(professional_id);
    let note = request.note.unwrap_or_else(|| "manual deduction".to_string());
    match marketplace.admin_deduct(&professional_id, request.amount, &note) {
        Ok(total) => balance_total(&professional_id, total),
        Err(error) => ledger_error(error),
    }
}

pub(crate) async fn reconcile_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(professional_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    match marketplace.reconcile(&ProfessionalId(professional_id)) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => ledger_error(error),
    }
}

pub(crate) async fn release_hold_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(professional_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    let professional_id = ProfessionalId(professional_id);
    match marketplace.release_hold(&professional_id) {
        Ok(released) => {
            let payload = json!({
                "professional_id": professional_id,
                "released": released,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => ledger_error(error),
    }
}

pub(crate) async fn verification_handler<S, N>(
    State(marketplace): SharedMarketplace<S, N>,
    Path(professional_id): Path<String>,
    axum::Json(request): axum::Json<VerificationRequest>,
) -> Response
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    match marketplace.set_professional_verified(&ProfessionalId(professional_id), request.verified)
    {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => claim_error(error),
    }
}

fn balance_total(professional_id: &ProfessionalId, total: u64) -> Response {
    let payload = json!({
        "professional_id": professional_id,
        "total_credits": total,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

fn error_body(status: StatusCode, code: &str, message: String) -> Response {
    let payload = json!({
        "error": code,
        "message": message,
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) fn repository_error(error: RepositoryError) -> Response {
    let status = match &error {
        RepositoryError::Conflict(_) => StatusCode::CONFLICT,
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    let code = match &error {
        RepositoryError::Conflict(_) => "WriteConflict",
        RepositoryError::NotFound => "NotFound",
        RepositoryError::Unavailable(_) => "StoreUnavailable",
    };
    error_body(status, code, error.to_string())
}

pub(crate) fn ledger_error(error: LedgerError) -> Response {
    match error {
        LedgerError::InsufficientCredits {
            required,
            available,
            shortfall,
        } => {
            let payload = json!({
                "error": "InsufficientCredits",
                "message": error.to_string(),
                "required": required,
                "available": available,
                "shortfall": shortfall,
            });
            (StatusCode::PAYMENT_REQUIRED, axum::Json(payload)).into_response()
        }
        LedgerError::OnHold { .. } => {
            error_body(StatusCode::LOCKED, "LedgerOnHold", error.to_string())
        }
        LedgerError::Integrity { .. } => {
            error_body(StatusCode::LOCKED, "LedgerIntegrity", error.to_string())
        }
        LedgerError::InvalidAmount(_) | LedgerError::UnsupportedType(_) => error_body(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Validation",
            error.to_string(),
        ),
        LedgerError::Repository(inner) => repository_error(inner),
    }
}

pub(crate) fn claim_error(error: ClaimError) -> Response {
    let message = error.to_string();
    match error {
        ClaimError::LeadNotFound(_) | ClaimError::ClaimNotFound(_) => {
            error_body(StatusCode::NOT_FOUND, "NotFound", message)
        }
        ClaimError::LeadNotClaimable { .. } => {
            error_body(StatusCode::CONFLICT, "LeadNotClaimable", message)
        }
        ClaimError::AlreadyClaimed => error_body(StatusCode::CONFLICT, "AlreadyClaimed", message),
        ClaimError::LeadFull => error_body(StatusCode::CONFLICT, "LeadFull", message),
        ClaimError::AlreadyRefunded => {
            error_body(StatusCode::CONFLICT, "AlreadyRefunded", message)
        }
        ClaimError::Ledger(inner) => ledger_error(inner),
        ClaimError::Repository(inner) => repository_error(inner),
    }
}

pub(crate) fn quote_error(error: QuoteError) -> Response {
    let message = error.to_string();
    match error {
        QuoteError::Pricing(_) | QuoteError::InvalidTimeline => {
            error_body(StatusCode::UNPROCESSABLE_ENTITY, "Validation", message)
        }
        QuoteError::LeadNotFound(_) | QuoteError::QuoteNotFound(_) => {
            error_body(StatusCode::NOT_FOUND, "NotFound", message)
        }
        QuoteError::ClaimRequired => error_body(StatusCode::FORBIDDEN, "ClaimRequired", message),
        QuoteError::LeadClosed { .. } => error_body(StatusCode::CONFLICT, "LeadClosed", message),
        QuoteError::AlreadySubmitted => {
            error_body(StatusCode::CONFLICT, "AlreadySubmitted", message)
        }
        QuoteError::AlreadyResolved => error_body(StatusCode::CONFLICT, "AlreadyResolved", message),
        QuoteError::Repository(inner) => repository_error(inner),
    }
}

pub(crate) fn lead_error(error: LeadError) -> Response {
    let message = error.to_string();
    match error {
        LeadError::Validation(_) => {
            error_body(StatusCode::UNPROCESSABLE_ENTITY, "Validation", message)
        }
        LeadError::NotFound(_) => error_body(StatusCode::NOT_FOUND, "NotFound", message),
        LeadError::AlreadyTerminal { .. } => {
            error_body(StatusCode::CONFLICT, "AlreadyResolved", message)
        }
        LeadError::NotDirect | LeadError::DirectTransition { .. } => {
            error_body(StatusCode::CONFLICT, "InvalidTransition", message)
        }
        LeadError::NotTargetProfessional => {
            error_body(StatusCode::FORBIDDEN, "NotTargetProfessional", message)
        }
        LeadError::Claim(inner) => claim_error(inner),
        LeadError::Repository(inner) => repository_error(inner),
    }
}
