use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;

use crate::config::MarketplaceConfig;
use crate::marketplace::domain::{
    BudgetBracket, Claim, ClaimId, HomeownerId, Lead, LeadId, ProfessionalId,
    ProfessionalIdentity, ProfessionalVerification, Quote, QuoteId, QuoteTimeline, Urgency,
};
use crate::marketplace::leads::NewLead;
use crate::marketplace::ledger::{CreditBalance, CreditTransaction};
use crate::marketplace::memory::{InMemoryMarketplaceStore, RecordingNotifier};
use crate::marketplace::quotes::{LineItemInput, PricingInput, QuoteSubmission};
use crate::marketplace::repository::{MarketplaceStore, RepositoryError, WriteBatch};
use crate::marketplace::service::Marketplace;

pub(super) type TestMarketplace = Marketplace<InMemoryMarketplaceStore, RecordingNotifier>;

pub(super) fn marketplace_config() -> MarketplaceConfig {
    MarketplaceConfig {
        default_max_claims: 3,
        low_credit_threshold: 4,
        ..MarketplaceConfig::default()
    }
}

pub(super) fn build_marketplace() -> (
    Arc<TestMarketplace>,
    InMemoryMarketplaceStore,
    RecordingNotifier,
) {
    let store = InMemoryMarketplaceStore::default();
    let notifier = RecordingNotifier::default();
    let marketplace = Marketplace::new(
        Arc::new(store.clone()),
        Arc::new(notifier.clone()),
        marketplace_config(),
    );
    (Arc::new(marketplace), store, notifier)
}

pub(super) fn professional(name: &str) -> ProfessionalIdentity {
    ProfessionalIdentity {
        id: ProfessionalId(format!("pro-{name}")),
        verified: false,
    }
}

pub(super) fn verified_professional(name: &str) -> ProfessionalIdentity {
    ProfessionalIdentity {
        verified: true,
        ..professional(name)
    }
}

pub(super) fn new_lead(bracket: BudgetBracket, urgency: Urgency, max_claims: u32) -> NewLead {
    NewLead {
        homeowner_id: HomeownerId("home-1".to_string()),
        category: "plumbing".to_string(),
        description: "Replace kitchen sink and faucet".to_string(),
        budget_bracket: bracket,
        urgency,
        max_claims: Some(max_claims),
        expires_at: Utc::now() + Duration::days(7),
        direct_professional_id: None,
    }
}

/// Marketplace lead priced at five credits for unverified professionals.
pub(super) fn post_lead(marketplace: &TestMarketplace, max_claims: u32) -> Lead {
    marketplace
        .post_lead(new_lead(
            BudgetBracket::From3kTo10k,
            Urgency::Flexible,
            max_claims,
        ))
        .expect("lead posts")
}

pub(super) fn post_direct_lead(marketplace: &TestMarketplace, target: &ProfessionalId) -> Lead {
    let mut request = new_lead(BudgetBracket::From3kTo10k, Urgency::Flexible, 1);
    request.max_claims = None;
    request.direct_professional_id = Some(target.clone());
    marketplace.post_lead(request).expect("direct lead posts")
}

pub(super) fn fund(marketplace: &TestMarketplace, professional_id: &ProfessionalId, amount: u64) {
    marketplace
        .grant_free_credits(professional_id, amount, "test funding")
        .expect("grant succeeds");
}

pub(super) fn total_credits(marketplace: &TestMarketplace, professional_id: &ProfessionalId) -> u64 {
    marketplace
        .balance(professional_id)
        .expect("balance readable")
        .total_credits
}

pub(super) fn submission(unit_price: u64) -> QuoteSubmission {
    QuoteSubmission {
        pricing: PricingInput {
            items: vec![
                LineItemInput {
                    category: "labour".to_string(),
                    quantity: 4,
                    unit_price,
                },
                LineItemInput {
                    category: "materials".to_string(),
                    quantity: 1,
                    unit_price: 12_000,
                },
            ],
        },
        timeline: QuoteTimeline {
            estimated_start_date: NaiveDate::from_ymd_opt(2026, 11, 2).expect("valid"),
            estimated_completion_date: NaiveDate::from_ymd_opt(2026, 11, 6).expect("valid"),
        },
    }
}

pub(super) fn corrupted_balance(professional_id: &ProfessionalId, version: u64) -> CreditBalance {
    serde_json::from_value(serde_json::json!({
        "professional_id": professional_id,
        "free_credits": 50,
        "paid_lots": [],
        "lifetime_earned": 10,
        "lifetime_spent": 0,
        "lifetime_refunded": 0,
        "version": version,
    }))
    .expect("balance deserializes")
}

/// Moves a stored lead's deadline into the past without running the expiry sweep.
pub(super) fn backdate_deadline(store: &InMemoryMarketplaceStore, lead_id: &LeadId) {
    let mut lead = store
        .lead(lead_id)
        .expect("store readable")
        .expect("lead stored");
    lead.expires_at = Utc::now() - Duration::hours(1);
    store
        .commit(WriteBatch {
            leads: vec![lead],
            ..WriteBatch::default()
        })
        .expect("deadline moved");
}

pub(super) fn later(days: i64) -> DateTime<Utc> {
    Utc::now() + Duration::days(days)
}

pub(super) fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).expect("json body")))
        .expect("request builds")
}

pub(super) fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Serves reads from a seeded in-memory store but rejects every write.
pub(super) struct ConflictStore {
    pub(super) inner: InMemoryMarketplaceStore,
}

impl MarketplaceStore for ConflictStore {
    fn lead(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        self.inner.lead(id)
    }

    fn claim(&self, id: &ClaimId) -> Result<Option<Claim>, RepositoryError> {
        self.inner.claim(id)
    }

    fn claim_for(
        &self,
        lead_id: &LeadId,
        professional_id: &ProfessionalId,
    ) -> Result<Option<Claim>, RepositoryError> {
        self.inner.claim_for(lead_id, professional_id)
    }

    fn claims_for_lead(&self, lead_id: &LeadId) -> Result<Vec<Claim>, RepositoryError> {
        self.inner.claims_for_lead(lead_id)
    }

    fn quote(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        self.inner.quote(id)
    }

    fn quotes_for_lead(&self, lead_id: &LeadId) -> Result<Vec<Quote>, RepositoryError> {
        self.inner.quotes_for_lead(lead_id)
    }

    fn balance(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<Option<CreditBalance>, RepositoryError> {
        self.inner.balance(professional_id)
    }

    fn transactions(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<Vec<CreditTransaction>, RepositoryError> {
        self.inner.transactions(professional_id)
    }

    fn transaction_with_reference(
        &self,
        professional_id: &ProfessionalId,
        reference: &str,
    ) -> Result<Option<CreditTransaction>, RepositoryError> {
        self.inner
            .transaction_with_reference(professional_id, reference)
    }

    fn verification(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<Option<ProfessionalVerification>, RepositoryError> {
        self.inner.verification(professional_id)
    }

    fn leads_expiring(&self, now: DateTime<Utc>) -> Result<Vec<LeadId>, RepositoryError> {
        self.inner.leads_expiring(now)
    }

    fn balances_with_expired_lots(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProfessionalId>, RepositoryError> {
        self.inner.balances_with_expired_lots(now)
    }

    fn commit(&self, _batch: WriteBatch) -> Result<(), RepositoryError> {
        Err(RepositoryError::Conflict("stale write".to_string()))
    }
}

pub(super) struct UnavailableStore;

impl MarketplaceStore for UnavailableStore {
    fn lead(&self, _id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        Err(offline())
    }

    fn claim(&self, _id: &ClaimId) -> Result<Option<Claim>, RepositoryError> {
        Err(offline())
    }

    fn claim_for(
        &self,
        _lead_id: &LeadId,
        _professional_id: &ProfessionalId,
    ) -> Result<Option<Claim>, RepositoryError> {
        Err(offline())
    }

    fn claims_for_lead(&self, _lead_id: &LeadId) -> Result<Vec<Claim>, RepositoryError> {
        Err(offline())
    }

    fn quote(&self, _id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        Err(offline())
    }

    fn quotes_for_lead(&self, _lead_id: &LeadId) -> Result<Vec<Quote>, RepositoryError> {
        Err(offline())
    }

    fn balance(
        &self,
        _professional_id: &ProfessionalId,
    ) -> Result<Option<CreditBalance>, RepositoryError> {
        Err(offline())
    }

    fn transactions(
        &self,
        _professional_id: &ProfessionalId,
    ) -> Result<Vec<CreditTransaction>, RepositoryError> {
        Err(offline())
    }

    fn transaction_with_reference(
        &self,
        _professional_id: &ProfessionalId,
        _reference: &str,
    ) -> Result<Option<CreditTransaction>, RepositoryError> {
        Err(offline())
    }

    fn verification(
        &self,
        _professional_id: &ProfessionalId,
    ) -> Result<Option<ProfessionalVerification>, RepositoryError> {
        Err(offline())
    }

    fn leads_expiring(&self, _now: DateTime<Utc>) -> Result<Vec<LeadId>, RepositoryError> {
        Err(offline())
    }

    fn balances_with_expired_lots(
        &self,
        _now: DateTime<Utc>,
    ) -> Result<Vec<ProfessionalId>, RepositoryError> {
        Err(offline())
    }

    fn commit(&self, _batch: WriteBatch) -> Result<(), RepositoryError> {
        Err(offline())
    }
}

fn offline() -> RepositoryError {
    RepositoryError::Unavailable("database offline".to_string())
}
