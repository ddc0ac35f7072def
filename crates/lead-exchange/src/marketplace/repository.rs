use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Claim, ClaimId, Lead, LeadId, ProfessionalId, ProfessionalVerification, Quote, QuoteId,
};
use super::ledger::{CreditBalance, CreditTransaction};

/// Records staged by one marketplace operation and committed as a single unit.
///
/// Adapters must apply a batch all-or-nothing: a relational adapter wraps it in one database
/// transaction, the in-memory adapter applies it under one lock.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub leads: Vec<Lead>,
    pub claims: Vec<Claim>,
    pub quotes: Vec<Quote>,
    pub balances: Vec<CreditBalance>,
    pub transactions: Vec<CreditTransaction>,
    pub verifications: Vec<ProfessionalVerification>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
            && self.claims.is_empty()
            && self.quotes.is_empty()
            && self.balances.is_empty()
            && self.transactions.is_empty()
            && self.verifications.is_empty()
    }
}

/// Persistence port for the lead claim and credit ledger engine.
///
/// `Lead` and `CreditBalance` writes are version checked: the staged record must carry the
/// version that was read, and the adapter stores it with the version incremented.
/// Transactions are insert-only.
pub trait MarketplaceStore: Send + Sync {
    fn lead(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError>;
    fn claim(&self, id: &ClaimId) -> Result<Option<Claim>, RepositoryError>;
    fn claim_for(
        &self,
        lead_id: &LeadId,
        professional_id: &ProfessionalId,
    ) -> Result<Option<Claim>, RepositoryError>;
    fn claims_for_lead(&self, lead_id: &LeadId) -> Result<Vec<Claim>, RepositoryError>;
    fn quote(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError>;
    fn quotes_for_lead(&self, lead_id: &LeadId) -> Result<Vec<Quote>, RepositoryError>;
    fn balance(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<Option<CreditBalance>, RepositoryError>;
    fn transactions(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<Vec<CreditTransaction>, RepositoryError>;
    fn transaction_with_reference(
        &self,
        professional_id: &ProfessionalId,
        reference: &str,
    ) -> Result<Option<CreditTransaction>, RepositoryError>;
    fn verification(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<Option<ProfessionalVerification>, RepositoryError>;
    /// Non-terminal leads whose `expires_at` is at or before `now`.
    fn leads_expiring(&self, now: DateTime<Utc>) -> Result<Vec<LeadId>, RepositoryError>;
    /// Professionals holding at least one paid lot past its expiry.
    fn balances_with_expired_lots(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProfessionalId>, RepositoryError>;
    fn commit(&self, batch: WriteBatch) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Fire-and-forget events handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MarketplaceEvent {
    LeadClaimed {
        lead_id: LeadId,
        professional_id: ProfessionalId,
        claim_id: ClaimId,
    },
    QuoteSubmitted {
        lead_id: LeadId,
        professional_id: ProfessionalId,
        quote_id: QuoteId,
    },
    QuoteAccepted {
        lead_id: LeadId,
        professional_id: ProfessionalId,
        quote_id: QuoteId,
    },
    CreditsLow {
        professional_id: ProfessionalId,
        remaining: u64,
    },
}

impl MarketplaceEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            MarketplaceEvent::LeadClaimed { .. } => "lead_claimed",
            MarketplaceEvent::QuoteSubmitted { .. } => "quote_submitted",
            MarketplaceEvent::QuoteAccepted { .. } => "quote_accepted",
            MarketplaceEvent::CreditsLow { .. } => "credits_low",
        }
    }
}

/// Outbound notification hook (push, e-mail or queue adapters).
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, event: MarketplaceEvent) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Publishes after the caller has released its locks; failures are logged and dropped.
pub(crate) fn dispatch<N: NotificationPublisher + ?Sized>(
    notifier: &N,
    events: Vec<MarketplaceEvent>,
) {
    for event in events {
        let name = event.name();
        if let Err(err) = notifier.publish(event) {
            tracing::warn!(event = name, error = %err, "notification dropped");
        }
    }
}
