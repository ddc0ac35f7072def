//! Quote submission and the accept/decline state machine.

mod pricing;

pub use pricing::{
    LineItemInput, PricedItem, PricingError, PricingInput, QuotePricing, VAT_PERCENT,
};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{
    LeadId, LeadStatus, ProfessionalId, Quote, QuoteId, QuoteStatus, QuoteTimeline,
};
use super::locks::{acquire, LockRegistry};
use super::repository::{
    dispatch, MarketplaceEvent, MarketplaceStore, NotificationPublisher, RepositoryError,
    WriteBatch,
};

pub const SIBLING_DECLINE_REASON: &str = "lead accepted another quote";

static QUOTE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_quote_id() -> QuoteId {
    let id = QUOTE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    QuoteId(format!("quote-{id:06}"))
}

/// Professional supplied quote payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSubmission {
    pub pricing: PricingInput,
    pub timeline: QuoteTimeline,
}

/// Error raised by the quote lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error("estimated completion date precedes the start date")]
    InvalidTimeline,
    #[error("lead {0} not found")]
    LeadNotFound(LeadId),
    #[error("quote {0} not found")]
    QuoteNotFound(QuoteId),
    #[error("an active claim on this lead is required before quoting")]
    ClaimRequired,
    #[error("lead no longer accepts quotes while {status}")]
    LeadClosed { status: &'static str },
    #[error("a quote has already been submitted for this claim")]
    AlreadySubmitted,
    #[error("quote or lead already resolved")]
    AlreadyResolved,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl QuoteError {
    /// Validation failures are rejected before any state is read or written.
    pub fn is_validation(&self) -> bool {
        matches!(self, QuoteError::Pricing(_) | QuoteError::InvalidTimeline)
    }
}

pub struct QuoteManager<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    locks: Arc<LockRegistry>,
}

impl<S, N> QuoteManager<S, N>
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, locks: Arc<LockRegistry>) -> Self {
        Self {
            store,
            notifier,
            locks,
        }
    }

    pub fn submit(
        &self,
        lead_id: &LeadId,
        professional_id: &ProfessionalId,
        submission: QuoteSubmission,
    ) -> Result<Quote, QuoteError> {
        let pricing = QuotePricing::compute(&submission.pricing)?;
        let timeline = submission.timeline;
        if timeline.estimated_completion_date < timeline.estimated_start_date {
            return Err(QuoteError::InvalidTimeline);
        }

        let lead_lock = self.locks.lead(lead_id);
        let lead_guard = acquire(&lead_lock);

        let lead = self
            .store
            .lead(lead_id)?
            .ok_or_else(|| QuoteError::LeadNotFound(lead_id.clone()))?;
        if lead.status.is_terminal() {
            return Err(QuoteError::LeadClosed {
                status: lead.status.label(),
            });
        }
        if lead.is_past_deadline(Utc::now()) {
            return Err(QuoteError::LeadClosed {
                status: LeadStatus::Expired.label(),
            });
        }

        let mut claim = match self.store.claim_for(lead_id, professional_id)? {
            Some(claim) if claim.is_active() => claim,
            _ => return Err(QuoteError::ClaimRequired),
        };
        if claim.quote_submitted {
            return Err(QuoteError::AlreadySubmitted);
        }
        claim.quote_submitted = true;

        let quote = Quote {
            id: next_quote_id(),
            lead_id: lead_id.clone(),
            professional_id: professional_id.clone(),
            status: QuoteStatus::Pending,
            pricing,
            timeline,
            submitted_at: Utc::now(),
            accepted_at: None,
            declined_at: None,
            decline_reason: None,
        };

        self.store.commit(WriteBatch {
            claims: vec![claim],
            quotes: vec![quote.clone()],
            ..WriteBatch::default()
        })?;
        drop(lead_guard);

        info!(
            lead_id = %lead_id,
            professional_id = %professional_id,
            quote_id = %quote.id,
            total = quote.pricing.total,
            "quote submitted"
        );
        dispatch(
            self.notifier.as_ref(),
            vec![MarketplaceEvent::QuoteSubmitted {
                lead_id: lead_id.clone(),
                professional_id: professional_id.clone(),
                quote_id: quote.id.clone(),
            }],
        );
        Ok(quote)
    }

    /// Accepts one quote, resolving the lead and declining every pending sibling in one commit.
    pub fn accept(&self, quote_id: &QuoteId) -> Result<Quote, QuoteError> {
        let lead_id = self.fetch_quote(quote_id)?.lead_id;

        let lead_lock = self.locks.lead(&lead_id);
        let lead_guard = acquire(&lead_lock);

        let mut quote = self.fetch_quote(quote_id)?;
        let mut lead = self
            .store
            .lead(&lead_id)?
            .ok_or_else(|| QuoteError::LeadNotFound(lead_id.clone()))?;
        let now = Utc::now();
        if !quote.is_pending()
            || !matches!(lead.status, LeadStatus::Open | LeadStatus::Full)
            || lead.is_past_deadline(now)
        {
            return Err(QuoteError::AlreadyResolved);
        }
        // A quote only stands while the claim behind it does.
        match self.store.claim_for(&lead_id, &quote.professional_id)? {
            Some(claim) if claim.is_active() => {}
            _ => return Err(QuoteError::AlreadyResolved),
        }

        quote.status = QuoteStatus::Accepted;
        quote.accepted_at = Some(now);

        let mut quotes: Vec<Quote> = self
            .store
            .quotes_for_lead(&lead_id)?
            .into_iter()
            .filter(|sibling| sibling.id != quote.id && sibling.is_pending())
            .collect();
        for sibling in quotes.iter_mut() {
            sibling.decline(SIBLING_DECLINE_REASON, now);
        }
        let declined = quotes.len();
        quotes.push(quote.clone());

        lead.status = LeadStatus::Accepted;
        lead.accepted_quote_id = Some(quote.id.clone());

        self.store.commit(WriteBatch {
            leads: vec![lead],
            quotes,
            ..WriteBatch::default()
        })?;
        drop(lead_guard);

        info!(
            lead_id = %lead_id,
            quote_id = %quote.id,
            professional_id = %quote.professional_id,
            declined_siblings = declined,
            "quote accepted"
        );
        dispatch(
            self.notifier.as_ref(),
            vec![MarketplaceEvent::QuoteAccepted {
                lead_id,
                professional_id: quote.professional_id.clone(),
                quote_id: quote.id.clone(),
            }],
        );
        Ok(quote)
    }

    /// Declines a single pending quote; the lead and other quotes are untouched.
    pub fn decline(&self, quote_id: &QuoteId, reason: &str) -> Result<Quote, QuoteError> {
        let lead_id = self.fetch_quote(quote_id)?.lead_id;

        let lead_lock = self.locks.lead(&lead_id);
        let _lead_guard = acquire(&lead_lock);

        let mut quote = self.fetch_quote(quote_id)?;
        if !quote.is_pending() {
            return Err(QuoteError::AlreadyResolved);
        }
        quote.decline(reason, Utc::now());

        self.store.commit(WriteBatch {
            quotes: vec![quote.clone()],
            ..WriteBatch::default()
        })?;
        info!(quote_id = %quote.id, lead_id = %lead_id, reason, "quote declined");
        Ok(quote)
    }

    pub fn quote(&self, quote_id: &QuoteId) -> Result<Quote, QuoteError> {
        self.fetch_quote(quote_id)
    }

    pub fn quotes_for_lead(&self, lead_id: &LeadId) -> Result<Vec<Quote>, QuoteError> {
        Ok(self.store.quotes_for_lead(lead_id)?)
    }

    fn fetch_quote(&self, quote_id: &QuoteId) -> Result<Quote, QuoteError> {
        self.store
            .quote(quote_id)?
            .ok_or_else(|| QuoteError::QuoteNotFound(quote_id.clone()))
    }
}
