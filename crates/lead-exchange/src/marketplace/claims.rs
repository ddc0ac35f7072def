use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::cost;
use super::domain::{
    Claim, ClaimId, DirectLeadStatus, Lead, LeadId, LeadStatus, ProfessionalId,
    ProfessionalIdentity, ProfessionalVerification,
};
use super::ledger::{
    CreditDestination, CreditLedger, EntryDetails, LedgerError, TransactionType,
};
use super::locks::{acquire, LockRegistry};
use super::repository::{
    dispatch, MarketplaceEvent, MarketplaceStore, NotificationPublisher, RepositoryError,
    WriteBatch,
};

pub const REFUNDED_QUOTE_REASON: &str = "claim refunded";

static CLAIM_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_claim_id() -> ClaimId {
    let id = CLAIM_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ClaimId(format!("claim-{id:06}"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimReceipt {
    pub claim: Claim,
    pub remaining_credits: u64,
}

/// Error raised while claiming or refunding a lead slot.
#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("lead {0} not found")]
    LeadNotFound(LeadId),
    #[error("lead is not claimable while {status}")]
    LeadNotClaimable { status: &'static str },
    #[error("lead already claimed by this professional")]
    AlreadyClaimed,
    #[error("all claim slots on this lead are taken")]
    LeadFull,
    #[error("claim {0} not found")]
    ClaimNotFound(ClaimId),
    #[error("claim already refunded")]
    AlreadyRefunded,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Serializes "spend credits + reserve a slot" against one lead.
pub struct ClaimCoordinator<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    locks: Arc<LockRegistry>,
    ledger: Arc<CreditLedger<S, N>>,
}

impl<S, N> ClaimCoordinator<S, N>
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        locks: Arc<LockRegistry>,
        ledger: Arc<CreditLedger<S, N>>,
    ) -> Self {
        Self {
            store,
            notifier,
            locks,
            ledger,
        }
    }

    /// Claims a slot on `lead_id`, debiting the professional in the same commit.
    ///
    /// Every failure leaves both the lead and the balance untouched.
    pub fn claim(
        &self,
        lead_id: &LeadId,
        professional: &ProfessionalIdentity,
    ) -> Result<ClaimReceipt, ClaimError> {
        let lead_lock = self.locks.lead(lead_id);
        let lead_guard = acquire(&lead_lock);
        let professional_lock = self.locks.professional(&professional.id);
        let professional_guard = acquire(&professional_lock);

        let now = Utc::now();
        let mut lead = self.fetch_lead(lead_id)?;
        // A full lead is reported as `LeadFull` once the duplicate check has run.
        let slots_exhausted = lead.status == LeadStatus::Full;
        if !lead.accepts_claims() && !slots_exhausted {
            return Err(ClaimError::LeadNotClaimable {
                status: lead.status.label(),
            });
        }
        if lead.is_past_deadline(now) {
            return Err(ClaimError::LeadNotClaimable {
                status: LeadStatus::Expired.label(),
            });
        }
        if lead.is_direct() && lead.direct_professional_id.as_ref() != Some(&professional.id) {
            return Err(ClaimError::LeadNotClaimable {
                status: "routed to another professional",
            });
        }
        if let Some(existing) = self.store.claim_for(lead_id, &professional.id)? {
            if existing.is_active() {
                return Err(ClaimError::AlreadyClaimed);
            }
        }
        if slots_exhausted || lead.claim_count >= lead.max_claims {
            return Err(ClaimError::LeadFull);
        }

        let price = lead.credits_required.unwrap_or_else(|| {
            cost::cost(lead.budget_bracket, lead.urgency, professional.verified)
        });

        let mut balance = self.ledger.load(&professional.id)?;
        let transaction = self.ledger.stage_debit(
            &mut balance,
            price,
            TransactionType::LeadClaim,
            EntryDetails::for_lead(lead_id),
            now,
        )?;

        let claim = Claim {
            id: next_claim_id(),
            lead_id: lead_id.clone(),
            professional_id: professional.id.clone(),
            credits_spent: price,
            claimed_at: now,
            quote_submitted: false,
            refunded: false,
            refunded_at: None,
            refund_reason: None,
        };

        lead.credits_required = Some(price);
        lead.claim_count += 1;
        if lead.is_direct() {
            lead.direct_status = Some(DirectLeadStatus::Accepted);
        }
        if lead.claim_count == lead.max_claims {
            lead.status = LeadStatus::Full;
        }

        let remaining_credits = balance.total();
        let mut events = vec![MarketplaceEvent::LeadClaimed {
            lead_id: lead_id.clone(),
            professional_id: professional.id.clone(),
            claim_id: claim.id.clone(),
        }];
        events.extend(self.ledger.low_credit_event(&balance, price));

        let claim_count = lead.claim_count;
        let status = lead.status;
        self.store.commit(WriteBatch {
            leads: vec![lead],
            claims: vec![claim.clone()],
            balances: vec![balance],
            transactions: vec![transaction],
            ..WriteBatch::default()
        })?;
        drop(professional_guard);
        drop(lead_guard);

        info!(
            lead_id = %lead_id,
            professional_id = %professional.id,
            credits = price,
            claim_count,
            status = status.label(),
            "lead claimed"
        );
        dispatch(self.notifier.as_ref(), events);

        Ok(ClaimReceipt {
            claim,
            remaining_credits,
        })
    }

    /// Administrative reversal of a single claim.
    pub fn refund_claim(&self, claim_id: &ClaimId, reason: &str) -> Result<Claim, ClaimError> {
        let claim = self
            .store
            .claim(claim_id)?
            .ok_or_else(|| ClaimError::ClaimNotFound(claim_id.clone()))?;

        let lead_lock = self.locks.lead(&claim.lead_id);
        let _lead_guard = acquire(&lead_lock);
        let professional_lock = self.locks.professional(&claim.professional_id);
        let _professional_guard = acquire(&professional_lock);

        // Re-read under the locks; a concurrent refund may have landed in between.
        let claim = self
            .store
            .claim(claim_id)?
            .ok_or_else(|| ClaimError::ClaimNotFound(claim_id.clone()))?;
        let mut lead = self.fetch_lead(&claim.lead_id)?;
        let mut batch = WriteBatch::default();
        let refunded = self.stage_refund(&mut lead, claim, reason, &mut batch)?;
        batch.leads.push(lead);
        self.store.commit(batch)?;

        info!(
            claim_id = %refunded.id,
            lead_id = %refunded.lead_id,
            professional_id = %refunded.professional_id,
            credits = refunded.credits_spent,
            reason,
            "claim refunded"
        );
        Ok(refunded)
    }

    /// Stages the refund of `claim` into `batch`, adjusting `lead` in place.
    ///
    /// The professional's pending quote on the lead is declined in the same batch unless the
    /// batch already stages it. Caller holds the lead lock and the professional lock, and pushes
    /// `lead` itself.
    pub(crate) fn stage_refund(
        &self,
        lead: &mut Lead,
        mut claim: Claim,
        reason: &str,
        batch: &mut WriteBatch,
    ) -> Result<Claim, ClaimError> {
        if claim.refunded {
            return Err(ClaimError::AlreadyRefunded);
        }

        let now = Utc::now();
        let mut balance = match batch
            .balances
            .iter()
            .position(|staged| staged.professional_id() == &claim.professional_id)
        {
            Some(index) => batch.balances.swap_remove(index),
            None => self.ledger.load(&claim.professional_id)?,
        };
        let transaction = self.ledger.stage_credit(
            &mut balance,
            claim.credits_spent,
            TransactionType::Refund,
            CreditDestination::Free,
            EntryDetails::for_lead(&claim.lead_id).with_note(reason),
            now,
        )?;

        claim.refunded = true;
        claim.refunded_at = Some(now);
        claim.refund_reason = Some(reason.to_string());

        let withdrawn: Vec<_> = self
            .store
            .quotes_for_lead(&claim.lead_id)?
            .into_iter()
            .filter(|quote| {
                quote.professional_id == claim.professional_id
                    && quote.is_pending()
                    && !batch.quotes.iter().any(|staged| staged.id == quote.id)
            })
            .collect();
        for mut quote in withdrawn {
            quote.decline(REFUNDED_QUOTE_REASON, now);
            batch.quotes.push(quote);
        }

        lead.claim_count = lead.claim_count.saturating_sub(1);
        if lead.status == LeadStatus::Full {
            lead.status = LeadStatus::Open;
        }

        batch.balances.push(balance);
        batch.transactions.push(transaction);
        batch.claims.push(claim.clone());
        Ok(claim)
    }

    /// Identity used for pricing, with the verified flag read from the stored record.
    pub fn identity(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<ProfessionalIdentity, ClaimError> {
        let verified = self
            .store
            .verification(professional_id)?
            .is_some_and(|record| record.verified);
        Ok(ProfessionalIdentity {
            id: professional_id.clone(),
            verified,
        })
    }

    /// Records the back-office verification outcome. Prices already frozen on leads stay as
    /// they are.
    pub fn set_verified(
        &self,
        professional_id: &ProfessionalId,
        verified: bool,
    ) -> Result<ProfessionalVerification, ClaimError> {
        let record = ProfessionalVerification {
            professional_id: professional_id.clone(),
            verified,
            updated_at: Utc::now(),
        };
        self.store.commit(WriteBatch {
            verifications: vec![record.clone()],
            ..WriteBatch::default()
        })?;
        info!(professional_id = %professional_id, verified, "verification recorded");
        Ok(record)
    }

    pub fn claims_for_lead(&self, lead_id: &LeadId) -> Result<Vec<Claim>, ClaimError> {
        Ok(self.store.claims_for_lead(lead_id)?)
    }

    pub fn claim_for(
        &self,
        lead_id: &LeadId,
        professional_id: &ProfessionalId,
    ) -> Result<Option<Claim>, ClaimError> {
        Ok(self.store.claim_for(lead_id, professional_id)?)
    }

    fn fetch_lead(&self, lead_id: &LeadId) -> Result<Lead, ClaimError> {
        self.store
            .lead(lead_id)?
            .ok_or_else(|| ClaimError::LeadNotFound(lead_id.clone()))
    }
}
