use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::claims::{ClaimCoordinator, ClaimError};
use super::domain::{
    BudgetBracket, DirectLeadStatus, HomeownerId, Lead, LeadId, LeadStatus, LeadType,
    ProfessionalId, QuoteStatus, Urgency,
};
use super::locks::{acquire, LockRegistry};
use super::repository::{MarketplaceStore, NotificationPublisher, RepositoryError, WriteBatch};
use crate::config::{MarketplaceConfig, MAX_CLAIMS_CEILING};

pub const CANCELLED_QUOTE_REASON: &str = "lead cancelled";

static LEAD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_lead_id() -> LeadId {
    let id = LEAD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    LeadId(format!("lead-{id:06}"))
}

/// Homeowner request to publish a lead. Setting `direct_professional_id` routes it to a single
/// professional instead of the open marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLead {
    pub homeowner_id: HomeownerId,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub budget_bracket: BudgetBracket,
    pub urgency: Urgency,
    #[serde(default)]
    pub max_claims: Option<u32>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub direct_professional_id: Option<ProfessionalId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExpirySummary {
    pub leads_expired: usize,
    pub quotes_expired: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancellationOutcome {
    pub lead: Lead,
    pub refunded_claims: usize,
    pub credits_refunded: u64,
    pub quotes_declined: usize,
}

/// Error raised by the lead lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum LeadError {
    #[error("invalid lead: {0}")]
    Validation(String),
    #[error("lead {0} not found")]
    NotFound(LeadId),
    #[error("lead is already {status}")]
    AlreadyTerminal { status: &'static str },
    #[error("lead is not a direct lead")]
    NotDirect,
    #[error("direct lead is routed to another professional")]
    NotTargetProfessional,
    #[error("direct lead cannot move from {from:?} to {to:?}")]
    DirectTransition {
        from: Option<DirectLeadStatus>,
        to: DirectLeadStatus,
    },
    #[error(transparent)]
    Claim(#[from] ClaimError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Owns lead status transitions: posting, cancellation, direct routing and expiry.
pub struct LeadLifecycle<S, N> {
    store: Arc<S>,
    locks: Arc<LockRegistry>,
    claims: Arc<ClaimCoordinator<S, N>>,
    config: MarketplaceConfig,
}

impl<S, N> LeadLifecycle<S, N>
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        store: Arc<S>,
        locks: Arc<LockRegistry>,
        claims: Arc<ClaimCoordinator<S, N>>,
        config: MarketplaceConfig,
    ) -> Self {
        Self {
            store,
            locks,
            claims,
            config,
        }
    }

    pub fn post(&self, request: NewLead) -> Result<Lead, LeadError> {
        let now = Utc::now();
        let category = request.category.trim();
        if category.is_empty() {
            return Err(LeadError::Validation("category is required".to_string()));
        }
        if request.expires_at <= now {
            return Err(LeadError::Validation(
                "expiry must be in the future".to_string(),
            ));
        }

        let (lead_type, max_claims, direct_status) = match &request.direct_professional_id {
            Some(_) => (LeadType::Direct, 1, Some(DirectLeadStatus::Pending)),
            None => {
                let max_claims = request
                    .max_claims
                    .unwrap_or(self.config.default_max_claims);
                if max_claims == 0 || max_claims > MAX_CLAIMS_CEILING {
                    return Err(LeadError::Validation(format!(
                        "max claims must be between 1 and {MAX_CLAIMS_CEILING}"
                    )));
                }
                (LeadType::Marketplace, max_claims, None)
            }
        };

        let lead = Lead {
            id: next_lead_id(),
            homeowner_id: request.homeowner_id,
            category: category.to_string(),
            description: request.description,
            budget_bracket: request.budget_bracket,
            urgency: request.urgency,
            max_claims,
            claim_count: 0,
            credits_required: None,
            status: LeadStatus::Open,
            lead_type,
            direct_professional_id: request.direct_professional_id,
            direct_status,
            expires_at: request.expires_at,
            created_at: now,
            accepted_quote_id: None,
            cancellation_reason: None,
            version: 0,
        };

        self.store.commit(WriteBatch {
            leads: vec![lead.clone()],
            ..WriteBatch::default()
        })?;
        info!(
            lead_id = %lead.id,
            lead_type = ?lead.lead_type,
            budget = lead.budget_bracket.label(),
            max_claims,
            "lead posted"
        );
        Ok(lead)
    }

    pub fn lead(&self, lead_id: &LeadId) -> Result<Lead, LeadError> {
        self.fetch(lead_id)
    }

    /// Homeowner cancellation: refunds every active claim and declines pending quotes in one
    /// commit.
    pub fn cancel(&self, lead_id: &LeadId, reason: &str) -> Result<CancellationOutcome, LeadError> {
        let lead_lock = self.locks.lead(lead_id);
        let _lead_guard = acquire(&lead_lock);

        let mut lead = self.fetch(lead_id)?;
        if lead.status.is_terminal() {
            return Err(LeadError::AlreadyTerminal {
                status: lead.status.label(),
            });
        }

        let active: Vec<_> = self
            .store
            .claims_for_lead(lead_id)?
            .into_iter()
            .filter(|claim| claim.is_active())
            .collect();
        let professional_locks = self
            .locks
            .professionals(active.iter().map(|claim| &claim.professional_id));
        let _professional_guards: Vec<_> =
            professional_locks.iter().map(|lock| acquire(lock)).collect();

        let now = Utc::now();
        let mut quotes: Vec<_> = self
            .store
            .quotes_for_lead(lead_id)?
            .into_iter()
            .filter(|quote| quote.is_pending())
            .collect();
        for quote in quotes.iter_mut() {
            quote.decline(CANCELLED_QUOTE_REASON, now);
        }
        let quotes_declined = quotes.len();
        let mut batch = WriteBatch {
            quotes,
            ..WriteBatch::default()
        };

        let mut credits_refunded = 0;
        let refunded_claims = active.len();
        for claim in active {
            let refunded = self.claims.stage_refund(&mut lead, claim, reason, &mut batch)?;
            credits_refunded += refunded.credits_spent;
        }

        lead.status = LeadStatus::Cancelled;
        lead.cancellation_reason = Some(reason.to_string());
        batch.leads.push(lead.clone());
        self.store.commit(batch)?;

        info!(
            lead_id = %lead_id,
            refunded_claims,
            credits_refunded,
            quotes_declined,
            reason,
            "lead cancelled"
        );
        Ok(CancellationOutcome {
            lead,
            refunded_claims,
            credits_refunded,
            quotes_declined,
        })
    }

    /// Targeted professional passes on a direct lead without spending credits.
    pub fn decline_direct(
        &self,
        lead_id: &LeadId,
        professional_id: &ProfessionalId,
    ) -> Result<Lead, LeadError> {
        self.transition_direct(lead_id, DirectLeadStatus::Declined, |lead| {
            if lead.direct_professional_id.as_ref() != Some(professional_id) {
                return Err(LeadError::NotTargetProfessional);
            }
            match lead.direct_status {
                Some(DirectLeadStatus::Pending) => Ok(()),
                from => Err(LeadError::DirectTransition {
                    from,
                    to: DirectLeadStatus::Declined,
                }),
            }
        })
    }

    /// Re-publishes an unclaimed direct lead on the open marketplace.
    pub fn convert_direct(&self, lead_id: &LeadId) -> Result<Lead, LeadError> {
        let default_max_claims = self.config.default_max_claims;
        let lead = self.transition_direct(lead_id, DirectLeadStatus::Converted, |lead| {
            match lead.direct_status {
                Some(DirectLeadStatus::Pending | DirectLeadStatus::Declined)
                    if lead.claim_count == 0 =>
                {
                    lead.lead_type = LeadType::Marketplace;
                    lead.max_claims = default_max_claims;
                    lead.status = LeadStatus::Open;
                    Ok(())
                }
                from => Err(LeadError::DirectTransition {
                    from,
                    to: DirectLeadStatus::Converted,
                }),
            }
        })?;
        info!(lead_id = %lead.id, max_claims = lead.max_claims, "direct lead converted");
        Ok(lead)
    }

    /// Expires open or full leads past their deadline along with their pending quotes.
    ///
    /// Already-terminal leads are skipped, so repeated runs are no-ops. Claims are not refunded.
    pub fn expire_due(&self, now: DateTime<Utc>) -> Result<ExpirySummary, LeadError> {
        let mut summary = ExpirySummary::default();
        for lead_id in self.store.leads_expiring(now)? {
            let lead_lock = self.locks.lead(&lead_id);
            let _lead_guard = acquire(&lead_lock);

            let Some(mut lead) = self.store.lead(&lead_id)? else {
                continue;
            };
            if lead.status.is_terminal() || lead.expires_at > now {
                continue;
            }

            let mut quotes: Vec<_> = self
                .store
                .quotes_for_lead(&lead_id)?
                .into_iter()
                .filter(|quote| quote.is_pending())
                .collect();
            for quote in quotes.iter_mut() {
                quote.status = QuoteStatus::Expired;
            }
            let quotes_expired = quotes.len();

            lead.status = LeadStatus::Expired;
            self.store.commit(WriteBatch {
                leads: vec![lead],
                quotes,
                ..WriteBatch::default()
            })?;

            info!(lead_id = %lead_id, quotes_expired, "lead expired");
            summary.leads_expired += 1;
            summary.quotes_expired += quotes_expired;
        }
        Ok(summary)
    }

    fn transition_direct<F>(
        &self,
        lead_id: &LeadId,
        to: DirectLeadStatus,
        check: F,
    ) -> Result<Lead, LeadError>
    where
        F: FnOnce(&mut Lead) -> Result<(), LeadError>,
    {
        let lead_lock = self.locks.lead(lead_id);
        let _lead_guard = acquire(&lead_lock);

        let mut lead = self.fetch(lead_id)?;
        if lead.status.is_terminal() {
            return Err(LeadError::AlreadyTerminal {
                status: lead.status.label(),
            });
        }
        if lead.direct_status.is_none() {
            return Err(LeadError::NotDirect);
        }
        check(&mut lead)?;
        lead.direct_status = Some(to);

        self.store.commit(WriteBatch {
            leads: vec![lead.clone()],
            ..WriteBatch::default()
        })?;
        Ok(lead)
    }

    fn fetch(&self, lead_id: &LeadId) -> Result<Lead, LeadError> {
        self.store
            .lead(lead_id)?
            .ok_or_else(|| LeadError::NotFound(lead_id.clone()))
    }
}
