use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::claims::{ClaimCoordinator, ClaimError, ClaimReceipt};
use super::domain::{
    Claim, ClaimId, Lead, LeadId, ProfessionalId, ProfessionalIdentity, ProfessionalVerification,
    Quote, QuoteId,
};
use super::leads::{CancellationOutcome, LeadError, LeadLifecycle, NewLead};
use super::ledger::{
    BalanceView, CreditLedger, CreditTransaction, LedgerError, PurchaseConfirmation,
    PurchaseReceipt, ReconciliationReport,
};
use super::locks::LockRegistry;
use super::quotes::{QuoteError, QuoteManager, QuoteSubmission};
use super::repository::{MarketplaceStore, NotificationPublisher};
use super::sweeper::{ExpirySweeper, SweepError, SweepReport};
use crate::config::MarketplaceConfig;

/// Facade wiring the ledger, claim coordinator, quote manager and lead lifecycle over one store
/// and one lock registry.
pub struct Marketplace<S, N> {
    ledger: Arc<CreditLedger<S, N>>,
    locks: Arc<LockRegistry>,
    claims: Arc<ClaimCoordinator<S, N>>,
    quotes: QuoteManager<S, N>,
    leads: Arc<LeadLifecycle<S, N>>,
    sweeper: Arc<ExpirySweeper<S, N>>,
}

impl<S, N> Marketplace<S, N>
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, config: MarketplaceConfig) -> Self {
        let locks = Arc::new(LockRegistry::default());
        let ledger = Arc::new(CreditLedger::new(
            store.clone(),
            notifier.clone(),
            locks.clone(),
            config.clone(),
        ));
        let claims = Arc::new(ClaimCoordinator::new(
            store.clone(),
            notifier.clone(),
            locks.clone(),
            ledger.clone(),
        ));
        let quotes = QuoteManager::new(store.clone(), notifier, locks.clone());
        let leads = Arc::new(LeadLifecycle::new(
            store,
            locks.clone(),
            claims.clone(),
            config,
        ));
        let sweeper = Arc::new(ExpirySweeper::new(
            leads.clone(),
            ledger.clone(),
            locks.clone(),
        ));

        Self {
            ledger,
            locks,
            claims,
            quotes,
            leads,
            sweeper,
        }
    }

    pub fn ledger(&self) -> &CreditLedger<S, N> {
        &self.ledger
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    pub fn sweeper(&self) -> Arc<ExpirySweeper<S, N>> {
        self.sweeper.clone()
    }

    pub fn balance(&self, professional_id: &ProfessionalId) -> Result<BalanceView, LedgerError> {
        self.ledger.balance(professional_id)
    }

    pub fn transactions(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<Vec<CreditTransaction>, LedgerError> {
        self.ledger.transactions(professional_id)
    }

    pub fn record_purchase(
        &self,
        purchase: PurchaseConfirmation,
    ) -> Result<PurchaseReceipt, LedgerError> {
        self.ledger.record_purchase(purchase)
    }

    pub fn grant_free_credits(
        &self,
        professional_id: &ProfessionalId,
        amount: u64,
        note: &str,
    ) -> Result<u64, LedgerError> {
        self.ledger.grant_free_credits(professional_id, amount, note)
    }

    pub fn admin_deduct(
        &self,
        professional_id: &ProfessionalId,
        amount: u64,
        note: &str,
    ) -> Result<u64, LedgerError> {
        self.ledger.admin_deduct(professional_id, amount, note)
    }

    pub fn release_hold(&self, professional_id: &ProfessionalId) -> Result<bool, LedgerError> {
        self.ledger.release_hold(professional_id)
    }

    pub fn reconcile(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<ReconciliationReport, LedgerError> {
        self.ledger.reconcile(professional_id)
    }

    pub fn post_lead(&self, request: NewLead) -> Result<Lead, LeadError> {
        self.leads.post(request)
    }

    pub fn lead(&self, lead_id: &LeadId) -> Result<Lead, LeadError> {
        self.leads.lead(lead_id)
    }

    pub fn claim_lead(
        &self,
        lead_id: &LeadId,
        professional: &ProfessionalIdentity,
    ) -> Result<ClaimReceipt, ClaimError> {
        self.claims.claim(lead_id, professional)
    }

    /// Claims on behalf of `professional_id`, pricing with the stored verification status.
    pub fn claim_lead_as(
        &self,
        lead_id: &LeadId,
        professional_id: &ProfessionalId,
    ) -> Result<ClaimReceipt, ClaimError> {
        let professional = self.claims.identity(professional_id)?;
        self.claims.claim(lead_id, &professional)
    }

    pub fn professional_identity(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<ProfessionalIdentity, ClaimError> {
        self.claims.identity(professional_id)
    }

    pub fn set_professional_verified(
        &self,
        professional_id: &ProfessionalId,
        verified: bool,
    ) -> Result<ProfessionalVerification, ClaimError> {
        self.claims.set_verified(professional_id, verified)
    }

    pub fn refund_claim(&self, claim_id: &ClaimId, reason: &str) -> Result<Claim, ClaimError> {
        self.claims.refund_claim(claim_id, reason)
    }

    pub fn claims_for_lead(&self, lead_id: &LeadId) -> Result<Vec<Claim>, ClaimError> {
        self.claims.claims_for_lead(lead_id)
    }

    pub fn submit_quote(
        &self,
        lead_id: &LeadId,
        professional_id: &ProfessionalId,
        submission: QuoteSubmission,
    ) -> Result<Quote, QuoteError> {
        self.quotes.submit(lead_id, professional_id, submission)
    }

    pub fn accept_quote(&self, quote_id: &QuoteId) -> Result<Quote, QuoteError> {
        self.quotes.accept(quote_id)
    }

    pub fn decline_quote(&self, quote_id: &QuoteId, reason: &str) -> Result<Quote, QuoteError> {
        self.quotes.decline(quote_id, reason)
    }

    pub fn quote(&self, quote_id: &QuoteId) -> Result<Quote, QuoteError> {
        self.quotes.quote(quote_id)
    }

    pub fn quotes_for_lead(&self, lead_id: &LeadId) -> Result<Vec<Quote>, QuoteError> {
        self.quotes.quotes_for_lead(lead_id)
    }

    pub fn cancel_lead(
        &self,
        lead_id: &LeadId,
        reason: &str,
    ) -> Result<CancellationOutcome, LeadError> {
        self.leads.cancel(lead_id, reason)
    }

    pub fn decline_direct_lead(
        &self,
        lead_id: &LeadId,
        professional_id: &ProfessionalId,
    ) -> Result<Lead, LeadError> {
        self.leads.decline_direct(lead_id, professional_id)
    }

    pub fn convert_direct_lead(&self, lead_id: &LeadId) -> Result<Lead, LeadError> {
        self.leads.convert_direct(lead_id)
    }

    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, SweepError> {
        self.sweeper.sweep(now)
    }
}
