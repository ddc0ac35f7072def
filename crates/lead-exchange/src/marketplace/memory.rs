use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::domain::{
    Claim, ClaimId, Lead, LeadId, ProfessionalId, ProfessionalVerification, Quote, QuoteId,
};
use super::ledger::{CreditBalance, CreditTransaction};
use super::repository::{
    MarketplaceEvent, MarketplaceStore, NotificationError, NotificationPublisher,
    RepositoryError, WriteBatch,
};

#[derive(Debug, Default)]
struct Tables {
    leads: HashMap<LeadId, Lead>,
    claims: HashMap<ClaimId, Claim>,
    claim_order: Vec<ClaimId>,
    quotes: HashMap<QuoteId, Quote>,
    quote_order: Vec<QuoteId>,
    balances: HashMap<ProfessionalId, CreditBalance>,
    transactions: Vec<CreditTransaction>,
    verifications: HashMap<ProfessionalId, ProfessionalVerification>,
}

/// Process-local adapter; every batch is validated, then applied under one lock.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMarketplaceStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryMarketplaceStore {
    fn tables(&self) -> Result<std::sync::MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl MarketplaceStore for InMemoryMarketplaceStore {
    fn lead(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        Ok(self.tables()?.leads.get(id).cloned())
    }

    fn claim(&self, id: &ClaimId) -> Result<Option<Claim>, RepositoryError> {
        Ok(self.tables()?.claims.get(id).cloned())
    }

    fn claim_for(
        &self,
        lead_id: &LeadId,
        professional_id: &ProfessionalId,
    ) -> Result<Option<Claim>, RepositoryError> {
        let tables = self.tables()?;
        let mut matching = tables
            .claim_order
            .iter()
            .rev()
            .filter_map(|id| tables.claims.get(id))
            .filter(|claim| &claim.lead_id == lead_id && &claim.professional_id == professional_id);
        let latest = matching.next().cloned();
        // Prefer the active claim when a refunded one was superseded.
        Ok(match latest {
            Some(claim) if claim.refunded => Some(
                matching
                    .find(|older| older.is_active())
                    .cloned()
                    .unwrap_or(claim),
            ),
            other => other,
        })
    }

    fn claims_for_lead(&self, lead_id: &LeadId) -> Result<Vec<Claim>, RepositoryError> {
        let tables = self.tables()?;
        Ok(tables
            .claim_order
            .iter()
            .filter_map(|id| tables.claims.get(id))
            .filter(|claim| &claim.lead_id == lead_id)
            .cloned()
            .collect())
    }

    fn quote(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        Ok(self.tables()?.quotes.get(id).cloned())
    }

    fn quotes_for_lead(&self, lead_id: &LeadId) -> Result<Vec<Quote>, RepositoryError> {
        let tables = self.tables()?;
        Ok(tables
            .quote_order
            .iter()
            .filter_map(|id| tables.quotes.get(id))
            .filter(|quote| &quote.lead_id == lead_id)
            .cloned()
            .collect())
    }

    fn balance(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<Option<CreditBalance>, RepositoryError> {
        Ok(self.tables()?.balances.get(professional_id).cloned())
    }

    fn transactions(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<Vec<CreditTransaction>, RepositoryError> {
        Ok(self
            .tables()?
            .transactions
            .iter()
            .filter(|entry| &entry.professional_id == professional_id)
            .cloned()
            .collect())
    }

    fn transaction_with_reference(
        &self,
        professional_id: &ProfessionalId,
        reference: &str,
    ) -> Result<Option<CreditTransaction>, RepositoryError> {
        Ok(self
            .tables()?
            .transactions
            .iter()
            .find(|entry| {
                &entry.professional_id == professional_id
                    && entry.reference.as_deref() == Some(reference)
            })
            .cloned())
    }

    fn verification(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<Option<ProfessionalVerification>, RepositoryError> {
        Ok(self.tables()?.verifications.get(professional_id).cloned())
    }

    fn leads_expiring(&self, now: DateTime<Utc>) -> Result<Vec<LeadId>, RepositoryError> {
        let tables = self.tables()?;
        let mut due: Vec<&Lead> = tables
            .leads
            .values()
            .filter(|lead| !lead.status.is_terminal() && lead.expires_at <= now)
            .collect();
        due.sort_by_key(|lead| lead.expires_at);
        Ok(due.into_iter().map(|lead| lead.id.clone()).collect())
    }

    fn balances_with_expired_lots(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProfessionalId>, RepositoryError> {
        let tables = self.tables()?;
        let mut due: Vec<ProfessionalId> = tables
            .balances
            .values()
            .filter(|balance| {
                balance
                    .paid_lots()
                    .iter()
                    .any(|lot| lot.amount > 0 && lot.is_expired(now))
            })
            .map(|balance| balance.professional_id().clone())
            .collect();
        due.sort();
        Ok(due)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), RepositoryError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut tables = self.tables()?;

        for lead in &batch.leads {
            if let Some(stored) = tables.leads.get(&lead.id) {
                if stored.version != lead.version {
                    return Err(RepositoryError::Conflict(format!(
                        "lead {} changed since it was read",
                        lead.id
                    )));
                }
            }
        }
        for balance in &batch.balances {
            let stored_version = tables
                .balances
                .get(balance.professional_id())
                .map(CreditBalance::version)
                .unwrap_or(0);
            if stored_version != balance.version() {
                return Err(RepositoryError::Conflict(format!(
                    "balance for {} changed since it was read",
                    balance.professional_id()
                )));
            }
        }
        for entry in &batch.transactions {
            if tables.transactions.iter().any(|stored| stored.id == entry.id) {
                return Err(RepositoryError::Conflict(format!(
                    "transaction {} already recorded",
                    entry.id.0
                )));
            }
        }

        for mut lead in batch.leads {
            lead.version += 1;
            tables.leads.insert(lead.id.clone(), lead);
        }
        for claim in batch.claims {
            if !tables.claims.contains_key(&claim.id) {
                tables.claim_order.push(claim.id.clone());
            }
            tables.claims.insert(claim.id.clone(), claim);
        }
        for quote in batch.quotes {
            if !tables.quotes.contains_key(&quote.id) {
                tables.quote_order.push(quote.id.clone());
            }
            tables.quotes.insert(quote.id.clone(), quote);
        }
        for mut balance in batch.balances {
            balance.set_version(balance.version() + 1);
            tables
                .balances
                .insert(balance.professional_id().clone(), balance);
        }
        tables.transactions.extend(batch.transactions);
        for record in batch.verifications {
            tables
                .verifications
                .insert(record.professional_id.clone(), record);
        }
        Ok(())
    }
}

/// Notification adapter that records events for inspection.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<MarketplaceEvent>>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<MarketplaceEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl NotificationPublisher for RecordingNotifier {
    fn publish(&self, event: MarketplaceEvent) -> Result<(), NotificationError> {
        self.events
            .lock()
            .map_err(|_| NotificationError::Transport("recorder mutex poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}
