use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::balance::{
    CreditBalance, CreditDestination, CreditTransaction, PaidLot, TransactionId, TransactionType,
};
use crate::config::MarketplaceConfig;
use crate::marketplace::domain::{LeadId, ProfessionalId};
use crate::marketplace::locks::{acquire, LockRegistry};
use crate::marketplace::repository::{
    dispatch, MarketplaceEvent, MarketplaceStore, NotificationPublisher, RepositoryError,
    WriteBatch,
};

static TRANSACTION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_transaction_id() -> TransactionId {
    let id = TRANSACTION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    TransactionId(format!("txn-{id:08}"))
}

pub(crate) const EXPIRY_NOTE: &str = "paid credits expired";

/// Optional attribution attached to a ledger entry.
#[derive(Debug, Clone, Default)]
pub(crate) struct EntryDetails {
    pub(crate) related_lead_id: Option<LeadId>,
    pub(crate) reference: Option<String>,
    pub(crate) note: Option<String>,
}

impl EntryDetails {
    pub(crate) fn for_lead(lead_id: &LeadId) -> Self {
        Self {
            related_lead_id: Some(lead_id.clone()),
            ..Self::default()
        }
    }

    pub(crate) fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Confirmed checkout emitted by the payment collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseConfirmation {
    pub professional_id: ProfessionalId,
    pub package_id: String,
    pub credits_amount: u64,
    #[serde(default)]
    pub bonus_credits: u64,
    pub payment_reference: String,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    pub transaction_id: TransactionId,
    pub credited: u64,
    pub new_balance: u64,
    /// `true` when the payment reference had already been recorded.
    pub duplicate: bool,
}

/// Externally visible snapshot of a balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceView {
    pub professional_id: ProfessionalId,
    pub free_credits: u64,
    pub paid_credits: u64,
    pub total_credits: u64,
    pub lifetime_earned: u64,
    pub lifetime_spent: u64,
    pub lifetime_refunded: u64,
    pub expiring_lots: Vec<PaidLot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub professional_id: ProfessionalId,
    pub balance: u64,
    pub transaction_sum: i64,
    pub transaction_count: usize,
}

/// Error raised by the credit ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient credits: {required} required, {available} available")]
    InsufficientCredits {
        required: u64,
        available: u64,
        shortfall: u64,
    },
    #[error("ledger for {professional_id} is on hold pending reconciliation: {reason}")]
    OnHold {
        professional_id: ProfessionalId,
        reason: String,
    },
    #[error("ledger integrity failure for {professional_id}: balance {actual}, expected {expected}")]
    Integrity {
        professional_id: ProfessionalId,
        expected: i64,
        actual: u64,
    },
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("transaction type {0:?} cannot be used for this operation")]
    UnsupportedType(TransactionType),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Sole writer of professional balances and the transaction log.
pub struct CreditLedger<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    locks: Arc<LockRegistry>,
    config: MarketplaceConfig,
}

impl<S, N> CreditLedger<S, N>
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        locks: Arc<LockRegistry>,
        config: MarketplaceConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            locks,
            config,
        }
    }

    pub fn balance(&self, professional_id: &ProfessionalId) -> Result<BalanceView, LedgerError> {
        self.balance_as_of(professional_id, Utc::now())
    }

    pub fn balance_as_of(
        &self,
        professional_id: &ProfessionalId,
        now: DateTime<Utc>,
    ) -> Result<BalanceView, LedgerError> {
        let balance = self.load(professional_id)?;
        let horizon = now + self.config.expiry_warning();
        let mut expiring_lots: Vec<PaidLot> = balance
            .paid_lots()
            .iter()
            .filter(|lot| lot.expires_at.is_some_and(|at| at <= horizon))
            .cloned()
            .collect();
        expiring_lots.sort_by_key(|lot| lot.expires_at);

        Ok(BalanceView {
            professional_id: professional_id.clone(),
            free_credits: balance.free_credits(),
            paid_credits: balance.paid_credits(),
            total_credits: balance.total(),
            lifetime_earned: balance.lifetime_earned(),
            lifetime_spent: balance.lifetime_spent(),
            lifetime_refunded: balance.lifetime_refunded(),
            expiring_lots,
            hold_reason: balance.hold_reason().map(str::to_string),
        })
    }

    pub fn transactions(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<Vec<CreditTransaction>, LedgerError> {
        Ok(self.store.transactions(professional_id)?)
    }

    /// Debit for a lead claim outside of the claim coordinator; returns the new balance.
    pub fn debit(
        &self,
        professional_id: &ProfessionalId,
        amount: u64,
        related_lead_id: Option<&LeadId>,
    ) -> Result<u64, LedgerError> {
        let lock = self.locks.professional(professional_id);
        let guard = acquire(&lock);

        let mut balance = self.load(professional_id)?;
        let details = EntryDetails {
            related_lead_id: related_lead_id.cloned(),
            ..EntryDetails::default()
        };
        let transaction = self.stage_debit(
            &mut balance,
            amount,
            TransactionType::LeadClaim,
            details,
            Utc::now(),
        )?;
        let remaining = balance.total();
        let low = self.low_credit_event(&balance, amount);
        self.commit_entry(balance, transaction)?;
        drop(guard);

        dispatch(self.notifier.as_ref(), low.into_iter().collect());
        Ok(remaining)
    }

    /// Adds credits of a crediting type; purchases open a new expiring lot, everything else lands
    /// in free credits.
    pub fn credit(
        &self,
        professional_id: &ProfessionalId,
        amount: u64,
        kind: TransactionType,
        related_lead_id: Option<&LeadId>,
    ) -> Result<u64, LedgerError> {
        let details = EntryDetails {
            related_lead_id: related_lead_id.cloned(),
            ..EntryDetails::default()
        };
        self.credit_with(professional_id, amount, kind, details)
    }

    pub fn grant_free_credits(
        &self,
        professional_id: &ProfessionalId,
        amount: u64,
        note: &str,
    ) -> Result<u64, LedgerError> {
        self.credit_with(
            professional_id,
            amount,
            TransactionType::AdminAddition,
            EntryDetails::default().with_note(note),
        )
    }

    pub fn admin_deduct(
        &self,
        professional_id: &ProfessionalId,
        amount: u64,
        note: &str,
    ) -> Result<u64, LedgerError> {
        let lock = self.locks.professional(professional_id);
        let _guard = acquire(&lock);

        let mut balance = self.load(professional_id)?;
        let transaction = self.stage_debit(
            &mut balance,
            amount,
            TransactionType::AdminDeduction,
            EntryDetails::default().with_note(note),
            Utc::now(),
        )?;
        let remaining = balance.total();
        self.commit_entry(balance, transaction)?;
        info!(professional_id = %professional_id, amount, remaining, "admin deduction recorded");
        Ok(remaining)
    }

    /// Converts a confirmed checkout into a `purchase` entry and a new paid lot.
    pub fn record_purchase(
        &self,
        purchase: PurchaseConfirmation,
    ) -> Result<PurchaseReceipt, LedgerError> {
        let credited = purchase
            .credits_amount
            .checked_add(purchase.bonus_credits)
            .ok_or_else(|| LedgerError::InvalidAmount("purchase overflows".to_string()))?;
        if purchase.payment_reference.trim().is_empty() {
            return Err(LedgerError::InvalidAmount(
                "payment reference is required".to_string(),
            ));
        }

        let lock = self.locks.professional(&purchase.professional_id);
        let _guard = acquire(&lock);

        if let Some(existing) = self
            .store
            .transaction_with_reference(&purchase.professional_id, &purchase.payment_reference)?
        {
            info!(
                professional_id = %purchase.professional_id,
                reference = %purchase.payment_reference,
                "duplicate purchase confirmation ignored"
            );
            let balance = self.load(&purchase.professional_id)?;
            return Ok(PurchaseReceipt {
                transaction_id: existing.id,
                credited: 0,
                new_balance: balance.total(),
                duplicate: true,
            });
        }

        let confirmed_at = purchase.confirmed_at.unwrap_or_else(Utc::now);
        let mut balance = self.load(&purchase.professional_id)?;
        let transaction = self.stage_credit(
            &mut balance,
            credited,
            TransactionType::Purchase,
            CreditDestination::PaidLot {
                expires_at: Some(confirmed_at + self.config.paid_lot_validity()),
                acquired_at: confirmed_at,
            },
            EntryDetails {
                reference: Some(purchase.payment_reference.clone()),
                note: Some(format!("package {}", purchase.package_id)),
                ..EntryDetails::default()
            },
            confirmed_at,
        )?;
        let receipt = PurchaseReceipt {
            transaction_id: transaction.id.clone(),
            credited,
            new_balance: balance.total(),
            duplicate: false,
        };
        self.commit_entry(balance, transaction)?;

        info!(
            professional_id = %purchase.professional_id,
            package_id = %purchase.package_id,
            credited,
            balance = receipt.new_balance,
            "credit purchase recorded"
        );
        Ok(receipt)
    }

    /// Replays the transaction log and compares it with the stored balance.
    ///
    /// A mismatch places the balance on hold and returns [`LedgerError::Integrity`].
    pub fn reconcile(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<ReconciliationReport, LedgerError> {
        let lock = self.locks.professional(professional_id);
        let _guard = acquire(&lock);

        let balance = self.load(professional_id)?;
        let transactions = self.store.transactions(professional_id)?;
        let transaction_sum: i64 = transactions.iter().map(|entry| entry.amount).sum();
        let last_after = transactions.last().map(|entry| entry.balance_after);

        let total = balance.total();
        let replay_matches = i64::try_from(total).is_ok_and(|total| total == transaction_sum);
        let tail_matches = last_after.map_or(total == 0, |after| after == total);

        if !(replay_matches && tail_matches && balance.counters_consistent()) {
            return Err(self.quarantine(balance, transaction_sum));
        }

        Ok(ReconciliationReport {
            professional_id: professional_id.clone(),
            balance: total,
            transaction_sum,
            transaction_count: transactions.len(),
        })
    }

    /// Lifts an integrity hold after manual reconciliation.
    pub fn release_hold(&self, professional_id: &ProfessionalId) -> Result<bool, LedgerError> {
        let lock = self.locks.professional(professional_id);
        let _guard = acquire(&lock);

        let mut balance = self.load(professional_id)?;
        if !balance.is_on_hold() {
            return Ok(false);
        }
        balance.release_hold();
        self.store.commit(WriteBatch {
            balances: vec![balance],
            ..WriteBatch::default()
        })?;
        info!(professional_id = %professional_id, "ledger hold released");
        Ok(true)
    }

    /// Zeroes every paid lot past its expiry, logging one `admin_deduction` per professional.
    ///
    /// Returns the number of credits removed.
    pub fn sweep_expired_lots(&self, now: DateTime<Utc>) -> Result<u64, LedgerError> {
        let mut removed = 0;
        for professional_id in self.store.balances_with_expired_lots(now)? {
            let lock = self.locks.professional(&professional_id);
            let _guard = acquire(&lock);

            let mut balance = self.load(&professional_id)?;
            if !balance.has_expired_lots(now) {
                continue;
            }
            let expired = balance.remove_expired_lots(now);
            let transaction = self.entry(
                &balance,
                TransactionType::AdminDeduction,
                -signed(expired)?,
                EntryDetails::default().with_note(EXPIRY_NOTE),
                now,
            );
            self.commit_entry(balance, transaction)?;
            info!(professional_id = %professional_id, expired, "expired paid credits removed");
            removed += expired;
        }
        Ok(removed)
    }

    fn credit_with(
        &self,
        professional_id: &ProfessionalId,
        amount: u64,
        kind: TransactionType,
        details: EntryDetails,
    ) -> Result<u64, LedgerError> {
        let lock = self.locks.professional(professional_id);
        let _guard = acquire(&lock);

        let now = Utc::now();
        let destination = match kind {
            TransactionType::Purchase => CreditDestination::PaidLot {
                expires_at: Some(now + self.config.paid_lot_validity()),
                acquired_at: now,
            },
            TransactionType::Refund | TransactionType::AdminAddition => CreditDestination::Free,
            other => return Err(LedgerError::UnsupportedType(other)),
        };

        let mut balance = self.load(professional_id)?;
        let transaction = self.stage_credit(&mut balance, amount, kind, destination, details, now)?;
        let total = balance.total();
        self.commit_entry(balance, transaction)?;
        Ok(total)
    }

    pub(crate) fn load(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<CreditBalance, LedgerError> {
        Ok(self
            .store
            .balance(professional_id)?
            .unwrap_or_else(|| CreditBalance::empty(professional_id.clone())))
    }

    /// Applies a debit to `balance` and returns the matching entry. Caller holds the
    /// professional lock and commits both in the same batch.
    pub(crate) fn stage_debit(
        &self,
        balance: &mut CreditBalance,
        amount: u64,
        kind: TransactionType,
        details: EntryDetails,
        now: DateTime<Utc>,
    ) -> Result<CreditTransaction, LedgerError> {
        if kind.is_credit() {
            return Err(LedgerError::UnsupportedType(kind));
        }
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "debit must be at least one credit".to_string(),
            ));
        }
        if let Some(reason) = balance.hold_reason() {
            return Err(LedgerError::OnHold {
                professional_id: balance.professional_id().clone(),
                reason: reason.to_string(),
            });
        }
        if !balance.counters_consistent() {
            let replayed: i64 = self
                .store
                .transactions(balance.professional_id())?
                .iter()
                .map(|entry| entry.amount)
                .sum();
            return Err(self.quarantine(balance.clone(), replayed));
        }

        let signed_amount = signed(amount)?;
        let available = balance.total();
        if !balance.consume(amount) {
            return Err(LedgerError::InsufficientCredits {
                required: amount,
                available,
                shortfall: amount - available,
            });
        }

        Ok(self.entry(balance, kind, -signed_amount, details, now))
    }

    pub(crate) fn stage_credit(
        &self,
        balance: &mut CreditBalance,
        amount: u64,
        kind: TransactionType,
        destination: CreditDestination,
        details: EntryDetails,
        now: DateTime<Utc>,
    ) -> Result<CreditTransaction, LedgerError> {
        if !kind.is_credit() {
            return Err(LedgerError::UnsupportedType(kind));
        }
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "credit must be at least one credit".to_string(),
            ));
        }
        let signed_amount = signed(amount)?;
        balance.add(amount, destination, kind == TransactionType::Refund);
        Ok(self.entry(balance, kind, signed_amount, details, now))
    }

    pub(crate) fn low_credit_event(
        &self,
        balance: &CreditBalance,
        debited: u64,
    ) -> Option<MarketplaceEvent> {
        let remaining = balance.total();
        let threshold = self.config.low_credit_threshold;
        // Only the debit that crosses the threshold raises the event.
        (remaining < threshold && remaining + debited >= threshold).then(|| {
            MarketplaceEvent::CreditsLow {
                professional_id: balance.professional_id().clone(),
                remaining,
            }
        })
    }

    fn entry(
        &self,
        balance: &CreditBalance,
        kind: TransactionType,
        amount: i64,
        details: EntryDetails,
        now: DateTime<Utc>,
    ) -> CreditTransaction {
        CreditTransaction {
            id: next_transaction_id(),
            professional_id: balance.professional_id().clone(),
            kind,
            amount,
            balance_after: balance.total(),
            related_lead_id: details.related_lead_id,
            reference: details.reference,
            note: details.note,
            created_at: now,
        }
    }

    fn commit_entry(
        &self,
        balance: CreditBalance,
        transaction: CreditTransaction,
    ) -> Result<(), LedgerError> {
        self.store.commit(WriteBatch {
            balances: vec![balance],
            transactions: vec![transaction],
            ..WriteBatch::default()
        })?;
        Ok(())
    }

    /// Halts further debits for a balance whose arithmetic no longer matches its history.
    fn quarantine(&self, mut balance: CreditBalance, replayed: i64) -> LedgerError {
        let professional_id = balance.professional_id().clone();
        let actual = balance.total();
        error!(
            professional_id = %professional_id,
            balance = actual,
            replayed,
            lifetime_earned = balance.lifetime_earned(),
            lifetime_spent = balance.lifetime_spent(),
            lifetime_refunded = balance.lifetime_refunded(),
            "ledger integrity failure; debits halted pending reconciliation"
        );

        if !balance.is_on_hold() {
            balance.place_hold(format!(
                "integrity check failed: balance {actual}, transaction log {replayed}"
            ));
            if let Err(err) = self.store.commit(WriteBatch {
                balances: vec![balance],
                ..WriteBatch::default()
            }) {
                error!(professional_id = %professional_id, error = %err, "failed to persist ledger hold");
            }
        }

        LedgerError::Integrity {
            professional_id,
            expected: replayed,
            actual,
        }
    }
}

fn signed(amount: u64) -> Result<i64, LedgerError> {
    i64::try_from(amount)
        .map_err(|_| LedgerError::InvalidAmount(format!("{amount} exceeds ledger range")))
}
