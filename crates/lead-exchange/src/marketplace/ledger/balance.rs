use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::marketplace::domain::{LeadId, ProfessionalId};

/// Identifier for an append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Purchase,
    LeadClaim,
    Refund,
    AdminAddition,
    AdminDeduction,
}

impl TransactionType {
    pub const fn label(self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::LeadClaim => "lead_claim",
            TransactionType::Refund => "refund",
            TransactionType::AdminAddition => "admin_addition",
            TransactionType::AdminDeduction => "admin_deduction",
        }
    }

    /// Whether entries of this type add credits to the balance.
    pub const fn is_credit(self) -> bool {
        matches!(
            self,
            TransactionType::Purchase | TransactionType::Refund | TransactionType::AdminAddition
        )
    }
}

/// Immutable ledger entry. Exactly one is written per balance mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: TransactionId,
    pub professional_id: ProfessionalId,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Signed: positive for credits, negative for debits.
    pub amount: i64,
    pub balance_after: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_lead_id: Option<LeadId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Block of purchased credits sharing one expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaidLot {
    pub amount: u64,
    pub expires_at: Option<DateTime<Utc>>,
    pub acquired_at: DateTime<Utc>,
}

impl PaidLot {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Where credited amounts land inside a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CreditDestination {
    Free,
    PaidLot {
        expires_at: Option<DateTime<Utc>>,
        acquired_at: DateTime<Utc>,
    },
}

/// A professional's credit holdings.
///
/// Fields are private: only the ledger module mutates a balance, and every mutation it performs
/// is paired with a [`CreditTransaction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    professional_id: ProfessionalId,
    free_credits: u64,
    paid_lots: Vec<PaidLot>,
    lifetime_earned: u64,
    lifetime_spent: u64,
    lifetime_refunded: u64,
    #[serde(default)]
    hold_reason: Option<String>,
    #[serde(default)]
    version: u64,
}

impl CreditBalance {
    pub fn empty(professional_id: ProfessionalId) -> Self {
        Self {
            professional_id,
            free_credits: 0,
            paid_lots: Vec::new(),
            lifetime_earned: 0,
            lifetime_spent: 0,
            lifetime_refunded: 0,
            hold_reason: None,
            version: 0,
        }
    }

    pub fn professional_id(&self) -> &ProfessionalId {
        &self.professional_id
    }

    pub fn free_credits(&self) -> u64 {
        self.free_credits
    }

    pub fn paid_credits(&self) -> u64 {
        self.paid_lots.iter().map(|lot| lot.amount).sum()
    }

    /// Spendable credits. Paid lots past their expiry still count here, and stay spendable,
    /// until the expiry sweep writes them off with an `admin_deduction` entry.
    pub fn total(&self) -> u64 {
        self.free_credits + self.paid_credits()
    }

    pub fn paid_lots(&self) -> &[PaidLot] {
        &self.paid_lots
    }

    pub fn lifetime_earned(&self) -> u64 {
        self.lifetime_earned
    }

    pub fn lifetime_spent(&self) -> u64 {
        self.lifetime_spent
    }

    pub fn lifetime_refunded(&self) -> u64 {
        self.lifetime_refunded
    }

    pub fn hold_reason(&self) -> Option<&str> {
        self.hold_reason.as_deref()
    }

    pub fn is_on_hold(&self) -> bool {
        self.hold_reason.is_some()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Balance implied by the lifetime counters; diverges from [`Self::total`] only on corruption.
    pub fn expected_total(&self) -> Option<u64> {
        (self.lifetime_earned + self.lifetime_refunded).checked_sub(self.lifetime_spent)
    }

    pub(crate) fn counters_consistent(&self) -> bool {
        self.expected_total() == Some(self.total())
    }

    /// Removes `amount` credits, free credits first, then paid lots soonest-to-expire first.
    ///
    /// Lapsed lots sort first and are spent like any other lot; see [`Self::total`].
    ///
    /// Returns `false` without touching the balance when the holdings do not cover `amount`.
    pub(super) fn consume(&mut self, amount: u64) -> bool {
        if amount > self.total() {
            return false;
        }

        let from_free = amount.min(self.free_credits);
        self.free_credits -= from_free;
        let mut outstanding = amount - from_free;

        if outstanding > 0 {
            self.paid_lots
                .sort_by(|left, right| match (left.expires_at, right.expires_at) {
                    (Some(a), Some(b)) => a.cmp(&b),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => left.acquired_at.cmp(&right.acquired_at),
                });

            for lot in self.paid_lots.iter_mut() {
                if outstanding == 0 {
                    break;
                }
                let taken = outstanding.min(lot.amount);
                lot.amount -= taken;
                outstanding -= taken;
            }
            self.paid_lots.retain(|lot| lot.amount > 0);
        }

        self.lifetime_spent += amount;
        true
    }

    pub(super) fn add(&mut self, amount: u64, destination: CreditDestination, refund: bool) {
        match destination {
            CreditDestination::Free => self.free_credits += amount,
            CreditDestination::PaidLot {
                expires_at,
                acquired_at,
            } => self.paid_lots.push(PaidLot {
                amount,
                expires_at,
                acquired_at,
            }),
        }

        if refund {
            self.lifetime_refunded += amount;
        } else {
            self.lifetime_earned += amount;
        }
    }

    /// Drops every lot past its expiry, returning the number of credits removed.
    pub(super) fn remove_expired_lots(&mut self, now: DateTime<Utc>) -> u64 {
        let expired: u64 = self
            .paid_lots
            .iter()
            .filter(|lot| lot.is_expired(now))
            .map(|lot| lot.amount)
            .sum();
        if expired > 0 {
            self.paid_lots.retain(|lot| !lot.is_expired(now));
            self.lifetime_spent += expired;
        }
        expired
    }

    pub(super) fn has_expired_lots(&self, now: DateTime<Utc>) -> bool {
        self.paid_lots
            .iter()
            .any(|lot| lot.amount > 0 && lot.is_expired(now))
    }

    pub(super) fn place_hold(&mut self, reason: String) {
        self.hold_reason = Some(reason);
    }

    pub(super) fn release_hold(&mut self) {
        self.hold_reason = None;
    }
}
