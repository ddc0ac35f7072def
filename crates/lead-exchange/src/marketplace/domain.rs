use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::quotes::QuotePricing;

/// Identifier wrapper for service professionals.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProfessionalId(pub String);

/// Identifier wrapper for homeowners posting leads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HomeownerId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

macro_rules! display_id {
    ($($name:ident),+ $(,)?) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )+
    };
}

display_id!(ProfessionalId, HomeownerId, LeadId, ClaimId, QuoteId);

/// Identity handed over by the authentication layer before any marketplace call.
///
/// HTTP callers never supply `verified`; the router resolves it from the stored
/// [`ProfessionalVerification`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfessionalIdentity {
    pub id: ProfessionalId,
    pub verified: bool,
}

/// Back-office verification record; professionals without one are unverified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfessionalVerification {
    pub professional_id: ProfessionalId,
    pub verified: bool,
    pub updated_at: DateTime<Utc>,
}

/// Homeowner budget brackets, ordered from cheapest to most expensive project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetBracket {
    #[serde(rename = "under_3k")]
    Under3k,
    #[serde(rename = "3k_10k")]
    From3kTo10k,
    #[serde(rename = "10k_25k")]
    From10kTo25k,
    #[serde(rename = "25k_50k")]
    From25kTo50k,
    #[serde(rename = "50k_100k")]
    From50kTo100k,
    #[serde(rename = "100k_250k")]
    From100kTo250k,
    #[serde(rename = "over_250k")]
    Over250k,
}

impl BudgetBracket {
    pub const fn label(self) -> &'static str {
        match self {
            BudgetBracket::Under3k => "under_3k",
            BudgetBracket::From3kTo10k => "3k_10k",
            BudgetBracket::From10kTo25k => "10k_25k",
            BudgetBracket::From25kTo50k => "25k_50k",
            BudgetBracket::From50kTo100k => "50k_100k",
            BudgetBracket::From100kTo250k => "100k_250k",
            BudgetBracket::Over250k => "over_250k",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Emergency,
    Urgent,
    Flexible,
    Planning,
}

impl Urgency {
    pub const fn label(self) -> &'static str {
        match self {
            Urgency::Emergency => "emergency",
            Urgency::Urgent => "urgent",
            Urgency::Flexible => "flexible",
            Urgency::Planning => "planning",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Open,
    Full,
    Accepted,
    Expired,
    Cancelled,
}

impl LeadStatus {
    pub const fn label(self) -> &'static str {
        match self {
            LeadStatus::Open => "open",
            LeadStatus::Full => "full",
            LeadStatus::Accepted => "accepted",
            LeadStatus::Expired => "expired",
            LeadStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            LeadStatus::Accepted | LeadStatus::Expired | LeadStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadType {
    Marketplace,
    Direct,
}

/// Sub-state of a lead routed to a single professional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectLeadStatus {
    Pending,
    Accepted,
    Declined,
    Converted,
}

/// A homeowner's service request and its shared claim-slot counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub homeowner_id: HomeownerId,
    pub category: String,
    pub description: String,
    pub budget_bracket: BudgetBracket,
    pub urgency: Urgency,
    pub max_claims: u32,
    pub claim_count: u32,
    /// Frozen at the first successful claim.
    pub credits_required: Option<u64>,
    pub status: LeadStatus,
    pub lead_type: LeadType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_professional_id: Option<ProfessionalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_status: Option<DirectLeadStatus>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_quote_id: Option<QuoteId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub version: u64,
}

impl Lead {
    pub fn remaining_slots(&self) -> u32 {
        self.max_claims.saturating_sub(self.claim_count)
    }

    pub fn is_direct(&self) -> bool {
        self.lead_type == LeadType::Direct
    }

    /// Deadline reached, whether or not the expiry sweep has recorded it yet.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the lead still accepts new claims from anyone.
    pub fn accepts_claims(&self) -> bool {
        match self.lead_type {
            LeadType::Marketplace => self.status == LeadStatus::Open,
            LeadType::Direct => {
                self.direct_status == Some(DirectLeadStatus::Pending)
                    && !self.status.is_terminal()
            }
        }
    }
}

/// A professional's paid reservation of one of a lead's slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub lead_id: LeadId,
    pub professional_id: ProfessionalId,
    pub credits_spent: u64,
    pub claimed_at: DateTime<Utc>,
    pub quote_submitted: bool,
    pub refunded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_reason: Option<String>,
}

impl Claim {
    pub fn is_active(&self) -> bool {
        !self.refunded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

impl QuoteStatus {
    pub const fn label(self) -> &'static str {
        match self {
            QuoteStatus::Pending => "pending",
            QuoteStatus::Accepted => "accepted",
            QuoteStatus::Declined => "declined",
            QuoteStatus::Expired => "expired",
        }
    }
}

/// Professional supplied schedule for the quoted work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteTimeline {
    pub estimated_start_date: NaiveDate,
    pub estimated_completion_date: NaiveDate,
}

/// A priced proposal submitted against a claimed lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub lead_id: LeadId,
    pub professional_id: ProfessionalId,
    pub status: QuoteStatus,
    pub pricing: QuotePricing,
    pub timeline: QuoteTimeline,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declined_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline_reason: Option<String>,
}

impl Quote {
    pub fn is_pending(&self) -> bool {
        self.status == QuoteStatus::Pending
    }

    pub(crate) fn decline(&mut self, reason: &str, at: DateTime<Utc>) {
        self.status = QuoteStatus::Declined;
        self.declined_at = Some(at);
        self.decline_reason = Some(reason.to_string());
    }
}
