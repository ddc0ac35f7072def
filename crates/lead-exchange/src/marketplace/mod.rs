//! Lead marketplace: claim coordination, credit ledger, quotes and lead lifecycle.
//!
//! Every mutating operation stages its records into a [`WriteBatch`] and commits it once while
//! holding the lead and professional locks it needs, so claims, refunds, acceptances and
//! cancellations never become visible half-applied.

pub mod claims;
pub mod cost;
pub mod domain;
pub mod leads;
pub mod ledger;
pub mod locks;
pub mod memory;
pub mod quotes;
pub mod repository;
pub mod router;
pub mod service;
pub mod sweeper;

#[cfg(test)]
mod tests;

pub use claims::{ClaimCoordinator, ClaimError, ClaimReceipt};
pub use domain::{
    BudgetBracket, Claim, ClaimId, DirectLeadStatus, HomeownerId, Lead, LeadId, LeadStatus,
    LeadType, ProfessionalId, ProfessionalIdentity, ProfessionalVerification, Quote, QuoteId, QuoteStatus, QuoteTimeline,
    Urgency,
};
pub use leads::{CancellationOutcome, ExpirySummary, LeadError, LeadLifecycle, NewLead};
pub use ledger::{
    export_transactions_csv, BalanceView, CreditBalance, CreditLedger, CreditTransaction,
    ExportError, LedgerError, PaidLot, PurchaseConfirmation, PurchaseReceipt,
    ReconciliationReport, TransactionId, TransactionType,
};
pub use locks::LockRegistry;
pub use memory::{InMemoryMarketplaceStore, RecordingNotifier};
pub use quotes::{
    LineItemInput, PricedItem, PricingError, PricingInput, QuoteError, QuoteManager,
    QuotePricing, QuoteSubmission,
};
pub use repository::{
    MarketplaceEvent, MarketplaceStore, NotificationError, NotificationPublisher,
    RepositoryError, WriteBatch,
};
pub use router::marketplace_router;
pub use service::Marketplace;
pub use sweeper::{ExpirySweeper, SweepError, SweepReport};
