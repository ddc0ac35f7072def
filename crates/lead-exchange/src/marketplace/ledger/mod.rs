//! Credit balances and the append-only transaction log.

mod balance;
mod export;
mod service;

pub use balance::{CreditBalance, CreditTransaction, PaidLot, TransactionId, TransactionType};
pub(crate) use balance::CreditDestination;
pub use export::{export_transactions_csv, ExportError};
pub use service::{
    BalanceView, CreditLedger, LedgerError, PurchaseConfirmation, PurchaseReceipt,
    ReconciliationReport,
};
pub(crate) use service::{EntryDetails, EXPIRY_NOTE};
