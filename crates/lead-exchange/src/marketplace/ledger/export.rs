use std::io::Write;

use serde::Serialize;

use super::balance::CreditTransaction;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write ledger export: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush ledger export: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct ExportRow<'a> {
    id: &'a str,
    professional_id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    amount: i64,
    balance_after: u64,
    related_lead_id: &'a str,
    reference: &'a str,
    note: &'a str,
    created_at: String,
}

/// Writes transactions as CSV rows in the order given, for audit hand-off.
pub fn export_transactions_csv<W: Write>(
    transactions: &[CreditTransaction],
    writer: W,
) -> Result<usize, ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for entry in transactions {
        csv_writer.serialize(ExportRow {
            id: &entry.id.0,
            professional_id: &entry.professional_id.0,
            kind: entry.kind.label(),
            amount: entry.amount,
            balance_after: entry.balance_after,
            related_lead_id: entry
                .related_lead_id
                .as_ref()
                .map(|id| id.0.as_str())
                .unwrap_or_default(),
            reference: entry.reference.as_deref().unwrap_or_default(),
            note: entry.note.as_deref().unwrap_or_default(),
            created_at: entry.created_at.to_rfc3339(),
        })?;
    }
    csv_writer.flush()?;
    Ok(transactions.len())
}
