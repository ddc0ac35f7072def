use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::leads::{LeadError, LeadLifecycle};
use super::ledger::{CreditLedger, LedgerError};
use super::locks::LockRegistry;
use super::repository::{MarketplaceStore, NotificationPublisher};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub leads_expired: usize,
    pub quotes_expired: usize,
    pub credits_expired: u64,
}

impl SweepReport {
    pub fn is_noop(&self) -> bool {
        self.leads_expired == 0 && self.quotes_expired == 0 && self.credits_expired == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("lead expiry sweep failed: {0}")]
    Leads(#[from] LeadError),
    #[error("paid lot expiry sweep failed: {0}")]
    Lots(#[from] LedgerError),
}

/// Time-based expiry of leads, their pending quotes and paid credit lots.
pub struct ExpirySweeper<S, N> {
    leads: Arc<LeadLifecycle<S, N>>,
    ledger: Arc<CreditLedger<S, N>>,
    locks: Arc<LockRegistry>,
}

impl<S, N> ExpirySweeper<S, N>
where
    S: MarketplaceStore + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        leads: Arc<LeadLifecycle<S, N>>,
        ledger: Arc<CreditLedger<S, N>>,
        locks: Arc<LockRegistry>,
    ) -> Self {
        Self {
            leads,
            ledger,
            locks,
        }
    }

    /// One pass over everything due at `now`. Both halves run even if the first fails; the
    /// first error is returned after the second half completes. Idle lock entries are pruned
    /// at the end of every pass.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, SweepError> {
        let mut report = SweepReport::default();

        let leads = self.leads.expire_due(now);
        if let Ok(summary) = &leads {
            report.leads_expired = summary.leads_expired;
            report.quotes_expired = summary.quotes_expired;
        }
        let lots = self.ledger.sweep_expired_lots(now);
        if let Ok(credits) = &lots {
            report.credits_expired = *credits;
        }

        let pruned = self.locks.prune();
        if pruned > 0 {
            tracing::debug!(pruned, "idle lock entries dropped");
        }

        leads?;
        lots?;

        if report.is_noop() {
            tracing::debug!("expiry sweep found nothing due");
        } else {
            info!(
                leads_expired = report.leads_expired,
                quotes_expired = report.quotes_expired,
                credits_expired = report.credits_expired,
                "expiry sweep completed"
            );
        }
        Ok(report)
    }

    /// Periodic driver; failures are logged and retried on the next tick.
    pub async fn run(self: Arc<Self>, period: std::time::Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(err) = self.sweep(Utc::now()) {
                warn!(error = %err, "expiry sweep failed; retrying next interval");
            }
        }
    }
}
