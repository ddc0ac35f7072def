use lead_exchange::marketplace::{
    BudgetBracket, MarketplaceEvent, NotificationError, NotificationPublisher, Urgency,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::de::DeserializeOwned;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Publishes marketplace events to the structured log until a push or e-mail transport is wired.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LogNotificationPublisher;

impl NotificationPublisher for LogNotificationPublisher {
    fn publish(&self, event: MarketplaceEvent) -> Result<(), NotificationError> {
        match &event {
            MarketplaceEvent::LeadClaimed {
                lead_id,
                professional_id,
                claim_id,
            } => info!(
                event = event.name(),
                lead_id = %lead_id,
                professional_id = %professional_id,
                claim_id = %claim_id,
                "notify homeowner"
            ),
            MarketplaceEvent::QuoteSubmitted {
                lead_id,
                professional_id,
                quote_id,
            }
            | MarketplaceEvent::QuoteAccepted {
                lead_id,
                professional_id,
                quote_id,
            } => info!(
                event = event.name(),
                lead_id = %lead_id,
                professional_id = %professional_id,
                quote_id = %quote_id,
                "notify participants"
            ),
            MarketplaceEvent::CreditsLow {
                professional_id,
                remaining,
            } => info!(
                event = event.name(),
                professional_id = %professional_id,
                remaining,
                "notify professional"
            ),
        }
        Ok(())
    }
}

fn parse_wire_name<T: DeserializeOwned>(raw: &str, kind: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_ascii_lowercase()))
        .map_err(|_| format!("'{raw}' is not a known {kind}"))
}

pub(crate) fn parse_bracket(raw: &str) -> Result<BudgetBracket, String> {
    parse_wire_name(raw, "budget bracket")
}

pub(crate) fn parse_urgency(raw: &str) -> Result<Urgency, String> {
    parse_wire_name(raw, "urgency")
}
