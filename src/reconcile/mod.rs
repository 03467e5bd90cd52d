//! Gateway callback reconciliation.

mod payload;
mod worker;

pub use payload::{GatewayStatus, WebhookPayload};
pub use worker::{ReconciliationWorker, RedirectView, WebhookOutcome};
