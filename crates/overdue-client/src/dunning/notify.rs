use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::dunning::level::DunningLevel;

/// A dunning notice handed to the dispatcher after the transition that
/// produced it has committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DunningNotice {
    pub invoice_id: String,
    pub invoice_number: String,
    pub customer_id: String,
    pub recipient: Option<String>,
    pub level: DunningLevel,
    pub fee: f64,
    pub total_amount: f64,
    pub currency: String,
    pub service_suspended: bool,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("no recipient address for customer `{0}`")]
    NoRecipient(String),
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Best-effort delivery of dunning notices. Implementations may fail; the
/// engine logs the failure and keeps the committed transition.
pub trait Notifier {
    fn send_dunning_notice(&self, notice: &DunningNotice) -> Result<(), NotifyError>;
}

/// Emits each notice as a structured log record instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_dunning_notice(&self, notice: &DunningNotice) -> Result<(), NotifyError> {
        let Some(recipient) = notice.recipient.as_deref() else {
            return Err(NotifyError::NoRecipient(notice.customer_id.clone()));
        };
        info!(
            invoice_id = %notice.invoice_id,
            customer_id = %notice.customer_id,
            recipient,
            level = notice.level.as_str(),
            fee = notice.fee,
            total_amount = notice.total_amount,
            currency = %notice.currency,
            service_suspended = notice.service_suspended,
            "dunning notice dispatched"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeOutcome {
    NotRequested,
    Sent,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::{DunningNotice, LogNotifier, Notifier, NotifyError};
    use crate::dunning::level::DunningLevel;

    fn notice(recipient: Option<&str>) -> DunningNotice {
        DunningNotice {
            invoice_id: "inv_1".to_string(),
            invoice_number: "INV-1".to_string(),
            customer_id: "cus_1".to_string(),
            recipient: recipient.map(str::to_string),
            level: DunningLevel::Level1,
            fee: 5.0,
            total_amount: 105.0,
            currency: "EUR".to_string(),
            service_suspended: false,
        }
    }

    #[test]
    fn log_notifier_requires_a_recipient() {
        assert_eq!(
            LogNotifier.send_dunning_notice(&notice(None)),
            Err(NotifyError::NoRecipient("cus_1".to_string()))
        );
        assert!(LogNotifier.send_dunning_notice(&notice(Some("ar@example.com"))).is_ok());
    }
}
