use serde::Serialize;

use crate::dunning::history::DunningEvent;
use crate::dunning::level::DunningLevel;
use crate::dunning::overdue::AgingBucket;
use crate::dunning::policy::PolicyView;
use crate::dunning::reports::{OverdueInvoiceRow, SuspendedCustomer, UpcomingCandidate};
use crate::dunning::store::Invoice;
use crate::dunning::suspension::ReactivationOutcome;

#[derive(Debug, Clone, Serialize)]
pub struct InvoicePaidData {
    pub invoice: Invoice,
    /// `None` when the reactivation check itself failed; the payment stands.
    pub reactivation: Option<ReactivationOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlaggedOverdueData {
    pub as_of: String,
    pub flagged: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyData {
    pub policy_id: String,
    pub policy: PolicyView,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrencyTotal {
    pub currency: String,
    pub outstanding: f64,
    pub dunning_fees: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketCount {
    pub bucket: AgingBucket,
    pub invoices: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverdueSummary {
    pub invoices: i64,
    pub totals: Vec<CurrencyTotal>,
    pub buckets: Vec<BucketCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverdueReportData {
    pub as_of: String,
    pub customer_id: Option<String>,
    pub level: Option<DunningLevel>,
    pub summary: OverdueSummary,
    pub rows: Vec<OverdueInvoiceRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryData {
    pub customer_id: String,
    pub events: Vec<DunningEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuspendedData {
    pub rows: Vec<SuspendedCustomer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpcomingData {
    pub as_of: String,
    pub days_ahead: i64,
    pub rows: Vec<UpcomingCandidate>,
}
