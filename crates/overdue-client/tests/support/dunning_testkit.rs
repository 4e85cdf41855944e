use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use overdue_client::commands::batch::{self, BatchRunOptions};
use overdue_client::commands::customers::{self, CustomerAddOptions};
use overdue_client::commands::escalate::{self, EscalateOptions};
use overdue_client::commands::invoices::{self, InvoiceAddOptions};
use overdue_client::commands::policy::{self, PolicyCreateOptions};
use overdue_client::dunning::notify::{DunningNotice, Notifier, NotifyError};
use overdue_client::dunning::policy::PolicyOverrides;
use overdue_client::dunning::store::{Customer, Invoice, load_customer, load_invoice};
use overdue_client::state::open_connection;
use overdue_client::{ClientResult, SuccessEnvelope};
use serde_json::Value;
use tempfile::{Builder, TempDir};

pub const ACTOR: &str = "collections-bot";

/// The instant every scenario runs at unless it moves the clock itself.
pub fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-05-20T09:00:00Z")
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub fn days_from_now(days: i64) -> DateTime<Utc> {
    now() + Duration::days(days)
}

pub fn temp_home(prefix: &str) -> std::io::Result<(TempDir, PathBuf)> {
    let dir = Builder::new().prefix(prefix).tempdir()?;
    let home = dir.path().join("ledger-home");
    fs::create_dir_all(&home)?;
    Ok((dir, home))
}

pub fn db_path(home: &Path) -> PathBuf {
    home.join("ledger.db")
}

pub fn payload(result: ClientResult<SuccessEnvelope>) -> Value {
    assert!(result.is_ok());
    if let Ok(success) = result {
        let value = serde_json::to_value(success);
        assert!(value.is_ok());
        if let Ok(json) = value {
            return json;
        }
    }
    Value::Null
}

pub fn add_customer(home: &Path, customer_id: &str, email: Option<&str>) {
    let result = customers::add(CustomerAddOptions {
        customer_id: Some(customer_id.to_string()),
        name: format!("Customer {customer_id}"),
        email: email.map(str::to_string),
        actor: Some(ACTOR.to_string()),
        home_override: Some(home),
        now: Some(now()),
    });
    assert!(result.is_ok());
}

pub fn add_policy(home: &Path, customer_id: &str, overrides: PolicyOverrides) -> String {
    let created = payload(policy::create(PolicyCreateOptions {
        customer_id: customer_id.to_string(),
        overrides,
        actor: Some(ACTOR.to_string()),
        home_override: Some(home),
        now: Some(now()),
    }));
    created["data"]["policy_id"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

/// A customer with an email address and a default 7/14/21 policy.
pub fn add_customer_with_policy(home: &Path, customer_id: &str) -> String {
    add_customer(home, customer_id, Some("billing@example.com"));
    add_policy(home, customer_id, PolicyOverrides::default())
}

/// Records an overdue invoice whose due date lies `days_overdue` days before
/// [`now`].
pub fn add_overdue_invoice(
    home: &Path,
    customer_id: Option<&str>,
    number: &str,
    total_amount: f64,
    days_overdue: i64,
) -> String {
    let due_at = days_from_now(-days_overdue);
    let recorded = payload(invoices::add(InvoiceAddOptions {
        customer_id: customer_id.map(str::to_string),
        number: number.to_string(),
        total_amount,
        currency: "EUR".to_string(),
        issued_at: Some(due_at - Duration::days(30)),
        due_at: Some(due_at),
        overdue: true,
        actor: Some(ACTOR.to_string()),
        home_override: Some(home),
        now: Some(now()),
    }));
    recorded["data"]["invoice_id"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

pub fn escalate_at(
    home: &Path,
    invoice_id: &str,
    level: i64,
    at: DateTime<Utc>,
) -> ClientResult<SuccessEnvelope> {
    escalate::run(EscalateOptions {
        invoice_id: invoice_id.to_string(),
        level,
        actor: Some(ACTOR.to_string()),
        home_override: Some(home),
        now: Some(at),
        ..EscalateOptions::default()
    })
}

pub fn escalate_now(home: &Path, invoice_id: &str, level: i64) -> ClientResult<SuccessEnvelope> {
    escalate_at(home, invoice_id, level, now())
}

pub fn run_batch(home: &Path, max_invoices: Option<usize>, page_size: Option<usize>) -> Value {
    run_batch_at(home, now(), max_invoices, page_size)
}

pub fn run_batch_at(
    home: &Path,
    at: DateTime<Utc>,
    max_invoices: Option<usize>,
    page_size: Option<usize>,
) -> Value {
    let summary = payload(batch::run(BatchRunOptions {
        page_size,
        max_invoices,
        actor: Some(ACTOR.to_string()),
        home_override: Some(home),
        now: Some(at),
        notifier: None,
    }));
    summary["data"].clone()
}

pub fn invoice(home: &Path, invoice_id: &str) -> Option<Invoice> {
    let path = db_path(home);
    let connection = open_connection(&path).ok()?;
    load_invoice(&connection, &path, invoice_id).ok()?
}

pub fn customer(home: &Path, customer_id: &str) -> Option<Customer> {
    let path = db_path(home);
    let connection = open_connection(&path).ok()?;
    load_customer(&connection, &path, customer_id).ok()?
}

pub fn execute_sql(home: &Path, sql: &str) {
    let path = db_path(home);
    let connection = open_connection(&path);
    assert!(connection.is_ok());
    if let Ok(conn) = connection {
        assert!(conn.execute_batch(sql).is_ok());
    }
}

pub fn query_count(home: &Path, sql: &str) -> i64 {
    let path = db_path(home);
    let connection = open_connection(&path);
    assert!(connection.is_ok());
    if let Ok(conn) = connection {
        return conn
            .query_row(sql, [], |row| row.get::<_, i64>(0))
            .unwrap_or(-1);
    }
    -1
}

pub fn count(value: &Value, key: &str) -> u64 {
    value[key].as_u64().unwrap_or(u64::MAX)
}

/// Keeps every notice it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: RefCell<Vec<DunningNotice>>,
}

impl Notifier for RecordingNotifier {
    fn send_dunning_notice(&self, notice: &DunningNotice) -> Result<(), NotifyError> {
        self.notices.borrow_mut().push(notice.clone());
        Ok(())
    }
}

/// Rejects every notice.
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn send_dunning_notice(&self, _notice: &DunningNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("smtp relay refused the connection".to_string()))
    }
}
