use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use overdue_client::dunning::clock::parse_timestamp_or_date;
use overdue_client::dunning::policy::PolicyOverrides;

pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp_or_date(value)
        .ok_or_else(|| "expected a date (YYYY-MM-DD) or an RFC 3339 timestamp".to_string())
}

pub fn parse_level(value: &str) -> Result<i64, String> {
    match value {
        "1" | "2" | "3" => value.parse::<i64>().map_err(|error| error.to_string()),
        _ => Err("dunning level must be 1, 2 or 3".to_string()),
    }
}

/// Extended help shown after `overdue escalate --help`.
pub const ESCALATE_AFTER_HELP: &str = "\
How escalation works:
  Levels advance one step at a time: 0 -> 1 -> 2 -> 3.
  A level is only reachable once the invoice is overdue for at least the
  policy's threshold for that level (defaults 7, 14 and 21 days).
  Each level adds its fee to the invoice total; fees compound.
  Level 3 suspends the customer's service unless the policy or
  `--no-suspend` says otherwise.

Notices:
  By default a notice is sent when the policy's auto-send flag for the level
  is on. Use `--send-email` or `--no-email` to decide for this call only.
  A notice that cannot be delivered never undoes the level.
";

#[derive(Debug, Parser)]
#[command(
    name = "overdue",
    version,
    about = "collections and dunning escalation engine",
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Ledger directory (defaults to $OVERDUE_HOME, then ~/.overdue)
    #[arg(long, global = true, value_name = "DIR")]
    pub home: Option<PathBuf>,
    /// Who is making the change (defaults to $OVERDUE_ACTOR)
    #[arg(long, global = true, value_name = "NAME")]
    pub actor: Option<String>,
    /// Print the result envelope as JSON
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Register customers
    #[command(arg_required_else_help = true)]
    Customer {
        #[command(subcommand)]
        command: CustomerCommand,
    },
    /// Record invoices and payments
    #[command(arg_required_else_help = true)]
    Invoice {
        #[command(subcommand)]
        command: InvoiceCommand,
    },
    /// Configure per-customer dunning policies
    #[command(arg_required_else_help = true)]
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },
    /// Move one overdue invoice to the next dunning level
    #[command(after_long_help = ESCALATE_AFTER_HELP)]
    Escalate {
        /// Target level (1, 2 or 3)
        #[arg(value_parser = parse_level)]
        level: i64,
        invoice_id: String,
        /// Send the notice even if the policy's auto-send flag is off
        #[arg(long, conflicts_with = "no_email")]
        send_email: bool,
        /// Skip the notice for this call
        #[arg(long)]
        no_email: bool,
        /// Do not suspend service when reaching level 3
        #[arg(long)]
        no_suspend: bool,
    },
    /// Suspend, reactivate and check customer service
    #[command(arg_required_else_help = true)]
    Service {
        #[command(subcommand)]
        command: ServiceCommand,
    },
    /// Periodic escalation across all overdue invoices
    #[command(arg_required_else_help = true)]
    Batch {
        #[command(subcommand)]
        command: BatchCommand,
    },
    /// Read-only views over dunning state
    #[command(arg_required_else_help = true)]
    Report {
        #[command(subcommand)]
        command: ReportCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum CustomerCommand {
    /// Register a customer
    Add {
        name: String,
        /// Customer id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum InvoiceCommand {
    /// Record an invoice
    Add {
        number: String,
        #[arg(long)]
        amount: f64,
        #[arg(long, default_value = "EUR")]
        currency: String,
        #[arg(long)]
        customer: Option<String>,
        /// Issue date (defaults to now)
        #[arg(long, value_parser = parse_instant)]
        issued: Option<DateTime<Utc>>,
        /// Due date (defaults to issue date plus the payment terms)
        #[arg(long, value_parser = parse_instant)]
        due: Option<DateTime<Utc>>,
        /// Record the invoice as already overdue
        #[arg(long)]
        overdue: bool,
    },
    /// Mark an invoice paid and run the reactivation check
    Pay {
        invoice_id: String,
        #[arg(long, value_parser = parse_instant)]
        paid_at: Option<DateTime<Utc>>,
    },
    /// Move open invoices past their due date to overdue
    FlagOverdue,
}

#[derive(Debug, Subcommand)]
pub enum PolicyCommand {
    /// Create a customer's policy; omitted fields take defaults
    Create {
        customer_id: String,
        #[command(flatten)]
        fields: PolicyFields,
    },
    /// Change selected fields of an existing policy
    Update {
        policy_id: String,
        #[command(flatten)]
        fields: PolicyFields,
    },
    /// Show a customer's policy and suspension state
    Show { customer_id: String },
}

#[derive(Debug, Clone, Default, Args)]
pub struct PolicyFields {
    #[arg(long, value_name = "DAYS")]
    pub level1_days: Option<i64>,
    #[arg(long, value_name = "DAYS")]
    pub level2_days: Option<i64>,
    #[arg(long, value_name = "DAYS")]
    pub level3_days: Option<i64>,
    #[arg(long, value_name = "AMOUNT")]
    pub level1_fee: Option<f64>,
    #[arg(long, value_name = "AMOUNT")]
    pub level2_fee: Option<f64>,
    #[arg(long, value_name = "AMOUNT")]
    pub level3_fee: Option<f64>,
    #[arg(long, value_name = "BOOL")]
    pub level1_auto_send: Option<bool>,
    #[arg(long, value_name = "BOOL")]
    pub level2_auto_send: Option<bool>,
    #[arg(long, value_name = "BOOL")]
    pub level3_auto_send: Option<bool>,
    /// Suspend service when an invoice reaches level 3
    #[arg(long, value_name = "BOOL")]
    pub suspend_on_level3: Option<bool>,
    #[arg(long, value_name = "BOOL")]
    pub allow_service_when_overdue: Option<bool>,
    #[arg(long, value_name = "BOOL")]
    pub auto_reactivate: Option<bool>,
    /// Exempt the customer from escalation
    #[arg(long, value_name = "BOOL")]
    pub skip_dunning: Option<bool>,
    #[arg(long, value_name = "DAYS", conflicts_with = "clear_payment_terms")]
    pub payment_terms_days: Option<i64>,
    #[arg(long)]
    pub clear_payment_terms: bool,
    #[arg(long, value_name = "BOOL")]
    pub require_prepayment: Option<bool>,
    /// Send notices here instead of the customer's email
    #[arg(long, value_name = "EMAIL", conflicts_with = "clear_contact_email")]
    pub contact_email: Option<String>,
    #[arg(long)]
    pub clear_contact_email: bool,
    #[arg(long, value_name = "BOOL")]
    pub active: Option<bool>,
}

impl PolicyFields {
    pub fn to_overrides(&self) -> PolicyOverrides {
        PolicyOverrides {
            threshold_days: [self.level1_days, self.level2_days, self.level3_days],
            fees: [self.level1_fee, self.level2_fee, self.level3_fee],
            auto_send: [
                self.level1_auto_send,
                self.level2_auto_send,
                self.level3_auto_send,
            ],
            level3_suspend_service: self.suspend_on_level3,
            allow_service_when_overdue: self.allow_service_when_overdue,
            auto_reactivate_on_payment: self.auto_reactivate,
            skip_dunning_process: self.skip_dunning,
            custom_payment_terms_days: nullable(self.payment_terms_days, self.clear_payment_terms),
            require_prepayment: self.require_prepayment,
            dunning_contact_email: nullable(self.contact_email.clone(), self.clear_contact_email),
            active: self.active,
        }
    }
}

fn nullable<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        return Some(None);
    }
    value.map(Some)
}

#[derive(Debug, Subcommand)]
pub enum ServiceCommand {
    /// Suspend a customer's service
    Suspend {
        customer_id: String,
        #[arg(long)]
        reason: String,
    },
    /// Lift a suspension, whatever its source
    Reactivate {
        customer_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Reactivate after an invoice payment if nothing else is overdue
    AutoReactivate { invoice_id: String },
    /// Check whether a customer may receive service
    Check { customer_id: String },
}

#[derive(Debug, Subcommand)]
pub enum BatchCommand {
    /// Apply every eligible level transition once
    Run {
        #[arg(long, value_name = "N")]
        page_size: Option<usize>,
        /// Stop after N invoices; the next run resumes where this one stopped
        #[arg(long, value_name = "N")]
        max_invoices: Option<usize>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ReportCommand {
    /// Overdue invoices with age and next action
    Overdue {
        #[arg(long)]
        customer: Option<String>,
        /// Only invoices currently at this level
        #[arg(long, value_parser = parse_level)]
        level: Option<i64>,
    },
    /// Dunning events for one customer, newest first
    History { customer_id: String },
    /// Customers whose service is suspended
    Suspended,
    /// Dunning effectiveness over a date range
    Stats {
        #[arg(long, value_name = "DATE")]
        from: Option<String>,
        #[arg(long, value_name = "DATE")]
        to: Option<String>,
    },
    /// Invoices whose next level is reachable soon
    Upcoming {
        #[arg(long, value_name = "DAYS")]
        days_ahead: Option<i64>,
    },
}

#[cfg(test)]
pub fn parse_from<I, T>(itr: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(itr)
}
