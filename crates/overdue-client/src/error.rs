use std::path::Path;

use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ClientError {
    pub code: String,
    pub message: String,
    pub recovery_steps: Vec<String>,
    pub data: Option<Value>,
}

impl ClientError {
    pub fn new(code: &str, message: &str, recovery_steps: Vec<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            recovery_steps,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn invalid_argument(message: &str) -> Self {
        Self::invalid_argument_for_command(message, None)
    }

    pub fn invalid_argument_for_command(message: &str, command: Option<&str>) -> Self {
        let help_hint = match command {
            Some(cmd) => format!("Run `overdue {cmd} --help` for usage."),
            None => "Run `overdue --help` for usage.".to_string(),
        };
        let error = Self::new("invalid_argument", message, vec![help_hint]);
        if let Some(cmd) = command {
            return error.with_data(json!({
                "command_hint": cmd,
            }));
        }
        error
    }

    pub fn invalid_argument_with_recovery(message: &str, recovery_steps: Vec<String>) -> Self {
        Self::new("invalid_argument", message, recovery_steps)
    }

    pub fn authentication_required(operation: &str) -> Self {
        Self::new(
            "authentication_required",
            &format!("`{operation}` requires a resolved actor."),
            vec![
                "Pass `--actor <name>` or set `OVERDUE_ACTOR`.".to_string(),
                "Retry the command once an actor is available.".to_string(),
            ],
        )
        .with_data(json!({
            "operation": operation,
        }))
    }

    pub fn invoice_not_found(invoice_id: &str) -> Self {
        Self::new(
            "invoice_not_found",
            &format!("Invoice `{invoice_id}` was not found."),
            vec!["Run `overdue report overdue` to find a valid invoice id.".to_string()],
        )
        .with_data(json!({
            "invoice_id": invoice_id,
        }))
    }

    pub fn customer_not_found(customer_id: &str) -> Self {
        Self::new(
            "customer_not_found",
            &format!("Customer `{customer_id}` was not found."),
            vec!["Register the customer with `overdue customer add` first.".to_string()],
        )
        .with_data(json!({
            "customer_id": customer_id,
        }))
    }

    pub fn policy_not_found(policy_id: &str) -> Self {
        Self::new(
            "policy_not_found",
            &format!("Dunning policy `{policy_id}` was not found."),
            vec!["Run `overdue policy show <customer-id>` to find the policy id.".to_string()],
        )
        .with_data(json!({
            "policy_id": policy_id,
        }))
    }

    pub fn policy_missing(customer_id: &str, invoice_id: &str) -> Self {
        Self::new(
            "policy_missing",
            &format!(
                "Customer `{customer_id}` has no dunning policy, so invoice `{invoice_id}` cannot be escalated."
            ),
            vec![format!(
                "Create one with `overdue policy create {customer_id}`."
            )],
        )
        .with_data(json!({
            "customer_id": customer_id,
            "invoice_id": invoice_id,
        }))
    }

    pub fn policy_disabled(customer_id: &str, detail: &str) -> Self {
        Self::new(
            "policy_disabled",
            &format!("Dunning is disabled for customer `{customer_id}`: {detail}"),
            vec![format!(
                "Update the policy with `overdue policy update` if dunning should resume for `{customer_id}`."
            )],
        )
        .with_data(json!({
            "customer_id": customer_id,
        }))
    }

    pub fn invalid_state_transition(invoice_id: &str, detail: &str, data: Value) -> Self {
        Self::new(
            "invalid_state_transition",
            &format!("Invoice `{invoice_id}` cannot move to the requested dunning level: {detail}"),
            vec![
                "Levels advance one step at a time: 0 -> 1 -> 2 -> 3.".to_string(),
                "Run `overdue report overdue` to inspect the current level and next action."
                    .to_string(),
            ],
        )
        .with_data(data)
    }

    pub fn duplicate_policy(customer_id: &str, existing_policy_id: &str) -> Self {
        Self::new(
            "duplicate_policy",
            &format!(
                "Customer `{customer_id}` already has dunning policy `{existing_policy_id}`."
            ),
            vec!["Use `overdue policy update` to change the existing policy.".to_string()],
        )
        .with_data(json!({
            "customer_id": customer_id,
            "policy_id": existing_policy_id,
        }))
    }

    pub fn internal_serialization(message: &str) -> Self {
        Self::new("internal_serialization_error", message, Vec::new())
    }

    pub fn ledger_init_permission_denied(path: &Path, detail: &str) -> Self {
        let location = path.display().to_string();
        Self::new(
            "ledger_init_permission_denied",
            &format!("Cannot initialize ledger at `{location}`: {detail}"),
            vec![format!(
                "Grant write access to `{location}` or set `OVERDUE_HOME` to a writable directory."
            )],
        )
    }

    pub fn ledger_locked(path: &Path) -> Self {
        let location = path.display().to_string();
        Self::new(
            "ledger_locked",
            &format!("Ledger database is locked at `{location}`."),
            vec![format!(
                "Close other processes using `{location}` so the lock is released."
            )],
        )
    }

    pub fn ledger_corrupt(path: &Path) -> Self {
        let location = path.display().to_string();
        Self::new(
            "ledger_corrupt",
            &format!("Ledger database appears corrupt at `{location}`."),
            vec![format!(
                "Replace `{location}` with a valid SQLite ledger file or restore from backup."
            )],
        )
    }

    pub fn migration_failed(path: &Path, detail: &str) -> Self {
        let location = path.display().to_string();
        Self::new(
            "migration_failed",
            &format!("Ledger migration failed at `{location}`: {detail}"),
            vec!["Resolve conflicting schema objects referenced in the error details.".to_string()],
        )
    }

    pub fn ledger_init_failed(path: &Path, detail: &str) -> Self {
        let location = path.display().to_string();
        Self::new(
            "ledger_init_failed",
            &format!("Ledger initialization failed at `{location}`: {detail}"),
            Vec::new(),
        )
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
