mod dunning_text;
mod error_text;
mod format;
mod json;
mod ledger_text;
mod mode;
mod report_text;

use std::io;

use overdue_client::{ClientError, SuccessEnvelope};

use crate::stdout_io::write_stdout_line;

pub use mode::{OutputMode, mode_for_args, mode_for_cli};

pub fn print_success(success: &SuccessEnvelope, mode: OutputMode) -> io::Result<()> {
    let body = match mode {
        OutputMode::Text => {
            let mut body = render_text_success(success)?;
            for warning in &success.warnings {
                body.push_str(&format!("\n\nWarning: {warning}"));
            }
            body
        }
        OutputMode::Json => json::render_success_json(success)?,
    };
    write_stdout_line(&body)
}

pub fn print_failure(
    command: Option<&str>,
    error: &ClientError,
    mode: OutputMode,
) -> io::Result<()> {
    let body = match mode {
        OutputMode::Json => json::render_error_json(command, error)?,
        OutputMode::Text => error_text::render_error(error),
    };
    write_stdout_line(&body)
}

fn render_text_success(success: &SuccessEnvelope) -> io::Result<String> {
    let data = &success.data;
    match success.command.as_str() {
        "customer add" => ledger_text::render_customer_add(data),
        "invoice add" => ledger_text::render_invoice_add(data),
        "invoice pay" => ledger_text::render_invoice_pay(data),
        "invoice flag-overdue" => ledger_text::render_flag_overdue(data),
        "policy create" | "policy update" | "policy show" => {
            ledger_text::render_policy(&success.command, data)
        }
        "escalate" => dunning_text::render_escalation(data),
        "batch run" => dunning_text::render_batch_run(data),
        "service suspend" | "service reactivate" => {
            dunning_text::render_service_change(&success.command, data)
        }
        "service auto-reactivate" => dunning_text::render_auto_reactivation(data),
        "service check" => dunning_text::render_service_check(data),
        "report overdue" => report_text::render_overdue(data),
        "report history" => report_text::render_history(data),
        "report suspended" => report_text::render_suspended(data),
        "report stats" => report_text::render_stats(data),
        "report upcoming" => report_text::render_upcoming(data),
        _ => Err(io::Error::other(format!(
            "unsupported text output command `{}`",
            success.command
        ))),
    }
}
