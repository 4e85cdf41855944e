use std::io;

use serde_json::Value;

use super::format::{self, count_field, level_label, money_field, str_field, text_or_dash, yes_no};

pub fn render_escalation(data: &Value) -> io::Result<String> {
    let invoice_id = str_field(data, "invoice_id")
        .ok_or_else(|| io::Error::other("escalate output requires invoice_id"))?;

    let notice = match str_field(data, "notice") {
        Some("sent") => "sent",
        Some("failed") => "failed",
        _ => "not sent",
    };
    let suspended = data
        .get("suspended")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut lines = vec![
        format!(
            "Invoice {invoice_id} moved from level {} to level {}.",
            level_label(data, "previous_level"),
            level_label(data, "level")
        ),
        String::new(),
    ];
    lines.extend(format::key_value_rows(
        &[
            ("Customer:", text_or_dash(data, "customer_id")),
            ("Days overdue:", count_field(data, "days_overdue").to_string()),
            ("Fee added:", money_field(data, "fee")),
            ("New total:", money_field(data, "new_total")),
            ("Fees so far:", money_field(data, "dunning_fee")),
            ("Notice:", notice.to_string()),
            ("Service suspended:", yes_no(suspended).to_string()),
        ],
        2,
    ));
    Ok(lines.join("\n"))
}

pub fn render_batch_run(data: &Value) -> io::Result<String> {
    let completed = data
        .get("completed")
        .and_then(Value::as_bool)
        .ok_or_else(|| io::Error::other("batch output requires completed"))?;

    let mut lines = vec![if completed {
        "Dunning pass completed.".to_string()
    } else {
        "Dunning pass stopped at the invoice limit.".to_string()
    }];
    if let Some(cursor) = str_field(data, "resumed_from") {
        lines.push(format!("Resumed after invoice {cursor}."));
    }

    lines.push(String::new());
    lines.extend(format::key_value_rows(
        &[
            ("Scanned:", count_field(data, "scanned").to_string()),
            ("Level 1:", count_field(data, "level1").to_string()),
            ("Level 2:", count_field(data, "level2").to_string()),
            ("Level 3:", count_field(data, "level3").to_string()),
            ("Suspended:", count_field(data, "suspended").to_string()),
            ("Not due:", count_field(data, "not_due").to_string()),
            ("Deferred:", count_field(data, "deferred").to_string()),
            ("Skipped:", count_field(data, "skipped").to_string()),
            ("Errors:", count_field(data, "errors").to_string()),
            ("Notices failed:", count_field(data, "notices_failed").to_string()),
        ],
        2,
    ));

    if !completed {
        lines.push(String::new());
        lines.push("Run `overdue batch run` again to continue.".to_string());
    }
    Ok(lines.join("\n"))
}

pub fn render_service_change(command: &str, data: &Value) -> io::Result<String> {
    let customer_id = str_field(data, "customer_id")
        .ok_or_else(|| io::Error::other("service output requires customer_id"))?;
    let changed = data
        .get("changed")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let line = match (command, changed) {
        ("service suspend", true) => format!("Service suspended for {customer_id}."),
        ("service suspend", false) => format!("Service for {customer_id} was already suspended."),
        (_, true) => format!("Service reactivated for {customer_id}."),
        (_, false) => format!("Service for {customer_id} was not suspended."),
    };
    Ok(line)
}

pub fn render_auto_reactivation(data: &Value) -> io::Result<String> {
    let invoice_id = text_or_dash(data, "invoice_id");
    let reactivated = data
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if reactivated {
        return Ok(format!(
            "Service reactivated for {} after payment of {invoice_id}.",
            text_or_dash(data, "customer_id")
        ));
    }

    let mut lines = vec![format!("Service unchanged after payment of {invoice_id}.")];
    if let Some(reason) = str_field(data, "reason") {
        lines.push(format!("  Reason:  {reason}"));
    }
    Ok(lines.join("\n"))
}

pub fn render_service_check(data: &Value) -> io::Result<String> {
    let customer_id = str_field(data, "customer_id")
        .ok_or_else(|| io::Error::other("service check output requires customer_id"))?;
    let allowed = data
        .get("allowed")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut lines = vec![if allowed {
        format!("Service allowed for {customer_id}.")
    } else {
        format!("Service blocked for {customer_id}.")
    }];
    let mut entries = vec![(
        "Overdue invoices:",
        count_field(data, "overdue_invoices").to_string(),
    )];
    if let Some(reason) = str_field(data, "reason") {
        entries.insert(0, ("Reason:", reason.to_string()));
    }
    lines.push(String::new());
    lines.extend(format::key_value_rows(&entries, 2));
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{render_batch_run, render_escalation, render_service_change, render_service_check};

    #[test]
    fn escalation_shows_fee_total_and_notice() {
        let rendered = render_escalation(&json!({
            "invoice_id": "inv_1",
            "customer_id": "cus_1",
            "previous_level": "level2",
            "level": "level3",
            "days_overdue": 25,
            "fee": 15.0,
            "new_total": 130.0,
            "dunning_fee": 30.0,
            "currency": "EUR",
            "suspended": true,
            "source": "manual",
            "notice": "failed"
        }));
        assert!(rendered.is_ok());
        if let Ok(text) = rendered {
            assert!(text.starts_with("Invoice inv_1 moved from level 2 to level 3."));
            assert!(text.contains("130.00 EUR"));
            assert!(text.contains("Notice:"));
            assert!(text.contains("failed"));
        }
    }

    #[test]
    fn partial_batch_tells_how_to_continue() {
        let rendered = render_batch_run(&json!({
            "level1": 2, "level2": 0, "level3": 0, "skipped": 0, "deferred": 0,
            "not_due": 0, "errors": 0, "suspended": 0, "notices_failed": 0,
            "scanned": 2, "completed": false, "resumed_from": null,
            "cursor": "inv_2", "run_at": "2026-04-05T00:00:00Z"
        }));
        assert!(rendered.is_ok());
        if let Ok(text) = rendered {
            assert!(text.starts_with("Dunning pass stopped at the invoice limit."));
            assert!(text.contains("Run `overdue batch run` again"));
        }
    }

    #[test]
    fn service_changes_report_no_ops() {
        let data = json!({ "customer_id": "cus_1", "suspended": false, "changed": false, "source": "manual" });
        let rendered = render_service_change("service reactivate", &data);
        assert!(rendered.is_ok());
        if let Ok(text) = rendered {
            assert_eq!(text, "Service for cus_1 was not suspended.");
        }
    }

    #[test]
    fn blocked_service_check_shows_the_reason() {
        let rendered = render_service_check(&json!({
            "customer_id": "cus_1",
            "allowed": false,
            "reason": "prepayment required while invoices are overdue",
            "gate": "prepayment_required",
            "overdue_invoices": 2
        }));
        assert!(rendered.is_ok());
        if let Ok(text) = rendered {
            assert!(text.starts_with("Service blocked for cus_1."));
            assert!(text.contains("Reason:"));
            assert!(text.contains("prepayment required"));
        }
    }
}
