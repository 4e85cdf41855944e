use std::io;

use serde_json::Value;

use super::format::{
    self, count_field, date_field, level_label, money_field, str_field, text_or_dash, yes_no,
};

pub fn render_customer_add(data: &Value) -> io::Result<String> {
    let customer_id = str_field(data, "customer_id")
        .ok_or_else(|| io::Error::other("customer output requires customer_id"))?;

    let mut lines = vec![format!("Customer {customer_id} registered."), String::new()];
    lines.extend(format::key_value_rows(
        &[
            ("Name:", text_or_dash(data, "name")),
            ("Email:", text_or_dash(data, "email")),
        ],
        2,
    ));
    lines.push(String::new());
    lines.push("Next:".to_string());
    lines.push(format!("  overdue policy create {customer_id}"));
    Ok(lines.join("\n"))
}

pub fn render_invoice_add(data: &Value) -> io::Result<String> {
    let invoice_id = str_field(data, "invoice_id")
        .ok_or_else(|| io::Error::other("invoice output requires invoice_id"))?;

    let mut lines = vec![format!("Invoice {invoice_id} recorded."), String::new()];
    lines.extend(invoice_rows(data));
    Ok(lines.join("\n"))
}

pub fn render_invoice_pay(data: &Value) -> io::Result<String> {
    let invoice = data
        .get("invoice")
        .ok_or_else(|| io::Error::other("invoice pay output requires invoice"))?;
    let reactivation = data.get("reactivation").unwrap_or(&Value::Null);

    let mut lines = vec![
        format!(
            "Invoice {} marked paid.",
            str_field(invoice, "number").unwrap_or("?")
        ),
        String::new(),
    ];
    lines.extend(format::key_value_rows(
        &[
            ("Paid at:", date_field(invoice, "paid_at")),
            ("Total:", money_field(invoice, "total_amount")),
            ("Dunning fees:", money_field(invoice, "dunning_fee")),
        ],
        2,
    ));

    lines.push(String::new());
    let reactivated = reactivation
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if reactivated {
        lines.push("Service reactivated for the customer.".to_string());
    } else if let Some(reason) = str_field(reactivation, "reason") {
        lines.push(format!("Service unchanged: {reason}"));
    }
    Ok(lines.join("\n"))
}

pub fn render_flag_overdue(data: &Value) -> io::Result<String> {
    let flagged = count_field(data, "flagged");
    Ok(format!(
        "{} moved to overdue as of {}.",
        format::plural(flagged, "invoice", "invoices"),
        date_field(data, "as_of")
    ))
}

pub fn render_policy(command: &str, data: &Value) -> io::Result<String> {
    let policy = data
        .get("policy")
        .ok_or_else(|| io::Error::other("policy output requires policy"))?;
    let policy_id = text_or_dash(data, "policy_id");
    let customer_id = text_or_dash(policy, "customer_id");

    let heading = match command {
        "policy create" => format!("Policy {policy_id} created for {customer_id}."),
        "policy update" => format!("Policy {policy_id} updated."),
        _ => format!("Policy {policy_id} for {customer_id}"),
    };

    let mut lines = vec![heading, String::new(), "Levels:".to_string()];
    let columns = [
        format::Column {
            name: "Level",
            align: format::Align::Right,
        },
        format::Column {
            name: "After days",
            align: format::Align::Right,
        },
        format::Column {
            name: "Fee",
            align: format::Align::Right,
        },
        format::Column {
            name: "Auto-send",
            align: format::Align::Left,
        },
    ];
    let rows = (0..3)
        .map(|index| {
            vec![
                (index + 1).to_string(),
                array_item(policy, "threshold_days", index),
                policy
                    .get("fees")
                    .and_then(|fees| fees.get(index))
                    .and_then(Value::as_f64)
                    .map(|fee| format!("{fee:.2}"))
                    .unwrap_or_else(|| "-".to_string()),
                array_item(policy, "auto_send", index),
            ]
        })
        .collect::<Vec<_>>();
    lines.extend(format::render_table_or_blocks(
        &columns,
        &rows,
        format::terminal_width(),
        "Level",
    ));

    lines.push(String::new());
    lines.push("Settings:".to_string());
    let flag = |key: &str| yes_no(policy.get(key).and_then(Value::as_bool).unwrap_or(false));
    let terms = policy
        .get("custom_payment_terms_days")
        .and_then(Value::as_i64)
        .map(|days| format!("{days} days"))
        .unwrap_or_else(|| "default".to_string());
    lines.extend(format::key_value_rows(
        &[
            ("Active:", flag("active").to_string()),
            ("Skip dunning:", flag("skip_dunning_process").to_string()),
            ("Suspend at level 3:", flag("level3_suspend_service").to_string()),
            (
                "Service while overdue:",
                flag("allow_service_when_overdue").to_string(),
            ),
            (
                "Reactivate on payment:",
                flag("auto_reactivate_on_payment").to_string(),
            ),
            ("Require prepayment:", flag("require_prepayment").to_string()),
            ("Payment terms:", terms),
            ("Contact email:", text_or_dash(policy, "dunning_contact_email")),
        ],
        2,
    ));

    if let Some(suspension) = policy.get("suspension") {
        lines.push(String::new());
        lines.extend(render_suspension(suspension));
    }
    Ok(lines.join("\n"))
}

fn render_suspension(suspension: &Value) -> Vec<String> {
    let suspended = suspension
        .get("suspended")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !suspended {
        return vec!["Service: active".to_string()];
    }

    let mut lines = vec!["Service: suspended".to_string()];
    lines.extend(format::key_value_rows(
        &[
            ("Reason:", text_or_dash(suspension, "reason")),
            ("Since:", date_field(suspension, "suspended_at")),
            ("By:", text_or_dash(suspension, "suspended_by")),
            ("Source:", text_or_dash(suspension, "source")),
        ],
        2,
    ));
    lines
}

fn invoice_rows(invoice: &Value) -> Vec<String> {
    format::key_value_rows(
        &[
            ("Number:", text_or_dash(invoice, "number")),
            ("Customer:", text_or_dash(invoice, "customer_id")),
            ("Status:", text_or_dash(invoice, "status")),
            ("Issued:", date_field(invoice, "issued_at")),
            ("Due:", date_field(invoice, "due_at")),
            ("Total:", money_field(invoice, "total_amount")),
            ("Dunning level:", level_label(invoice, "dunning_level")),
        ],
        2,
    )
}

fn array_item(value: &Value, key: &str, index: usize) -> String {
    match value.get(key).and_then(|items| items.get(index)) {
        Some(Value::Bool(flag)) => yes_no(*flag).to_string(),
        Some(Value::Number(number)) => number.to_string(),
        _ => "-".to_string(),
    }
}
