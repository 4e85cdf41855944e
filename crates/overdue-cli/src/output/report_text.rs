use std::io;

use serde_json::Value;

use super::format::{
    self, Align, Column, count_field, date_field, level_label, money, money_field, str_field,
    text_or_dash, yes_no,
};

fn rows<'a>(data: &'a Value, key: &str, command: &str) -> io::Result<&'a Vec<Value>> {
    data.get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| io::Error::other(format!("{command} output requires {key}")))
}

pub fn render_overdue(data: &Value) -> io::Result<String> {
    let invoices = rows(data, "rows", "report overdue")?;
    if invoices.is_empty() {
        return Ok("No overdue invoices.".to_string());
    }

    let mut lines = vec![
        format!(
            "{} overdue as of {}.",
            format::plural(invoices.len() as i64, "invoice", "invoices"),
            date_field(data, "as_of")
        ),
        String::new(),
    ];

    let columns = [
        Column {
            name: "Invoice",
            align: Align::Left,
        },
        Column {
            name: "Customer",
            align: Align::Left,
        },
        Column {
            name: "Due",
            align: Align::Left,
        },
        Column {
            name: "Days",
            align: Align::Right,
        },
        Column {
            name: "Level",
            align: Align::Right,
        },
        Column {
            name: "Total",
            align: Align::Right,
        },
        Column {
            name: "Next",
            align: Align::Left,
        },
    ];
    let table = invoices
        .iter()
        .map(|row| {
            let customer = str_field(row, "customer_name")
                .or_else(|| str_field(row, "customer_id"))
                .unwrap_or("-");
            vec![
                text_or_dash(row, "number"),
                customer.to_string(),
                date_field(row, "due_at"),
                count_field(row, "days_overdue").to_string(),
                level_label(row, "dunning_level"),
                money_field(row, "total_amount"),
                next_action_label(row),
            ]
        })
        .collect::<Vec<_>>();
    lines.extend(format::render_table_or_blocks(
        &columns,
        &table,
        format::terminal_width(),
        "Invoice",
    ));

    if let Some(summary) = data.get("summary") {
        lines.push(String::new());
        lines.push("Totals:".to_string());
        let totals = summary
            .get("totals")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for total in &totals {
            let currency = str_field(total, "currency");
            lines.push(format!(
                "  {} outstanding, {} in dunning fees",
                money(total.get("outstanding").and_then(Value::as_f64), currency),
                money(total.get("dunning_fees").and_then(Value::as_f64), currency)
            ));
        }

        let buckets = summary
            .get("buckets")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(|bucket| {
                format!(
                    "{} {}",
                    text_or_dash(bucket, "bucket"),
                    count_field(bucket, "invoices")
                )
            })
            .collect::<Vec<_>>();
        if !buckets.is_empty() {
            lines.push(format!("  Aging: {}", buckets.join(", ")));
        }
    }
    Ok(lines.join("\n"))
}

fn next_action_label(row: &Value) -> String {
    let action = str_field(row, "next_action").unwrap_or("none");
    if action == "none" {
        return "-".to_string();
    }
    let level = action.trim_start_matches("level");
    match row.get("days_until_next").and_then(Value::as_i64) {
        Some(days) if days > 0 => format!("level {level} in {days}d"),
        _ => format!("level {level} now"),
    }
}

pub fn render_history(data: &Value) -> io::Result<String> {
    let events = rows(data, "events", "report history")?;
    let customer_id = text_or_dash(data, "customer_id");
    if events.is_empty() {
        return Ok(format!("No dunning events for {customer_id}."));
    }

    let columns = [
        Column {
            name: "When",
            align: Align::Left,
        },
        Column {
            name: "Event",
            align: Align::Left,
        },
        Column {
            name: "Invoice",
            align: Align::Left,
        },
        Column {
            name: "Fee",
            align: Align::Right,
        },
        Column {
            name: "Total after",
            align: Align::Right,
        },
        Column {
            name: "By",
            align: Align::Left,
        },
        Column {
            name: "Note",
            align: Align::Left,
        },
    ];
    let table = events
        .iter()
        .map(|event| {
            let amount = |key: &str| {
                event
                    .get(key)
                    .and_then(Value::as_f64)
                    .map(|value| format!("{value:.2}"))
                    .unwrap_or_else(|| "-".to_string())
            };
            vec![
                date_field(event, "occurred_at"),
                format!(
                    "{} ({})",
                    text_or_dash(event, "kind"),
                    text_or_dash(event, "source")
                ),
                text_or_dash(event, "invoice_id"),
                amount("fee"),
                amount("total_after"),
                text_or_dash(event, "actor"),
                text_or_dash(event, "note"),
            ]
        })
        .collect::<Vec<_>>();

    let mut lines = vec![
        format!("Dunning history for {customer_id}, newest first."),
        String::new(),
    ];
    lines.extend(format::render_table_or_blocks(
        &columns,
        &table,
        format::terminal_width(),
        "Event",
    ));
    Ok(lines.join("\n"))
}

pub fn render_suspended(data: &Value) -> io::Result<String> {
    let customers = rows(data, "rows", "report suspended")?;
    if customers.is_empty() {
        return Ok("No customers are suspended.".to_string());
    }

    let columns = [
        Column {
            name: "Customer",
            align: Align::Left,
        },
        Column {
            name: "Since",
            align: Align::Left,
        },
        Column {
            name: "Source",
            align: Align::Left,
        },
        Column {
            name: "Overdue",
            align: Align::Right,
        },
        Column {
            name: "Outstanding",
            align: Align::Right,
        },
        Column {
            name: "Reason",
            align: Align::Left,
        },
    ];
    let table = customers
        .iter()
        .map(|row| {
            vec![
                format!(
                    "{} ({})",
                    text_or_dash(row, "name"),
                    text_or_dash(row, "customer_id")
                ),
                date_field(row, "suspended_at"),
                text_or_dash(row, "source"),
                count_field(row, "overdue_invoices").to_string(),
                row.get("overdue_total")
                    .and_then(Value::as_f64)
                    .map(|value| format!("{value:.2}"))
                    .unwrap_or_else(|| "-".to_string()),
                text_or_dash(row, "reason"),
            ]
        })
        .collect::<Vec<_>>();

    let mut lines = vec![
        format!(
            "{} suspended.",
            format::plural(customers.len() as i64, "customer", "customers")
        ),
        String::new(),
    ];
    lines.extend(format::render_table_or_blocks(
        &columns,
        &table,
        format::terminal_width(),
        "Customer",
    ));
    Ok(lines.join("\n"))
}

pub fn render_stats(data: &Value) -> io::Result<String> {
    let dunned = data
        .get("dunned_invoices")
        .and_then(Value::as_i64)
        .ok_or_else(|| io::Error::other("report stats output requires dunned_invoices"))?;

    let range = match (str_field(data, "from"), str_field(data, "to")) {
        (None, None) => "all time".to_string(),
        (from, to) => format!(
            "{} to {}",
            from.map(|value| value.get(..10).unwrap_or(value)).unwrap_or("start"),
            to.map(|value| value.get(..10).unwrap_or(value)).unwrap_or("now")
        ),
    };
    let average = data
        .get("average_days_to_payment")
        .and_then(Value::as_f64)
        .map(|days| format!("{days:.1} days"))
        .unwrap_or_else(|| "-".to_string());
    let effectiveness = data
        .get("effectiveness_percent")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    let mut lines = vec![format!("Dunning statistics, {range}."), String::new()];
    lines.extend(format::key_value_rows(
        &[
            ("Dunned invoices:", dunned.to_string()),
            ("Paid:", count_field(data, "paid").to_string()),
            ("Still overdue:", count_field(data, "still_overdue").to_string()),
            ("Effectiveness:", format!("{effectiveness:.1}%")),
            ("Avg days to payment:", average),
            ("Fees charged:", money_field(data, "total_fees")),
        ],
        2,
    ));

    let levels = data
        .get("levels")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if !levels.is_empty() {
        lines.push(String::new());
        let columns = [
            Column {
                name: "Level",
                align: Align::Right,
            },
            Column {
                name: "Invoices",
                align: Align::Right,
            },
            Column {
                name: "Fees",
                align: Align::Right,
            },
            Column {
                name: "Paid",
                align: Align::Right,
            },
            Column {
                name: "Overdue",
                align: Align::Right,
            },
        ];
        let table = levels
            .iter()
            .map(|level| {
                vec![
                    level_label(level, "level"),
                    count_field(level, "invoices").to_string(),
                    money_field(level, "fees"),
                    count_field(level, "paid").to_string(),
                    count_field(level, "still_overdue").to_string(),
                ]
            })
            .collect::<Vec<_>>();
        lines.extend(format::render_table_or_blocks(
            &columns,
            &table,
            format::terminal_width(),
            "Level",
        ));
    }
    Ok(lines.join("\n"))
}

pub fn render_upcoming(data: &Value) -> io::Result<String> {
    let candidates = rows(data, "rows", "report upcoming")?;
    let days_ahead = count_field(data, "days_ahead");
    if candidates.is_empty() {
        return Ok(format!(
            "No invoices reach their next level within {}.",
            format::plural(days_ahead, "day", "days")
        ));
    }

    let columns = [
        Column {
            name: "Invoice",
            align: Align::Left,
        },
        Column {
            name: "Customer",
            align: Align::Left,
        },
        Column {
            name: "Next",
            align: Align::Right,
        },
        Column {
            name: "In days",
            align: Align::Right,
        },
        Column {
            name: "Fee",
            align: Align::Right,
        },
        Column {
            name: "Auto-send",
            align: Align::Left,
        },
        Column {
            name: "Suspends",
            align: Align::Left,
        },
    ];
    let table = candidates
        .iter()
        .map(|row| {
            let flag = |key: &str| yes_no(row.get(key).and_then(Value::as_bool).unwrap_or(false));
            vec![
                text_or_dash(row, "number"),
                text_or_dash(row, "customer_id"),
                level_label(row, "next_level"),
                count_field(row, "days_remaining").to_string(),
                money_field(row, "next_fee"),
                flag("auto_send").to_string(),
                flag("would_suspend").to_string(),
            ]
        })
        .collect::<Vec<_>>();

    let mut lines = vec![
        format!(
            "{} reach their next level within {}.",
            format::plural(candidates.len() as i64, "invoice", "invoices"),
            format::plural(days_ahead, "day", "days")
        ),
        String::new(),
    ];
    lines.extend(format::render_table_or_blocks(
        &columns,
        &table,
        format::terminal_width(),
        "Invoice",
    ));
    Ok(lines.join("\n"))
}
