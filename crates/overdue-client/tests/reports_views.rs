mod support;

use std::path::Path;

use overdue_client::commands::invoices::{self, InvoicePayOptions};
use overdue_client::commands::reports::{
    self, OverdueReportOptions, StatsReportOptions, UpcomingReportOptions,
};
use overdue_client::commands::service::{self, ServiceChangeOptions};
use overdue_client::dunning::policy::PolicyOverrides;
use serde_json::Value;
use support::dunning_testkit::{
    ACTOR, add_customer, add_customer_with_policy, add_overdue_invoice, add_policy,
    days_from_now, escalate_now, now, payload, temp_home,
};

fn overdue_report(home: &Path, customer_id: Option<&str>, level: Option<i64>) -> Value {
    payload(reports::overdue(OverdueReportOptions {
        customer_id: customer_id.map(str::to_string),
        level,
        home_override: Some(home),
        now: Some(now()),
    }))["data"]
        .clone()
}

fn upcoming(home: &Path, days_ahead: Option<i64>) -> Value {
    payload(reports::upcoming(UpcomingReportOptions {
        days_ahead,
        home_override: Some(home),
        now: Some(now()),
    }))["data"]
        .clone()
}

fn stats(home: &Path, from: Option<&str>, to: Option<&str>) -> Value {
    payload(reports::stats(StatsReportOptions {
        from: from.map(str::to_string),
        to: to.map(str::to_string),
        home_override: Some(home),
    }))["data"]
        .clone()
}

fn row_numbers(rows: &Value) -> Vec<String> {
    rows.as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row["number"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn overdue_report_orders_by_age_and_summarizes_exposure() {
    let temp = temp_home("overdue-report-overdue");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_a");
        add_overdue_invoice(&home, Some("cus_a"), "A-1", 100.0, 40);
        let dunned = add_overdue_invoice(&home, Some("cus_a"), "A-2", 100.0, 10);
        assert!(escalate_now(&home, &dunned, 1).is_ok());
        add_customer(&home, "cus_b", None);
        add_overdue_invoice(&home, Some("cus_b"), "B-1", 50.0, 95);

        let report = overdue_report(&home, None, None);
        assert_eq!(row_numbers(&report["rows"]), vec!["B-1", "A-1", "A-2"]);

        let oldest = &report["rows"][0];
        assert_eq!(oldest["aging_bucket"], "90+");
        assert_eq!(oldest["next_action"], "none");
        assert_eq!(oldest["customer_name"], "Customer cus_b");

        let middle = &report["rows"][1];
        assert_eq!(middle["next_action"], "level1");
        assert_eq!(middle["days_until_next"], -33);

        let youngest = &report["rows"][2];
        assert_eq!(youngest["dunning_level"], "level1");
        assert_eq!(youngest["total_amount"], 105.0);
        assert_eq!(youngest["days_until_next"], 4);

        let summary = &report["summary"];
        assert_eq!(summary["invoices"], 3);
        assert_eq!(summary["totals"][0]["currency"], "EUR");
        assert_eq!(summary["totals"][0]["outstanding"], 255.0);
        assert_eq!(summary["totals"][0]["dunning_fees"], 5.0);
        assert_eq!(summary["buckets"][1]["bucket"], "1-30");
        assert_eq!(summary["buckets"][1]["invoices"], 1);
        assert_eq!(summary["buckets"][2]["invoices"], 1);
        assert_eq!(summary["buckets"][4]["invoices"], 1);
    }
}

#[test]
fn overdue_report_narrows_by_customer_and_level() {
    let temp = temp_home("overdue-report-filters");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_a");
        add_overdue_invoice(&home, Some("cus_a"), "A-1", 100.0, 40);
        let dunned = add_overdue_invoice(&home, Some("cus_a"), "A-2", 100.0, 10);
        assert!(escalate_now(&home, &dunned, 1).is_ok());
        add_customer(&home, "cus_b", None);
        add_overdue_invoice(&home, Some("cus_b"), "B-1", 50.0, 95);

        let only_a = overdue_report(&home, Some("cus_a"), None);
        assert_eq!(row_numbers(&only_a["rows"]), vec!["A-1", "A-2"]);
        assert_eq!(only_a["customer_id"], "cus_a");

        let level_one = overdue_report(&home, None, Some(1));
        assert_eq!(row_numbers(&level_one["rows"]), vec!["A-2"]);
        assert_eq!(level_one["level"], "level1");

        let unknown = reports::overdue(OverdueReportOptions {
            customer_id: Some("cus_ghost".to_string()),
            home_override: Some(&home),
            ..OverdueReportOptions::default()
        });
        assert!(unknown.is_err());
        if let Err(error) = unknown {
            assert_eq!(error.code, "customer_not_found");
        }

        let bad_level = reports::overdue(OverdueReportOptions {
            level: Some(7),
            home_override: Some(&home),
            ..OverdueReportOptions::default()
        });
        assert!(bad_level.is_err());
    }
}

#[test]
fn history_lists_events_newest_first() {
    let temp = temp_home("overdue-report-history");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_hist");
        let invoice_id = add_overdue_invoice(&home, Some("cus_hist"), "H-1", 200.0, 16);
        assert!(escalate_now(&home, &invoice_id, 1).is_ok());
        assert!(escalate_now(&home, &invoice_id, 2).is_ok());

        let history = payload(reports::history("cus_hist", Some(&home)));
        let events = &history["data"]["events"];
        assert_eq!(events.as_array().map(Vec::len), Some(2));
        assert_eq!(events[0]["kind"], "level2");
        assert_eq!(events[0]["fee"], 10.0);
        assert_eq!(events[0]["total_after"], 215.0);
        assert_eq!(events[0]["source"], "manual");
        assert_eq!(events[0]["actor"], ACTOR);
        assert_eq!(events[1]["kind"], "level1");

        let unknown = reports::history("cus_ghost", Some(&home));
        assert!(unknown.is_err());
        if let Err(error) = unknown {
            assert_eq!(error.code, "customer_not_found");
        }
    }
}

#[test]
fn suspended_report_shows_source_and_outstanding_exposure() {
    let temp = temp_home("overdue-report-suspended");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_auto");
        let invoice_id = add_overdue_invoice(&home, Some("cus_auto"), "S-1", 100.0, 30);
        for level in 1..=3 {
            assert!(escalate_now(&home, &invoice_id, level).is_ok());
        }

        add_customer(&home, "cus_manual", None);
        let manual = service::suspend(ServiceChangeOptions {
            customer_id: "cus_manual".to_string(),
            reason: Some("fraud review".to_string()),
            actor: Some(ACTOR.to_string()),
            home_override: Some(&home),
            now: Some(now()),
        });
        assert!(manual.is_ok());
        add_customer(&home, "cus_fine", None);

        let report = payload(reports::suspended(Some(&home)));
        let rows = report["data"]["rows"].as_array().cloned().unwrap_or_default();
        assert_eq!(rows.len(), 2);

        let automatic = rows.iter().find(|row| row["customer_id"] == "cus_auto");
        assert!(automatic.is_some());
        if let Some(row) = automatic {
            assert_eq!(row["source"], "automatic");
            assert_eq!(row["overdue_invoices"], 1);
            assert_eq!(row["overdue_total"], 130.0);
            assert_eq!(row["dunning_fees"], 30.0);
            assert_eq!(row["suspended_by"], ACTOR);
        }

        let administrative = rows.iter().find(|row| row["customer_id"] == "cus_manual");
        assert!(administrative.is_some());
        if let Some(row) = administrative {
            assert_eq!(row["source"], "manual");
            assert_eq!(row["reason"], "fraud review");
            assert_eq!(row["overdue_invoices"], 0);
        }
    }
}

#[test]
fn statistics_measure_payment_after_dunning() {
    let temp = temp_home("overdue-report-stats");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer(&home, "cus_stats", Some("billing@example.com"));
        add_policy(
            &home,
            "cus_stats",
            PolicyOverrides {
                auto_reactivate_on_payment: Some(false),
                ..PolicyOverrides::default()
            },
        );
        let settled = add_overdue_invoice(&home, Some("cus_stats"), "ST-1", 100.0, 8);
        let lingering = add_overdue_invoice(&home, Some("cus_stats"), "ST-2", 100.0, 15);
        add_overdue_invoice(&home, Some("cus_stats"), "ST-3", 100.0, 1);
        assert!(escalate_now(&home, &settled, 1).is_ok());
        assert!(escalate_now(&home, &lingering, 1).is_ok());
        assert!(escalate_now(&home, &lingering, 2).is_ok());

        let paid = invoices::pay(InvoicePayOptions {
            invoice_id: settled.clone(),
            paid_at: Some(days_from_now(2)),
            actor: Some(ACTOR.to_string()),
            home_override: Some(&home),
            now: Some(days_from_now(2)),
        });
        assert!(paid.is_ok());

        let all = stats(&home, None, None);
        assert_eq!(all["dunned_invoices"], 2);
        assert_eq!(all["paid"], 1);
        assert_eq!(all["still_overdue"], 1);
        assert_eq!(all["total_fees"], 20.0);
        assert_eq!(all["effectiveness_percent"], 50.0);
        assert_eq!(all["average_days_to_payment"], 2.0);
        assert_eq!(all["levels"][0]["level"], "level1");
        assert_eq!(all["levels"][0]["paid"], 1);
        assert_eq!(all["levels"][1]["still_overdue"], 1);
        assert_eq!(all["levels"][2]["invoices"], 0);

        let before = stats(&home, None, Some("2026-05-19"));
        assert_eq!(before["dunned_invoices"], 0);
        assert_eq!(before["effectiveness_percent"], 0.0);
        assert_eq!(before["average_days_to_payment"], Value::Null);

        let same_day = stats(&home, Some("2026-05-20"), Some("2026-05-20"));
        assert_eq!(same_day["dunned_invoices"], 2);

        let inverted = reports::stats(StatsReportOptions {
            from: Some("2026-06-01".to_string()),
            to: Some("2026-05-01".to_string()),
            home_override: Some(&home),
        });
        assert!(inverted.is_err());
        if let Err(error) = inverted {
            assert_eq!(error.code, "invalid_argument");
        }
    }
}

#[test]
fn upcoming_candidates_respect_the_lookahead_window() {
    let temp = temp_home("overdue-report-upcoming");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_up");
        add_overdue_invoice(&home, Some("cus_up"), "U-SOON", 100.0, 5);
        add_overdue_invoice(&home, Some("cus_up"), "U-LATER", 100.0, 2);
        add_overdue_invoice(&home, Some("cus_up"), "U-READY", 100.0, 10);
        let final_step = add_overdue_invoice(&home, Some("cus_up"), "U-FINAL", 100.0, 20);
        assert!(escalate_now(&home, &final_step, 1).is_ok());
        assert!(escalate_now(&home, &final_step, 2).is_ok());

        add_customer(&home, "cus_exempt", None);
        add_policy(
            &home,
            "cus_exempt",
            PolicyOverrides {
                skip_dunning_process: Some(true),
                ..PolicyOverrides::default()
            },
        );
        add_overdue_invoice(&home, Some("cus_exempt"), "X-1", 100.0, 6);

        let default_window = upcoming(&home, None);
        assert_eq!(default_window["days_ahead"], 3);
        assert_eq!(
            row_numbers(&default_window["rows"]),
            vec!["U-READY", "U-FINAL", "U-SOON"]
        );

        let ready = &default_window["rows"][0];
        assert_eq!(ready["days_remaining"], 0);
        assert_eq!(ready["next_level"], "level1");
        assert_eq!(ready["next_fee"], 5.0);
        assert_eq!(ready["would_suspend"], false);

        let last = &default_window["rows"][1];
        assert_eq!(last["current_level"], "level2");
        assert_eq!(last["next_level"], "level3");
        assert_eq!(last["days_remaining"], 1);
        assert_eq!(last["would_suspend"], true);

        let wide = upcoming(&home, Some(5));
        assert_eq!(wide["rows"].as_array().map(Vec::len), Some(4));

        let negative = reports::upcoming(UpcomingReportOptions {
            days_ahead: Some(-1),
            home_override: Some(&home),
            now: Some(now()),
        });
        assert!(negative.is_err());
        if let Err(error) = negative {
            assert_eq!(error.code, "invalid_argument");
        }
    }
}
