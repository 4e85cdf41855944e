mod support;

use chrono::Duration;
use overdue_client::commands::batch::{self, BatchRunOptions};
use overdue_client::dunning::level::DunningLevel;
use overdue_client::dunning::policy::PolicyOverrides;
use support::dunning_testkit::{
    ACTOR, RecordingNotifier, add_customer, add_customer_with_policy, add_overdue_invoice,
    add_policy, count, customer, days_from_now, db_path, execute_sql, invoice, now, payload, query_count,
    run_batch, run_batch_at, temp_home,
};

#[test]
fn second_immediate_run_applies_no_transitions() {
    let temp = temp_home("overdue-batch-idempotent");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_batch");
        add_overdue_invoice(&home, Some("cus_batch"), "INV-1", 100.0, 8);
        add_overdue_invoice(&home, Some("cus_batch"), "INV-2", 100.0, 16);
        add_overdue_invoice(&home, Some("cus_batch"), "INV-3", 100.0, 2);

        let first = run_batch(&home, None, None);
        assert_eq!(count(&first, "level1"), 2);
        assert_eq!(count(&first, "not_due"), 1);
        assert_eq!(count(&first, "scanned"), 3);
        assert_eq!(first["completed"], true);

        let second = run_batch(&home, None, None);
        assert_eq!(count(&second, "level1"), 0);
        assert_eq!(count(&second, "level2"), 0);
        assert_eq!(count(&second, "level3"), 0);
        assert_eq!(count(&second, "not_due"), 3);
    }
}

#[test]
fn passes_at_a_sub_second_instant_stay_idempotent() {
    let temp = temp_home("overdue-batch-subsecond");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_millis");
        let invoice_id = add_overdue_invoice(&home, Some("cus_millis"), "INV-1", 100.0, 25);
        let at = now() + Duration::milliseconds(500);

        let first = run_batch_at(&home, at, None, None);
        assert_eq!(count(&first, "level1"), 1);

        let second = run_batch_at(&home, at, None, None);
        assert_eq!(count(&second, "level1"), 0);
        assert_eq!(count(&second, "level2"), 0);
        assert_eq!(count(&second, "not_due"), 1);

        if let Some(value) = invoice(&home, &invoice_id) {
            assert_eq!(value.dunning_level, DunningLevel::Level1);
        }
    }
}

#[test]
fn batch_applies_one_step_per_pass_and_never_fast_forwards() {
    let temp = temp_home("overdue-batch-one-step");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_far");
        let invoice_id = add_overdue_invoice(&home, Some("cus_far"), "INV-1", 100.0, 45);

        let first = run_batch(&home, None, None);
        assert_eq!(count(&first, "level1"), 1);
        if let Some(value) = invoice(&home, &invoice_id) {
            assert_eq!(value.dunning_level, DunningLevel::Level1);
        }

        for (pass, expected) in [
            DunningLevel::Level2,
            DunningLevel::Level3,
            DunningLevel::Level3,
        ]
        .into_iter()
        .enumerate()
        {
            let at = now() + Duration::hours(pass as i64 + 1);
            let summary = run_batch_at(&home, at, None, None);
            assert_eq!(summary["completed"], true, "pass {pass}");
            if let Some(value) = invoice(&home, &invoice_id) {
                assert_eq!(value.dunning_level, expected, "pass {pass}");
            }
        }

        if let Some(value) = invoice(&home, &invoice_id) {
            assert_eq!(value.total_amount, 130.0);
            assert_eq!(value.dunning_fee, 30.0);
        }
        if let Some(value) = customer(&home, "cus_far") {
            assert!(value.suspension.suspended);
        }
        assert_eq!(
            query_count(
                &home,
                "SELECT COUNT(*) FROM dunning_events WHERE source = 'automatic' AND kind LIKE 'level%'"
            ),
            3
        );
    }
}

#[test]
fn exempt_or_unowned_invoices_are_skipped() {
    let temp = temp_home("overdue-batch-skipped");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer(&home, "cus_nopolicy", None);
        add_overdue_invoice(&home, Some("cus_nopolicy"), "INV-1", 10.0, 30);
        add_overdue_invoice(&home, None, "INV-2", 10.0, 30);

        add_customer(&home, "cus_skip", None);
        add_policy(
            &home,
            "cus_skip",
            PolicyOverrides {
                skip_dunning_process: Some(true),
                ..PolicyOverrides::default()
            },
        );
        add_overdue_invoice(&home, Some("cus_skip"), "INV-3", 10.0, 30);

        add_customer_with_policy(&home, "cus_ok");
        add_overdue_invoice(&home, Some("cus_ok"), "INV-4", 10.0, 30);

        let summary = run_batch(&home, None, None);
        assert_eq!(count(&summary, "skipped"), 3);
        assert_eq!(count(&summary, "level1"), 1);
        assert_eq!(count(&summary, "errors"), 0);
    }
}

#[test]
fn disabled_auto_send_defers_the_level() {
    let temp = temp_home("overdue-batch-deferred");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer(&home, "cus_quiet", Some("billing@example.com"));
        add_policy(
            &home,
            "cus_quiet",
            PolicyOverrides {
                auto_send: [None, Some(false), None],
                ..PolicyOverrides::default()
            },
        );
        let invoice_id = add_overdue_invoice(&home, Some("cus_quiet"), "INV-1", 100.0, 20);

        let first = run_batch(&home, None, None);
        assert_eq!(count(&first, "level1"), 1);

        let second = run_batch_at(&home, days_from_now(1), None, None);
        assert_eq!(count(&second, "deferred"), 1);
        assert_eq!(count(&second, "level2"), 0);
        assert_eq!(count(&second, "level3"), 0);
        if let Some(value) = invoice(&home, &invoice_id) {
            assert_eq!(value.dunning_level, DunningLevel::Level1);
        }
    }
}

#[test]
fn a_failing_invoice_is_counted_and_the_rest_still_advance() {
    let temp = temp_home("overdue-batch-errors");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_mixed");
        let broken = add_overdue_invoice(&home, Some("cus_mixed"), "INV-1", 100.0, 10);
        let healthy = add_overdue_invoice(&home, Some("cus_mixed"), "INV-2", 100.0, 10);

        execute_sql(
            &home,
            &format!(
                "CREATE TRIGGER fail_one_invoice BEFORE UPDATE ON invoices
                 WHEN OLD.invoice_id = '{broken}'
                 BEGIN SELECT RAISE(ABORT, 'forced failure'); END;"
            ),
        );

        let envelope = payload(batch::run(BatchRunOptions {
            actor: Some(ACTOR.to_string()),
            home_override: Some(&home),
            now: Some(now()),
            ..BatchRunOptions::default()
        }));
        assert!(envelope["warnings"][0].is_string());
        let summary = &envelope["data"];
        assert_eq!(count(summary, "errors"), 1);
        assert_eq!(count(summary, "level1"), 1);
        assert_eq!(summary["completed"], true);

        if let Some(value) = invoice(&home, &broken) {
            assert_eq!(value.dunning_level, DunningLevel::Clean);
            assert_eq!(value.total_amount, 100.0);
        }
        if let Some(value) = invoice(&home, &healthy) {
            assert_eq!(value.dunning_level, DunningLevel::Level1);
        }
        assert_eq!(
            query_count(
                &home,
                &format!("SELECT COUNT(*) FROM dunning_events WHERE invoice_id = '{broken}'")
            ),
            0
        );
    }
}

#[test]
fn bounded_runs_resume_from_their_cursor() {
    let temp = temp_home("overdue-batch-cursor");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_pages");
        for number in 1..=5 {
            add_overdue_invoice(&home, Some("cus_pages"), &format!("INV-{number}"), 10.0, 8);
        }

        let first = run_batch(&home, Some(2), Some(1));
        assert_eq!(count(&first, "scanned"), 2);
        assert_eq!(count(&first, "level1"), 2);
        assert_eq!(first["completed"], false);
        assert!(first["cursor"].is_string());

        let second = run_batch(&home, Some(2), Some(10));
        assert_eq!(second["resumed_from"], first["cursor"]);
        assert_eq!(count(&second, "level1"), 2);
        assert_eq!(second["completed"], false);

        let third = run_batch(&home, None, Some(2));
        assert_eq!(count(&third, "scanned"), 1);
        assert_eq!(count(&third, "level1"), 1);
        assert_eq!(third["completed"], true);
        assert!(third["cursor"].is_null());

        assert_eq!(
            query_count(&home, "SELECT COUNT(*) FROM invoices WHERE dunning_level = 1"),
            5
        );
        assert_eq!(
            query_count(&home, "SELECT COUNT(*) FROM internal_meta WHERE key = 'batch_cursor'"),
            0
        );
    }
}

#[test]
fn batch_notices_are_sent_for_every_applied_transition() {
    let temp = temp_home("overdue-batch-notices");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_notify");
        add_overdue_invoice(&home, Some("cus_notify"), "INV-1", 100.0, 9);
        add_overdue_invoice(&home, Some("cus_notify"), "INV-2", 100.0, 1);
        let recorder = RecordingNotifier::default();

        let summary = payload(batch::run(BatchRunOptions {
            actor: Some(ACTOR.to_string()),
            home_override: Some(&home),
            now: Some(now()),
            notifier: Some(&recorder),
            ..BatchRunOptions::default()
        }));
        assert_eq!(count(&summary["data"], "level1"), 1);

        let notices = recorder.notices.borrow();
        assert_eq!(notices.len(), 1);
        if let Some(notice) = notices.first() {
            assert_eq!(notice.invoice_number, "INV-1");
            assert_eq!(notice.recipient.as_deref(), Some("billing@example.com"));
        }
    }
}

#[test]
fn batch_rejects_empty_pages_and_anonymous_callers() {
    let temp = temp_home("overdue-batch-validation");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        let anonymous = batch::run(BatchRunOptions {
            actor: Some(" ".to_string()),
            home_override: Some(&home),
            ..BatchRunOptions::default()
        });
        assert!(anonymous.is_err());
        if let Err(error) = anonymous {
            assert_eq!(error.code, "authentication_required");
        }
        assert!(!db_path(&home).exists());

        let zero_page = batch::run(BatchRunOptions {
            page_size: Some(0),
            actor: Some(ACTOR.to_string()),
            home_override: Some(&home),
            ..BatchRunOptions::default()
        });
        assert!(zero_page.is_err());
        if let Err(error) = zero_page {
            assert_eq!(error.code, "invalid_argument");
        }
    }
}
