mod support;

use overdue_client::commands::customers::{self, CustomerAddOptions};
use overdue_client::commands::escalate::{self, EscalateOptions};
use overdue_client::commands::invoices::{self, InvoicePayOptions};
use overdue_client::commands::policy::{self, PolicyCreateOptions, PolicyUpdateOptions};
use overdue_client::commands::reports;
use overdue_client::dunning::history::EventSource;
use overdue_client::dunning::level::DunningLevel;
use overdue_client::dunning::policy::PolicyOverrides;
use support::dunning_testkit::{
    ACTOR, FailingNotifier, RecordingNotifier, add_customer, add_customer_with_policy,
    add_overdue_invoice, add_policy, customer, days_from_now, escalate_at, escalate_now, invoice,
    now, payload, temp_home,
};

#[test]
fn level_one_adds_the_fee_to_total_and_dunning_fee() {
    let temp = temp_home("overdue-escalate-fee");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_fee");
        let invoice_id = add_overdue_invoice(&home, Some("cus_fee"), "INV-100", 100.0, 10);

        let outcome = payload(escalate_now(&home, &invoice_id, 1));
        assert_eq!(outcome["command"], "escalate");
        assert_eq!(outcome["data"]["fee"], 5.0);
        assert_eq!(outcome["data"]["new_total"], 105.0);
        assert_eq!(outcome["data"]["source"], "manual");

        let stored = invoice(&home, &invoice_id);
        assert!(stored.is_some());
        if let Some(value) = stored {
            assert_eq!(value.dunning_level, DunningLevel::Level1);
            assert_eq!(value.total_amount, 105.0);
            assert_eq!(value.dunning_fee, 5.0);
            assert_eq!(value.last_dunning_at, Some(now()));
        }
    }
}

#[test]
fn level_two_requires_level_one_first() {
    let temp = temp_home("overdue-escalate-sequence");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_seq");
        let invoice_id = add_overdue_invoice(&home, Some("cus_seq"), "INV-200", 100.0, 15);

        let skipped = escalate_now(&home, &invoice_id, 2);
        assert!(skipped.is_err());
        if let Err(error) = skipped {
            assert_eq!(error.code, "invalid_state_transition");
            assert_eq!(
                error.data.as_ref().and_then(|data| data["current_level"].as_i64()),
                Some(0)
            );
        }

        assert!(escalate_now(&home, &invoice_id, 1).is_ok());
        let second = payload(escalate_now(&home, &invoice_id, 2));
        assert_eq!(second["data"]["previous_level"], "level1");
        assert_eq!(second["data"]["level"], "level2");

        let stored = invoice(&home, &invoice_id);
        if let Some(value) = stored {
            assert_eq!(value.dunning_level, DunningLevel::Level2);
            assert_eq!(value.total_amount, 115.0);
            assert_eq!(value.dunning_fee, 15.0);
        }
    }
}

#[test]
fn thresholds_gate_each_step_and_level_three_is_never_reached_directly() {
    let temp = temp_home("overdue-escalate-thresholds");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_e2e");
        let invoice_id = add_overdue_invoice(&home, Some("cus_e2e"), "INV-300", 100.0, 10);

        let direct = escalate_now(&home, &invoice_id, 3);
        assert!(direct.is_err());

        assert!(escalate_now(&home, &invoice_id, 1).is_ok());

        let too_early = escalate_now(&home, &invoice_id, 2);
        assert!(too_early.is_err());
        if let Err(error) = too_early {
            assert_eq!(error.code, "invalid_state_transition");
            assert!(error.message.contains("10 days overdue"));
        }

        let five_days_later = days_from_now(5);
        assert!(escalate_at(&home, &invoice_id, 2, five_days_later).is_ok());
        assert!(escalate_at(&home, &invoice_id, 3, five_days_later).is_err());

        let stored = invoice(&home, &invoice_id);
        if let Some(value) = stored {
            assert_eq!(value.dunning_level, DunningLevel::Level2);
            assert_eq!(value.total_amount, 115.0);
        }
    }
}

#[test]
fn level_three_suspends_the_customer_and_cannot_be_repeated() {
    let temp = temp_home("overdue-escalate-level3");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_l3");
        let invoice_id = add_overdue_invoice(&home, Some("cus_l3"), "INV-400", 200.0, 30);

        assert!(escalate_now(&home, &invoice_id, 1).is_ok());
        assert!(escalate_now(&home, &invoice_id, 2).is_ok());
        let third = payload(escalate_now(&home, &invoice_id, 3));
        assert_eq!(third["data"]["suspended"], true);
        assert_eq!(third["data"]["new_total"], 230.0);

        let stored = customer(&home, "cus_l3");
        assert!(stored.is_some());
        if let Some(value) = stored {
            assert!(value.suspension.suspended);
            assert_eq!(value.suspension.source, Some(EventSource::Automatic));
            assert_eq!(value.suspension.suspended_by.as_deref(), Some(ACTOR));
        }

        let again = escalate_now(&home, &invoice_id, 3);
        assert!(again.is_err());
        if let Err(error) = again {
            assert_eq!(error.code, "invalid_state_transition");
        }

        let history = payload(reports::history("cus_l3", Some(&home)));
        let kinds: Vec<String> = history["data"]["events"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .filter_map(|event| event["kind"].as_str().map(str::to_string))
            .collect();
        assert_eq!(kinds, vec!["suspended", "level3", "level2", "level1"]);
    }
}

#[test]
fn level_three_suspension_can_be_suppressed_per_call() {
    let temp = temp_home("overdue-escalate-nosuspend");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_keep");
        let invoice_id = add_overdue_invoice(&home, Some("cus_keep"), "INV-410", 50.0, 25);
        assert!(escalate_now(&home, &invoice_id, 1).is_ok());
        assert!(escalate_now(&home, &invoice_id, 2).is_ok());

        let third = payload(escalate::run(EscalateOptions {
            invoice_id: invoice_id.clone(),
            level: 3,
            suspend: Some(false),
            actor: Some(ACTOR.to_string()),
            home_override: Some(&home),
            now: Some(now()),
            ..EscalateOptions::default()
        }));
        assert_eq!(third["data"]["suspended"], false);
        if let Some(value) = customer(&home, "cus_keep") {
            assert!(!value.suspension.suspended);
        }
    }
}

#[test]
fn missing_policy_and_missing_customer_fail_with_policy_missing() {
    let temp = temp_home("overdue-escalate-nopolicy");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer(&home, "cus_bare", None);
        let owned = add_overdue_invoice(&home, Some("cus_bare"), "INV-500", 80.0, 12);
        let orphan = add_overdue_invoice(&home, None, "INV-501", 80.0, 12);

        for invoice_id in [owned, orphan] {
            let result = escalate_now(&home, &invoice_id, 1);
            assert!(result.is_err());
            if let Err(error) = result {
                assert_eq!(error.code, "policy_missing");
            }
        }
    }
}

#[test]
fn exempt_policies_fail_with_policy_disabled() {
    let temp = temp_home("overdue-escalate-exempt");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer(&home, "cus_skip", None);
        add_policy(
            &home,
            "cus_skip",
            PolicyOverrides {
                skip_dunning_process: Some(true),
                ..PolicyOverrides::default()
            },
        );
        let skipped = add_overdue_invoice(&home, Some("cus_skip"), "INV-600", 80.0, 12);

        add_customer(&home, "cus_idle", None);
        let policy_id = add_policy(&home, "cus_idle", PolicyOverrides::default());
        let updated = policy::update(PolicyUpdateOptions {
            policy_id,
            overrides: PolicyOverrides {
                active: Some(false),
                ..PolicyOverrides::default()
            },
            actor: Some(ACTOR.to_string()),
            home_override: Some(&home),
            now: Some(now()),
        });
        assert!(updated.is_ok());
        let inactive = add_overdue_invoice(&home, Some("cus_idle"), "INV-601", 80.0, 12);

        for invoice_id in [skipped, inactive] {
            let result = escalate_now(&home, &invoice_id, 1);
            assert!(result.is_err());
            if let Err(error) = result {
                assert_eq!(error.code, "policy_disabled");
            }
            if let Some(value) = invoice(&home, &invoice_id) {
                assert_eq!(value.dunning_level, DunningLevel::Clean);
                assert_eq!(value.total_amount, 80.0);
            }
        }
    }
}

#[test]
fn invoices_that_are_not_overdue_cannot_escalate() {
    let temp = temp_home("overdue-escalate-open");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_open");
        let invoice_id = add_overdue_invoice(&home, Some("cus_open"), "INV-700", 100.0, 20);
        let paid = invoices::pay(InvoicePayOptions {
            invoice_id: invoice_id.clone(),
            actor: Some(ACTOR.to_string()),
            home_override: Some(&home),
            now: Some(now()),
            ..InvoicePayOptions::default()
        });
        assert!(paid.is_ok());

        let result = escalate_now(&home, &invoice_id, 1);
        assert!(result.is_err());
        if let Err(error) = result {
            assert_eq!(error.code, "invalid_state_transition");
            assert!(error.message.contains("paid"));
        }
    }
}

#[test]
fn escalation_without_an_actor_is_rejected_before_any_change() {
    let temp = temp_home("overdue-escalate-auth");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_auth");
        let invoice_id = add_overdue_invoice(&home, Some("cus_auth"), "INV-800", 100.0, 10);

        let result = escalate::run(EscalateOptions {
            invoice_id: invoice_id.clone(),
            level: 1,
            actor: Some("   ".to_string()),
            home_override: Some(&home),
            now: Some(now()),
            ..EscalateOptions::default()
        });
        assert!(result.is_err());
        if let Err(error) = result {
            assert_eq!(error.code, "authentication_required");
        }
        if let Some(value) = invoice(&home, &invoice_id) {
            assert_eq!(value.dunning_level, DunningLevel::Clean);
        }
    }
}

#[test]
fn anonymous_writes_never_create_a_ledger() {
    let temp = temp_home("overdue-anonymous-fresh");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        let anonymous = Some(String::new());
        let attempts = [
            escalate::run(EscalateOptions {
                invoice_id: "inv_unknown".to_string(),
                level: 1,
                actor: anonymous.clone(),
                home_override: Some(&home),
                ..EscalateOptions::default()
            }),
            customers::add(CustomerAddOptions {
                name: "Initech".to_string(),
                actor: anonymous.clone(),
                home_override: Some(&home),
                ..CustomerAddOptions::default()
            }),
            policy::create(PolicyCreateOptions {
                customer_id: "cus_initech".to_string(),
                actor: anonymous.clone(),
                home_override: Some(&home),
                ..PolicyCreateOptions::default()
            }),
            invoices::pay(InvoicePayOptions {
                invoice_id: "inv_unknown".to_string(),
                actor: anonymous,
                home_override: Some(&home),
                ..InvoicePayOptions::default()
            }),
        ];

        for attempt in attempts {
            assert!(matches!(attempt, Err(ref error) if error.code == "authentication_required"));
        }
        assert!(!home.join("ledger.db").exists());
    }
}

#[test]
fn failed_notice_keeps_the_committed_transition() {
    let temp = temp_home("overdue-escalate-notify-fail");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer_with_policy(&home, "cus_smtp");
        let invoice_id = add_overdue_invoice(&home, Some("cus_smtp"), "INV-900", 100.0, 10);

        let outcome = payload(escalate::run(EscalateOptions {
            invoice_id: invoice_id.clone(),
            level: 1,
            actor: Some(ACTOR.to_string()),
            home_override: Some(&home),
            now: Some(now()),
            notifier: Some(&FailingNotifier),
            ..EscalateOptions::default()
        }));
        assert_eq!(outcome["data"]["notice"], "failed");
        assert!(outcome["warnings"][0].is_string());
        if let Some(value) = invoice(&home, &invoice_id) {
            assert_eq!(value.dunning_level, DunningLevel::Level1);
            assert_eq!(value.total_amount, 105.0);
        }
    }
}

#[test]
fn notices_go_to_the_policy_contact_and_can_be_suppressed() {
    let temp = temp_home("overdue-escalate-notify");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        add_customer(&home, "cus_contact", Some("owner@example.com"));
        add_policy(
            &home,
            "cus_contact",
            PolicyOverrides {
                dunning_contact_email: Some(Some("ar@example.com".to_string())),
                ..PolicyOverrides::default()
            },
        );
        let invoice_id = add_overdue_invoice(&home, Some("cus_contact"), "INV-910", 100.0, 20);
        let recorder = RecordingNotifier::default();

        let first = payload(escalate::run(EscalateOptions {
            invoice_id: invoice_id.clone(),
            level: 1,
            actor: Some(ACTOR.to_string()),
            home_override: Some(&home),
            now: Some(now()),
            notifier: Some(&recorder),
            ..EscalateOptions::default()
        }));
        assert_eq!(first["data"]["notice"], "sent");

        let second = payload(escalate::run(EscalateOptions {
            invoice_id: invoice_id.clone(),
            level: 2,
            send_email: Some(false),
            actor: Some(ACTOR.to_string()),
            home_override: Some(&home),
            now: Some(now()),
            notifier: Some(&recorder),
            ..EscalateOptions::default()
        }));
        assert_eq!(second["data"]["notice"], "not_requested");

        let notices = recorder.notices.borrow();
        assert_eq!(notices.len(), 1);
        if let Some(notice) = notices.first() {
            assert_eq!(notice.recipient.as_deref(), Some("ar@example.com"));
            assert_eq!(notice.level, DunningLevel::Level1);
            assert_eq!(notice.total_amount, 105.0);
        }
    }
}

#[test]
fn unknown_invoices_and_bad_levels_are_reported() {
    let temp = temp_home("overdue-escalate-unknown");
    assert!(temp.is_ok());
    if let Ok((_dir, home)) = temp {
        let missing = escalate_now(&home, "inv_missing", 1);
        assert!(missing.is_err());
        if let Err(error) = missing {
            assert_eq!(error.code, "invoice_not_found");
        }

        let bad_level = escalate_now(&home, "inv_missing", 4);
        assert!(bad_level.is_err());
        if let Err(error) = bad_level {
            assert_eq!(error.code, "invalid_argument");
        }
    }
}
