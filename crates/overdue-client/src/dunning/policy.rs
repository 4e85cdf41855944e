use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use ulid::Ulid;

use crate::dunning::DunningContext;
use crate::dunning::clock::format_timestamp;
use crate::dunning::level::DunningLevel;
use crate::dunning::store::{SuspensionSnapshot, load_customer};
use crate::identity::require_actor;
use crate::state::{map_sqlite_error, with_immediate_transaction};
use crate::{ClientError, ClientResult};

pub const DEFAULT_THRESHOLD_DAYS: [i64; 3] = [7, 14, 21];
pub const DEFAULT_FEES: [f64; 3] = [5.0, 10.0, 15.0];
pub const DEFAULT_PAYMENT_TERMS_DAYS: i64 = 30;

const POLICY_COLUMNS: &str = "policy_id, customer_id,
    level1_days, level2_days, level3_days,
    level1_fee, level2_fee, level3_fee,
    level1_auto_send, level2_auto_send, level3_auto_send,
    level3_suspend_service, allow_service_when_overdue, auto_reactivate_on_payment,
    skip_dunning_process, custom_payment_terms_days, require_prepayment,
    dunning_contact_email, active, created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DunningPolicy {
    pub policy_id: String,
    pub customer_id: String,
    pub threshold_days: [i64; 3],
    pub fees: [f64; 3],
    pub auto_send: [bool; 3],
    pub level3_suspend_service: bool,
    pub allow_service_when_overdue: bool,
    pub auto_reactivate_on_payment: bool,
    pub skip_dunning_process: bool,
    pub custom_payment_terms_days: Option<i64>,
    pub require_prepayment: bool,
    pub dunning_contact_email: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl DunningPolicy {
    fn with_defaults(policy_id: String, customer_id: String, timestamp: String) -> Self {
        Self {
            policy_id,
            customer_id,
            threshold_days: DEFAULT_THRESHOLD_DAYS,
            fees: DEFAULT_FEES,
            auto_send: [true; 3],
            level3_suspend_service: true,
            allow_service_when_overdue: true,
            auto_reactivate_on_payment: true,
            skip_dunning_process: false,
            custom_payment_terms_days: None,
            require_prepayment: false,
            dunning_contact_email: None,
            active: true,
            created_at: timestamp.clone(),
            updated_at: timestamp,
        }
    }

    /// Days overdue at which `level` becomes reachable. `None` for `Clean`.
    pub fn threshold_days(&self, level: DunningLevel) -> Option<i64> {
        level.policy_slot().map(|slot| self.threshold_days[slot])
    }

    pub fn fee(&self, level: DunningLevel) -> f64 {
        level.policy_slot().map_or(0.0, |slot| self.fees[slot])
    }

    pub fn auto_send(&self, level: DunningLevel) -> bool {
        level.policy_slot().is_some_and(|slot| self.auto_send[slot])
    }

    /// Exempt policies never escalate: skipped by the batch, refused by
    /// manual operations.
    pub fn is_exempt(&self) -> bool {
        self.skip_dunning_process || !self.active
    }

    pub fn exemption_reason(&self) -> Option<&'static str> {
        if self.skip_dunning_process {
            return Some("the policy skips the dunning process");
        }
        if !self.active {
            return Some("the policy is inactive");
        }
        None
    }

    pub fn payment_terms_days(&self) -> i64 {
        self.custom_payment_terms_days
            .unwrap_or(DEFAULT_PAYMENT_TERMS_DAYS)
    }

    fn apply(&mut self, overrides: &PolicyOverrides) {
        for (slot, value) in overrides.threshold_days.iter().enumerate() {
            if let Some(days) = value {
                self.threshold_days[slot] = *days;
            }
        }
        for (slot, value) in overrides.fees.iter().enumerate() {
            if let Some(fee) = value {
                self.fees[slot] = round_money(*fee);
            }
        }
        for (slot, value) in overrides.auto_send.iter().enumerate() {
            if let Some(flag) = value {
                self.auto_send[slot] = *flag;
            }
        }
        if let Some(flag) = overrides.level3_suspend_service {
            self.level3_suspend_service = flag;
        }
        if let Some(flag) = overrides.allow_service_when_overdue {
            self.allow_service_when_overdue = flag;
        }
        if let Some(flag) = overrides.auto_reactivate_on_payment {
            self.auto_reactivate_on_payment = flag;
        }
        if let Some(flag) = overrides.skip_dunning_process {
            self.skip_dunning_process = flag;
        }
        if let Some(terms) = overrides.custom_payment_terms_days {
            self.custom_payment_terms_days = terms;
        }
        if let Some(flag) = overrides.require_prepayment {
            self.require_prepayment = flag;
        }
        if let Some(contact) = &overrides.dunning_contact_email {
            self.dunning_contact_email = contact.as_ref().map(|value| value.trim().to_string());
        }
        if let Some(flag) = overrides.active {
            self.active = flag;
        }
    }

    fn validate(&self) -> ClientResult<()> {
        let [first, second, third] = self.threshold_days;
        if first < 0 || first >= second || second >= third {
            return Err(ClientError::invalid_argument_with_recovery(
                "Dunning thresholds must be non-negative and strictly increasing (level 1 < level 2 < level 3).",
                vec!["Pass thresholds such as `--level1-days 7 --level2-days 14 --level3-days 21`.".to_string()],
            )
            .with_data(json!({ "threshold_days": self.threshold_days })));
        }

        if self.fees.iter().any(|fee| !fee.is_finite() || *fee < 0.0) {
            return Err(ClientError::invalid_argument_with_recovery(
                "Dunning fees must be finite, non-negative amounts.",
                vec!["Pass fees such as `--level1-fee 5 --level2-fee 10 --level3-fee 15`.".to_string()],
            )
            .with_data(json!({ "fees": self.fees })));
        }

        if let Some(terms) = self.custom_payment_terms_days
            && terms < 0
        {
            return Err(ClientError::invalid_argument(
                "Custom payment terms must be zero or more days.",
            ));
        }

        if let Some(contact) = &self.dunning_contact_email
            && (contact.is_empty() || !contact.contains('@'))
        {
            return Err(ClientError::invalid_argument(
                "The dunning contact override must be an email address.",
            ));
        }

        Ok(())
    }
}

/// Partial update for a policy. `None` leaves a field untouched; the nested
/// options on nullable fields distinguish "clear" (`Some(None)`) from "keep".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyOverrides {
    pub threshold_days: [Option<i64>; 3],
    pub fees: [Option<f64>; 3],
    pub auto_send: [Option<bool>; 3],
    pub level3_suspend_service: Option<bool>,
    pub allow_service_when_overdue: Option<bool>,
    pub auto_reactivate_on_payment: Option<bool>,
    pub skip_dunning_process: Option<bool>,
    pub custom_payment_terms_days: Option<Option<i64>>,
    pub require_prepayment: Option<bool>,
    pub dunning_contact_email: Option<Option<String>>,
    pub active: Option<bool>,
}

impl PolicyOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Policy as read back for display: the stored configuration plus the
/// customer's suspension state, which lives only on the customer record.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyView {
    #[serde(flatten)]
    pub policy: DunningPolicy,
    pub suspension: SuspensionSnapshot,
}

pub fn create_policy(
    connection: &mut Connection,
    db_path: &Path,
    context: &DunningContext<'_>,
    customer_id: &str,
    overrides: &PolicyOverrides,
) -> ClientResult<DunningPolicy> {
    let actor = require_actor(context.actor, "create policy")?;
    let timestamp = format_timestamp(&context.now());

    let policy = with_immediate_transaction(connection, db_path, |transaction| {
        if load_customer(transaction, db_path, customer_id)?.is_none() {
            return Err(ClientError::customer_not_found(customer_id));
        }
        if let Some(existing) = load_policy_for_customer(transaction, db_path, customer_id)? {
            return Err(ClientError::duplicate_policy(customer_id, &existing.policy_id));
        }

        let mut policy = DunningPolicy::with_defaults(
            format!("pol_{}", Ulid::new()),
            customer_id.to_string(),
            timestamp.clone(),
        );
        policy.apply(overrides);
        policy.validate()?;

        transaction
            .execute(
                "INSERT INTO dunning_policies (
                    policy_id, customer_id,
                    level1_days, level2_days, level3_days,
                    level1_fee, level2_fee, level3_fee,
                    level1_auto_send, level2_auto_send, level3_auto_send,
                    level3_suspend_service, allow_service_when_overdue, auto_reactivate_on_payment,
                    skip_dunning_process, custom_payment_terms_days, require_prepayment,
                    dunning_contact_email, active, created_at, created_by, updated_at, updated_by
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?20, ?21)",
                params![
                    &policy.policy_id,
                    &policy.customer_id,
                    policy.threshold_days[0],
                    policy.threshold_days[1],
                    policy.threshold_days[2],
                    policy.fees[0],
                    policy.fees[1],
                    policy.fees[2],
                    policy.auto_send[0],
                    policy.auto_send[1],
                    policy.auto_send[2],
                    policy.level3_suspend_service,
                    policy.allow_service_when_overdue,
                    policy.auto_reactivate_on_payment,
                    policy.skip_dunning_process,
                    policy.custom_payment_terms_days,
                    policy.require_prepayment,
                    &policy.dunning_contact_email,
                    policy.active,
                    &timestamp,
                    actor.as_str(),
                ],
            )
            .map_err(|error| map_sqlite_error(db_path, &error))?;

        Ok(policy)
    })?;

    info!(
        policy_id = %policy.policy_id,
        customer_id = %policy.customer_id,
        actor = actor.as_str(),
        "dunning policy created"
    );
    Ok(policy)
}

pub fn update_policy(
    connection: &mut Connection,
    db_path: &Path,
    context: &DunningContext<'_>,
    policy_id: &str,
    overrides: &PolicyOverrides,
) -> ClientResult<DunningPolicy> {
    let actor = require_actor(context.actor, "update policy")?;
    let timestamp = format_timestamp(&context.now());

    let policy = with_immediate_transaction(connection, db_path, |transaction| {
        let mut policy = load_policy(transaction, db_path, policy_id)?
            .ok_or_else(|| ClientError::policy_not_found(policy_id))?;
        policy.apply(overrides);
        policy.validate()?;
        policy.updated_at = timestamp.clone();

        transaction
            .execute(
                "UPDATE dunning_policies SET
                    level1_days = ?2, level2_days = ?3, level3_days = ?4,
                    level1_fee = ?5, level2_fee = ?6, level3_fee = ?7,
                    level1_auto_send = ?8, level2_auto_send = ?9, level3_auto_send = ?10,
                    level3_suspend_service = ?11, allow_service_when_overdue = ?12,
                    auto_reactivate_on_payment = ?13, skip_dunning_process = ?14,
                    custom_payment_terms_days = ?15, require_prepayment = ?16,
                    dunning_contact_email = ?17, active = ?18, updated_at = ?19, updated_by = ?20
                 WHERE policy_id = ?1",
                params![
                    &policy.policy_id,
                    policy.threshold_days[0],
                    policy.threshold_days[1],
                    policy.threshold_days[2],
                    policy.fees[0],
                    policy.fees[1],
                    policy.fees[2],
                    policy.auto_send[0],
                    policy.auto_send[1],
                    policy.auto_send[2],
                    policy.level3_suspend_service,
                    policy.allow_service_when_overdue,
                    policy.auto_reactivate_on_payment,
                    policy.skip_dunning_process,
                    policy.custom_payment_terms_days,
                    policy.require_prepayment,
                    &policy.dunning_contact_email,
                    policy.active,
                    &timestamp,
                    actor.as_str(),
                ],
            )
            .map_err(|error| map_sqlite_error(db_path, &error))?;

        Ok(policy)
    })?;

    info!(policy_id = %policy.policy_id, actor = actor.as_str(), "dunning policy updated");
    Ok(policy)
}

pub fn load_policy(
    connection: &Connection,
    db_path: &Path,
    policy_id: &str,
) -> ClientResult<Option<DunningPolicy>> {
    connection
        .query_row(
            &format!("SELECT {POLICY_COLUMNS} FROM dunning_policies WHERE policy_id = ?1"),
            params![policy_id],
            policy_from_row,
        )
        .optional()
        .map_err(|error| map_sqlite_error(db_path, &error))
}

pub fn load_policy_for_customer(
    connection: &Connection,
    db_path: &Path,
    customer_id: &str,
) -> ClientResult<Option<DunningPolicy>> {
    connection
        .query_row(
            &format!("SELECT {POLICY_COLUMNS} FROM dunning_policies WHERE customer_id = ?1"),
            params![customer_id],
            policy_from_row,
        )
        .optional()
        .map_err(|error| map_sqlite_error(db_path, &error))
}

pub fn load_policy_view(
    connection: &Connection,
    db_path: &Path,
    customer_id: &str,
) -> ClientResult<PolicyView> {
    let customer = load_customer(connection, db_path, customer_id)?
        .ok_or_else(|| ClientError::customer_not_found(customer_id))?;
    let policy = load_policy_for_customer(connection, db_path, customer_id)?.ok_or_else(|| {
        ClientError::new(
            "policy_not_found",
            &format!("Customer `{customer_id}` has no dunning policy."),
            vec![format!("Create one with `overdue policy create {customer_id}`.")],
        )
    })?;

    Ok(PolicyView {
        policy,
        suspension: customer.suspension,
    })
}

fn policy_from_row(row: &Row<'_>) -> rusqlite::Result<DunningPolicy> {
    Ok(DunningPolicy {
        policy_id: row.get(0)?,
        customer_id: row.get(1)?,
        threshold_days: [row.get(2)?, row.get(3)?, row.get(4)?],
        fees: [row.get(5)?, row.get(6)?, row.get(7)?],
        auto_send: [row.get(8)?, row.get(9)?, row.get(10)?],
        level3_suspend_service: row.get(11)?,
        allow_service_when_overdue: row.get(12)?,
        auto_reactivate_on_payment: row.get(13)?,
        skip_dunning_process: row.get(14)?,
        custom_payment_terms_days: row.get(15)?,
        require_prepayment: row.get(16)?,
        dunning_contact_email: row.get(17)?,
        active: row.get(18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
    })
}

pub(crate) fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::{DunningPolicy, PolicyOverrides, round_money};
    use crate::dunning::level::DunningLevel;

    fn default_policy() -> DunningPolicy {
        DunningPolicy::with_defaults(
            "pol_test".to_string(),
            "cus_test".to_string(),
            "2026-01-01T00:00:00Z".to_string(),
        )
    }

    #[test]
    fn defaults_follow_seven_fourteen_twenty_one() {
        let policy = default_policy();
        assert_eq!(policy.threshold_days(DunningLevel::Level1), Some(7));
        assert_eq!(policy.threshold_days(DunningLevel::Level2), Some(14));
        assert_eq!(policy.threshold_days(DunningLevel::Level3), Some(21));
        assert_eq!(policy.threshold_days(DunningLevel::Clean), None);
        assert_eq!(policy.fee(DunningLevel::Level3), 15.0);
        assert_eq!(policy.fee(DunningLevel::Clean), 0.0);
        assert!(policy.auto_send(DunningLevel::Level2));
        assert!(!policy.is_exempt());
        assert_eq!(policy.payment_terms_days(), 30);
    }

    #[test]
    fn overrides_patch_only_named_fields() {
        let mut policy = default_policy();
        policy.apply(&PolicyOverrides {
            threshold_days: [None, Some(20), Some(40)],
            fees: [Some(2.499), None, None],
            dunning_contact_email: Some(Some(" ar@example.com ".to_string())),
            ..PolicyOverrides::default()
        });
        assert_eq!(policy.threshold_days, [7, 20, 40]);
        assert_eq!(policy.fees, [2.5, 10.0, 15.0]);
        assert_eq!(policy.dunning_contact_email.as_deref(), Some("ar@example.com"));
        assert!(policy.validate().is_ok());

        policy.apply(&PolicyOverrides {
            dunning_contact_email: Some(None),
            ..PolicyOverrides::default()
        });
        assert_eq!(policy.dunning_contact_email, None);
    }

    #[test]
    fn non_increasing_thresholds_are_rejected() {
        let mut policy = default_policy();
        policy.apply(&PolicyOverrides {
            threshold_days: [Some(14), Some(14), None],
            ..PolicyOverrides::default()
        });
        let result = policy.validate();
        assert!(result.is_err());
        if let Err(error) = result {
            assert_eq!(error.code, "invalid_argument");
        }
    }

    #[test]
    fn negative_fees_are_rejected() {
        let mut policy = default_policy();
        policy.apply(&PolicyOverrides {
            fees: [None, Some(-1.0), None],
            ..PolicyOverrides::default()
        });
        assert!(policy.validate().is_err());
    }

    #[test]
    fn inactive_or_skipping_policies_are_exempt() {
        let mut policy = default_policy();
        policy.active = false;
        assert!(policy.is_exempt());
        assert_eq!(policy.exemption_reason(), Some("the policy is inactive"));
        policy.active = true;
        policy.skip_dunning_process = true;
        assert_eq!(policy.exemption_reason(), Some("the policy skips the dunning process"));
    }

    #[test]
    fn money_rounds_to_cents() {
        assert_eq!(round_money(105.004), 105.0);
        assert_eq!(round_money(0.1 + 0.2), 0.3);
        assert!(PolicyOverrides::default().is_empty());
    }
}
