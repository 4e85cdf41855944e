use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::migrations::{
    EXPECTED_USER_VERSION, REQUIRED_INDEX_NAMES, REQUIRED_META_KEYS, run_pending,
    safe_repair_statement,
};
use crate::state::{
    ensure_ledger_directory, ledger_db_path, map_sqlite_error, open_connection, resolve_ledger_home,
};
use crate::{ClientError, ClientResult};

const CUSTOMERS_COLUMNS: [&str; 9] = [
    "customer_id",
    "name",
    "email",
    "service_suspended",
    "suspended_reason",
    "suspended_at",
    "suspended_by",
    "suspension_source",
    "reactivated_at",
];
const DUNNING_POLICIES_COLUMNS: [&str; 19] = [
    "policy_id",
    "customer_id",
    "level1_days",
    "level2_days",
    "level3_days",
    "level1_fee",
    "level2_fee",
    "level3_fee",
    "level1_auto_send",
    "level2_auto_send",
    "level3_auto_send",
    "level3_suspend_service",
    "allow_service_when_overdue",
    "auto_reactivate_on_payment",
    "skip_dunning_process",
    "custom_payment_terms_days",
    "require_prepayment",
    "dunning_contact_email",
    "active",
];
const INVOICES_COLUMNS: [&str; 12] = [
    "invoice_id",
    "customer_id",
    "number",
    "issued_at",
    "due_at",
    "status",
    "total_amount",
    "currency",
    "dunning_level",
    "dunning_fee",
    "last_dunning_at",
    "paid_at",
];
const DUNNING_EVENTS_COLUMNS: [&str; 10] = [
    "event_id",
    "invoice_id",
    "customer_id",
    "kind",
    "source",
    "actor",
    "fee",
    "total_after",
    "occurred_at",
    "note",
];

const REQUIRED_CORE_TABLES: [(&str, &[&str]); 4] = [
    ("customers", &CUSTOMERS_COLUMNS),
    ("dunning_policies", &DUNNING_POLICIES_COLUMNS),
    ("invoices", &INVOICES_COLUMNS),
    ("dunning_events", &DUNNING_EVENTS_COLUMNS),
];

/// A ledger that passed migration, verification and repair.
#[derive(Debug, Clone)]
pub struct SetupContext {
    pub db_path: PathBuf,
    pub schema_version: String,
}

pub fn ensure_initialized_at(home_override: &Path) -> ClientResult<SetupContext> {
    ensure_initialized_with_home_override(Some(home_override))
}

/// Opens (creating when needed) the ledger under the resolved home, applies
/// pending migrations, and checks the dunning tables before any command
/// touches them. Missing indexes and meta rows are recreated; a missing
/// table or column means the file is not a ledger this build can use.
pub fn ensure_initialized_with_home_override(
    home_override: Option<&Path>,
) -> ClientResult<SetupContext> {
    let ledger_home = resolve_ledger_home(home_override)?;
    ensure_ledger_directory(&ledger_home)?;

    let db_path = ledger_db_path(&ledger_home);
    let mut connection = open_connection(&db_path)?;
    run_pending(&mut connection).map_err(|error| map_migration_error(&db_path, &error))?;

    let schema = SchemaProbe {
        connection: &connection,
        db_path: &db_path,
    };
    schema.verify_core_tables()?;
    schema.repair_meta_and_indexes()?;
    schema.verify_version_and_indexes()?;
    let schema_version = schema.schema_version()?;

    Ok(SetupContext {
        db_path,
        schema_version,
    })
}

fn map_migration_error(db_path: &Path, error: &rusqlite_migration::Error) -> ClientError {
    if let rusqlite_migration::Error::RusqliteError { err, .. } = error {
        let mapped = map_sqlite_error(db_path, err);
        if matches!(
            mapped.code.as_str(),
            "ledger_locked" | "ledger_corrupt" | "ledger_init_permission_denied"
        ) {
            return mapped;
        }
    }
    ClientError::migration_failed(db_path, &error.to_string())
}

struct SchemaProbe<'a> {
    connection: &'a Connection,
    db_path: &'a Path,
}

impl SchemaProbe<'_> {
    fn verify_core_tables(&self) -> ClientResult<()> {
        for (table_name, required_columns) in REQUIRED_CORE_TABLES {
            if !self.object_exists("table", table_name)? {
                warn!(table = table_name, "ledger is missing a core table");
                return Err(ClientError::ledger_corrupt(self.db_path));
            }

            let columns = self.table_columns(table_name)?;
            if let Some(missing) = required_columns
                .iter()
                .find(|required| !columns.iter().any(|column| column == *required))
            {
                warn!(table = table_name, column = *missing, "ledger is missing a column");
                return Err(ClientError::ledger_corrupt(self.db_path));
            }
        }
        Ok(())
    }

    fn repair_meta_and_indexes(&self) -> ClientResult<()> {
        for (meta_key, default_value) in REQUIRED_META_KEYS {
            let inserted = self
                .connection
                .execute(
                    "INSERT OR IGNORE INTO internal_meta (key, value) VALUES (?1, ?2)",
                    params![meta_key, default_value],
                )
                .map_err(|error| map_sqlite_error(self.db_path, &error))?;
            if inserted > 0 {
                debug!(key = meta_key, "restored ledger meta row");
            }
        }

        for index_name in REQUIRED_INDEX_NAMES {
            if self.object_exists("index", index_name)? {
                continue;
            }
            let sql = safe_repair_statement(index_name).ok_or_else(|| {
                ClientError::ledger_init_failed(self.db_path, "Missing canonical SQL for index repair.")
            })?;
            self.connection
                .execute_batch(&sql)
                .map_err(|error| map_sqlite_error(self.db_path, &error))?;
            debug!(index = index_name, "recreated ledger index");
        }
        Ok(())
    }

    fn verify_version_and_indexes(&self) -> ClientResult<()> {
        let user_version = self
            .connection
            .query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0))
            .map_err(|error| map_sqlite_error(self.db_path, &error))?;
        if user_version != EXPECTED_USER_VERSION {
            return Err(ClientError::ledger_corrupt(self.db_path));
        }

        for index_name in REQUIRED_INDEX_NAMES {
            if !self.object_exists("index", index_name)? {
                return Err(ClientError::ledger_corrupt(self.db_path));
            }
        }
        Ok(())
    }

    fn object_exists(&self, object_type: &str, object_name: &str) -> ClientResult<bool> {
        let found = self
            .connection
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2 LIMIT 1",
                params![object_type, object_name],
                |_row| Ok(()),
            )
            .optional()
            .map_err(|error| map_sqlite_error(self.db_path, &error))?;
        Ok(found.is_some())
    }

    fn table_columns(&self, table_name: &str) -> ClientResult<Vec<String>> {
        if !REQUIRED_CORE_TABLES
            .iter()
            .any(|(required_name, _)| *required_name == table_name)
        {
            return Err(ClientError::ledger_init_failed(
                self.db_path,
                "Refused PRAGMA table inspection for non-core table.",
            ));
        }

        // `table_name` comes from REQUIRED_CORE_TABLES only.
        let sql = format!("PRAGMA table_info({table_name})");
        let mut statement = self
            .connection
            .prepare(&sql)
            .map_err(|error| map_sqlite_error(self.db_path, &error))?;
        let rows = statement
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(|error| map_sqlite_error(self.db_path, &error))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|error| map_sqlite_error(self.db_path, &error))
    }

    fn schema_version(&self) -> ClientResult<String> {
        let value = self
            .connection
            .query_row(
                "SELECT value FROM internal_meta WHERE key = 'schema_version' LIMIT 1",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|error| map_sqlite_error(self.db_path, &error))?;
        Ok(value.unwrap_or_else(|| "v1".to_string()))
    }
}
