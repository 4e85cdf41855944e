use rusqlite::Connection;
use rusqlite_migration::{M, Migrations};

const BOOTSTRAP_SQL: &str = include_str!("migrations/0001_bootstrap.sql");

pub const EXPECTED_USER_VERSION: i64 = 1;

pub const REQUIRED_INDEX_NAMES: [&str; 3] = [
    "idx_invoices_status_invoice_id",
    "idx_invoices_customer_status",
    "idx_dunning_events_customer_occurred_at",
];

pub const REQUIRED_META_KEYS: [(&str, &str); 1] = [("schema_version", "v1")];

pub fn run_pending(conn: &mut Connection) -> rusqlite_migration::Result<()> {
    let migrations = Migrations::new(vec![M::up(BOOTSTRAP_SQL)]);
    migrations.to_latest(conn)
}

/// The `CREATE ... IF NOT EXISTS` block tagged `name` in the bootstrap SQL.
/// Setup replays these when an index or meta row has gone missing.
pub fn safe_repair_statement(name: &str) -> Option<String> {
    let start = format!("-- overdue:safe_repair:start:{name}");
    let end = format!("-- overdue:safe_repair:end:{name}");

    let body = BOOTSTRAP_SQL
        .lines()
        .skip_while(|line| line.trim() != start)
        .skip(1)
        .take_while(|line| line.trim() != end)
        .collect::<Vec<_>>();

    let closed = BOOTSTRAP_SQL.lines().any(|line| line.trim() == end);
    let sql = body.join("\n").trim().to_string();
    (closed && !sql.is_empty()).then_some(sql)
}
