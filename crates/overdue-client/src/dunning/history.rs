use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;
use ulid::Ulid;

use crate::ClientResult;
use crate::dunning::clock::format_timestamp;
use crate::dunning::level::DunningLevel;
use crate::dunning::store::require_customer;
use crate::state::map_sqlite_error;

/// Whether a change came from the level-driven path or an operator override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Automatic,
    Manual,
}

impl EventSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "automatic" => Some(Self::Automatic),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Level1,
    Level2,
    Level3,
    Suspended,
    Reactivated,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Level1 => "level1",
            Self::Level2 => "level2",
            Self::Level3 => "level3",
            Self::Suspended => "suspended",
            Self::Reactivated => "reactivated",
        }
    }

    pub const fn for_level(level: DunningLevel) -> Option<Self> {
        match level {
            DunningLevel::Clean => None,
            DunningLevel::Level1 => Some(Self::Level1),
            DunningLevel::Level2 => Some(Self::Level2),
            DunningLevel::Level3 => Some(Self::Level3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DunningEvent {
    pub event_id: String,
    pub invoice_id: Option<String>,
    pub customer_id: String,
    pub kind: String,
    pub source: String,
    pub actor: String,
    pub fee: Option<f64>,
    pub total_after: Option<f64>,
    pub occurred_at: String,
    pub note: Option<String>,
}

pub(crate) struct NewEvent<'a> {
    pub(crate) invoice_id: Option<&'a str>,
    pub(crate) customer_id: &'a str,
    pub(crate) kind: EventKind,
    pub(crate) source: EventSource,
    pub(crate) actor: &'a str,
    pub(crate) fee: Option<f64>,
    pub(crate) total_after: Option<f64>,
    pub(crate) occurred_at: &'a DateTime<Utc>,
    pub(crate) note: Option<&'a str>,
}

pub(crate) fn record_event(
    connection: &Connection,
    db_path: &Path,
    event: &NewEvent<'_>,
) -> ClientResult<String> {
    let event_id = format!("evt_{}", Ulid::new());
    connection
        .execute(
            "INSERT INTO dunning_events (
                event_id, invoice_id, customer_id, kind, source, actor,
                fee, total_after, occurred_at, note
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &event_id,
                event.invoice_id,
                event.customer_id,
                event.kind.as_str(),
                event.source.as_str(),
                event.actor,
                event.fee,
                event.total_after,
                format_timestamp(event.occurred_at),
                event.note,
            ],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    Ok(event_id)
}

/// Every transition, suspension and reactivation recorded for a customer,
/// newest first.
pub fn customer_history(
    connection: &Connection,
    db_path: &Path,
    customer_id: &str,
) -> ClientResult<Vec<DunningEvent>> {
    require_customer(connection, db_path, customer_id)?;

    let mut statement = connection
        .prepare(
            "SELECT event_id, invoice_id, customer_id, kind, source, actor,
                    fee, total_after, occurred_at, note
             FROM dunning_events
             WHERE customer_id = ?1
             ORDER BY occurred_at DESC, rowid DESC",
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let rows_iter = statement
        .query_map(params![customer_id], |row| {
            Ok(DunningEvent {
                event_id: row.get(0)?,
                invoice_id: row.get(1)?,
                customer_id: row.get(2)?,
                kind: row.get(3)?,
                source: row.get(4)?,
                actor: row.get(5)?,
                fee: row.get(6)?,
                total_after: row.get(7)?,
                occurred_at: row.get(8)?,
                note: row.get(9)?,
            })
        })
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let mut events = Vec::new();
    for row in rows_iter {
        events.push(row.map_err(|error| map_sqlite_error(db_path, &error))?);
    }
    Ok(events)
}
