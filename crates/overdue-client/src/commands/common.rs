use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;

use crate::dunning::clock::{Clock, FixedClock, SystemClock, parse_timestamp_or_date};
use crate::dunning::DunningContext;
use crate::dunning::level::DunningLevel;
use crate::identity::require_actor;
use crate::setup::ensure_initialized_with_home_override;
use crate::state::open_connection;
use crate::{ClientError, ClientResult};

/// An initialized ledger and an open connection to it.
pub(crate) struct Session {
    pub(crate) db_path: PathBuf,
    pub(crate) connection: Connection,
}

pub(crate) fn open_session(home_override: Option<&Path>) -> ClientResult<Session> {
    let setup = ensure_initialized_with_home_override(home_override)?;
    let connection = open_connection(&setup.db_path)?;
    Ok(Session {
        db_path: setup.db_path,
        connection,
    })
}

/// Checks the caller's identity, then opens the ledger. An anonymous write
/// fails before the home directory or database is touched.
pub(crate) fn open_write_session(
    context: &DunningContext<'_>,
    operation: &str,
    home_override: Option<&Path>,
) -> ClientResult<Session> {
    require_actor(context.actor, operation)?;
    open_session(home_override)
}

/// A pinned instant when one was supplied, the system clock otherwise.
pub(crate) fn clock_for(now: Option<DateTime<Utc>>) -> Box<dyn Clock> {
    match now {
        Some(instant) => Box::new(FixedClock(instant)),
        None => Box::new(SystemClock),
    }
}

pub(crate) fn parse_date_argument(
    value: &str,
    flag: &str,
    command: &str,
) -> ClientResult<DateTime<Utc>> {
    parse_timestamp_or_date(value).ok_or_else(|| {
        ClientError::invalid_argument_for_command(
            &format!("`{flag}` must be a date (YYYY-MM-DD) or an RFC 3339 timestamp, got `{value}`."),
            Some(command),
        )
    })
}

/// Like [`parse_date_argument`], but a bare date covers the whole day.
pub(crate) fn parse_range_end(value: &str, flag: &str, command: &str) -> ClientResult<DateTime<Utc>> {
    let parsed = parse_date_argument(value, flag, command)?;
    if value.len() == 10 {
        return Ok(parsed + Duration::days(1) - Duration::seconds(1));
    }
    Ok(parsed)
}

pub(crate) fn parse_level_argument(value: i64, command: &str) -> ClientResult<DunningLevel> {
    DunningLevel::from_i64(value)
        .filter(|level| *level != DunningLevel::Clean)
        .ok_or_else(|| {
            ClientError::invalid_argument_for_command(
                &format!("Dunning level must be 1, 2 or 3, got {value}."),
                Some(command),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::{parse_date_argument, parse_level_argument, parse_range_end};

    #[test]
    fn range_end_dates_cover_the_whole_day() {
        let end = parse_range_end("2026-03-31", "--to", "report stats");
        assert!(end.is_ok());
        if let Ok(value) = end {
            assert_eq!(value.to_rfc3339(), "2026-03-31T23:59:59+00:00");
        }
    }

    #[test]
    fn malformed_dates_name_the_flag() {
        let result = parse_date_argument("31/03/2026", "--from", "report stats");
        assert!(result.is_err());
        if let Err(error) = result {
            assert_eq!(error.code, "invalid_argument");
            assert!(error.message.contains("--from"));
        }
    }

    #[test]
    fn level_zero_is_not_a_target() {
        assert!(parse_level_argument(0, "escalate").is_err());
        assert!(parse_level_argument(4, "escalate").is_err());
        assert!(parse_level_argument(2, "escalate").is_ok());
    }
}
