//! Shared SQLite helpers for the ledger store.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use rusqlite::types::Type;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::str::FromStr;

use reprotrack_types::UnknownCode;

/// Open a SQLite database at `path`, creating the parent directory if needed.
pub(crate) fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    Connection::open(path).with_context(|| format!("Failed to open ledger at {}", path.display()))
}

/// Parse a stored code column into its domain enum.
pub(crate) fn parse_code<T>(idx: usize, code: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownCode>,
{
    code.parse().map_err(|e: UnknownCode| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

/// `?,?,?` with `n` placeholders, for `IN (...)` filters.
pub(crate) fn placeholders(n: usize) -> String {
    let mut out = String::with_capacity(n * 2);
    for i in 0..n {
        if i > 0 {
            out.push(',');
        }
        out.push('?');
    }
    out
}

/// Fixed-width RFC 3339 timestamp; sorts lexicographically.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_json<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::{parse_timestamp, placeholders, timestamp};
    use chrono::{TimeZone, Utc};

    #[test]
    fn placeholders_are_comma_separated() {
        assert_eq!(placeholders(0), "");
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?,?,?");
    }

    #[test]
    fn timestamps_are_fixed_width_and_parse_back() {
        let early = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let late = early + chrono::Duration::nanoseconds(500);

        let (a, b) = (timestamp(early), timestamp(late));
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_timestamp(0, &b).unwrap(), late);
    }
}
