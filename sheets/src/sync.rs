use chrono::{DateTime, FixedOffset, Utc};
use tic_core::config::RemoteLogConfig;
use tracing::{debug, info};

use crate::adapters::{GoogleSheetsStore, ServiceAccountKey};
use crate::errors::{SheetsError, SheetsResult};
use crate::store::{CellValue, LogColumn, RowStoreRef};

use std::sync::Arc;

/// Timestamp format written to the log sheet
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One session's row in the shared log sheet.
///
/// Keyed by `(login_timestamp, user_id)`. `session_ordinal` is derived on
/// every save from the rows already in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteLogRow {
    pub login_timestamp: String,
    pub last_update_timestamp: String,
    pub user_id: String,
    pub duration_minutes: f64,
    pub session_ordinal: u32,
    pub transcript_text: String,
}

impl RemoteLogRow {
    /// Builds a row from the session start and the current time, both
    /// rendered in the sheet's fixed offset
    pub fn new(
        user_id: impl Into<String>,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
        offset: FixedOffset,
        transcript_text: impl Into<String>,
    ) -> Self {
        let seconds = (now - started_at).num_milliseconds().max(0) as f64 / 1000.0;
        Self {
            login_timestamp: format_timestamp(started_at, offset),
            last_update_timestamp: format_timestamp(now, offset),
            user_id: user_id.into(),
            duration_minutes: (seconds / 60.0 * 100.0).round() / 100.0,
            session_ordinal: 0,
            transcript_text: transcript_text.into(),
        }
    }

    pub fn cells(&self) -> Vec<CellValue> {
        vec![
            self.login_timestamp.clone().into(),
            self.last_update_timestamp.clone().into(),
            self.user_id.clone().into(),
            self.duration_minutes.into(),
            (self.session_ordinal as f64).into(),
            self.transcript_text.clone().into(),
        ]
    }
}

pub fn format_timestamp(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format(TIMESTAMP_FORMAT).to_string()
}

/// What an upsert did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// One-based row the session now occupies
    pub row_number: usize,
    pub session_ordinal: u32,
    pub inserted: bool,
}

/// Keeps each session's row in the shared store current.
///
/// Concurrent upserts for different keys touch disjoint rows. Concurrent
/// upserts for the same key (one user in two terminals started in the same
/// second) race: the last write wins, and two appends can both land if
/// both lookups miss.
#[derive(Debug, Clone)]
pub struct RemoteLogSync {
    store: RowStoreRef,
    header_rows: usize,
    offset: FixedOffset,
}

impl RemoteLogSync {
    pub fn new(store: RowStoreRef, header_rows: usize, offset: FixedOffset) -> Self {
        Self {
            store,
            header_rows,
            offset,
        }
    }

    /// Builds the Google Sheets backed sync, or `None` when remote logging is disabled
    pub fn from_config(config: &RemoteLogConfig) -> SheetsResult<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }

        let spreadsheet_id = config.spreadsheet_id.clone().ok_or_else(|| {
            SheetsError::Config("remote_log.spreadsheet_id is required".to_string())
        })?;
        let key_path = config.service_account_key_path.as_ref().ok_or_else(|| {
            SheetsError::Config("remote_log.service_account_key_path is required".to_string())
        })?;
        let key = ServiceAccountKey::from_file(key_path)?;
        let offset = fixed_offset(config.utc_offset_hours)?;

        let store = GoogleSheetsStore::new(spreadsheet_id, config.worksheet.clone(), key)?;
        info!(worksheet = %config.worksheet, "Remote session log enabled");
        Ok(Some(Self::new(Arc::new(store), config.header_rows, offset)))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn store(&self) -> &RowStoreRef {
        &self.store
    }

    /// Updates the session's row in place, or appends it if this is the
    /// session's first save. Fills in `session_ordinal`.
    pub async fn upsert(&self, mut row: RemoteLogRow) -> SheetsResult<UpsertOutcome> {
        let logins = self.store.read_column(LogColumn::LoginTimestamp).await?;
        let user_ids = self.store.read_column(LogColumn::UserId).await?;

        let existing = (self.header_rows..logins.len()).find(|&i| {
            logins[i] == row.login_timestamp
                && user_ids.get(i).is_some_and(|id| *id == row.user_id)
        });

        let mut ordinal = user_ids
            .iter()
            .skip(self.header_rows)
            .filter(|id| **id == row.user_id)
            .count();
        if existing.is_none() {
            ordinal += 1;
        }
        row.session_ordinal = ordinal as u32;

        let outcome = match existing {
            Some(index) => {
                let row_number = index + 1;
                self.store.overwrite_row(row_number, row.cells()).await?;
                UpsertOutcome {
                    row_number,
                    session_ordinal: row.session_ordinal,
                    inserted: false,
                }
            }
            None => {
                self.store.append_row(row.cells()).await?;
                UpsertOutcome {
                    row_number: logins.len().max(user_ids.len()).max(self.header_rows) + 1,
                    session_ordinal: row.session_ordinal,
                    inserted: true,
                }
            }
        };

        debug!(
            user_id = %row.user_id,
            login = %row.login_timestamp,
            ordinal = outcome.session_ordinal,
            inserted = outcome.inserted,
            "Upserted session log row"
        );
        Ok(outcome)
    }
}

pub fn fixed_offset(hours: i32) -> SheetsResult<FixedOffset> {
    hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| SheetsError::Config(format!("Invalid UTC offset: {} hours", hours)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryRowStore;
    use chrono::TimeZone;

    const HEADER: [&str; 6] = ["login", "last_update", "user_id", "minutes", "ordinal", "transcript"];

    fn sync_with_store() -> (RemoteLogSync, InMemoryRowStore) {
        let store = InMemoryRowStore::with_header(&HEADER);
        let sync = RemoteLogSync::new(Arc::new(store.clone()), 1, fixed_offset(8).unwrap());
        (sync, store)
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, h, m, s).unwrap()
    }

    fn row(user: &str, start: DateTime<Utc>, now: DateTime<Utc>, text: &str) -> RemoteLogRow {
        RemoteLogRow::new(user, start, now, fixed_offset(8).unwrap(), text)
    }

    #[test]
    fn test_row_times_use_offset_and_round_minutes() {
        let r = row("001", at(1, 0, 0), at(1, 2, 20), "x");
        assert_eq!(r.login_timestamp, "2025-03-01 09:00:00");
        assert_eq!(r.last_update_timestamp, "2025-03-01 09:02:20");
        assert_eq!(r.duration_minutes, 2.33);
    }

    #[tokio::test]
    async fn test_repeated_upsert_keeps_one_row() {
        let (sync, store) = sync_with_store();

        let first = sync.upsert(row("001", at(1, 0, 0), at(1, 1, 0), "turn 1")).await.unwrap();
        assert!(first.inserted);
        assert_eq!(first.row_number, 2);
        assert_eq!(first.session_ordinal, 1);

        let second = sync.upsert(row("001", at(1, 0, 0), at(1, 5, 0), "turn 1\nturn 2")).await.unwrap();
        assert!(!second.inserted);
        assert_eq!(second.row_number, 2);
        assert_eq!(second.session_ordinal, 1);

        assert_eq!(store.len(), 2);
        let data = &store.rows()[1];
        assert_eq!(data[1], CellValue::from("2025-03-01 09:05:00"));
        assert_eq!(data[3], CellValue::from(5.0));
        assert_eq!(data[5], CellValue::from("turn 1\nturn 2"));
    }

    #[tokio::test]
    async fn test_ordinal_counts_sessions_per_user() {
        let (sync, store) = sync_with_store();

        for n in 1..=3u32 {
            let start = at(n, 0, 0);
            let outcome = sync.upsert(row("001", start, start, "hello")).await.unwrap();
            assert_eq!(outcome.session_ordinal, n);
            // later saves of the same session keep the ordinal
            let again = sync.upsert(row("001", start, at(n, 10, 0), "hello again")).await.unwrap();
            assert_eq!(again.session_ordinal, n);
        }

        let other = sync.upsert(row("002", at(5, 0, 0), at(5, 0, 0), "hi")).await.unwrap();
        assert_eq!(other.session_ordinal, 1);
        assert_eq!(store.len(), 5);
    }

    #[tokio::test]
    async fn test_same_login_different_users_are_distinct_rows() {
        let (sync, store) = sync_with_store();
        sync.upsert(row("001", at(1, 0, 0), at(1, 0, 0), "a")).await.unwrap();
        sync.upsert(row("002", at(1, 0, 0), at(1, 0, 0), "b")).await.unwrap();
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_header_is_never_matched() {
        let store = InMemoryRowStore::with_header(&["login", "x", "001", "m", "o", "t"]);
        let sync = RemoteLogSync::new(Arc::new(store.clone()), 1, fixed_offset(0).unwrap());

        let mut r = row("001", at(1, 0, 0), at(1, 0, 0), "a");
        r.login_timestamp = "login".to_string();
        let outcome = sync.upsert(r).await.unwrap();

        assert!(outcome.inserted);
        assert_eq!(outcome.session_ordinal, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_offset_out_of_range_is_config_error() {
        assert_eq!(fixed_offset(-5).unwrap().local_minus_utc(), -5 * 3600);
        assert!(matches!(fixed_offset(30), Err(SheetsError::Config(_))));
        assert!(matches!(fixed_offset(i32::MAX), Err(SheetsError::Config(_))));
    }

    #[tokio::test]
    async fn test_concurrent_sessions_land_in_disjoint_rows() {
        let (sync, store) = sync_with_store();

        let (a, b) = tokio::join!(
            sync.upsert(row("001", at(1, 0, 0), at(1, 1, 0), "from 001")),
            sync.upsert(row("002", at(1, 0, 5), at(1, 1, 0), "from 002")),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(a.inserted && b.inserted);

        let (a2, b2) = tokio::join!(
            sync.upsert(row("001", at(1, 0, 0), at(1, 2, 0), "from 001 again")),
            sync.upsert(row("002", at(1, 0, 5), at(1, 2, 0), "from 002 again")),
        );
        assert!(!a2.unwrap().inserted);
        assert!(!b2.unwrap().inserted);

        let rows = store.rows();
        assert_eq!(rows.len(), 3);
        for (user, text) in [("001", "from 001 again"), ("002", "from 002 again")] {
            let matching: Vec<_> = rows[1..]
                .iter()
                .filter(|r| r[2] == CellValue::from(user))
                .collect();
            assert_eq!(matching.len(), 1, "user {user}");
            assert_eq!(matching[0][4], CellValue::from(1.0));
            assert_eq!(matching[0][5], CellValue::from(text));
        }
    }

    #[test]
    fn test_disabled_config_builds_nothing() {
        let config = RemoteLogConfig::default();
        assert!(RemoteLogSync::from_config(&config).unwrap().is_none());

        let config = RemoteLogConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(matches!(
            RemoteLogSync::from_config(&config),
            Err(SheetsError::Config(_))
        ));
    }
}
