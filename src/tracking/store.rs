//! SQLite persistence for tracked pump events.
//!
//! All access goes through the [`TrackingStore`] trait so the scan cycle and
//! the reversal monitor never touch SQL directly. The schema lives in `sql/`
//! and is applied at startup by [`run_schema_migrations`].

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::tracking::event::{EventOutcome, EventState, TrackedEvent};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("event has no row id, insert it first")]
    Unsaved,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Column list shared by every SELECT so the row mapper stays in one place.
const EVENT_COLUMNS: &str = "id, profile, symbol, detected_at, detection_price, detection_volume, \
     pump_percent, pre_pump_price, deadline, lowest_price, highest_price, last_price, \
     last_checked_at, max_drop_from_high_pct, time_to_25pct_secs, time_to_50pct_secs, \
     time_to_75pct_secs, time_to_full_reversal_secs, state, outcome, closed_at";

/// Persistence seam for tracked events and per-profile metadata.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Insert a freshly opened event, returning its row id. The partial
    /// unique index rejects a second open event for the same
    /// (profile, symbol) pair.
    async fn insert_event(&self, event: &TrackedEvent) -> Result<i64, StoreError>;

    /// Persist the mutable monitoring fields of an existing event.
    async fn update_event(&self, event: &TrackedEvent) -> Result<(), StoreError>;

    async fn get_event(&self, id: i64) -> Result<Option<TrackedEvent>, StoreError>;

    async fn has_open_event(&self, profile: &str, symbol: &str) -> Result<bool, StoreError>;

    /// Open events for a profile, oldest detection first.
    async fn list_open_events(&self, profile: &str) -> Result<Vec<TrackedEvent>, StoreError>;

    /// Closed events for a profile, newest detection first, optionally
    /// narrowed to one symbol.
    async fn list_closed_events(
        &self,
        profile: &str,
        symbol: Option<&str>,
    ) -> Result<Vec<TrackedEvent>, StoreError>;

    async fn count_closed_events(&self, profile: &str) -> Result<i64, StoreError>;

    /// Marker of the last published stats run, if any.
    async fn pinned_marker(&self, profile: &str) -> Result<Option<i64>, StoreError>;

    async fn set_pinned_marker(
        &self,
        profile: &str,
        marker: i64,
        published_at: i64,
    ) -> Result<(), StoreError>;
}

/// Apply every `.sql` file in `schema_dir` in lexical order.
pub fn run_schema_migrations(conn: &Connection, schema_dir: &Path) -> Result<(), StoreError> {
    // PRAGMA journal_mode returns a result row, so pragma_update it is
    conn.pragma_update(None, "journal_mode", "WAL")?;

    let mut scripts: Vec<_> = std::fs::read_dir(schema_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().map(|ext| ext == "sql").unwrap_or(false))
        .collect();
    scripts.sort();

    if scripts.is_empty() {
        return Err(StoreError::Schema(format!(
            "no .sql files found in {}",
            schema_dir.display()
        )));
    }

    log::info!("🗄️  Applying schema from {}", schema_dir.display());
    for script in &scripts {
        let name = script
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| script.display().to_string());
        log::info!("  ├─ {}", name);
        let sql = std::fs::read_to_string(script)?;
        conn.execute_batch(&sql)?;
    }
    log::info!("  └─ ✅ {} migration(s) applied", scripts.len());

    Ok(())
}

/// [`TrackingStore`] backed by a single shared SQLite connection.
pub struct SqliteTrackingStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTrackingStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Open (or create) the database at `db_path` and bring the schema up
    /// to date.
    pub fn open(db_path: &Path, schema_dir: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        run_schema_migrations(&conn, schema_dir)?;
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }
}

fn row_to_event(row: &Row) -> rusqlite::Result<TrackedEvent> {
    let state_raw: String = row.get(18)?;
    let state = EventState::from_str(&state_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            18,
            rusqlite::types::Type::Text,
            format!("unknown event state '{state_raw}'").into(),
        )
    })?;

    let outcome = match row.get::<_, Option<String>>(19)? {
        Some(raw) => Some(EventOutcome::from_str(&raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                19,
                rusqlite::types::Type::Text,
                format!("unknown event outcome '{raw}'").into(),
            )
        })?),
        None => None,
    };

    Ok(TrackedEvent {
        id: Some(row.get(0)?),
        profile: row.get(1)?,
        symbol: row.get(2)?,
        detected_at: row.get(3)?,
        detection_price: row.get(4)?,
        detection_volume: row.get(5)?,
        pump_percent: row.get(6)?,
        pre_pump_price: row.get(7)?,
        deadline: row.get(8)?,
        lowest_price: row.get(9)?,
        highest_price: row.get(10)?,
        last_price: row.get(11)?,
        last_checked_at: row.get(12)?,
        max_drop_from_high_pct: row.get(13)?,
        time_to_25pct_secs: row.get(14)?,
        time_to_50pct_secs: row.get(15)?,
        time_to_75pct_secs: row.get(16)?,
        time_to_full_reversal_secs: row.get(17)?,
        state,
        outcome,
        closed_at: row.get(20)?,
    })
}

#[async_trait]
impl TrackingStore for SqliteTrackingStore {
    async fn insert_event(&self, event: &TrackedEvent) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO pump_events (
                profile, symbol, detected_at, detection_price, detection_volume,
                pump_percent, pre_pump_price, deadline, lowest_price, highest_price,
                last_price, last_checked_at, max_drop_from_high_pct,
                time_to_25pct_secs, time_to_50pct_secs, time_to_75pct_secs,
                time_to_full_reversal_secs, state, outcome, closed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            params![
                event.profile,
                event.symbol,
                event.detected_at,
                event.detection_price,
                event.detection_volume,
                event.pump_percent,
                event.pre_pump_price,
                event.deadline,
                event.lowest_price,
                event.highest_price,
                event.last_price,
                event.last_checked_at,
                event.max_drop_from_high_pct,
                event.time_to_25pct_secs,
                event.time_to_50pct_secs,
                event.time_to_75pct_secs,
                event.time_to_full_reversal_secs,
                event.state.as_str(),
                event.outcome.map(|o| o.as_str()),
                event.closed_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn update_event(&self, event: &TrackedEvent) -> Result<(), StoreError> {
        let id = event.id.ok_or(StoreError::Unsaved)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE pump_events SET
                lowest_price = ?1, highest_price = ?2, last_price = ?3,
                last_checked_at = ?4, max_drop_from_high_pct = ?5,
                time_to_25pct_secs = ?6, time_to_50pct_secs = ?7,
                time_to_75pct_secs = ?8, time_to_full_reversal_secs = ?9,
                state = ?10, outcome = ?11, closed_at = ?12
             WHERE id = ?13",
            params![
                event.lowest_price,
                event.highest_price,
                event.last_price,
                event.last_checked_at,
                event.max_drop_from_high_pct,
                event.time_to_25pct_secs,
                event.time_to_50pct_secs,
                event.time_to_75pct_secs,
                event.time_to_full_reversal_secs,
                event.state.as_str(),
                event.outcome.map(|o| o.as_str()),
                event.closed_at,
                id,
            ],
        )?;
        Ok(())
    }

    async fn get_event(&self, id: i64) -> Result<Option<TrackedEvent>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let event = conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM pump_events WHERE id = ?1"),
                params![id],
                row_to_event,
            )
            .optional()?;
        Ok(event)
    }

    async fn has_open_event(&self, profile: &str, symbol: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pump_events WHERE profile = ?1 AND symbol = ?2 AND state = 'open'",
            params![profile, symbol],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn list_open_events(&self, profile: &str) -> Result<Vec<TrackedEvent>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM pump_events
             WHERE profile = ?1 AND state = 'open' ORDER BY detected_at ASC"
        ))?;
        let events = stmt
            .query_map(params![profile], row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    async fn list_closed_events(
        &self,
        profile: &str,
        symbol: Option<&str>,
    ) -> Result<Vec<TrackedEvent>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let events = match symbol {
            Some(symbol) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM pump_events
                     WHERE profile = ?1 AND symbol = ?2 AND state = 'closed'
                     ORDER BY detected_at DESC"
                ))?;
                stmt.query_map(params![profile, symbol], row_to_event)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM pump_events
                     WHERE profile = ?1 AND state = 'closed' ORDER BY detected_at DESC"
                ))?;
                stmt.query_map(params![profile], row_to_event)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(events)
    }

    async fn count_closed_events(&self, profile: &str) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pump_events WHERE profile = ?1 AND state = 'closed'",
            params![profile],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    async fn pinned_marker(&self, profile: &str) -> Result<Option<i64>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let marker = conn
            .query_row(
                "SELECT pinned_marker FROM profile_meta WHERE profile = ?1",
                params![profile],
                |row| row.get(0),
            )
            .optional()?;
        Ok(marker)
    }

    async fn set_pinned_marker(
        &self,
        profile: &str,
        marker: i64,
        published_at: i64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO profile_meta (profile, pinned_marker, stats_published_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(profile) DO UPDATE SET
                pinned_marker = excluded.pinned_marker,
                stats_published_at = excluded.stats_published_at",
            params![profile, marker, published_at],
        )?;
        Ok(())
    }
}
