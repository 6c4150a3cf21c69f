use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};

use crate::record::{RecordEventRequest, RecordSink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub row_id: i64,
    pub request: RecordEventRequest,
    pub recorded_at: String,
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS recorded_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            match_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            player_id TEXT NOT NULL,
            team TEXT NOT NULL,
            event_time TEXT NOT NULL,
            created_by TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_recorded_events_match
            ON recorded_events (match_id, event_time);
        "#,
    )
    .context("init event log schema")?;
    Ok(())
}

pub fn insert_event(conn: &Connection, request: &RecordEventRequest) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO recorded_events (
            match_id, event_type, player_id, team, event_time, created_by, recorded_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            request.match_id,
            request.event_type,
            request.player_id,
            request.team,
            request.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            request.created_by,
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        ],
    )
    .context("insert recorded event")?;
    Ok(conn.last_insert_rowid())
}

/// Events of one match in match-time order.
pub fn load_match_events(conn: &Connection, match_id: &str) -> Result<Vec<StoredEvent>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, match_id, event_type, player_id, team, event_time, created_by, recorded_at
            FROM recorded_events
            WHERE match_id = ?1
            ORDER BY event_time ASC, id ASC
            "#,
        )
        .context("prepare load match events")?;
    let rows = stmt
        .query_map(params![match_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })
        .context("query load match events")?;

    let mut out = Vec::new();
    for row in rows {
        let (row_id, match_id, event_type, player_id, team, event_time, created_by, recorded_at) =
            row.context("decode event row")?;
        let timestamp = DateTime::parse_from_rfc3339(&event_time)
            .map_err(|err| anyhow!("bad event_time {event_time}: {err}"))?
            .with_timezone(&Utc);
        out.push(StoredEvent {
            row_id,
            request: RecordEventRequest {
                match_id,
                event_type,
                player_id,
                team,
                timestamp,
                created_by,
            },
            recorded_at,
        });
    }
    Ok(out)
}

pub fn count_by_type(conn: &Connection, match_id: &str) -> Result<BTreeMap<String, usize>> {
    let mut stmt = conn
        .prepare(
            "SELECT event_type, COUNT(*) FROM recorded_events WHERE match_id = ?1 GROUP BY event_type",
        )
        .context("prepare count by type")?;
    let rows = stmt
        .query_map(params![match_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })
        .context("query count by type")?;
    let mut out = BTreeMap::new();
    for row in rows {
        let (event_type, count) = row.context("decode count row")?;
        out.insert(event_type, usize::try_from(count).unwrap_or_default());
    }
    Ok(out)
}

/// Local event log as a record sink.
pub struct SqliteEventLog {
    conn: Connection,
}

impl SqliteEventLog {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl RecordSink for SqliteEventLog {
    fn submit(&mut self, request: &RecordEventRequest) -> Result<()> {
        insert_event(&self.conn, request).map(|_| ())
    }
}
