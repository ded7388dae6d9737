use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::{ClassificationRecord, Language, Lyrics, Status, Track, TrackId};

use super::migrations::MIGRATIONS;

const RECORD_COLUMNS: &str = "track_id, name, artists, added_at, status, lyrics_state, lyrics,
    scores, playlist_membership, needs_review, attempts, last_error, created_at, updated_at";

/// Number of records in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: u64,
    pub scored: u64,
    pub finalized: u64,
    pub failed: u64,
}

impl StatusCounts {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.pending + self.scored + self.finalized + self.failed
    }

    /// Records a run would still pick up.
    #[must_use]
    pub const fn outstanding(&self) -> u64 {
        self.pending + self.scored + self.failed
    }
}

/// The classification state store.
///
/// A single SQLite connection owned by one writer. Every write is a single
/// statement or a transaction, so a crash never leaves a record half
/// written.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database at the given path and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Get a reference to the underlying connection (for advanced queries).
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    fn apply_migrations(&self) -> Result<()> {
        // Create migrations table if it doesn't exist
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        let mut stmt = self
            .conn
            .prepare("SELECT version FROM schema_migrations ORDER BY version")?;
        let applied: Vec<u32> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for migration in MIGRATIONS {
            if !applied.contains(&migration.version) {
                log::info!(
                    "Applying migration {} ({})",
                    migration.version,
                    migration.name
                );
                let tx = self.conn.unchecked_transaction()?;
                tx.execute_batch(migration.sql)?;
                tx.execute(
                    "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    rusqlite::params![migration.version, migration.name],
                )?;
                tx.commit()?;
            }
        }

        Ok(())
    }
}

// Record reads
impl Database {
    /// Look up the record for a track.
    ///
    /// # Errors
    /// Returns [`Error::Corrupt`] when the stored row cannot be decoded.
    pub fn get_record(&self, track_id: &TrackId) -> Result<Option<ClassificationRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM tracks WHERE track_id = ?1"),
                [track_id.as_str()],
                RawRecord::from_row,
            )
            .optional()?;

        raw.map(RawRecord::decode).transpose()
    }

    /// All records in a given status, oldest saved first.
    pub fn list_by_status(&self, status: Status) -> Result<Vec<ClassificationRecord>> {
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM tracks WHERE status = ?1 ORDER BY added_at, track_id"
            ),
            [status.as_str()],
        )
    }

    /// Finalized records flagged for manual review, oldest saved first.
    pub fn list_needs_review(&self) -> Result<Vec<ClassificationRecord>> {
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM tracks
                 WHERE status = 'finalized' AND needs_review = 1
                 ORDER BY added_at, track_id"
            ),
            [],
        )
    }

    /// Number of records in each status.
    pub fn status_counts(&self) -> Result<StatusCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM tracks GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            let count = u64::try_from(count).unwrap_or(0);
            match status.parse::<Status>() {
                Ok(Status::Pending) => counts.pending = count,
                Ok(Status::Scored) => counts.scored = count,
                Ok(Status::Finalized) => counts.finalized = count,
                Ok(Status::Failed) => counts.failed = count,
                Err(_) => {
                    return Err(Error::Corrupt {
                        track_id: "<unknown>".to_string(),
                        reason: format!("{count} record(s) with unknown status '{status}'"),
                    });
                }
            }
        }
        Ok(counts)
    }

    fn query_records<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<ClassificationRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let raws = stmt
            .query_map(params, RawRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawRecord::decode).collect()
    }
}

// Record writes
impl Database {
    /// Insert or replace the record for a track.
    pub fn upsert_record(&self, record: &ClassificationRecord) -> Result<()> {
        let encoded = EncodedRecord::new(record)?;
        encoded.upsert(&self.conn)?;
        Ok(())
    }

    /// Durably commit a finalized record.
    ///
    /// The write happens inside one transaction: either the whole record is
    /// stored as `finalized` or the previous row is left untouched.
    ///
    /// # Errors
    /// Returns [`Error::InvalidData`] if the record is not `finalized`.
    pub fn commit_finalized(&self, record: &ClassificationRecord) -> Result<()> {
        if record.status != Status::Finalized {
            return Err(Error::InvalidData(format!(
                "refusing to commit track {} in status {} as finalized",
                record.track.id, record.status
            )));
        }
        let encoded = EncodedRecord::new(record)?;

        let tx = self.conn.unchecked_transaction()?;
        let changed = encoded.upsert(&tx)?;
        if changed != 1 {
            return Err(Error::InvalidData(format!(
                "finalizing track {} touched {changed} rows",
                record.track.id
            )));
        }
        tx.commit()?;
        Ok(())
    }
}

/// A record row as stored, before decoding.
struct RawRecord {
    track_id: String,
    name: String,
    artists: String,
    added_at: String,
    status: String,
    lyrics_state: String,
    lyrics: Option<String>,
    scores: String,
    playlist_membership: String,
    needs_review: bool,
    attempts: i64,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            track_id: row.get(0)?,
            name: row.get(1)?,
            artists: row.get(2)?,
            added_at: row.get(3)?,
            status: row.get(4)?,
            lyrics_state: row.get(5)?,
            lyrics: row.get(6)?,
            scores: row.get(7)?,
            playlist_membership: row.get(8)?,
            needs_review: row.get(9)?,
            attempts: row.get(10)?,
            last_error: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn decode(self) -> Result<ClassificationRecord> {
        let track_id = self.track_id;
        let corrupt = |reason: String| Error::Corrupt {
            track_id: track_id.clone(),
            reason,
        };

        let artists: Vec<String> = serde_json::from_str(&self.artists)
            .map_err(|e| corrupt(format!("artists: {e}")))?;
        let status = self
            .status
            .parse::<Status>()
            .map_err(|e| corrupt(e.to_string()))?;
        let lyrics = match (self.lyrics_state.as_str(), self.lyrics) {
            ("pending", _) => Lyrics::Pending,
            ("unavailable", _) => Lyrics::Unavailable,
            ("found", Some(text)) => Lyrics::Found(text),
            (state, _) => return Err(corrupt(format!("lyrics state '{state}'"))),
        };
        let scores: BTreeMap<Language, f64> = serde_json::from_str(&self.scores)
            .map_err(|e| corrupt(format!("scores: {e}")))?;
        if let Some((language, value)) = scores
            .iter()
            .find(|(_, value)| !(0.0..=1.0).contains(*value))
        {
            return Err(corrupt(format!("{language} confidence {value} out of range")));
        }
        let playlist_membership: BTreeMap<Language, bool> =
            serde_json::from_str(&self.playlist_membership)
                .map_err(|e| corrupt(format!("playlist_membership: {e}")))?;
        let attempts =
            u32::try_from(self.attempts).map_err(|e| corrupt(format!("attempts: {e}")))?;

        let added_at = parse_timestamp(&self.added_at).map_err(|e| corrupt(format!("added_at: {e}")))?;
        let created_at =
            parse_timestamp(&self.created_at).map_err(|e| corrupt(format!("created_at: {e}")))?;
        let updated_at =
            parse_timestamp(&self.updated_at).map_err(|e| corrupt(format!("updated_at: {e}")))?;

        Ok(ClassificationRecord {
            track: Track {
                id: TrackId::new(track_id.clone()),
                name: self.name,
                artists,
                added_at,
            },
            status,
            lyrics,
            scores,
            playlist_membership,
            needs_review: self.needs_review,
            attempts,
            last_error: self.last_error,
            created_at,
            updated_at,
        })
    }
}

/// A record serialized into column values.
struct EncodedRecord<'a> {
    record: &'a ClassificationRecord,
    artists: String,
    scores: String,
    playlist_membership: String,
}

impl<'a> EncodedRecord<'a> {
    fn new(record: &'a ClassificationRecord) -> Result<Self> {
        Ok(Self {
            record,
            artists: serde_json::to_string(&record.track.artists)?,
            scores: serde_json::to_string(&record.scores)?,
            playlist_membership: serde_json::to_string(&record.playlist_membership)?,
        })
    }

    fn upsert(&self, conn: &Connection) -> rusqlite::Result<usize> {
        let record = self.record;
        conn.execute(
            "INSERT INTO tracks (
                track_id, name, artists, added_at, status, lyrics_state, lyrics,
                scores, playlist_membership, needs_review, attempts, last_error,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(track_id) DO UPDATE SET
                name = excluded.name,
                artists = excluded.artists,
                added_at = excluded.added_at,
                status = excluded.status,
                lyrics_state = excluded.lyrics_state,
                lyrics = excluded.lyrics,
                scores = excluded.scores,
                playlist_membership = excluded.playlist_membership,
                needs_review = excluded.needs_review,
                attempts = excluded.attempts,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at",
            rusqlite::params![
                record.track.id.as_str(),
                record.track.name,
                self.artists,
                record.track.added_at.to_rfc3339(),
                record.status.as_str(),
                record.lyrics.state_str(),
                record.lyrics.text(),
                self.scores,
                self.playlist_membership,
                record.needs_review,
                i64::from(record.attempts),
                record.last_error,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )
    }
}

fn parse_timestamp(value: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}
