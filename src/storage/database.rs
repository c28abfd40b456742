use crate::error::Result;
use crate::storage::migrations;
use crate::storage::{CachedSubtitles, SubtitleKey};
use crate::transcript::TranscriptLine;
use rusqlite::{params, Connection};
use std::path::Path;

pub struct Database {
    conn: Connection,
}

type RawRow = (String, String, f64, f64, String, String);

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Inserts or overwrites the record for the entry's key.
    pub fn put_subtitles(&self, entry: &CachedSubtitles) -> Result<()> {
        let lines = serde_json::to_string(&entry.subtitles)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO subtitles (id, video_id, fps, chunk_seconds, lines, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.id.as_str(),
                entry.video_id,
                entry.fps,
                entry.chunk_seconds,
                lines,
                entry.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_subtitles(&self, key: &SubtitleKey) -> Result<Option<CachedSubtitles>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, video_id, fps, chunk_seconds, lines, updated_at
                 FROM subtitles WHERE id = ?1",
                [key.as_str()],
                read_row,
            )
            .optional()?;

        row.map(decode_row).transpose()
    }

    pub fn list_subtitles(&self) -> Result<Vec<CachedSubtitles>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, video_id, fps, chunk_seconds, lines, updated_at
             FROM subtitles ORDER BY updated_at DESC",
        )?;

        let rows = stmt
            .query_map([], read_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(decode_row).collect()
    }

    pub fn delete_subtitles(&self, key: &SubtitleKey) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM subtitles WHERE id = ?1", [key.as_str()])?;
        Ok(deleted > 0)
    }

    pub fn delete_video(&self, video_id: &str) -> Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM subtitles WHERE video_id = ?1", [video_id])?;
        Ok(deleted)
    }

    pub fn clear_subtitles(&self) -> Result<usize> {
        let deleted = self.conn.execute("DELETE FROM subtitles", [])?;
        Ok(deleted)
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode_row(raw: RawRow) -> Result<CachedSubtitles> {
    let (id, video_id, fps, chunk_seconds, lines, updated_at) = raw;
    let subtitles: Vec<TranscriptLine> = serde_json::from_str(&lines)?;

    Ok(CachedSubtitles {
        id: SubtitleKey::from_string(id),
        video_id,
        fps,
        chunk_seconds,
        subtitles,
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)
            .map(|t| t.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
    })
}

trait OptionalExt<T> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
