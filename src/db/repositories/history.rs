use anyhow::{Context, Result};
use log::warn;
use rusqlite::{params, Row};

use crate::db::{parse_datetime, to_i64, to_u64, Database};
use crate::models::Song;

fn row_to_song(row: &Row) -> Result<Song> {
    Ok(Song {
        id: row.get("song_id")?,
        title: row.get("title")?,
        artist: row.get("artist")?,
        album: row.get("album")?,
        duration_ms: to_u64(row.get("duration_ms")?, "duration_ms")?,
        cover_ref: row.get("cover_ref")?,
        added_at: parse_datetime(&row.get::<_, String>("added_at")?, "added_at")?,
    })
}

impl Database {
    /// Appends `song` unless an equal song is already in the history.
    /// Returns whether a row was inserted.
    pub async fn insert_history(&self, song: &Song) -> Result<bool> {
        let record = song.clone();
        self.execute(move |conn| {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO history
                        (song_id, title, artist, album, duration_ms, cover_ref, added_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        record.id,
                        record.title,
                        record.artist,
                        record.album,
                        to_i64(record.duration_ms)?,
                        record.cover_ref,
                        record.added_at.to_rfc3339(),
                    ],
                )
                .with_context(|| "failed to insert history entry")?;
            Ok(inserted > 0)
        })
        .await
    }

    /// History in chronological order. Rows that no longer parse are skipped.
    pub async fn list_history(&self) -> Result<Vec<Song>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT song_id, title, artist, album, duration_ms, cover_ref, added_at
                 FROM history
                 ORDER BY seq ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut songs = Vec::new();
            while let Some(row) = rows.next()? {
                match row_to_song(row) {
                    Ok(song) => songs.push(song),
                    Err(err) => warn!("Skipping unreadable history row: {err:#}"),
                }
            }
            Ok(songs)
        })
        .await
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.execute(|conn| {
            conn.execute("DELETE FROM history", [])
                .with_context(|| "failed to clear history")?;
            Ok(())
        })
        .await
    }
}
