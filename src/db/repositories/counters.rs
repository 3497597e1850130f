use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use crate::db::{to_u64, Database};

pub const SONGS_PLAYED: &str = "songs_played";
pub const SONGS_SKIPPED: &str = "songs_skipped";

impl Database {
    /// Atomically adds one to the named counter and returns the new value.
    pub async fn increment_counter(&self, name: &'static str) -> Result<u64> {
        self.execute(move |conn| {
            let value: i64 = conn
                .query_row(
                    "INSERT INTO counters (name, value) VALUES (?1, 1)
                     ON CONFLICT(name) DO UPDATE SET value = value + 1
                     RETURNING value",
                    params![name],
                    |row| row.get(0),
                )
                .with_context(|| format!("failed to increment counter {name}"))?;
            to_u64(value, name)
        })
        .await
    }

    pub async fn counter(&self, name: &'static str) -> Result<u64> {
        self.execute(move |conn| {
            let value: Option<i64> = conn
                .query_row(
                    "SELECT value FROM counters WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()
                .with_context(|| format!("failed to read counter {name}"))?;
            value.map(|v| to_u64(v, name)).transpose().map(Option::unwrap_or_default)
        })
        .await
    }
}
