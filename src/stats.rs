use anyhow::Result;
use log::{debug, info};
use tokio::sync::watch;

use crate::db::{Database, SONGS_PLAYED, SONGS_SKIPPED};
use crate::models::Song;

/// Listening statistics: the history of songs heard plus played/skipped totals.
///
/// Clones share the same database and streams.
#[derive(Clone)]
pub struct StatsStore {
    db: Database,
    history_tx: watch::Sender<Vec<Song>>,
    played_tx: watch::Sender<u64>,
    skipped_tx: watch::Sender<u64>,
}

impl StatsStore {
    pub async fn open(db: Database) -> Result<Self> {
        let history = db.list_history().await?;
        let played = db.counter(SONGS_PLAYED).await?;
        let skipped = db.counter(SONGS_SKIPPED).await?;
        info!(
            "Loaded stats: {} history entries, {} played, {} skipped",
            history.len(),
            played,
            skipped
        );

        let (history_tx, _) = watch::channel(history);
        let (played_tx, _) = watch::channel(played);
        let (skipped_tx, _) = watch::channel(skipped);
        Ok(Self {
            db,
            history_tx,
            played_tx,
            skipped_tx,
        })
    }

    pub fn history(&self) -> Vec<Song> {
        self.history_tx.borrow().clone()
    }

    pub fn total_songs_played(&self) -> u64 {
        *self.played_tx.borrow()
    }

    pub fn total_songs_skipped(&self) -> u64 {
        *self.skipped_tx.borrow()
    }

    pub fn subscribe_history(&self) -> watch::Receiver<Vec<Song>> {
        self.history_tx.subscribe()
    }

    pub fn subscribe_played(&self) -> watch::Receiver<u64> {
        self.played_tx.subscribe()
    }

    pub fn subscribe_skipped(&self) -> watch::Receiver<u64> {
        self.skipped_tx.subscribe()
    }

    /// Appends `song` to the history. Partial songs and songs already in the
    /// history are refused; returns whether the history grew.
    pub async fn add_to_history(&self, song: &Song) -> Result<bool> {
        if song.is_partial() {
            debug!("Refusing partial song '{}' for history", song.title);
            return Ok(false);
        }
        if self.history_tx.borrow().last() == Some(song) {
            debug!("'{}' is already the latest history entry", song.title);
            return Ok(false);
        }

        let inserted = self.db.insert_history(song).await?;
        if inserted {
            let stored = song.clone();
            self.history_tx.send_modify(|history| history.push(stored));
        }
        Ok(inserted)
    }

    pub async fn increment_played(&self) -> Result<u64> {
        let value = self.db.increment_counter(SONGS_PLAYED).await?;
        self.played_tx.send_replace(value);
        Ok(value)
    }

    pub async fn increment_skipped(&self) -> Result<u64> {
        let value = self.db.increment_counter(SONGS_SKIPPED).await?;
        self.skipped_tx.send_replace(value);
        Ok(value)
    }

    /// Commits a song change: history entry plus one more song played.
    pub async fn record_song_change(&self, song: &Song) -> Result<()> {
        self.add_to_history(song).await?;
        self.increment_played().await?;
        Ok(())
    }

    /// Empties the history; the totals are kept.
    pub async fn clear_history(&self) -> Result<()> {
        self.db.clear_history().await?;
        self.history_tx.send_replace(Vec::new());
        Ok(())
    }
}
