use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use tokio::runtime::Handle;

use crate::models::{MediaMetadata, PlaybackState, Song};
use crate::platform::{MediaController, MediaEventSender};
use crate::stats::StatsStore;
use crate::{log_debug, log_error, log_info, log_warn};

use super::NowPlaying;

const ENABLE_LOGS: bool = true;

/// Tracks one OS media session: its now-playing song, whether it is playing,
/// and the transport commands issued on the user's behalf.
pub struct SessionEntry {
    package: String,
    controller: Arc<dyn MediaController>,
    now_playing: Mutex<NowPlaying>,
    is_playing: AtomicBool,
    stats: StatsStore,
}

impl SessionEntry {
    pub fn new(controller: Arc<dyn MediaController>, stats: StatsStore) -> Self {
        let package = controller.package_name().to_string();
        let is_playing = controller.playback_state().is_playing();
        Self {
            package,
            controller,
            now_playing: Mutex::new(NowPlaying::default()),
            is_playing: AtomicBool::new(is_playing),
            stats,
        }
    }

    pub fn package_name(&self) -> &str {
        &self.package
    }

    pub fn controller(&self) -> &Arc<dyn MediaController> {
        &self.controller
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::SeqCst)
    }

    pub fn playing_song(&self) -> Option<Song> {
        self.now_playing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .playing_song()
            .cloned()
    }

    pub(crate) fn attach(&self, events: MediaEventSender) {
        self.controller.attach(events);
        log_debug!("Attached to media session {}", self.package);
    }

    /// Runs a metadata reading through the debouncer and records a committed
    /// song change in the stats. If recording fails the debouncer is put back
    /// as it was, so the same reading is retried on the next callback.
    pub async fn on_metadata_changed(
        &self,
        metadata: Option<MediaMetadata>,
    ) -> Result<Option<Song>> {
        let (previous, committed) = {
            let mut now_playing = self.now_playing.lock().unwrap_or_else(PoisonError::into_inner);
            let previous = now_playing.clone();
            (previous, now_playing.on_metadata(metadata.as_ref()))
        };
        let Some(song) = committed else {
            return Ok(None);
        };

        log_info!(
            "{} now playing '{}' by {}",
            self.package,
            song.title,
            song.artist
        );
        if let Err(err) = self.stats.record_song_change(&song).await {
            *self.now_playing.lock().unwrap_or_else(PoisonError::into_inner) = previous;
            return Err(err);
        }
        Ok(Some(song))
    }

    pub fn on_playback_state_changed(&self, state: PlaybackState) {
        self.is_playing.store(state.is_playing(), Ordering::SeqCst);
        log_debug!("{} playback state {:?}", self.package, state);
    }

    pub fn skip_to_next(&self) {
        self.controller.skip_to_next();
        self.count_skip();
    }

    pub fn skip_to_previous(&self) {
        self.controller.skip_to_previous();
        self.count_skip();
    }

    pub fn toggle_play_pause(&self) {
        if self.is_playing() {
            self.controller.pause();
        } else {
            self.controller.play();
        }
    }

    /// Detaches from the OS session. The entry must not be used afterwards.
    pub(crate) fn destroy(&self) {
        self.controller.detach();
        log_debug!("Destroyed media session entry {}", self.package);
    }

    fn count_skip(&self) {
        let Ok(runtime) = Handle::try_current() else {
            log_warn!("No runtime to record skip for {}", self.package);
            return;
        };
        let stats = self.stats.clone();
        runtime.spawn(async move {
            if let Err(err) = stats.increment_skipped().await {
                log_error!("Failed to record skip: {err:#}");
            }
        });
    }
}
