use crate::models::{MediaMetadata, Song};

/// Turns noisy metadata callbacks from one session into song changes.
///
/// A single reading that differs from the current song in every field is
/// treated as a transition glitch and absorbed; the next such reading commits.
#[derive(Debug, Clone, Default)]
pub struct NowPlaying {
    playing_song: Option<Song>,
    debounce_counter: u32,
}

impl NowPlaying {
    pub fn playing_song(&self) -> Option<&Song> {
        self.playing_song.as_ref()
    }

    pub fn debounce_counter(&self) -> u32 {
        self.debounce_counter
    }

    /// Returns the song to commit to the stats, if this reading is a change.
    pub fn on_metadata(&mut self, metadata: Option<&MediaMetadata>) -> Option<Song> {
        let candidate = Song::from_metadata(metadata?)?;
        if candidate.is_partial() {
            return None;
        }
        if self.playing_song.as_ref() == Some(&candidate) {
            return None;
        }

        let completely_different = self
            .playing_song
            .as_ref()
            .map(|playing| candidate.is_completely_different(playing))
            .unwrap_or(false);
        if completely_different && self.debounce_counter < 1 {
            self.debounce_counter += 1;
            return None;
        }

        self.debounce_counter = 0;
        self.playing_song = Some(candidate.clone());
        Some(candidate)
    }
}
