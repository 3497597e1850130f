use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MediaMetadata;

/// A track as captured from a media session.
///
/// Equality covers `(title, artist, album, duration_ms, cover_ref)` only, so two
/// captures of the same track compare equal whatever their `id` or `added_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_ms: u64,
    pub cover_ref: String,
    pub added_at: DateTime<Utc>,
}

impl Song {
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
        duration_ms: u64,
        cover_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
            duration_ms,
            cover_ref: cover_ref.into(),
            added_at: Utc::now(),
        }
    }

    /// Builds a candidate from session metadata. Returns `None` when title,
    /// artist or album is missing; a missing cover becomes an empty reference.
    pub fn from_metadata(metadata: &MediaMetadata) -> Option<Self> {
        let title = metadata.title.as_deref()?;
        let artist = metadata.artist.as_deref()?;
        let album = metadata.album.as_deref()?;
        Some(Self::new(
            title,
            artist,
            album,
            metadata.duration_ms,
            metadata.art_uri.clone().unwrap_or_default(),
        ))
    }

    /// Mid-transition captures often carry empty fields or no duration yet.
    /// Such songs must never reach the history.
    pub fn is_partial(&self) -> bool {
        self.title.is_empty()
            || self.artist.is_empty()
            || self.album.is_empty()
            || self.cover_ref.is_empty()
            || self.duration_ms == 0
    }

    /// True only when every compared field differs from `other`.
    pub fn is_completely_different(&self, other: &Song) -> bool {
        self.title != other.title
            && self.artist != other.artist
            && self.album != other.album
            && self.duration_ms != other.duration_ms
            && self.cover_ref != other.cover_ref
    }
}

impl PartialEq for Song {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.artist == other.artist
            && self.album == other.album
            && self.duration_ms == other.duration_ms
            && self.cover_ref == other.cover_ref
    }
}

impl Eq for Song {}
