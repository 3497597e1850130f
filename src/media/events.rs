use std::fmt;
use std::sync::Arc;

use crate::models::{MediaMetadata, PlaybackState};
use crate::platform::MediaController;

/// OS media-session callbacks, delivered to the registry over a channel.
pub enum MediaEvent {
    /// The OS reported its current list of active sessions.
    ActiveSessionsChanged(Vec<Arc<dyn MediaController>>),
    MetadataChanged {
        package: String,
        metadata: Option<MediaMetadata>,
    },
    PlaybackStateChanged {
        package: String,
        state: PlaybackState,
    },
    SessionDestroyed {
        package: String,
    },
}

impl MediaEvent {
    pub fn package(&self) -> Option<&str> {
        match self {
            MediaEvent::ActiveSessionsChanged(_) => None,
            MediaEvent::MetadataChanged { package, .. }
            | MediaEvent::PlaybackStateChanged { package, .. }
            | MediaEvent::SessionDestroyed { package } => Some(package),
        }
    }
}

impl fmt::Debug for MediaEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaEvent::ActiveSessionsChanged(sessions) => f
                .debug_tuple("ActiveSessionsChanged")
                .field(
                    &sessions
                        .iter()
                        .map(|session| session.package_name())
                        .collect::<Vec<_>>(),
                )
                .finish(),
            MediaEvent::MetadataChanged { package, metadata } => f
                .debug_struct("MetadataChanged")
                .field("package", package)
                .field("metadata", metadata)
                .finish(),
            MediaEvent::PlaybackStateChanged { package, state } => f
                .debug_struct("PlaybackStateChanged")
                .field("package", package)
                .field("state", state)
                .finish(),
            MediaEvent::SessionDestroyed { package } => f
                .debug_struct("SessionDestroyed")
                .field("package", package)
                .finish(),
        }
    }
}
