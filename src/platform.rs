//! Boundary between the core and the host OS.
//!
//! The mobile shell implements these traits on top of the native accessibility,
//! audio, vibrator, display and media-session APIs. The core only ever calls
//! out through them, and receives OS callbacks as [`MediaEvent`]s and key events.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::media::MediaEvent;
use crate::models::{DisplayState, HapticLevel, MediaMetadata, PlaybackState, VolumeDirection};

pub type MediaEventSender = mpsc::UnboundedSender<MediaEvent>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Permission {
    Accessibility,
    NotificationListener,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Accessibility => f.write_str("accessibility"),
            Permission::NotificationListener => f.write_str("notification listener"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("{0} permission is missing or was revoked")]
    PermissionDenied(Permission),
    #[error("media session service unavailable: {0}")]
    Unavailable(String),
}

/// Device-level side effects used by the gesture path.
pub trait DeviceControl: Send + Sync {
    /// Default volume step with the system volume UI shown.
    fn adjust_volume(&self, direction: VolumeDirection);
    fn vibrate(&self, level: HapticLevel);
    fn display_states(&self) -> Vec<DisplayState>;
}

/// One active OS media session, keyed by its owning package.
pub trait MediaController: Send + Sync {
    fn package_name(&self) -> &str;
    fn metadata(&self) -> Option<MediaMetadata>;
    fn playback_state(&self) -> PlaybackState;

    /// Start forwarding this session's metadata, playback-state and teardown
    /// callbacks into `events`.
    fn attach(&self, events: MediaEventSender);
    fn detach(&self);

    fn play(&self);
    fn pause(&self);
    fn skip_to_next(&self);
    fn skip_to_previous(&self);
}

/// The OS media-session manager.
pub trait MediaSessionPlatform: Send + Sync {
    /// Registers the active-sessions listener and returns the sessions that are
    /// active right now. Later changes arrive as
    /// [`MediaEvent::ActiveSessionsChanged`].
    fn subscribe(
        &self,
        events: MediaEventSender,
    ) -> Result<Vec<Arc<dyn MediaController>>, PlatformError>;

    /// Must stop all further active-session notifications before returning.
    fn unsubscribe(&self);
}
