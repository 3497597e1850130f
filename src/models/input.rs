use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum VolumeKey {
    VolumeUp,
    VolumeDown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum KeyAction {
    Down,
    Up,
}

/// A raw hardware key event as delivered by the accessibility layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyEvent {
    pub action: KeyAction,
    pub key: VolumeKey,
}

impl KeyEvent {
    pub fn down(key: VolumeKey) -> Self {
        Self {
            action: KeyAction::Down,
            key,
        }
    }

    pub fn up(key: VolumeKey) -> Self {
        Self {
            action: KeyAction::Up,
            key,
        }
    }
}

/// What the platform should do with the key event after the core saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDisposition {
    /// Swallow the event; the OS must not change the volume.
    Consumed,
    /// Let the OS apply its default volume behaviour.
    PassThrough,
}

impl KeyDisposition {
    pub fn is_consumed(&self) -> bool {
        matches!(self, KeyDisposition::Consumed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum VolumeDirection {
    Raise,
    Lower,
}

impl From<VolumeKey> for VolumeDirection {
    fn from(key: VolumeKey) -> Self {
        match key {
            VolumeKey::VolumeUp => VolumeDirection::Raise,
            VolumeKey::VolumeDown => VolumeDirection::Lower,
        }
    }
}

/// Display power state as reported by the OS display manager.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DisplayState {
    Unknown,
    Off,
    On,
    Doze,
    DozeSuspend,
    Vr,
    OnSuspend,
}

impl DisplayState {
    pub fn is_dark(&self) -> bool {
        matches!(
            self,
            DisplayState::Off | DisplayState::Doze | DisplayState::DozeSuspend
        )
    }
}

/// A classified user intent derived from button timing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Gesture {
    SkipToNext,
    SkipToPrevious,
    TogglePlayPause,
}

impl Gesture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gesture::SkipToNext => "skip-to-next",
            Gesture::SkipToPrevious => "skip-to-previous",
            Gesture::TogglePlayPause => "toggle-play-pause",
        }
    }
}
