mod input;
mod media;
mod preferences;
mod song;

pub use input::{
    DisplayState, Gesture, KeyAction, KeyDisposition, KeyEvent, VolumeDirection, VolumeKey,
};
pub use media::{MediaMetadata, PlaybackState};
pub use preferences::{
    clamp_long_press_threshold, AutoplayTrigger, GestureConfig, HapticLevel, WorkingMode,
    DEFAULT_DOUBLE_PRESS_THRESHOLD_MS, DEFAULT_LONG_PRESS_THRESHOLD_MS,
    MAX_LONG_PRESS_THRESHOLD_MS, MIN_LONG_PRESS_THRESHOLD_MS,
};
pub use song::Song;
