use serde::{Deserialize, Serialize};

use super::DisplayState;

pub const DEFAULT_LONG_PRESS_THRESHOLD_MS: u64 = 400;
pub const DEFAULT_DOUBLE_PRESS_THRESHOLD_MS: u64 = 400;
pub const MIN_LONG_PRESS_THRESHOLD_MS: u64 = 300;
pub const MAX_LONG_PRESS_THRESHOLD_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HapticLevel {
    None,
    Light,
    #[default]
    Medium,
    Strong,
}

impl HapticLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HapticLevel::None => "NONE",
            HapticLevel::Light => "LIGHT",
            HapticLevel::Medium => "MEDIUM",
            HapticLevel::Strong => "STRONG",
        }
    }
}

/// Restricts when gestures are processed, based on display power state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkingMode {
    #[default]
    ScreenOnOff,
    ScreenOn,
    ScreenOff,
}

impl WorkingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkingMode::ScreenOnOff => "SCREEN_ON_OFF",
            WorkingMode::ScreenOn => "SCREEN_ON",
            WorkingMode::ScreenOff => "SCREEN_OFF",
        }
    }

    /// Whether events may be processed given the state of every display.
    pub fn allows(&self, displays: &[DisplayState]) -> bool {
        match self {
            WorkingMode::ScreenOnOff => true,
            WorkingMode::ScreenOn => displays.iter().all(|state| *state == DisplayState::On),
            WorkingMode::ScreenOff => displays.iter().all(|state| state.is_dark()),
        }
    }
}

/// When the autoplay layer should start the preferred player.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutoplayTrigger {
    #[default]
    Headphones,
    Bluetooth,
    Any,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GestureConfig {
    pub long_press_threshold_ms: u64,
    pub double_press_threshold_ms: u64,
    pub haptic_level: HapticLevel,
    pub working_mode: WorkingMode,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            long_press_threshold_ms: DEFAULT_LONG_PRESS_THRESHOLD_MS,
            double_press_threshold_ms: DEFAULT_DOUBLE_PRESS_THRESHOLD_MS,
            haptic_level: HapticLevel::default(),
            working_mode: WorkingMode::default(),
        }
    }
}

pub fn clamp_long_press_threshold(value_ms: u64) -> u64 {
    value_ms.clamp(MIN_LONG_PRESS_THRESHOLD_MS, MAX_LONG_PRESS_THRESHOLD_MS)
}
