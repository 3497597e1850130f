use tokio::time::{Duration, Instant};

use crate::models::{Gesture, GestureConfig, VolumeKey};

/// Minimum delay after a gesture fires before another one may fire.
pub const REFRACTORY_PERIOD: Duration = Duration::from_millis(1000);

/// Button bookkeeping for one running accessibility service.
///
/// A `None` press timestamp means the button is up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonState {
    pub is_running: bool,
    pub is_activated: bool,
    pub volume_up_pressed_at: Option<Instant>,
    pub volume_down_pressed_at: Option<Instant>,
    pub last_event_at: Option<Instant>,
    /// Set once both buttons fired play/pause; the rest of that hold can no
    /// longer turn into a skip. Cleared when both buttons are up.
    pub combo_fired: bool,
    /// Set while a poll loop owns this state; flipped under the same lock that
    /// observes key presses so a press can never slip past an exiting loop.
    pub(crate) polling: bool,
}

/// Result of evaluating one poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Both buttons are up (or the service went away); the loop must exit.
    Finished,
    /// Still inside the refractory period of the last gesture.
    Cooling,
    /// Buttons are held but no threshold is met, or the working mode filters.
    Waiting,
    Fire(Gesture),
}

impl ButtonState {
    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn pressed_at(&self, key: VolumeKey) -> Option<Instant> {
        match key {
            VolumeKey::VolumeUp => self.volume_up_pressed_at,
            VolumeKey::VolumeDown => self.volume_down_pressed_at,
        }
    }

    fn slot(&mut self, key: VolumeKey) -> &mut Option<Instant> {
        match key {
            VolumeKey::VolumeUp => &mut self.volume_up_pressed_at,
            VolumeKey::VolumeDown => &mut self.volume_down_pressed_at,
        }
    }

    /// Records a press. Auto-repeat downs for a held button keep the original
    /// timestamp. Returns whether a new press was recorded.
    pub fn press(&mut self, key: VolumeKey, now: Instant) -> bool {
        let slot = self.slot(key);
        if slot.is_some() {
            return false;
        }
        *slot = Some(now);
        true
    }

    /// Clears a press and returns when it started.
    pub fn release(&mut self, key: VolumeKey) -> Option<Instant> {
        let pressed_at = self.slot(key).take();
        if self.both_released() {
            self.combo_fired = false;
        }
        pressed_at
    }

    pub fn release_all(&mut self) {
        self.volume_up_pressed_at = None;
        self.volume_down_pressed_at = None;
        self.combo_fired = false;
    }

    pub fn both_released(&self) -> bool {
        self.volume_up_pressed_at.is_none() && self.volume_down_pressed_at.is_none()
    }

    pub fn held_for(&self, key: VolumeKey, now: Instant) -> Option<Duration> {
        self.pressed_at(key)
            .map(|pressed| now.saturating_duration_since(pressed))
    }

    pub fn in_refractory_period(&self, now: Instant) -> bool {
        self.last_event_at
            .map(|last| now < last + REFRACTORY_PERIOD)
            .unwrap_or(false)
    }

    /// Picks at most one gesture for the current hold. Both buttons held past
    /// the double-press threshold wins over either single-button long press,
    /// and after it fired the remaining button never skips.
    pub fn classify(&self, now: Instant, config: &GestureConfig) -> Option<Gesture> {
        let long_press = Duration::from_millis(config.long_press_threshold_ms);
        let double_press = Duration::from_millis(config.double_press_threshold_ms);
        let up = self.held_for(VolumeKey::VolumeUp, now);
        let down = self.held_for(VolumeKey::VolumeDown, now);

        match (up, down) {
            (Some(up), Some(down)) if up >= double_press && down >= double_press => {
                Some(Gesture::TogglePlayPause)
            }
            _ if self.combo_fired => None,
            (Some(up), None) if up >= long_press => Some(Gesture::SkipToNext),
            (None, Some(down)) if down >= long_press => Some(Gesture::SkipToPrevious),
            _ => None,
        }
    }

    /// One poll tick. A fired gesture is stamped into `last_event_at` here, in
    /// the same critical section that decided it.
    pub(crate) fn poll(
        &mut self,
        now: Instant,
        config: &GestureConfig,
        working_mode_allows: bool,
    ) -> PollOutcome {
        if !self.is_running || !self.is_activated {
            self.release_all();
        }
        if self.both_released() {
            self.polling = false;
            return PollOutcome::Finished;
        }
        if self.in_refractory_period(now) {
            return PollOutcome::Cooling;
        }
        if !working_mode_allows {
            return PollOutcome::Waiting;
        }

        match self.classify(now, config) {
            Some(gesture) => {
                self.last_event_at = Some(now);
                if gesture == Gesture::TogglePlayPause {
                    self.combo_fired = true;
                }
                PollOutcome::Fire(gesture)
            }
            None => PollOutcome::Waiting,
        }
    }
}
