use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::{
    Gesture, GestureConfig, HapticLevel, KeyAction, KeyDisposition, KeyEvent, VolumeKey,
};
use crate::platform::DeviceControl;
use crate::{log_debug, log_info, log_warn};

use super::state::{ButtonState, PollOutcome};

const ENABLE_LOGS: bool = true;

pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Whatever receives classified gestures; in the app this is the media
/// session registry.
pub trait GestureTarget: Send + Sync {
    /// Whether there is a controllable player right now.
    fn has_target(&self) -> bool;
    /// Returns false when no player took the command.
    fn dispatch(&self, gesture: Gesture) -> bool;
}

struct Poller {
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Turns raw volume key events into gestures.
///
/// Key events arrive synchronously from the accessibility layer and must be
/// answered immediately; the hold timing is tracked by a poll loop that runs
/// on the tokio runtime only while at least one button is down.
#[derive(Clone)]
pub struct GestureController {
    state: Arc<Mutex<ButtonState>>,
    config: watch::Receiver<GestureConfig>,
    device: Arc<dyn DeviceControl>,
    target: Arc<dyn GestureTarget>,
    runtime: Handle,
    poller: Arc<Mutex<Poller>>,
}

impl GestureController {
    /// Must be called from within a tokio runtime; the poll loop is spawned
    /// onto that runtime.
    pub fn new(
        config: watch::Receiver<GestureConfig>,
        device: Arc<dyn DeviceControl>,
        target: Arc<dyn GestureTarget>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().context("gesture controller needs a tokio runtime")?;
        Ok(Self {
            state: Arc::new(Mutex::new(ButtonState::default())),
            config,
            device,
            target,
            runtime,
            poller: Arc::new(Mutex::new(Poller {
                cancel_token: CancellationToken::new(),
                handle: None,
            })),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, ButtonState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_poller(&self) -> MutexGuard<'_, Poller> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn button_state(&self) -> ButtonState {
        self.lock_state().clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().is_running
    }

    pub fn is_activated(&self) -> bool {
        self.lock_state().is_activated
    }

    /// Marks the service as running with the given activation.
    pub fn start(&self, activated: bool) {
        let mut state = self.lock_state();
        state.is_running = true;
        state.is_activated = activated;
        log_info!("Gesture controller running (activated: {activated})");
    }

    pub fn set_activated(&self, activated: bool) {
        let mut state = self.lock_state();
        state.is_activated = activated;
        if !activated {
            // A loop that is still polling sees this and exits on its next tick.
            state.release_all();
        }
        log_debug!("Gesture activation set to {activated}");
    }

    /// Stops the service and the poll loop. Waits for a running loop to exit.
    pub async fn stop(&self) {
        {
            let mut state = self.lock_state();
            state.is_running = false;
            state.is_activated = false;
            state.release_all();
        }

        let handle = {
            let mut poller = self.lock_poller();
            poller.cancel_token.cancel();
            poller.cancel_token = CancellationToken::new();
            poller.handle.take()
        };
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    log_warn!("Gesture poll loop ended abnormally: {err}");
                }
            }
        }

        self.lock_state().polling = false;
        log_info!("Gesture controller stopped");
    }

    /// Decides synchronously whether the OS should apply its default volume
    /// change for this event.
    pub fn on_key_event(&self, event: KeyEvent) -> KeyDisposition {
        let config = *self.config.borrow();

        {
            let state = self.lock_state();
            if !state.is_running || !state.is_activated {
                return KeyDisposition::PassThrough;
            }
            // The release of a press we already swallowed is always ours, even
            // if the player or the screen state changed mid-hold.
            if event.action == KeyAction::Up && state.pressed_at(event.key).is_some() {
                drop(state);
                return self.on_key_up(event.key, &config);
            }
        }

        if !self.target.has_target() {
            log_debug!("No media session for {:?}, passing through", event.key);
            return KeyDisposition::PassThrough;
        }
        if !config
            .working_mode
            .allows(&self.device.display_states())
        {
            log_debug!(
                "Working mode {} filters {:?}, passing through",
                config.working_mode.as_str(),
                event.key
            );
            return KeyDisposition::PassThrough;
        }

        match event.action {
            KeyAction::Down => self.on_key_down(event.key),
            KeyAction::Up => self.on_key_up(event.key, &config),
        }
    }

    fn on_key_down(&self, key: VolumeKey) -> KeyDisposition {
        let start_loop = {
            let mut state = self.lock_state();
            if state.press(key, Instant::now()) {
                log_debug!("{key:?} pressed");
            }
            let start_loop = !state.polling;
            state.polling = true;
            start_loop
        };

        if start_loop {
            self.spawn_poller();
        }
        KeyDisposition::Consumed
    }

    fn on_key_up(&self, key: VolumeKey, config: &GestureConfig) -> KeyDisposition {
        let now = Instant::now();
        let Some(pressed_at) = self.lock_state().release(key) else {
            // Its key-down was not ours.
            return KeyDisposition::PassThrough;
        };

        let held = now.saturating_duration_since(pressed_at);
        if held < Duration::from_millis(config.long_press_threshold_ms) {
            log_debug!("{key:?} short press ({} ms), adjusting volume", held.as_millis());
            self.device.adjust_volume(key.into());
        } else {
            log_debug!("{key:?} released after {} ms", held.as_millis());
        }
        KeyDisposition::Consumed
    }

    fn spawn_poller(&self) {
        let mut poller = self.lock_poller();
        let handle = self.runtime.spawn(poll_loop(
            Arc::clone(&self.state),
            self.config.clone(),
            Arc::clone(&self.device),
            Arc::clone(&self.target),
            poller.cancel_token.clone(),
        ));
        poller.handle = Some(handle);
    }
}

async fn poll_loop(
    state: Arc<Mutex<ButtonState>>,
    config: watch::Receiver<GestureConfig>,
    device: Arc<dyn DeviceControl>,
    target: Arc<dyn GestureTarget>,
    cancel_token: CancellationToken,
) {
    log_debug!("Gesture poll loop started");
    let mut ticker = time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel_token.cancelled() => {
                log_debug!("Gesture poll loop cancelled");
                return;
            }
        }

        let config = *config.borrow();
        let allows = config.working_mode.allows(&device.display_states());
        let outcome = {
            let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
            guard.poll(Instant::now(), &config, allows)
        };

        match outcome {
            PollOutcome::Finished => break,
            PollOutcome::Cooling | PollOutcome::Waiting => {}
            PollOutcome::Fire(gesture) => {
                log_info!("Gesture detected: {}", gesture.as_str());
                if !target.dispatch(gesture) {
                    log_warn!("No player accepted {}", gesture.as_str());
                }
                if config.haptic_level != HapticLevel::None {
                    device.vibrate(config.haptic_level);
                }
            }
        }
    }

    log_debug!("Gesture poll loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DisplayState, VolumeDirection, WorkingMode};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::sleep;

    #[derive(Default)]
    struct FakeDevice {
        volume: Mutex<Vec<VolumeDirection>>,
        haptics: Mutex<Vec<HapticLevel>>,
        displays: Mutex<Vec<DisplayState>>,
    }

    impl DeviceControl for FakeDevice {
        fn adjust_volume(&self, direction: VolumeDirection) {
            self.volume.lock().unwrap().push(direction);
        }

        fn vibrate(&self, level: HapticLevel) {
            self.haptics.lock().unwrap().push(level);
        }

        fn display_states(&self) -> Vec<DisplayState> {
            self.displays.lock().unwrap().clone()
        }
    }

    struct FakeTarget {
        present: AtomicBool,
        gestures: Mutex<Vec<Gesture>>,
    }

    impl FakeTarget {
        fn new() -> Self {
            Self {
                present: AtomicBool::new(true),
                gestures: Mutex::new(Vec::new()),
            }
        }

        fn gestures(&self) -> Vec<Gesture> {
            self.gestures.lock().unwrap().clone()
        }
    }

    impl GestureTarget for FakeTarget {
        fn has_target(&self) -> bool {
            self.present.load(Ordering::SeqCst)
        }

        fn dispatch(&self, gesture: Gesture) -> bool {
            self.gestures.lock().unwrap().push(gesture);
            true
        }
    }

    struct Harness {
        controller: GestureController,
        device: Arc<FakeDevice>,
        target: Arc<FakeTarget>,
        config_tx: watch::Sender<GestureConfig>,
    }

    fn harness(config: GestureConfig) -> Harness {
        let (config_tx, config_rx) = watch::channel(config);
        let device = Arc::new(FakeDevice::default());
        let target = Arc::new(FakeTarget::new());
        let controller = GestureController::new(
            config_rx,
            device.clone() as Arc<dyn DeviceControl>,
            target.clone() as Arc<dyn GestureTarget>,
        )
        .expect("controller");
        controller.start(true);
        Harness {
            controller,
            device,
            target,
            config_tx,
        }
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[tokio::test(start_paused = true)]
    async fn short_press_adjusts_volume_once() {
        let h = harness(GestureConfig::default());

        let down = h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeUp));
        sleep(ms(100)).await;
        let up = h.controller.on_key_event(KeyEvent::up(VolumeKey::VolumeUp));
        sleep(ms(200)).await;

        assert!(down.is_consumed());
        assert!(up.is_consumed());
        assert_eq!(*h.device.volume.lock().unwrap(), vec![VolumeDirection::Raise]);
        assert!(h.target.gestures().is_empty());
        assert!(!h.controller.button_state().is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn long_press_fires_once_per_refractory_window() {
        let h = harness(GestureConfig::default());

        h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeUp));
        sleep(ms(1350)).await;
        assert_eq!(h.target.gestures(), vec![Gesture::SkipToNext]);

        sleep(ms(100)).await;
        assert_eq!(
            h.target.gestures(),
            vec![Gesture::SkipToNext, Gesture::SkipToNext]
        );

        h.controller.on_key_event(KeyEvent::up(VolumeKey::VolumeUp));
        sleep(ms(100)).await;
        assert!(h.device.volume.lock().unwrap().is_empty());
        assert_eq!(
            *h.device.haptics.lock().unwrap(),
            vec![HapticLevel::Medium, HapticLevel::Medium]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn volume_down_hold_skips_back() {
        let h = harness(GestureConfig::default());

        h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeDown));
        sleep(ms(500)).await;
        h.controller.on_key_event(KeyEvent::up(VolumeKey::VolumeDown));

        assert_eq!(h.target.gestures(), vec![Gesture::SkipToPrevious]);
    }

    #[tokio::test(start_paused = true)]
    async fn both_buttons_only_toggle_playback() {
        let h = harness(GestureConfig::default());

        h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeUp));
        h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeDown));
        sleep(ms(450)).await;
        h.controller.on_key_event(KeyEvent::up(VolumeKey::VolumeUp));
        h.controller.on_key_event(KeyEvent::up(VolumeKey::VolumeDown));
        sleep(ms(1500)).await;

        assert_eq!(h.target.gestures(), vec![Gesture::TogglePlayPause]);
        assert!(h.device.volume.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn staggered_release_after_toggle_does_not_skip() {
        let h = harness(GestureConfig::default());

        h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeUp));
        h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeDown));
        sleep(ms(500)).await;
        h.controller.on_key_event(KeyEvent::up(VolumeKey::VolumeUp));
        sleep(ms(1000)).await;
        h.controller.on_key_event(KeyEvent::up(VolumeKey::VolumeDown));
        sleep(ms(100)).await;

        assert_eq!(h.target.gestures(), vec![Gesture::TogglePlayPause]);
        assert!(h.device.volume.lock().unwrap().is_empty());
        assert!(!h.controller.button_state().combo_fired);
    }

    #[tokio::test(start_paused = true)]
    async fn screen_change_mid_hold_is_seen_by_the_loop() {
        let h = harness(GestureConfig {
            working_mode: WorkingMode::ScreenOn,
            ..GestureConfig::default()
        });
        *h.device.displays.lock().unwrap() = vec![DisplayState::On];

        h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeUp));
        sleep(ms(100)).await;
        *h.device.displays.lock().unwrap() = vec![DisplayState::Off];
        sleep(ms(500)).await;
        assert!(h.target.gestures().is_empty());

        *h.device.displays.lock().unwrap() = vec![DisplayState::On];
        sleep(ms(100)).await;
        assert_eq!(h.target.gestures(), vec![Gesture::SkipToNext]);
    }

    #[tokio::test(start_paused = true)]
    async fn no_haptic_when_level_is_none() {
        let h = harness(GestureConfig {
            haptic_level: HapticLevel::None,
            ..GestureConfig::default()
        });

        h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeUp));
        sleep(ms(450)).await;

        assert_eq!(h.target.gestures(), vec![Gesture::SkipToNext]);
        assert!(h.device.haptics.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_changes_apply_to_the_next_tick() {
        let h = harness(GestureConfig::default());
        h.config_tx.send_modify(|config| config.long_press_threshold_ms = 1000);

        h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeUp));
        sleep(ms(900)).await;
        assert!(h.target.gestures().is_empty());
        sleep(ms(200)).await;
        assert_eq!(h.target.gestures(), vec![Gesture::SkipToNext]);
    }

    #[tokio::test(start_paused = true)]
    async fn deactivated_or_targetless_events_pass_through() {
        let h = harness(GestureConfig::default());

        h.controller.set_activated(false);
        let event = h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeUp));
        assert_eq!(event, KeyDisposition::PassThrough);
        assert_eq!(h.controller.button_state().volume_up_pressed_at, None);

        h.controller.set_activated(true);
        h.target.present.store(false, Ordering::SeqCst);
        let event = h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeUp));
        assert_eq!(event, KeyDisposition::PassThrough);
        assert!(!h.controller.button_state().is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn working_mode_filters_by_display_state() {
        let h = harness(GestureConfig {
            working_mode: WorkingMode::ScreenOn,
            ..GestureConfig::default()
        });
        *h.device.displays.lock().unwrap() = vec![DisplayState::Off];

        let event = h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeDown));
        assert_eq!(event, KeyDisposition::PassThrough);

        *h.device.displays.lock().unwrap() = vec![DisplayState::On];
        let event = h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeDown));
        assert_eq!(event, KeyDisposition::Consumed);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_repeat_keeps_hold_start() {
        let h = harness(GestureConfig::default());

        h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeUp));
        let first = h.controller.button_state().volume_up_pressed_at;
        sleep(ms(200)).await;
        let repeat = h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeUp));
        sleep(ms(250)).await;

        assert!(repeat.is_consumed());
        assert_eq!(h.controller.button_state().volume_up_pressed_at, first);
        assert_eq!(h.target.gestures(), vec![Gesture::SkipToNext]);
    }

    #[tokio::test(start_paused = true)]
    async fn orphan_key_up_passes_through() {
        let h = harness(GestureConfig::default());

        let event = h.controller.on_key_event(KeyEvent::up(VolumeKey::VolumeDown));
        assert_eq!(event, KeyDisposition::PassThrough);
        assert!(h.device.volume.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn release_is_handled_after_player_goes_away() {
        let h = harness(GestureConfig::default());

        h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeUp));
        sleep(ms(100)).await;
        h.target.present.store(false, Ordering::SeqCst);
        let up = h.controller.on_key_event(KeyEvent::up(VolumeKey::VolumeUp));
        sleep(ms(100)).await;

        assert!(up.is_consumed());
        assert_eq!(*h.device.volume.lock().unwrap(), vec![VolumeDirection::Raise]);
        assert!(!h.controller.button_state().is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_a_held_press() {
        let h = harness(GestureConfig::default());

        h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeUp));
        sleep(ms(100)).await;
        h.controller.stop().await;
        sleep(ms(1000)).await;

        let state = h.controller.button_state();
        assert!(h.target.gestures().is_empty());
        assert!(!state.is_running);
        assert!(!state.is_polling());
        assert_eq!(
            h.controller.on_key_event(KeyEvent::down(VolumeKey::VolumeUp)),
            KeyDisposition::PassThrough
        );
    }
}
