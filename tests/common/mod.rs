#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use volskip_lib::media::MediaEvent;
use volskip_lib::models::{DisplayState, HapticLevel, MediaMetadata, PlaybackState, VolumeDirection};
use volskip_lib::platform::{
    DeviceControl, MediaController, MediaEventSender, MediaSessionPlatform, Permission,
    PlatformError,
};
use volskip_lib::AppContext;

#[derive(Default)]
pub struct FakeDevice {
    pub volume: Mutex<Vec<VolumeDirection>>,
    pub haptics: Mutex<Vec<HapticLevel>>,
    pub displays: Mutex<Vec<DisplayState>>,
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

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Play,
    Pause,
    Next,
    Previous,
}

pub struct FakePlayer {
    pub package: String,
    pub transport: Mutex<Vec<Transport>>,
    pub attached: Mutex<bool>,
}

impl FakePlayer {
    pub fn new(package: &str) -> Arc<Self> {
        Arc::new(Self {
            package: package.to_string(),
            transport: Mutex::new(Vec::new()),
            attached: Mutex::new(false),
        })
    }

    pub fn transport(&self) -> Vec<Transport> {
        self.transport.lock().unwrap().clone()
    }

    pub fn is_attached(&self) -> bool {
        *self.attached.lock().unwrap()
    }
}

impl MediaController for FakePlayer {
    fn package_name(&self) -> &str {
        &self.package
    }

    fn metadata(&self) -> Option<MediaMetadata> {
        None
    }

    fn playback_state(&self) -> PlaybackState {
        PlaybackState::Paused
    }

    fn attach(&self, _events: MediaEventSender) {
        *self.attached.lock().unwrap() = true;
    }

    fn detach(&self) {
        *self.attached.lock().unwrap() = false;
    }

    fn play(&self) {
        self.transport.lock().unwrap().push(Transport::Play);
    }

    fn pause(&self) {
        self.transport.lock().unwrap().push(Transport::Pause);
    }

    fn skip_to_next(&self) {
        self.transport.lock().unwrap().push(Transport::Next);
    }

    fn skip_to_previous(&self) {
        self.transport.lock().unwrap().push(Transport::Previous);
    }
}

/// Session manager that hands out a fixed list of players and keeps the event
/// sender so tests can play the OS side.
#[derive(Default)]
pub struct FakeSessions {
    pub players: Mutex<Vec<Arc<FakePlayer>>>,
    pub events: Mutex<Option<MediaEventSender>>,
    pub denied: Mutex<Option<Permission>>,
}

impl FakeSessions {
    pub fn with_players(players: &[Arc<FakePlayer>]) -> Arc<Self> {
        let sessions = Self::default();
        sessions.players.lock().unwrap().extend(players.iter().cloned());
        Arc::new(sessions)
    }

    pub fn send(&self, event: MediaEvent) {
        let events = self.events.lock().unwrap();
        let sender = events.as_ref().expect("subscribed");
        sender.send(event).expect("registry listening");
    }

    pub fn is_subscribed(&self) -> bool {
        self.events.lock().unwrap().is_some()
    }
}

impl MediaSessionPlatform for FakeSessions {
    fn subscribe(
        &self,
        events: MediaEventSender,
    ) -> Result<Vec<Arc<dyn MediaController>>, PlatformError> {
        if let Some(permission) = *self.denied.lock().unwrap() {
            return Err(PlatformError::PermissionDenied(permission));
        }
        *self.events.lock().unwrap() = Some(events);
        Ok(self
            .players
            .lock()
            .unwrap()
            .iter()
            .map(|player| Arc::clone(player) as Arc<dyn MediaController>)
            .collect())
    }

    fn unsubscribe(&self) {
        *self.events.lock().unwrap() = None;
    }
}

pub async fn open_context() -> (TempDir, AppContext) {
    let dir = tempfile::tempdir().expect("tempdir");
    let context = AppContext::open(dir.path().join("data"))
        .await
        .expect("context");
    (dir, context)
}

pub fn metadata(title: &str, artist: &str, album: &str, duration_ms: u64) -> MediaMetadata {
    MediaMetadata {
        title: Some(title.to_string()),
        artist: Some(artist.to_string()),
        album: Some(album.to_string()),
        duration_ms,
        art_uri: Some(format!("content://covers/{album}")),
    }
}

/// Polls `condition` until it holds, failing the test after a few seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
