use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use log::{info, warn};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;
use crate::gesture::{ButtonState, GestureController, GestureTarget};
use crate::media::MediaSessionRegistry;
use crate::models::{KeyDisposition, KeyEvent};
use crate::platform::{DeviceControl, MediaSessionPlatform, Permission, PlatformError};
use crate::settings::SettingsStore;
use crate::stats::StatsStore;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "status", content = "permission")]
pub enum ServiceStatus {
    Stopped,
    Running,
    /// Disabled itself because a permission is missing; the user has to grant
    /// it and start the service again.
    PermissionRequired(Permission),
}

struct SettingsWatcher {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// The accessibility-service core: receives key events, owns the gesture
/// controller and the media session registry, and follows the settings.
pub struct VolumeKeyService {
    settings: Arc<SettingsStore>,
    registry: Arc<MediaSessionRegistry>,
    gestures: GestureController,
    status_tx: watch::Sender<ServiceStatus>,
    watcher: Mutex<Option<SettingsWatcher>>,
}

impl VolumeKeyService {
    /// Must be called from within a tokio runtime.
    pub fn new(
        settings: Arc<SettingsStore>,
        stats: StatsStore,
        device: Arc<dyn DeviceControl>,
        sessions: Arc<dyn MediaSessionPlatform>,
    ) -> Result<Self> {
        let registry = Arc::new(MediaSessionRegistry::new(
            sessions,
            stats,
            settings.unsupported_players(),
        ));
        let gestures = GestureController::new(
            settings.subscribe_gesture_config(),
            device,
            Arc::clone(&registry) as Arc<dyn GestureTarget>,
        )?;
        let (status_tx, _) = watch::channel(ServiceStatus::Stopped);

        Ok(Self {
            settings,
            registry,
            gestures,
            status_tx,
            watcher: Mutex::new(None),
        })
    }

    pub fn status(&self) -> ServiceStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ServiceStatus> {
        self.status_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.gestures.is_running()
    }

    pub fn is_activated(&self) -> bool {
        self.gestures.is_activated()
    }

    pub fn button_state(&self) -> ButtonState {
        self.gestures.button_state()
    }

    pub fn registry(&self) -> &Arc<MediaSessionRegistry> {
        &self.registry
    }

    /// Connects to the media sessions and starts handling key events, with
    /// the user's saved activation. A missing permission disables the service
    /// and is reported through the status stream as well as the error.
    pub async fn start(&self) -> Result<(), ServiceError> {
        if self.is_running() {
            return Ok(());
        }

        // Subscribed first so a change landing after this read still wakes
        // the watcher.
        let mut unsupported_rx = self.settings.subscribe_unsupported_players();
        let unsupported = unsupported_rx.borrow_and_update().clone();
        self.registry.apply_unsupported(&unsupported);
        if let Err(err) = self.registry.register() {
            return Err(self.fail_start(err).await);
        }

        self.gestures.start(self.settings.activated());
        self.spawn_settings_watcher(unsupported_rx);
        self.status_tx.send_replace(ServiceStatus::Running);
        info!(
            "Volume key service started (activated: {})",
            self.is_activated()
        );
        Ok(())
    }

    async fn fail_start(&self, err: PlatformError) -> ServiceError {
        let err = ServiceError::from(err);
        match err.permission() {
            Some(permission) => {
                warn!("Cannot start volume key service: {err}");
                self.disable(permission).await;
            }
            None => {
                warn!("Volume key service failed to start: {err}");
                self.status_tx.send_replace(ServiceStatus::Stopped);
            }
        }
        err
    }

    /// Stops handling key events and releases every media session.
    pub async fn stop(&self) {
        self.shutdown().await;
        self.status_tx.send_replace(ServiceStatus::Stopped);
        info!("Volume key service stopped");
    }

    /// The platform reports that a permission was revoked while running.
    pub async fn on_permission_revoked(&self, permission: Permission) {
        warn!("{permission} permission revoked, disabling volume key service");
        self.disable(permission).await;
    }

    async fn disable(&self, permission: Permission) {
        self.shutdown().await;
        self.status_tx
            .send_replace(ServiceStatus::PermissionRequired(permission));
    }

    async fn shutdown(&self) {
        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(watcher) = watcher {
            watcher.cancel_token.cancel();
            if let Err(err) = watcher.handle.await {
                warn!("Settings watcher ended abnormally: {err}");
            }
        }

        self.gestures.stop().await;
        self.registry.unregister().await;
    }

    /// The user's enable toggle. Enabling is refused while the service is not
    /// running; returns whether the toggle was applied.
    pub fn set_activated(&self, activated: bool) -> Result<bool, ServiceError> {
        if activated && !self.is_running() {
            warn!("Refusing to activate gestures while the service is not running");
            return Ok(false);
        }

        self.settings.set_activated(activated)?;
        if self.is_running() {
            self.gestures.set_activated(activated);
        }
        Ok(true)
    }

    /// Includes or excludes a player from gesture control. Persisted, and
    /// applied to the live registry right away.
    pub fn set_player_supported(&self, package: &str, supported: bool) -> Result<(), ServiceError> {
        self.settings.set_player_supported(package, supported)?;
        self.registry.toggle_supported(package, supported);
        Ok(())
    }

    /// Answers a raw key event from the accessibility layer. Must return
    /// without blocking.
    pub fn on_key_event(&self, event: KeyEvent) -> KeyDisposition {
        self.gestures.on_key_event(event)
    }

    fn spawn_settings_watcher(&self, unsupported_rx: watch::Receiver<BTreeSet<String>>) {
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(watch_unsupported_players(
            Arc::clone(&self.registry),
            unsupported_rx,
            cancel_token.clone(),
        ));
        *self.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(SettingsWatcher {
            cancel_token,
            handle,
        });
    }
}

async fn watch_unsupported_players(
    registry: Arc<MediaSessionRegistry>,
    mut unsupported_rx: watch::Receiver<BTreeSet<String>>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            changed = unsupported_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let unsupported = unsupported_rx.borrow_and_update().clone();
                registry.apply_unsupported(&unsupported);
            }
        }
    }
}
