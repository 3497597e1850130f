use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::gesture::GestureTarget;
use crate::models::Gesture;
use crate::platform::{MediaController, MediaEventSender, MediaSessionPlatform, PlatformError};
use crate::stats::StatsStore;
use crate::{log_debug, log_error, log_info, log_warn};

use super::{MediaEvent, SessionEntry};

const ENABLE_LOGS: bool = true;

/// Immutable view of the tracked sessions. Both lists keep insertion order.
/// The excluded packages live here too, so routing a new session and
/// excluding a package serialize on the same write.
#[derive(Clone, Default)]
struct Snapshot {
    supported: Vec<Arc<SessionEntry>>,
    unsupported: Vec<Arc<SessionEntry>>,
    unsupported_players: BTreeSet<String>,
}

impl Snapshot {
    fn contains(&self, package: &str) -> bool {
        self.find(package).is_some()
    }

    fn find(&self, package: &str) -> Option<&Arc<SessionEntry>> {
        self.supported
            .iter()
            .chain(self.unsupported.iter())
            .find(|entry| entry.package_name() == package)
    }

    fn len(&self) -> usize {
        self.supported.len() + self.unsupported.len()
    }

    /// Moves `package`'s entry to the list matching `supported`, keeping the
    /// same `Arc`. Returns whether it moved.
    fn set_supported(&mut self, package: &str, supported: bool) -> bool {
        if supported {
            self.unsupported_players.remove(package);
        } else {
            self.unsupported_players.insert(package.to_string());
        }

        let (from, to) = if supported {
            (&mut self.unsupported, &mut self.supported)
        } else {
            (&mut self.supported, &mut self.unsupported)
        };
        match from.iter().position(|entry| entry.package_name() == package) {
            Some(index) => {
                let entry = from.remove(index);
                to.push(entry);
                true
            }
            None => false,
        }
    }

    fn take_entries(&mut self) -> Vec<Arc<SessionEntry>> {
        let mut entries = std::mem::take(&mut self.supported);
        entries.append(&mut self.unsupported);
        entries
    }
}

struct Worker {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// The set of active OS media sessions, one entry per owning package.
///
/// Readers always see a whole snapshot; every mutation builds a new one and
/// swaps it in.
pub struct MediaSessionRegistry {
    platform: Arc<dyn MediaSessionPlatform>,
    stats: StatsStore,
    sessions: RwLock<Arc<Snapshot>>,
    worker: Mutex<Option<Worker>>,
}

impl MediaSessionRegistry {
    pub fn new(
        platform: Arc<dyn MediaSessionPlatform>,
        stats: StatsStore,
        unsupported_players: BTreeSet<String>,
    ) -> Self {
        Self {
            platform,
            stats,
            sessions: RwLock::new(Arc::new(Snapshot {
                unsupported_players,
                ..Snapshot::default()
            })),
            worker: Mutex::new(None),
        }
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.sessions.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn update<R>(&self, apply: impl FnOnce(&mut Snapshot) -> R) -> R {
        let mut guard = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Snapshot::clone(&guard);
        let result = apply(&mut next);
        *guard = Arc::new(next);
        result
    }

    pub fn is_registered(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Subscribes to the OS session manager and starts tracking every active
    /// session. Calling it again while registered is a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(self: &Arc<Self>) -> Result<(), PlatformError> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            log_debug!("Media session registry already registered");
            return Ok(());
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let active = self.platform.subscribe(events_tx.clone())?;
        self.add_sessions(active, &events_tx);

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(event_loop(
            Arc::clone(self),
            events_rx,
            events_tx,
            cancel_token.clone(),
        ));
        *worker = Some(Worker {
            cancel_token,
            handle,
        });

        log_info!(
            "Media session registry registered with {} sessions",
            self.snapshot().len()
        );
        Ok(())
    }

    /// Stops OS notifications and the event worker, then tears down every
    /// entry. No callback is processed once this returns.
    pub async fn unregister(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return;
        };

        self.platform.unsubscribe();
        worker.cancel_token.cancel();
        if let Err(err) = worker.handle.await {
            log_error!("Media event worker ended abnormally: {err}");
        }

        let previous = self.update(Snapshot::take_entries);
        for entry in previous.iter() {
            entry.destroy();
        }
        log_info!(
            "Media session registry unregistered, {} sessions torn down",
            previous.len()
        );
    }

    /// The player gestures are sent to: the first supported session.
    pub fn current_target(&self) -> Option<Arc<SessionEntry>> {
        self.snapshot().supported.first().cloned()
    }

    pub fn sessions(&self) -> Vec<Arc<SessionEntry>> {
        self.snapshot().supported.clone()
    }

    pub fn unsupported_sessions(&self) -> Vec<Arc<SessionEntry>> {
        self.snapshot().unsupported.clone()
    }

    pub fn session(&self, package: &str) -> Option<Arc<SessionEntry>> {
        self.snapshot().find(package).cloned()
    }

    /// Moves a tracked entry between the supported and unsupported lists
    /// without recreating it. Also decides where future sessions of this
    /// package land. Returns whether an entry moved.
    pub fn toggle_supported(&self, package: &str, supported: bool) -> bool {
        let moved = self.update(|snapshot| snapshot.set_supported(package, supported));
        if moved {
            log_info!(
                "{package} is now {}",
                if supported { "supported" } else { "unsupported" }
            );
        }
        moved
    }

    pub fn unsupported_players(&self) -> BTreeSet<String> {
        self.snapshot().unsupported_players.clone()
    }

    /// Brings the registry in line with the persisted unsupported-players set
    /// in a single snapshot swap.
    pub fn apply_unsupported(&self, unsupported: &BTreeSet<String>) {
        self.update(|snapshot| {
            let excluded: Vec<String> = snapshot
                .supported
                .iter()
                .map(|entry| entry.package_name().to_string())
                .filter(|package| unsupported.contains(package))
                .collect();
            let included: Vec<String> = snapshot
                .unsupported
                .iter()
                .map(|entry| entry.package_name().to_string())
                .filter(|package| !unsupported.contains(package))
                .collect();
            for package in &excluded {
                snapshot.set_supported(package, false);
            }
            for package in &included {
                snapshot.set_supported(package, true);
            }
            snapshot.unsupported_players = unsupported.clone();
        });
    }

    fn add_sessions(&self, controllers: Vec<Arc<dyn MediaController>>, events: &MediaEventSender) {
        let added = self.update(|snapshot| {
            let mut added = Vec::new();
            for controller in controllers {
                let package = controller.package_name();
                if snapshot.contains(package) {
                    continue;
                }
                let entry = Arc::new(SessionEntry::new(controller, self.stats.clone()));
                if snapshot.unsupported_players.contains(entry.package_name()) {
                    snapshot.unsupported.push(Arc::clone(&entry));
                } else {
                    snapshot.supported.push(Arc::clone(&entry));
                }
                added.push(entry);
            }
            added
        });

        for entry in added {
            entry.attach(events.clone());
            log_info!("Tracking media session {}", entry.package_name());
        }
    }

    fn remove_session(&self, package: &str) {
        let removed = self.update(|snapshot| {
            if let Some(index) = snapshot
                .supported
                .iter()
                .position(|entry| entry.package_name() == package)
            {
                return Some(snapshot.supported.remove(index));
            }
            snapshot
                .unsupported
                .iter()
                .position(|entry| entry.package_name() == package)
                .map(|index| snapshot.unsupported.remove(index))
        });

        match removed {
            Some(entry) => {
                entry.destroy();
                log_info!("Media session {package} destroyed");
            }
            None => log_debug!("Destroy for untracked session {package}"),
        }
    }

    pub(crate) async fn handle_event(&self, event: MediaEvent, events: &MediaEventSender) {
        match event {
            MediaEvent::ActiveSessionsChanged(controllers) => {
                self.add_sessions(controllers, events);
            }
            MediaEvent::MetadataChanged { package, metadata } => {
                let Some(entry) = self.session(&package) else {
                    log_debug!("Dropping metadata for untracked session {package}");
                    return;
                };
                if let Err(err) = entry.on_metadata_changed(metadata).await {
                    log_error!("Failed to record song change for {package}: {err:#}");
                }
            }
            MediaEvent::PlaybackStateChanged { package, state } => match self.session(&package) {
                Some(entry) => entry.on_playback_state_changed(state),
                None => log_debug!("Dropping playback state for untracked session {package}"),
            },
            MediaEvent::SessionDestroyed { package } => self.remove_session(&package),
        }
    }
}

impl GestureTarget for MediaSessionRegistry {
    fn has_target(&self) -> bool {
        !self.snapshot().supported.is_empty()
    }

    fn dispatch(&self, gesture: Gesture) -> bool {
        let Some(target) = self.current_target() else {
            log_warn!("No media session for {}", gesture.as_str());
            return false;
        };

        log_debug!("Sending {} to {}", gesture.as_str(), target.package_name());
        match gesture {
            Gesture::SkipToNext => target.skip_to_next(),
            Gesture::SkipToPrevious => target.skip_to_previous(),
            Gesture::TogglePlayPause => target.toggle_play_pause(),
        }
        true
    }
}

async fn event_loop(
    registry: Arc<MediaSessionRegistry>,
    mut events_rx: mpsc::UnboundedReceiver<MediaEvent>,
    events_tx: MediaEventSender,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            event = events_rx.recv() => match event {
                Some(event) => registry.handle_event(event, &events_tx).await,
                None => break,
            },
        }
    }
    log_debug!("Media event worker stopped");
}
