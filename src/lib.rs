pub mod db;
pub mod error;
pub mod gesture;
pub mod media;
pub mod models;
pub mod platform;
pub mod service;
pub mod settings;
pub mod stats;
mod utils;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use db::Database;
use platform::{DeviceControl, MediaSessionPlatform};
use service::VolumeKeyService;
use settings::SettingsStore;
use stats::StatsStore;

pub const DATABASE_FILE: &str = "volskip.sqlite3";
pub const SETTINGS_FILE: &str = "settings.json";

/// Initializes logging (reads RUST_LOG). Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

/// Persistent state shared by the app: the stats database and the settings.
pub struct AppContext {
    data_dir: PathBuf,
    pub db: Database,
    pub settings: Arc<SettingsStore>,
    pub stats: StatsStore,
}

impl AppContext {
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).with_context(|| {
            format!("failed to create app data directory {}", data_dir.display())
        })?;

        let db = Database::open_or_reset(data_dir.join(DATABASE_FILE))
            .context("failed to open stats database")?;
        let settings = Arc::new(SettingsStore::new(data_dir.join(SETTINGS_FILE)));
        let stats = StatsStore::open(db.clone())
            .await
            .context("failed to load stats")?;

        log::info!("Volskip data directory: {}", data_dir.display());
        Ok(Self {
            data_dir,
            db,
            settings,
            stats,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Builds the volume key service over the platform implementations.
    pub fn volume_key_service(
        &self,
        device: Arc<dyn DeviceControl>,
        sessions: Arc<dyn MediaSessionPlatform>,
    ) -> Result<VolumeKeyService> {
        VolumeKeyService::new(
            Arc::clone(&self.settings),
            self.stats.clone(),
            device,
            sessions,
        )
    }
}
