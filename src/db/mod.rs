use std::{
    convert::TryFrom,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

mod migrations;
mod repositories;

use migrations::run_migrations;

pub use repositories::counters::{SONGS_PLAYED, SONGS_SKIPPED};

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// Owns the worker thread. Dropping the sender ends the worker's receive loop,
/// after which the thread is joined.
struct DatabaseInner {
    sender: Option<mpsc::Sender<DbTask>>,
    worker: Option<JoinHandle<()>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.worker.take() {
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

/// Opens the connection, migrates, reports readiness, then serves tasks until
/// every sender is gone.
fn run_worker(path: PathBuf, ready_tx: mpsc::Sender<Result<()>>, tasks: mpsc::Receiver<DbTask>) {
    let opened = Connection::open(&path)
        .context("failed to open SQLite database")
        .and_then(|mut conn| {
            if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                warn!("Failed to enable WAL mode: {err}");
            }
            run_migrations(&mut conn).context("failed to run database migrations")?;
            Ok(conn)
        });

    let mut conn = match opened {
        Ok(conn) => {
            if ready_tx.send(Ok(())).is_err() {
                return;
            }
            conn
        }
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    for task in tasks {
        task(&mut conn);
    }
    info!("Database thread shutting down");
}

pub(crate) fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub(crate) fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub(crate) fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

/// SQLite handle owned by a dedicated thread. Calls are queued to that thread
/// and awaited through a oneshot reply, so async callers never block on I/O.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (task_tx, task_rx) = mpsc::channel::<DbTask>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("volskip-db".into())
            .spawn(move || run_worker(path_for_thread, ready_tx, task_rx))
            .context("failed to spawn database worker thread")?;

        let ready = ready_rx
            .recv()
            .context("database worker exited before signaling readiness")
            .and_then(|result| result);
        if let Err(err) = ready {
            if let Err(join_err) = worker.join() {
                error!("Failed to join DB thread after init failure: {join_err:?}");
            }
            return Err(err);
        }

        info!("Database initialized at {}", db_path.display());
        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: Some(task_tx),
                worker: Some(worker),
            }),
            db_path: Arc::new(db_path),
        })
    }

    /// Opens the database, and if the file turns out to be unreadable moves it
    /// aside as `<name>.corrupt` and starts over with an empty one.
    pub fn open_or_reset(db_path: PathBuf) -> Result<Self> {
        match Self::new(db_path.clone()) {
            Ok(db) => Ok(db),
            Err(err) => {
                let mut quarantine = db_path.clone().into_os_string();
                quarantine.push(".corrupt");
                let quarantine = PathBuf::from(quarantine);
                warn!(
                    "Stats database at {} is unreadable ({err:#}); moving it to {}",
                    db_path.display(),
                    quarantine.display()
                );
                std::fs::rename(&db_path, &quarantine).with_context(|| {
                    format!("failed to move aside corrupt database {}", db_path.display())
                })?;
                for suffix in ["-wal", "-shm"] {
                    let mut sidecar = db_path.clone().into_os_string();
                    sidecar.push(suffix);
                    let sidecar = PathBuf::from(sidecar);
                    match std::fs::remove_file(&sidecar) {
                        Ok(()) => {}
                        Err(err) if err.kind() == ErrorKind::NotFound => {}
                        Err(err) => warn!(
                            "Failed to remove stale {}: {err}",
                            sidecar.display()
                        ),
                    }
                }
                Self::new(db_path)
            }
        }
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self
            .inner
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("database is shutting down"))?;
        let (reply_tx, reply_rx) = oneshot::channel();

        sender
            .send(Box::new(move |conn: &mut Connection| {
                if reply_tx.send(task(conn)).is_err() {
                    error!("DB caller dropped before receiving result");
                }
            }))
            .map_err(|err| anyhow!("failed to send task to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }
}
