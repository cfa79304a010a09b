use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::SnapshotStore;
use crate::core::{Error, Portfolio, Result};

enum Command {
    Schedule(Portfolio),
    SaveNow(Portfolio, oneshot::Sender<Result<DateTime<Utc>>>),
    Clear(oneshot::Sender<Result<()>>),
}

/// Debounced background saver and sole writer of the save file. Every
/// scheduled snapshot restarts the delay, so a burst of edits ends in a single
/// write of the newest snapshot. Immediate saves and clears are queued behind
/// whatever write is in flight.
pub struct Autosaver {
    commands: mpsc::UnboundedSender<Command>,
    saved_tx: Arc<watch::Sender<Option<DateTime<Utc>>>>,
    task: JoinHandle<()>,
}

impl Autosaver {
    pub fn spawn(store: Arc<SnapshotStore>, delay: Duration) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let saved_tx = Arc::new(watch::channel(None).0);
        let task = tokio::spawn(run_autosave(store, delay, rx, Arc::clone(&saved_tx)));
        info!(delay_ms = delay.as_millis() as u64, "autosave started");
        Self {
            commands,
            saved_tx,
            task,
        }
    }

    pub fn schedule(&self, portfolio: Portfolio) {
        if self.commands.send(Command::Schedule(portfolio)).is_err() {
            warn!("autosave task stopped, edit not scheduled");
        }
    }

    /// Saves immediately and drops whatever was waiting on the timer.
    pub async fn save_now(&self, portfolio: Portfolio) -> Result<DateTime<Utc>> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::SaveNow(portfolio, reply))
            .map_err(|_| Error::SaverStopped)?;
        rx.await.map_err(|_| Error::SaverStopped)?
    }

    /// Drops any pending write and removes the save file.
    pub async fn clear(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Clear(reply))
            .map_err(|_| Error::SaverStopped)?;
        rx.await.map_err(|_| Error::SaverStopped)?
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        *self.saved_tx.borrow()
    }

    pub fn subscribe_saves(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.saved_tx.subscribe()
    }

    /// Flushes a pending snapshot, if any, and stops the background task.
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(e) = self.task.await {
            warn!(error = %e, "autosave task ended abnormally");
        }
    }
}

async fn run_autosave(
    store: Arc<SnapshotStore>,
    delay: Duration,
    mut commands: mpsc::UnboundedReceiver<Command>,
    saved: Arc<watch::Sender<Option<DateTime<Utc>>>>,
) {
    let mut pending: Option<Portfolio> = None;
    let deadline = tokio::time::sleep(delay);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Schedule(portfolio)) => {
                    if pending.replace(portfolio).is_some() {
                        debug!("autosave delay restarted by newer snapshot");
                    }
                    deadline.as_mut().reset(Instant::now() + delay);
                }
                Some(Command::SaveNow(portfolio, reply)) => {
                    pending = None;
                    let result = write_snapshot(&store, portfolio, &saved).await;
                    let _ = reply.send(result);
                }
                Some(Command::Clear(reply)) => {
                    pending = None;
                    let _ = reply.send(remove_snapshot(&store).await);
                }
                None => {
                    if let Some(portfolio) = pending.take() {
                        autosave(&store, portfolio, &saved).await;
                    }
                    return;
                }
            },
            _ = &mut deadline, if pending.is_some() => {
                if let Some(portfolio) = pending.take() {
                    autosave(&store, portfolio, &saved).await;
                }
            }
        }
    }
}

async fn autosave(
    store: &Arc<SnapshotStore>,
    portfolio: Portfolio,
    saved: &watch::Sender<Option<DateTime<Utc>>>,
) {
    match write_snapshot(store, portfolio, saved).await {
        Ok(saved_at) => info!(%saved_at, "autosaved snapshot"),
        Err(e) => warn!(error = %e, "autosave failed"),
    }
}

async fn write_snapshot(
    store: &Arc<SnapshotStore>,
    portfolio: Portfolio,
    saved: &watch::Sender<Option<DateTime<Utc>>>,
) -> Result<DateTime<Utc>> {
    let store = Arc::clone(store);
    let saved_at = tokio::task::spawn_blocking(move || store.save(&portfolio))
        .await
        .map_err(std::io::Error::other)??;
    saved.send_replace(Some(saved_at));
    Ok(saved_at)
}

async fn remove_snapshot(store: &Arc<SnapshotStore>) -> Result<()> {
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || store.clear())
        .await
        .map_err(std::io::Error::other)?
}
