//! Debounced whole-document saves driven by state store notifications.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::models::ProgramState;
use crate::persistence::PersistenceAdapter;
use crate::remote::RemoteStore;

/// Quiet period after the last edit before a save fires.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(700);

pub trait SaveSink: Send + Sync + 'static {
    fn save(&self, state: &ProgramState) -> impl Future<Output = Result<()>> + Send;
}

impl<R: RemoteStore + 'static> SaveSink for PersistenceAdapter<R> {
    async fn save(&self, state: &ProgramState) -> Result<()> {
        PersistenceAdapter::save(self, state).await
    }
}

/// Background task that saves the latest state once edits go quiet.
///
/// The value current at start is treated as already saved, so nothing is written until
/// the first change after construction. Dropping the saver cancels any pending save.
pub struct Autosaver {
    handle: JoinHandle<()>,
    flush_tx: mpsc::Sender<oneshot::Sender<()>>,
}

impl Autosaver {
    pub fn start<S: SaveSink>(
        sink: Arc<S>,
        mut changes: watch::Receiver<ProgramState>,
        quiet: Duration,
    ) -> Self {
        changes.mark_unchanged();
        let (flush_tx, flush_rx) = mpsc::channel(4);
        let handle = tokio::spawn(run(sink, changes, quiet, flush_rx));
        Self { handle, flush_tx }
    }

    /// Save immediately if a change is pending, then return.
    pub async fn flush(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.flush_tx.send(reply_tx).await.is_err() {
            return;
        }
        let _ = reply_rx.await;
    }

    /// Cancel any pending save without writing it.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for Autosaver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run<S: SaveSink>(
    sink: Arc<S>,
    mut changes: watch::Receiver<ProgramState>,
    quiet: Duration,
    mut flush_rx: mpsc::Receiver<oneshot::Sender<()>>,
) {
    let mut pending = false;
    loop {
        if pending {
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    debug!("Edit arrived, rescheduling save");
                }
                Some(reply) = flush_rx.recv() => {
                    save_latest(sink.as_ref(), &mut changes).await;
                    pending = false;
                    let _ = reply.send(());
                }
                () = sleep(quiet) => {
                    save_latest(sink.as_ref(), &mut changes).await;
                    pending = false;
                }
            }
        } else {
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    pending = true;
                }
                request = flush_rx.recv() => match request {
                    Some(reply) => {
                        if changes.has_changed().unwrap_or(false) {
                            save_latest(sink.as_ref(), &mut changes).await;
                        }
                        let _ = reply.send(());
                    }
                    None => break,
                },
            }
        }
    }
    debug!("Autosave stopped");
}

async fn save_latest<S: SaveSink>(sink: &S, changes: &mut watch::Receiver<ProgramState>) {
    let state = changes.borrow_and_update().clone();
    match sink.save(&state).await {
        Ok(()) => debug!("Autosaved program state"),
        Err(e) => warn!(error = %format!("{e:#}"), "Autosave failed"),
    }
}
