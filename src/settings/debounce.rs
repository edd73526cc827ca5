//! Coalesces bursts of view-state changes into one settings write.

use super::SettingsStore;
use crate::data::ViewState;
use crate::session::Notice;
use crate::util::send_or_log;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub struct Debouncer {
    tx: watch::Sender<Option<ViewState>>,
    handle: JoinHandle<()>,
}

impl Debouncer {
    /// Spawn the saver task. Save failures are reported on `notices`.
    pub fn spawn(store: SettingsStore, delay: Duration, notices: mpsc::Sender<Notice>) -> Self {
        let (tx, rx) = watch::channel(None);
        let handle = tokio::spawn(save_loop(store, delay, rx, notices));
        Self { tx, handle }
    }

    /// Queue `state` for saving once no newer state arrives within the delay
    pub fn schedule(&self, state: ViewState) {
        self.tx.send_replace(Some(state));
    }

    /// Flush any pending state and stop the task
    pub async fn shutdown(self) {
        let Self { tx, handle } = self;
        drop(tx);
        if let Err(e) = handle.await {
            tracing::warn!("Settings saver task failed: {}", e);
        }
    }
}

async fn save_loop(
    store: SettingsStore,
    delay: Duration,
    mut rx: watch::Receiver<Option<ViewState>>,
    notices: mpsc::Sender<Notice>,
) {
    loop {
        if rx.changed().await.is_err() {
            break;
        }

        let mut closed = false;
        loop {
            match tokio::time::timeout(delay, rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        let pending = rx.borrow_and_update().clone();
        if let Some(state) = pending {
            if let Err(e) = store.save(&state).await {
                tracing::warn!("Failed to save view settings: {}", e);
                send_or_log(&notices, Notice::SaveFailed(e.to_string()), "save failure notice")
                    .await;
            }
        }

        if closed {
            break;
        }
    }
}
