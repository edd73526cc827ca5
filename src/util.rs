//! Channel helpers shared by the session and the settings saver.

use tokio::sync::mpsc;

/// Send on a bounded channel; a closed receiver is logged, not an error.
pub async fn send_or_log<T>(tx: &mpsc::Sender<T>, value: T, context: &str) {
    if let Err(e) = tx.send(value).await {
        tracing::warn!("Failed to send {}: {}", context, e);
    }
}

/// Take everything currently queued without waiting
pub fn drain<T>(rx: &mut mpsc::Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(value) = rx.try_recv() {
        out.push(value);
    }
    out
}
