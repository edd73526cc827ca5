use super::{Notice, Session};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

const TICK: Duration = Duration::from_secs(1);

/// Drive a started session until `shutdown` resolves.
///
/// Ticks once a second (the session decides whether a poll is due), applies
/// finished refreshes as they arrive, and calls `on_change` whenever the
/// snapshot is replaced. Notices are logged.
pub async fn run_background<S, F>(session: &mut Session, shutdown: S, mut on_change: F)
where
    S: Future<Output = ()>,
    F: FnMut(&Session),
{
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                session.on_tick(Instant::now());
            }
            Some(event) = session.next_refresh_event() => {
                if session.apply_refresh(event) {
                    on_change(session);
                }
            }
        }

        for notice in session.drain_notices() {
            match notice {
                Notice::SaveFailed(message) => {
                    tracing::warn!("Settings were not saved: {}", message)
                }
                Notice::MutationFailed { item_id, message } => {
                    tracing::warn!("Update of item {} failed: {}", item_id, message)
                }
            }
        }
    }

    session.close().await;
}
