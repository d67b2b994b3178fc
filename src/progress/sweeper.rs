use crate::progress::{ProgressHub, SessionChannels};
use std::sync::Arc;
use std::time::Duration;

/// Periodically drop expired snapshots and abandoned channels.
pub async fn run(hub: ProgressHub, channels: Arc<SessionChannels>, interval: Duration) {
    log::info!("progress sweeper started (every {}s)", interval.as_secs());
    let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));

    loop {
        ticker.tick().await;
        sweep_once(&hub, &channels).await;
    }
}

pub async fn sweep_once(hub: &ProgressHub, channels: &SessionChannels) {
    match hub.purge_expired().await {
        Ok(0) => {}
        Ok(purged) => log::debug!("sweeper: purged {} expired progress entries", purged),
        Err(e) => log::warn!("sweeper: failed to purge progress entries: {}", e),
    }

    let pruned = channels.prune_idle();
    if pruned > 0 {
        log::debug!("sweeper: dropped {} idle progress channels", pruned);
    }
}
