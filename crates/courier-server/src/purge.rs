use std::time::Duration;

use tracing::{info, warn};

use courier_api::AppState;
use courier_api::state::with_db;

/// Background task that drops revoked tokens once they would have expired
/// anyway.
pub async fn run_purge_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let now = chrono::Utc::now().timestamp();
        match with_db(&state, move |db| db.purge_expired_tokens(now)).await {
            Ok(count) => {
                if count > 0 {
                    info!("Purge: removed {} expired revoked tokens", count);
                }
            }
            Err(e) => {
                warn!("Purge error: {}", e);
            }
        }
    }
}
