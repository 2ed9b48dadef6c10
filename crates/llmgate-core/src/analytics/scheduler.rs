//! Periodic snapshot task

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::CostAnalytics;
use crate::models::{CostAlert, Severity};
use crate::router::Router;

/// Feeds router totals into the analytics engine on a fixed interval
pub struct SnapshotTask;

impl SnapshotTask {
    /// Spawn the task; it stops when `cancel` fires.
    ///
    /// The first snapshot is taken one interval after the call.
    pub fn spawn(
        router: Arc<Router>,
        analytics: Arc<CostAnalytics>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval = %humantime::format_duration(period), "Starting cost snapshot task");

            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let totals = router.totals();
                        for alert in analytics.record_snapshot(&totals) {
                            log_alert(&alert);
                        }
                    }
                }
            }

            info!("Cost snapshot task stopped");
        })
    }
}

fn log_alert(alert: &CostAlert) {
    match alert.severity {
        Severity::Critical => error!(
            alert = %alert.type_tag(),
            percent = alert.percent,
            spend = alert.spend,
            budget = alert.budget,
            "{}", alert.message
        ),
        Severity::Warning => warn!(
            alert = %alert.type_tag(),
            percent = alert.percent,
            spend = alert.spend,
            budget = alert.budget,
            "{}", alert.message
        ),
        Severity::Info => info!(
            alert = %alert.type_tag(),
            percent = alert.percent,
            "{}", alert.message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentRegistry;
    use crate::models::{CompletionRequest, Message, MicroUsd};
    use crate::providers::{EchoProvider, ProviderRegistry};

    #[tokio::test]
    async fn test_snapshots_until_cancelled() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(EchoProvider::new("openrouter"))).unwrap();
        let router = Arc::new(Router::new(registry, Arc::new(AgentRegistry::new())).unwrap());
        let analytics = Arc::new(CostAnalytics::new(100, MicroUsd::ZERO, MicroUsd::ZERO));

        router
            .complete(&CompletionRequest::new("ada", vec![Message::user("hello")]))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let handle = SnapshotTask::spawn(
            router.clone(),
            analytics.clone(),
            Duration::from_millis(10),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
        handle.await.unwrap();

        let taken = analytics.len();
        assert!(taken >= 1);
        assert_eq!(analytics.latest().unwrap().total_requests, 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(analytics.len(), taken);
    }
}
