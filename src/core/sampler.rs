//! Periodic background sampling, independent of any widget's refresh cadence

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::metrics::{MetricKind, MetricSnapshot, MetricsService};

/// Everything sampled on one tick.
#[derive(Debug, Clone)]
pub struct SampleReport {
    pub memory: MetricSnapshot,
    pub download: MetricSnapshot,
    pub upload: MetricSnapshot,
}

pub struct BackgroundSampler {
    service: Arc<MetricsService>,
    interface: String,
    interval: Duration,
}

impl BackgroundSampler {
    pub fn new(service: Arc<MetricsService>, interface: String, interval: Duration) -> Self {
        Self {
            service,
            interface,
            interval,
        }
    }

    /// Run until `shutdown` flips to true or its sender is dropped. Reports are
    /// sent to `report_tx` when given; a closed receiver also stops the loop.
    pub fn spawn(
        self,
        report_tx: Option<mpsc::UnboundedSender<SampleReport>>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(report_tx, shutdown))
    }

    async fn run(
        self,
        report_tx: Option<mpsc::UnboundedSender<SampleReport>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = self.interval.as_secs_f64(),
            interface = %self.interface,
            "background sampling started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(report) = self.tick().await else { continue };
                    if let Some(tx) = &report_tx {
                        if tx.send(report).is_err() {
                            break;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("background sampling stopped");
    }

    /// OS queries are short but blocking, so they run off the async workers.
    async fn tick(&self) -> Option<SampleReport> {
        let service = Arc::clone(&self.service);
        let interface = self.interface.clone();

        let result = tokio::task::spawn_blocking(move || {
            let now = Utc::now();
            let memory = service.get_metric(MetricKind::Memory, "", now);
            let (download, upload) = service.network_snapshots(&interface, now);
            SampleReport {
                memory,
                download,
                upload,
            }
        })
        .await;

        match result {
            Ok(report) => {
                tracing::debug!(
                    memory = report.memory.formatted("percent"),
                    download = report.download.formatted("rate"),
                    upload = report.upload.formatted("rate"),
                    "sampled"
                );
                Some(report)
            }
            Err(e) => {
                tracing::warn!(error = %e, "sampling task failed");
                None
            }
        }
    }
}
