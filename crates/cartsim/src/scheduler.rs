//! Signal scheduler
//!
//! Drives traces, logs and metrics on independent intervals until the
//! cancellation token fires or the trace cycle budget is spent. Trace cycles
//! are fire-and-forget: the loop never awaits a cycle's children.

use crate::config::GeneratorConfig;
use crate::logs::LogGenerator;
use crate::metrics::ShopMetrics;
use cartsim_core::{SimulationEngine, StatsSnapshot};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Added to the catalog's longest typical duration when draining, so
/// children whose timers fire on the same tick as the drain still export.
pub const DRAIN_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunSummary {
    pub cycles: u64,
    pub log_ticks: u64,
    pub log_records: u64,
    pub metric_ticks: u64,
    pub engine: Option<StatsSnapshot>,
}

pub struct Scheduler {
    trace_interval: Duration,
    cycles: Option<u64>,
    log_interval: Duration,
    metric_interval: Duration,
    engine: Option<SimulationEngine>,
    logs: Option<Arc<LogGenerator>>,
    metrics: Option<Arc<ShopMetrics>>,
}

impl Scheduler {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            trace_interval: Duration::from_millis(config.trace_interval_ms),
            cycles: config.cycles,
            log_interval: Duration::from_millis(config.log_interval_ms),
            metric_interval: Duration::from_millis(config.metric_interval_ms),
            engine: None,
            logs: None,
            metrics: None,
        }
    }

    pub fn with_engine(mut self, engine: SimulationEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_logs(mut self, logs: Arc<LogGenerator>) -> Self {
        self.logs = Some(logs);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ShopMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run every attached signal.
    ///
    /// Returns after `cancel` fires, or once a bounded trace run has started
    /// its last cycle and drained. The engine is dropped on return so HTTP
    /// exporters can flush.
    pub async fn run(self, cancel: CancellationToken) -> RunSummary {
        let stop = cancel.child_token();

        let traces = self.engine.clone().map(|engine| {
            tokio::spawn(trace_loop(
                engine,
                self.trace_interval,
                self.cycles,
                stop.clone(),
            ))
        });
        let logs = self
            .logs
            .clone()
            .map(|logs| tokio::spawn(log_loop(logs, self.log_interval, stop.clone())));
        let metrics = self
            .metrics
            .clone()
            .map(|metrics| tokio::spawn(metric_loop(metrics, self.metric_interval, stop.clone())));

        info!(
            traces = traces.is_some(),
            logs = logs.is_some(),
            metrics = metrics.is_some(),
            "Scheduler started"
        );

        let mut summary = RunSummary::default();
        match traces {
            Some(task) => {
                summary.cycles = joined(task, "traces").await.unwrap_or_default();
                // A bounded run ends every signal once its cycles are spent
                stop.cancel();
            }
            None => stop.cancelled().await,
        }
        if let Some(task) = logs {
            let (ticks, records) = joined(task, "logs").await.unwrap_or_default();
            summary.log_ticks = ticks;
            summary.log_records = records;
        }
        if let Some(task) = metrics {
            summary.metric_ticks = joined(task, "metrics").await.unwrap_or_default();
        }

        if let Some(engine) = self.engine {
            if summary.cycles > 0 {
                let drain = Duration::from_millis(engine.catalog().max_typical_duration_ms())
                    + DRAIN_GRACE;
                debug!(drain_ms = drain.as_millis() as u64, "Draining in-flight spans");
                tokio::time::sleep(drain).await;
            }
            summary.engine = Some(engine.stats());
        }

        info!(
            cycles = summary.cycles,
            log_records = summary.log_records,
            metric_ticks = summary.metric_ticks,
            "Scheduler stopped"
        );
        summary
    }
}

async fn joined<T>(task: JoinHandle<T>, signal: &str) -> Option<T> {
    match task.await {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(signal, error = %err, "Signal loop aborted");
            None
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn trace_loop(
    engine: SimulationEngine,
    period: Duration,
    limit: Option<u64>,
    stop: CancellationToken,
) -> u64 {
    let mut interval = ticker(period);
    let mut cycles = 0u64;

    while limit.is_none_or(|limit| cycles < limit) {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = interval.tick() => {
                let handle = engine.run_cycle();
                cycles += 1;
                info!(
                    cycle = cycles,
                    trace_id = %handle.trace_id,
                    launched = handle.launched(),
                    "Trace cycle started"
                );
            }
        }
    }
    cycles
}

async fn log_loop(
    logs: Arc<LogGenerator>,
    period: Duration,
    stop: CancellationToken,
) -> (u64, u64) {
    let mut interval = ticker(period);
    let (mut ticks, mut records) = (0u64, 0u64);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = interval.tick() => {
                ticks += 1;
                match logs.tick() {
                    Ok(count) => records += count as u64,
                    Err(err) => warn!(error = %err, "Failed to write log records"),
                }
            }
        }
    }
    (ticks, records)
}

async fn metric_loop(metrics: Arc<ShopMetrics>, period: Duration, stop: CancellationToken) -> u64 {
    let mut interval = ticker(period);
    let mut ticks = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = interval.tick() => {
                metrics.record_tick();
                ticks += 1;
            }
        }
    }
    ticks
}
