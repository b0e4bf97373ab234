use std::time::Duration;

use chrono::Utc;
use tokio::{
    select,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace_span, warn};

use crate::{
    errors::MonitorError,
    nvapi::types::GpuHandle,
    sampler::TelemetrySampler,
    sink::{SampleRecord, SampleSink},
};

// Shortest period accepted by the tick timer
const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub interval: Duration,
    // None runs until cancelled
    pub ticks: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub ticks: u64,
    pub samples: u64,
    pub failed_reads: u64,
    pub cancelled: bool,
}

/// Drives the sampler at a fixed cadence and forwards every record to
/// the sink.
pub struct PollingLoop {
    config: PollingConfig,
    state: LoopState,
}

impl PollingLoop {
    pub fn new(config: PollingConfig) -> Self {
        Self {
            config,
            state: LoopState::Idle,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    // Run the polling loop.
    // Cancellation is only observed at tick boundaries, a tick that
    // already started always completes. Per tick read failures are
    // emitted and never stop the loop, a failing sink does.
    pub async fn run(
        &mut self,
        sampler: &TelemetrySampler<'_, '_>,
        gpus: &[GpuHandle],
        sink: &mut dyn SampleSink,
        token: &CancellationToken,
    ) -> Result<LoopSummary, MonitorError> {
        if self.state != LoopState::Idle {
            warn!("Polling loop: already run, ignoring");
            return Ok(LoopSummary::default());
        }

        self.state = LoopState::Running;
        info!(
            "Polling loop: Running - interval {:?} - ticks {}",
            self.config.interval,
            self.config
                .ticks
                .map_or_else(|| "unbounded".to_string(), |t| t.to_string())
        );

        let result = self.poll(sampler, gpus, sink, token).await;

        self.state = LoopState::Stopped;
        info!("Polling loop: Stopped");

        result
    }

    async fn poll(
        &self,
        sampler: &TelemetrySampler<'_, '_>,
        gpus: &[GpuHandle],
        sink: &mut dyn SampleSink,
        token: &CancellationToken,
    ) -> Result<LoopSummary, MonitorError> {
        let mut interval = time::interval(self.config.interval.max(MIN_INTERVAL));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut summary = LoopSummary::default();

        loop {
            if self.config.ticks.is_some_and(|ticks| summary.ticks >= ticks) {
                break;
            }

            select! {
                biased;

                _ = token.cancelled() => {
                    info!("Polling loop: cancelled after {} tick(s)", summary.ticks);
                    summary.cancelled = true;

                    break;
                },
                _ = interval.tick() => {},
            }

            let tick = summary.ticks + 1;
            let timestamp = Utc::now();
            let _guard = trace_span!("tick", tick).entered();

            // Handles of the same GPU are never sampled concurrently,
            // several GPUs are sampled one after the other
            for gpu in gpus {
                let sample = sampler.sample(*gpu);

                for err in sample.errors() {
                    warn!("Tick {}: GPU {}: {}: {}", tick, gpu, err, err.source);
                    summary.failed_reads += 1;
                }

                let record = SampleRecord::new(tick, timestamp, &sample);
                sink.emit(&record).map_err(MonitorError::Output)?;

                summary.samples += 1;
            }

            debug!("Tick {} done", tick);
            summary.ticks = tick;
        }

        Ok(summary)
    }
}
