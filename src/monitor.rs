use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    capability_table::CapabilityTable,
    config::MonitorConfig,
    errors::MonitorError,
    gpu_enumerator,
    library::DriverModule,
    polling_loop::{LoopSummary, PollingLoop},
    resolver::InterfaceResolver,
    sampler::TelemetrySampler,
    sink::SampleSink,
};

// Resolve the driver interface, enumerate the GPUs once and run the
// polling loop. Any setup failure returns before the first tick.
pub async fn run(
    module: &dyn DriverModule,
    config: &MonitorConfig,
    sink: &mut dyn SampleSink,
    token: &CancellationToken,
) -> Result<LoopSummary, MonitorError> {
    let resolver = InterfaceResolver::bootstrap(module, &config.bootstrap_symbol)?;
    let table = resolver.resolve(&config.registry())?;

    // Unload runs for every built table, including when enumeration or
    // GPU selection fails after Initialize
    let result = monitor(&table, config, sink, token).await;

    match table.unload() {
        Some(Ok(())) => debug!("Driver unloaded"),
        Some(Err(err)) => warn!("Driver unload failed: {}", err),
        None => debug!("Unload not provided by the driver"),
    }

    result
}

async fn monitor(
    table: &CapabilityTable<'_>,
    config: &MonitorConfig,
    sink: &mut dyn SampleSink,
    token: &CancellationToken,
) -> Result<LoopSummary, MonitorError> {
    let gpus = gpu_enumerator::enumerate(table)?;
    let selected = gpus.select(config.gpus)?;
    info!(
        "Monitoring {} of {} GPU(s): {:?}",
        selected.len(),
        gpus.handles().len(),
        selected
    );

    let sampler = TelemetrySampler::new(table);
    let mut polling = PollingLoop::new(config.polling());

    polling.run(&sampler, &selected, sink, token).await
}
