use std::{io, process::ExitCode};

use moss_nvapi::{
    arg_parser::ArgsOptions,
    config::MonitorConfig,
    errors::MonitorError,
    library::LibraryHandle,
    logger, monitor,
    polling_loop::LoopSummary,
    sink::{JsonLinesSink, OutputFormat, SampleSink, TextSink},
};
use tokio::signal::ctrl_c;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    logger::init_logging();

    // Parse the command line arguments
    let args_options = ArgsOptions::parse();

    // This token is cancelled on Ctrl-C, the polling loop
    // checks it at every tick boundary
    let token = CancellationToken::new();
    {
        let token = token.clone();

        tokio::spawn(async move {
            if ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping after the current tick");
                token.cancel();
            }
        });
    }

    match run(&args_options, &token).await {
        Ok(summary) => {
            info!(
                "Done: {} tick(s), {} sample(s), {} failed read(s){}",
                summary.ticks,
                summary.samples,
                summary.failed_reads,
                if summary.cancelled { ", interrupted" } else { "" }
            );

            ExitCode::SUCCESS
        }
        Err(err) => {
            let code = ExitCode::from(&err);

            for e in anyhow::Error::from(err).chain() {
                error!("{e}");
            }

            code
        }
    }
}

async fn run(
    args_options: &ArgsOptions,
    token: &CancellationToken,
) -> Result<LoopSummary, MonitorError> {
    let mut config = MonitorConfig::load(args_options.config_file_path.as_deref())?;
    args_options.apply(&mut config);
    config.validate()?;

    let mut sink: Box<dyn SampleSink> = match config.output {
        OutputFormat::Json => Box::new(JsonLinesSink::new(io::stdout())),
        OutputFormat::Text => Box::new(TextSink::new(io::stdout())),
    };

    // The library outlives everything resolved from it and is
    // released once the monitor is done, whatever the outcome
    let library = LibraryHandle::acquire(&config.library)?;

    let result = monitor::run(&library, &config, sink.as_mut(), token).await;

    if let Err(err) = library.release() {
        warn!("Failed to release driver library: {err}");
    }

    result
}
