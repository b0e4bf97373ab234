use std::path::PathBuf;

use argparse::{ArgumentParser, Print, StoreOption, StoreTrue};

use crate::{config::MonitorConfig, gpu_enumerator::GpuSelection, sink::OutputFormat};

// Command line options, every value set here overrides the configuration
#[derive(Debug, Default)]
pub struct ArgsOptions {
    pub config_file_path: Option<PathBuf>,

    pub library: Option<String>,
    pub interval_ms: Option<u64>,
    pub ticks: Option<u64>,
    pub forever: bool,
    pub gpu_index: Option<usize>,
    pub all_gpus: bool,
    pub output: Option<OutputFormat>,
}

impl ArgsOptions {
    pub fn parse() -> Self {
        let mut options = ArgsOptions::default();

        {
            let mut parser = ArgumentParser::new();
            parser.set_description("Sample GPU temperature and utilization through NVAPI");

            // Configuration file path
            parser.refer(&mut options.config_file_path).add_option(
                &["-c", "--config"],
                StoreOption,
                "The file path of the configuration file",
            );

            parser.refer(&mut options.library).add_option(
                &["-l", "--library"],
                StoreOption,
                "Name or path of the driver library",
            );

            parser.refer(&mut options.interval_ms).add_option(
                &["-i", "--interval"],
                StoreOption,
                "Sampling interval in milliseconds",
            );

            parser.refer(&mut options.ticks).add_option(
                &["-n", "--ticks"],
                StoreOption,
                "Number of samples to take",
            );

            parser.refer(&mut options.forever).add_option(
                &["--forever"],
                StoreTrue,
                "Sample until interrupted",
            );

            parser.refer(&mut options.gpu_index).add_option(
                &["-g", "--gpu"],
                StoreOption,
                "Index of the GPU to sample",
            );

            parser.refer(&mut options.all_gpus).add_option(
                &["--all-gpus"],
                StoreTrue,
                "Sample every enumerated GPU",
            );

            parser.refer(&mut options.output).add_option(
                &["-f", "--format"],
                StoreOption,
                "Output format: json or text",
            );

            // Show version
            parser.add_option(
                &["-V", "--version"],
                Print(env!("CARGO_PKG_VERSION").to_string()),
                "Show the version",
            );

            parser.parse_args_or_exit();
        }

        options
    }

    // Apply the command line overrides on top of the loaded configuration
    pub fn apply(&self, config: &mut MonitorConfig) {
        if let Some(library) = &self.library {
            config.library = library.clone();
        }

        if let Some(interval_ms) = self.interval_ms {
            config.interval_ms = interval_ms;
        }

        if self.forever {
            config.ticks = None;
        } else if let Some(ticks) = self.ticks {
            config.ticks = Some(ticks);
        }

        if self.all_gpus {
            config.gpus = GpuSelection::All;
        } else if let Some(index) = self.gpu_index {
            config.gpus = GpuSelection::Index(index);
        }

        if let Some(output) = self.output {
            config.output = output;
        }
    }
}
