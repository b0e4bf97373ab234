use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    gpu_enumerator::GpuSelection,
    nvapi::capability::{CapabilityIds, CapabilityRegistry},
    polling_loop::PollingConfig,
    sink::OutputFormat,
};

#[cfg(target_pointer_width = "64")]
const DEFAULT_LIBRARY: &str = "nvapi64.dll";
#[cfg(not(target_pointer_width = "64"))]
const DEFAULT_LIBRARY: &str = "nvapi.dll";

const DEFAULT_BOOTSTRAP_SYMBOL: &str = "nvapi_QueryInterface";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't open configuration file \"{}\"", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("couldn't parse configuration file \"{}\"", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Monitor configuration.
///
/// Missing fields in the configuration file take their default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub library: String,
    pub bootstrap_symbol: String,

    // Sampling period in milliseconds
    pub interval_ms: u64,
    // Number of ticks, null runs until interrupted
    pub ticks: Option<u64>,

    pub gpus: GpuSelection,
    pub output: OutputFormat,

    // Identifiers of the private entry points for the targeted driver
    pub capabilities: CapabilityIds,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            library: DEFAULT_LIBRARY.to_string(),
            bootstrap_symbol: DEFAULT_BOOTSTRAP_SYMBOL.to_string(),
            interval_ms: 1000,
            ticks: Some(100),
            gpus: GpuSelection::default(),
            output: OutputFormat::default(),
            capabilities: CapabilityIds::default(),
        }
    }
}

impl MonitorConfig {
    // Load the configuration file, or the defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            debug!("No configuration file given, using defaults");
            return Ok(Self::default());
        };

        info!("Loading configuration file \"{}\"", path.display());

        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = serde_json::from_reader(BufReader::new(file)).map_err(
            |source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
        )?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.library.is_empty() {
            return Err(ConfigError::Invalid("library name is empty".into()));
        }
        if self.bootstrap_symbol.is_empty() {
            return Err(ConfigError::Invalid("bootstrap symbol is empty".into()));
        }
        if self.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sampling interval must be greater than zero".into(),
            ));
        }
        if self.ticks == Some(0) {
            return Err(ConfigError::Invalid(
                "tick count must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn polling(&self) -> PollingConfig {
        PollingConfig {
            interval: self.interval(),
            ticks: self.ticks,
        }
    }

    pub fn registry(&self) -> CapabilityRegistry {
        CapabilityRegistry::new(&self.capabilities)
    }
}
