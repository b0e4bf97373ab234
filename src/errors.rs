use std::process::ExitCode;

use thiserror::Error;

use crate::{
    config::ConfigError,
    nvapi::{NativeCallError, capability::Capability},
};

/// Failures of the one time setup phase, all of them are fatal.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("couldn't load driver library \"{name}\"")]
    LibraryLoad {
        name: String,
        #[source]
        source: libloading::Error,
    },
    #[error("bootstrap symbol \"{symbol}\" not found in \"{module}\"")]
    InterfaceBootstrap { module: String, symbol: String },
    #[error("driver interface incomplete, unresolved: {}", join_capabilities(.missing))]
    InterfaceResolution { missing: Vec<Capability> },
    #[error("GPU enumeration failed")]
    Enumeration(#[from] EnumerationError),
    #[error("no physical GPU found")]
    NoGpusFound,
    #[error("GPU index {index} out of range, {count} GPU(s) found")]
    GpuIndexOutOfRange { index: usize, count: usize },
}

#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error(transparent)]
    Native(#[from] NativeCallError),
    #[error("driver reported an invalid GPU count: {0}")]
    InvalidCount(i32),
}

// The main error type
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("couldn't emit sample")]
    Output(#[source] anyhow::Error),
}

impl MonitorError {
    // Each fatal class gets its own code so callers can tell
    // "driver absent" from "driver incompatible"
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Setup(SetupError::LibraryLoad { .. }) => 1,
            Self::Setup(SetupError::InterfaceResolution { .. }) => 2,
            Self::Setup(SetupError::InterfaceBootstrap { .. }) => 3,
            Self::Setup(SetupError::Enumeration(_)) => 4,
            Self::Setup(SetupError::NoGpusFound) => 5,
            Self::Setup(SetupError::GpuIndexOutOfRange { .. }) => 6,
            Self::Config(_) => 7,
            Self::Output(_) => 8,
        }
    }
}

impl From<&MonitorError> for ExitCode {
    fn from(err: &MonitorError) -> Self {
        ExitCode::from(err.exit_code())
    }
}

fn join_capabilities(capabilities: &[Capability]) -> String {
    capabilities
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_error_names_missing_capabilities() {
        let err = SetupError::InterfaceResolution {
            missing: vec![Capability::EnumPhysicalGpus, Capability::GetUsages],
        };

        assert_eq!(
            err.to_string(),
            "driver interface incomplete, unresolved: EnumPhysicalGpus, GetUsages"
        );
    }

    #[test]
    fn fatal_classes_have_distinct_exit_codes() {
        let errors: Vec<MonitorError> = vec![
            SetupError::InterfaceBootstrap {
                module: "m".into(),
                symbol: "s".into(),
            }
            .into(),
            SetupError::InterfaceResolution { missing: vec![] }.into(),
            SetupError::Enumeration(EnumerationError::InvalidCount(-1)).into(),
            SetupError::NoGpusFound.into(),
            SetupError::GpuIndexOutOfRange { index: 2, count: 1 }.into(),
            ConfigError::Invalid("interval".into()).into(),
            MonitorError::Output(anyhow::anyhow!("closed")),
        ];

        let mut codes: Vec<u8> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort();
        codes.dedup();

        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0));
        // Code 1 stays reserved for a missing library
        assert!(!codes.contains(&1));
    }
}
