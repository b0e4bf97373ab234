use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use crate::{
    capability_table::CapabilityTable,
    nvapi::{
        NativeCallError,
        types::{GpuHandle, ThermalSensorReading, ThermalSettings, UsageBuffer},
    },
};

// Sensor slot requested from the thermal settings call
const THERMAL_SENSOR_INDEX: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SampleErrorKind {
    ThermalReadFailed,
    UsageReadFailed,
}

impl fmt::Display for SampleErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThermalReadFailed => f.write_str("thermal read failed"),
            Self::UsageReadFailed => f.write_str("usage read failed"),
        }
    }
}

/// A failed telemetry channel within a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct SampleError {
    pub kind: SampleErrorKind,
    #[source]
    pub source: NativeCallError,
}

/// One observation of a GPU.
///
/// The thermal and usage channels are independent, either one can fail
/// without discarding the other.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub gpu: GpuHandle,
    pub temperature: Result<i32, SampleError>,
    pub utilization: Result<u32, SampleError>,
    // Sensor slots populated by a successful thermal read
    pub sensors: Vec<ThermalSensorReading>,
}

impl Sample {
    pub fn temperature_celsius(&self) -> Option<i32> {
        self.temperature.as_ref().ok().copied()
    }

    pub fn utilization_percent(&self) -> Option<u32> {
        self.utilization.as_ref().ok().copied()
    }

    pub fn errors(&self) -> Vec<SampleError> {
        let mut errors = Vec::new();

        if let Err(err) = self.temperature {
            errors.push(err);
        }
        if let Err(err) = self.utilization {
            errors.push(err);
        }

        errors
    }

    pub fn is_complete(&self) -> bool {
        self.temperature.is_ok() && self.utilization.is_ok()
    }
}

/// Reads one sample per call from the resolved driver entry points.
///
/// Scratch structures are rebuilt for every read so no state crosses
/// tick boundaries.
pub struct TelemetrySampler<'t, 'm> {
    table: &'t CapabilityTable<'m>,
}

impl<'t, 'm> TelemetrySampler<'t, 'm> {
    pub fn new(table: &'t CapabilityTable<'m>) -> Self {
        Self { table }
    }

    pub fn sample(&self, gpu: GpuHandle) -> Sample {
        let (temperature, sensors) = match self.read_thermal(gpu) {
            Ok(settings) => (Ok(settings.current_temp()), settings.readings()),
            Err(err) => (Err(err), Vec::new()),
        };

        let utilization = self.read_usage(gpu);

        trace!(
            "GPU {}: temperature {:?} - utilization {:?}",
            gpu, temperature, utilization
        );

        Sample {
            gpu,
            temperature,
            utilization,
            sensors,
        }
    }

    fn read_thermal(&self, gpu: GpuHandle) -> Result<ThermalSettings, SampleError> {
        let mut settings = ThermalSettings::gpu_query();

        self.table
            .get_thermal_settings(gpu, THERMAL_SENSOR_INDEX, &mut settings)
            .map_err(|source| SampleError {
                kind: SampleErrorKind::ThermalReadFailed,
                source,
            })?;

        Ok(settings)
    }

    fn read_usage(&self, gpu: GpuHandle) -> Result<u32, SampleError> {
        let mut usages = UsageBuffer::new();

        self.table
            .get_usages(gpu, &mut usages)
            .map_err(|source| SampleError {
                kind: SampleErrorKind::UsageReadFailed,
                source,
            })?;

        Ok(usages.core_utilization())
    }
}
