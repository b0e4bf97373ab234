use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    nvapi::types::ThermalSensorReading,
    sampler::{Sample, SampleErrorKind},
};

/// Output record emitted once per GPU per tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRecord {
    pub tick: u64,
    pub gpu_id: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_celsius: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilization_percent: Option<u32>,
    pub errors: Vec<SampleErrorKind>,
    // Every sensor slot the driver populated, empty on a failed thermal read
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sensors: Vec<ThermalSensorReading>,
}

impl SampleRecord {
    // The timestamp belongs to the tick, not to the sampler
    pub fn new(tick: u64, timestamp: DateTime<Utc>, sample: &Sample) -> Self {
        Self {
            tick,
            gpu_id: sample.gpu.id(),
            timestamp,
            temperature_celsius: sample.temperature_celsius(),
            utilization_percent: sample.utilization_percent(),
            errors: sample.errors().iter().map(|e| e.kind).collect(),
            sensors: sample.sensors.clone(),
        }
    }
}

/// Destination of the sample stream.
pub trait SampleSink {
    fn emit(&mut self, record: &SampleRecord) -> Result<()>;
}

// Collect the records in memory
impl SampleSink for Vec<SampleRecord> {
    fn emit(&mut self, record: &SampleRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            other => Err(format!("unknown output format \"{other}\"")),
        }
    }
}

// One JSON object per line
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> SampleSink for JsonLinesSink<W> {
    fn emit(&mut self, record: &SampleRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)
            .with_context(|| "Failed to serialize sample record")?;
        writeln!(self.writer)?;
        self.writer.flush().with_context(|| "Failed to flush sample output")?;

        Ok(())
    }
}

// Temperature line followed by the usage line, error markers for
// missing channels
pub struct TextSink<W: Write> {
    writer: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> SampleSink for TextSink<W> {
    fn emit(&mut self, record: &SampleRecord) -> Result<()> {
        let marker = |kind: SampleErrorKind| {
            record
                .errors
                .contains(&kind)
                .then(|| format!("error: {kind}"))
        };

        match record.temperature_celsius {
            Some(temp) => writeln!(self.writer, "{temp}")?,
            None => writeln!(
                self.writer,
                "{}",
                marker(SampleErrorKind::ThermalReadFailed).unwrap_or_default()
            )?,
        }

        match record.utilization_percent {
            Some(usage) => writeln!(self.writer, "GPU Usage: {usage}")?,
            None => writeln!(
                self.writer,
                "GPU Usage: {}",
                marker(SampleErrorKind::UsageReadFailed).unwrap_or_default()
            )?,
        }

        self.writer.flush().with_context(|| "Failed to flush sample output")?;

        Ok(())
    }
}
