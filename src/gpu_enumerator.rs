use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    capability_table::CapabilityTable,
    errors::{EnumerationError, SetupError},
    nvapi::types::{GpuHandle, MAX_PHYSICAL_GPUS},
};

/// Which enumerated GPUs get sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuSelection {
    All,
    Index(usize),
}

impl Default for GpuSelection {
    fn default() -> Self {
        Self::Index(0)
    }
}

/// Physical GPU handles reported by the driver, fixed for the process
/// lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuList {
    handles: Vec<GpuHandle>,
}

// Initialize the driver and list the physical GPUs.
// This is the only place Initialize is requested from.
pub fn enumerate(table: &CapabilityTable<'_>) -> Result<GpuList, SetupError> {
    table.initialize().map_err(EnumerationError::from)?;

    let mut buffer = [GpuHandle::NULL; MAX_PHYSICAL_GPUS];
    let count = table
        .enum_physical_gpus(&mut buffer)
        .map_err(EnumerationError::from)?;

    if count < 0 || count as usize > MAX_PHYSICAL_GPUS {
        return Err(EnumerationError::InvalidCount(count).into());
    }

    if count == 0 {
        return Err(SetupError::NoGpusFound);
    }

    let handles = buffer[..count as usize].to_vec();

    for (i, handle) in handles.iter().enumerate() {
        debug!("Found physical GPU {}: {}", i, handle);
    }
    info!("Found {} physical GPU(s)", handles.len());

    Ok(GpuList { handles })
}

impl GpuList {
    pub fn handles(&self) -> &[GpuHandle] {
        &self.handles
    }

    // Return the handles to monitor for the given selection
    pub fn select(&self, selection: GpuSelection) -> Result<Vec<GpuHandle>, SetupError> {
        match selection {
            GpuSelection::All => Ok(self.handles.clone()),
            GpuSelection::Index(index) => {
                let handle = self.handles.get(index).ok_or(
                    SetupError::GpuIndexOutOfRange {
                        index,
                        count: self.handles.len(),
                    },
                )?;

                Ok(vec![*handle])
            }
        }
    }
}
