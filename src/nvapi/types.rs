// Fixed layout structures exchanged with the driver.
//
// The driver validates the header word of every in/out structure before
// touching it, a wrong header makes the call fail without further notice.

use std::{ffi::c_void, fmt, mem::size_of, ptr};

use serde::Serialize;

// magic numbers, do not change them
pub const MAX_PHYSICAL_GPUS: usize = 64;
pub const MAX_USAGES_PER_GPU: usize = 34;
pub const MAX_THERMAL_SENSORS_PER_GPU: usize = 3;

// Flag bit the driver expects in the usage buffer header word
const USAGE_BUFFER_FLAG: u32 = 0x10000;

// Index of the GPU core utilization in the usage buffer
const CORE_UTILIZATION_INDEX: usize = 3;

// Revision of the thermal settings structure understood by this crate
const THERMAL_SETTINGS_REVISION: u32 = 1;

// Controller id meaning "let the driver pick the sensor"
const ANY_CONTROLLER: i32 = -1;

/// Version word of a versioned driver structure: its byte size with the
/// revision stored in the high half-word.
pub const fn struct_version<T>(revision: u32) -> u32 {
    size_of::<T>() as u32 | (revision << 16)
}

/// Header word of a usage buffer holding `capacity` 32 bit counters.
pub const fn usage_buffer_header(capacity: usize) -> u32 {
    (capacity * size_of::<u32>()) as u32 | USAGE_BUFFER_FLAG
}

pub const THERMAL_SETTINGS_VERSION: u32 =
    struct_version::<ThermalSettings>(THERMAL_SETTINGS_REVISION);

pub const USAGE_BUFFER_HEADER: u32 = usage_buffer_header(MAX_USAGES_PER_GPU);

/// Opaque physical GPU handle owned by the driver.
///
/// The handle is only ever copied around, it is never dereferenced,
/// created or freed on this side.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuHandle(*mut c_void);

impl GpuHandle {
    pub const NULL: GpuHandle = GpuHandle(ptr::null_mut());

    pub fn from_raw(raw: *mut c_void) -> Self {
        Self(raw)
    }

    // Numeric identity used when reporting samples
    pub fn id(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for GpuHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuHandle({:#x})", self.id())
    }
}

impl fmt::Display for GpuHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.id())
    }
}

/// What a thermal sensor measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalTarget {
    None,
    Gpu,
    Memory,
    PowerSupply,
    Board,
    VcdBoard,
    VcdInlet,
    VcdOutlet,
    All,
    Unknown,
}

impl ThermalTarget {
    // The driver writes this field, so any value may come back
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::None,
            1 => Self::Gpu,
            2 => Self::Memory,
            4 => Self::PowerSupply,
            8 => Self::Board,
            9 => Self::VcdBoard,
            10 => Self::VcdInlet,
            11 => Self::VcdOutlet,
            15 => Self::All,
            _ => Self::Unknown,
        }
    }

    pub fn to_raw(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Gpu => 1,
            Self::Memory => 2,
            Self::PowerSupply => 4,
            Self::Board => 8,
            Self::VcdBoard => 9,
            Self::VcdInlet => 10,
            Self::VcdOutlet => 11,
            Self::All => 15,
            Self::Unknown => -1,
        }
    }
}

// One sensor slot as laid out by the driver
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThermalSensor {
    pub controller: i32,
    pub default_min_temp: i32,
    pub default_max_temp: i32,
    pub current_temp: i32,
    pub target: i32,
}

/// In/out structure of the thermal settings call.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThermalSettings {
    pub version: u32,
    pub count: u32,
    pub sensors: [ThermalSensor; MAX_THERMAL_SENSORS_PER_GPU],
}

impl ThermalSettings {
    /// Scratch value asking the driver for the GPU core sensor.
    pub fn gpu_query() -> Self {
        let mut sensors = [ThermalSensor::default(); MAX_THERMAL_SENSORS_PER_GPU];
        sensors[0].controller = ANY_CONTROLLER;
        sensors[0].target = ThermalTarget::Gpu.to_raw();

        Self {
            version: THERMAL_SETTINGS_VERSION,
            count: 0,
            sensors,
        }
    }

    // Temperature of the first slot, the one requested by `gpu_query`
    pub fn current_temp(&self) -> i32 {
        self.sensors[0].current_temp
    }

    // Sensor slots populated by the driver
    pub fn readings(&self) -> Vec<ThermalSensorReading> {
        let count = (self.count as usize).min(MAX_THERMAL_SENSORS_PER_GPU);

        self.sensors[..count]
            .iter()
            .map(ThermalSensorReading::from)
            .collect()
    }
}

/// Decoded view of a populated sensor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThermalSensorReading {
    pub controller_id: i32,
    pub default_min_temp_c: i32,
    pub default_max_temp_c: i32,
    pub current_temp_c: i32,
    pub target: ThermalTarget,
}

impl From<&ThermalSensor> for ThermalSensorReading {
    fn from(sensor: &ThermalSensor) -> Self {
        Self {
            controller_id: sensor.controller,
            default_min_temp_c: sensor.default_min_temp,
            default_max_temp_c: sensor.default_max_temp,
            current_temp_c: sensor.current_temp,
            target: ThermalTarget::from_raw(sensor.target),
        }
    }
}

/// In/out buffer of the usages call.
///
/// Word 0 is the header, word 3 the core utilization in percent.
/// Every other word is undocumented and passed through untouched.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageBuffer {
    words: [u32; MAX_USAGES_PER_GPU],
}

impl UsageBuffer {
    pub fn new() -> Self {
        let mut words = [0; MAX_USAGES_PER_GPU];
        words[0] = USAGE_BUFFER_HEADER;

        Self { words }
    }

    pub fn header(&self) -> u32 {
        self.words[0]
    }

    pub fn core_utilization(&self) -> u32 {
        self.words[CORE_UTILIZATION_INDEX]
    }

    pub fn words_mut(&mut self) -> &mut [u32; MAX_USAGES_PER_GPU] {
        &mut self.words
    }
}

impl Default for UsageBuffer {
    fn default() -> Self {
        Self::new()
    }
}
