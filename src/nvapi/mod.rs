// Raw definitions for the private NVAPI entry points.
//
// None of these functions are exported by name, every pointer is obtained
// through the bootstrap query function using an opaque numeric identifier.

use std::{
    ffi::{c_int, c_void},
    fmt,
};

use thiserror::Error;

use crate::nvapi::{
    capability::Capability,
    types::{GpuHandle, ThermalSettings, UsageBuffer},
};

pub mod capability;
pub mod types;

// Bootstrap export, looks up every other function by numeric identifier
pub type QueryInterfaceFn = unsafe extern "C" fn(id: u32) -> *mut c_void;

pub type InitializeFn = unsafe extern "C" fn() -> NvStatus;
pub type UnloadFn = unsafe extern "C" fn() -> NvStatus;
pub type EnumPhysicalGpusFn =
    unsafe extern "C" fn(handles: *mut GpuHandle, count: *mut c_int) -> NvStatus;
pub type GetUsagesFn =
    unsafe extern "C" fn(gpu: GpuHandle, usages: *mut UsageBuffer) -> NvStatus;
pub type GetThermalSettingsFn = unsafe extern "C" fn(
    gpu: GpuHandle,
    sensor_index: c_int,
    settings: *mut ThermalSettings,
) -> NvStatus;

/// Status code returned by every driver entry point.
///
/// Zero is success, anything else is a failure. The named codes are only
/// used to make log output readable.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NvStatus(pub c_int);

impl NvStatus {
    pub const OK: NvStatus = NvStatus(0);

    pub fn is_ok(self) -> bool {
        self.0 == 0
    }

    // Convert the status into a result tagged with the invoked capability
    pub fn check(self, capability: Capability) -> Result<(), NativeCallError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(NativeCallError {
                capability,
                status: self,
            })
        }
    }

    pub fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            0 => "NVAPI_OK",
            -1 => "NVAPI_ERROR",
            -2 => "NVAPI_LIBRARY_NOT_FOUND",
            -3 => "NVAPI_NO_IMPLEMENTATION",
            -4 => "NVAPI_API_NOT_INITIALIZED",
            -5 => "NVAPI_INVALID_ARGUMENT",
            -6 => "NVAPI_NVIDIA_DEVICE_NOT_FOUND",
            -7 => "NVAPI_END_ENUMERATION",
            -8 => "NVAPI_INVALID_HANDLE",
            -9 => "NVAPI_INCOMPATIBLE_STRUCT_VERSION",
            -10 => "NVAPI_HANDLE_INVALIDATED",
            _ => return None,
        };

        Some(name)
    }
}

impl fmt::Display for NvStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "status {}", self.0),
        }
    }
}

/// A native call that returned a non success status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{capability} returned {status}")]
pub struct NativeCallError {
    pub capability: Capability,
    pub status: NvStatus,
}
