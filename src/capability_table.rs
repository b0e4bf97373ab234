use std::{
    ffi::{c_int, c_void},
    marker::PhantomData,
    mem,
    ptr::NonNull,
    sync::atomic::{AtomicBool, Ordering},
};

use tracing::{trace, warn};

use crate::{
    library::DriverModule,
    nvapi::{
        EnumPhysicalGpusFn, GetThermalSettingsFn, GetUsagesFn, InitializeFn,
        NativeCallError, UnloadFn,
        capability::Capability,
        types::{GpuHandle, MAX_PHYSICAL_GPUS, ThermalSettings, UsageBuffer},
    },
    resolver::Resolution,
};

/// Resolved driver entry points, immutable once built.
///
/// The table borrows the module it was resolved from, so it can't outlive
/// the loaded library. Every call goes through a typed wrapper returning
/// the invoked capability on failure.
#[derive(Debug)]
pub struct CapabilityTable<'m> {
    initialize: InitializeFn,
    enum_physical_gpus: EnumPhysicalGpusFn,
    get_usages: GetUsagesFn,
    get_thermal_settings: GetThermalSettingsFn,
    unload: Option<UnloadFn>,

    // Initialize must reach the driver at most once
    initialized: AtomicBool,

    _module: PhantomData<&'m dyn DriverModule>,
}

// Reinterpret a resolved entry as the function type registered for it
unsafe fn cast<F: Copy>(entry: NonNull<c_void>) -> F {
    debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<*mut c_void>());

    unsafe { mem::transmute_copy::<*mut c_void, F>(&entry.as_ptr()) }
}

impl<'m> CapabilityTable<'m> {
    // None if a required entry is missing from the resolution
    pub(crate) fn from_resolution(resolution: &Resolution<'m>) -> Option<Self> {
        // The signatures below are the ones registered for each identifier,
        // the driver family defines them and they can't be checked here
        unsafe {
            Some(Self {
                initialize: cast(resolution.entry(Capability::Initialize)?),
                enum_physical_gpus: cast(
                    resolution.entry(Capability::EnumPhysicalGpus)?,
                ),
                get_usages: cast(resolution.entry(Capability::GetUsages)?),
                get_thermal_settings: cast(
                    resolution.entry(Capability::GetThermalSettings)?,
                ),
                unload: resolution.entry(Capability::Unload).map(|e| cast(e)),
                initialized: AtomicBool::new(false),
                _module: PhantomData,
            })
        }
    }

    // Only the GPU enumerator calls this, a second call never reaches
    // the driver
    pub(crate) fn initialize(&self) -> Result<(), NativeCallError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            warn!("Driver already initialized, skipping Initialize");
            return Ok(());
        }

        trace!("Calling {}", Capability::Initialize);

        unsafe { (self.initialize)() }.check(Capability::Initialize)
    }

    // Fill the handle buffer and return the raw count reported by the driver
    pub fn enum_physical_gpus(
        &self,
        handles: &mut [GpuHandle; MAX_PHYSICAL_GPUS],
    ) -> Result<i32, NativeCallError> {
        let mut count: c_int = 0;

        unsafe { (self.enum_physical_gpus)(handles.as_mut_ptr(), &mut count) }
            .check(Capability::EnumPhysicalGpus)?;

        Ok(count)
    }

    pub fn get_usages(
        &self,
        gpu: GpuHandle,
        usages: &mut UsageBuffer,
    ) -> Result<(), NativeCallError> {
        unsafe { (self.get_usages)(gpu, usages) }.check(Capability::GetUsages)
    }

    pub fn get_thermal_settings(
        &self,
        gpu: GpuHandle,
        sensor_index: i32,
        settings: &mut ThermalSettings,
    ) -> Result<(), NativeCallError> {
        unsafe { (self.get_thermal_settings)(gpu, sensor_index, settings) }
            .check(Capability::GetThermalSettings)
    }

    pub fn has_unload(&self) -> bool {
        self.unload.is_some()
    }

    // None when the driver doesn't provide Unload
    pub fn unload(&self) -> Option<Result<(), NativeCallError>> {
        let unload = self.unload?;

        trace!("Calling {}", Capability::Unload);

        Some(unsafe { unload() }.check(Capability::Unload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mock_driver::{self, MockDriver, MockModule},
        nvapi::{capability::CapabilityRegistry, types::USAGE_BUFFER_HEADER},
        resolver::InterfaceResolver,
    };

    #[test]
    fn initialize_reaches_driver_once() {
        mock_driver::install(MockDriver::default());
        let module = MockModule::new();
        let resolver =
            InterfaceResolver::bootstrap(&module, mock_driver::BOOTSTRAP).unwrap();
        let table = resolver.resolve(&CapabilityRegistry::default()).unwrap();

        table.initialize().unwrap();
        table.initialize().unwrap();

        assert_eq!(mock_driver::state().init_calls, 1);
    }

    #[test]
    fn failing_status_names_the_capability() {
        mock_driver::install(MockDriver {
            fail_usage_calls: vec![1],
            ..Default::default()
        });
        let module = MockModule::new();
        let resolver =
            InterfaceResolver::bootstrap(&module, mock_driver::BOOTSTRAP).unwrap();
        let table = resolver.resolve(&CapabilityRegistry::default()).unwrap();

        let mut usages = UsageBuffer::new();
        let err = table
            .get_usages(mock_driver::gpu(1), &mut usages)
            .unwrap_err();

        assert_eq!(err.capability, Capability::GetUsages);
        assert!(!err.status.is_ok());
        assert_eq!(mock_driver::state().usage_headers, vec![USAGE_BUFFER_HEADER]);
    }

    #[test]
    fn unload_is_forwarded_when_resolved() {
        mock_driver::install(MockDriver::default());
        let module = MockModule::new();
        let resolver =
            InterfaceResolver::bootstrap(&module, mock_driver::BOOTSTRAP).unwrap();
        let table = resolver.resolve(&CapabilityRegistry::default()).unwrap();

        assert!(matches!(table.unload(), Some(Ok(()))));
        assert_eq!(mock_driver::state().unload_calls, 1);
    }
}
