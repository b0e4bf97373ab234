// In-process stand-in for the vendor driver.
//
// The entry points are real `extern "C"` functions handed out through the
// same bootstrap path as the native module. Behaviour and call records live
// in thread local state, every test runs on its own thread so tests don't
// see each other.

use std::{
    cell::RefCell,
    ffi::{c_int, c_void},
    ptr,
};

use crate::{
    library::DriverModule,
    nvapi::{
        EnumPhysicalGpusFn, GetThermalSettingsFn, GetUsagesFn, InitializeFn,
        NvStatus, QueryInterfaceFn, UnloadFn,
        capability::CapabilityIds,
        types::{
            GpuHandle, MAX_PHYSICAL_GPUS, ThermalSettings, ThermalTarget,
            UsageBuffer,
        },
    },
};

pub(crate) const BOOTSTRAP: &str = "nvapi_QueryInterface";

const FAILED: NvStatus = NvStatus(-1);

#[derive(Debug, Clone)]
pub(crate) struct MockDriver {
    // Identifiers answered with a null pointer
    pub missing_ids: Vec<u32>,
    pub gpus: Vec<usize>,
    // Overrides the count written by enumeration
    pub reported_count: Option<i32>,
    pub init_status: NvStatus,
    pub enum_status: NvStatus,
    pub temperature: i32,
    pub utilization: u32,
    // 1-based call numbers that fail
    pub fail_usage_calls: Vec<usize>,
    pub fail_thermal_calls: Vec<usize>,

    pub queried_ids: Vec<u32>,
    pub init_calls: usize,
    pub enum_calls: usize,
    pub usage_calls: usize,
    pub thermal_calls: usize,
    pub unload_calls: usize,
    pub usage_headers: Vec<u32>,
    pub thermal_versions: Vec<u32>,
    pub thermal_sensor_indexes: Vec<i32>,
    pub sampled_gpus: Vec<usize>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self {
            missing_ids: Vec::new(),
            gpus: vec![0x1],
            reported_count: None,
            init_status: NvStatus::OK,
            enum_status: NvStatus::OK,
            temperature: 62,
            utilization: 47,
            fail_usage_calls: Vec::new(),
            fail_thermal_calls: Vec::new(),

            queried_ids: Vec::new(),
            init_calls: 0,
            enum_calls: 0,
            usage_calls: 0,
            thermal_calls: 0,
            unload_calls: 0,
            usage_headers: Vec::new(),
            thermal_versions: Vec::new(),
            thermal_sensor_indexes: Vec::new(),
            sampled_gpus: Vec::new(),
        }
    }
}

thread_local! {
    static DRIVER: RefCell<MockDriver> = RefCell::new(MockDriver::default());
}

pub(crate) fn install(driver: MockDriver) {
    DRIVER.with_borrow_mut(|d| *d = driver);
}

// Snapshot of the driver state, including the recorded calls
pub(crate) fn state() -> MockDriver {
    DRIVER.with_borrow(|d| d.clone())
}

pub(crate) fn gpu(id: usize) -> GpuHandle {
    GpuHandle::from_raw(id as *mut c_void)
}

pub(crate) struct MockModule {
    bootstrap: bool,
}

impl MockModule {
    pub fn new() -> Self {
        Self { bootstrap: true }
    }

    pub fn without_bootstrap() -> Self {
        Self { bootstrap: false }
    }
}

impl DriverModule for MockModule {
    fn name(&self) -> &str {
        "mock-nvapi"
    }

    fn query_interface(&self, symbol: &str) -> Option<QueryInterfaceFn> {
        if self.bootstrap && symbol == BOOTSTRAP {
            Some(query_interface as QueryInterfaceFn)
        } else {
            None
        }
    }
}

unsafe extern "C" fn query_interface(id: u32) -> *mut c_void {
    let ids = CapabilityIds::default();

    let missing = DRIVER.with_borrow_mut(|d| {
        d.queried_ids.push(id);
        d.missing_ids.contains(&id)
    });

    if missing {
        return ptr::null_mut();
    }

    if id == ids.initialize.0 {
        initialize as InitializeFn as *mut c_void
    } else if id == ids.enum_physical_gpus.0 {
        enum_physical_gpus as EnumPhysicalGpusFn as *mut c_void
    } else if id == ids.get_usages.0 {
        get_usages as GetUsagesFn as *mut c_void
    } else if id == ids.get_thermal_settings.0 {
        get_thermal_settings as GetThermalSettingsFn as *mut c_void
    } else if id == ids.unload.0 {
        unload as UnloadFn as *mut c_void
    } else {
        ptr::null_mut()
    }
}

unsafe extern "C" fn initialize() -> NvStatus {
    DRIVER.with_borrow_mut(|d| {
        d.init_calls += 1;
        d.init_status
    })
}

unsafe extern "C" fn unload() -> NvStatus {
    DRIVER.with_borrow_mut(|d| {
        d.unload_calls += 1;
        NvStatus::OK
    })
}

unsafe extern "C" fn enum_physical_gpus(
    handles: *mut GpuHandle,
    count: *mut c_int,
) -> NvStatus {
    DRIVER.with_borrow_mut(|d| {
        d.enum_calls += 1;

        if !d.enum_status.is_ok() {
            return d.enum_status;
        }

        let handles =
            unsafe { std::slice::from_raw_parts_mut(handles, MAX_PHYSICAL_GPUS) };
        for (slot, id) in handles.iter_mut().zip(&d.gpus) {
            *slot = gpu(*id);
        }

        let reported = d.reported_count.unwrap_or(d.gpus.len() as i32);
        unsafe { *count = reported };

        NvStatus::OK
    })
}

unsafe extern "C" fn get_usages(handle: GpuHandle, usages: *mut UsageBuffer) -> NvStatus {
    let usages = unsafe { &mut *usages };

    DRIVER.with_borrow_mut(|d| {
        d.usage_calls += 1;
        d.usage_headers.push(usages.header());
        d.sampled_gpus.push(handle.id());

        if d.fail_usage_calls.contains(&d.usage_calls) {
            return FAILED;
        }

        // The real driver rewrites the whole buffer, header included
        let words = usages.words_mut();
        words.fill(0xAAAA_AAAA);
        words[3] = d.utilization;

        NvStatus::OK
    })
}

unsafe extern "C" fn get_thermal_settings(
    _handle: GpuHandle,
    sensor_index: c_int,
    settings: *mut ThermalSettings,
) -> NvStatus {
    let settings = unsafe { &mut *settings };

    DRIVER.with_borrow_mut(|d| {
        d.thermal_calls += 1;
        d.thermal_versions.push(settings.version);
        d.thermal_sensor_indexes.push(sensor_index);

        if d.fail_thermal_calls.contains(&d.thermal_calls) {
            return FAILED;
        }

        settings.version = 0;
        settings.count = 1;
        settings.sensors[0].controller = 1;
        settings.sensors[0].default_min_temp = 0;
        settings.sensors[0].default_max_temp = 127;
        settings.sensors[0].current_temp = d.temperature;
        settings.sensors[0].target = ThermalTarget::Gpu.to_raw();

        NvStatus::OK
    })
}
