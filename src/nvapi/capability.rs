use std::fmt;

use serde::{Deserialize, Serialize};

/// A private driver function reachable only through the bootstrap query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    Initialize,
    EnumPhysicalGpus,
    GetUsages,
    GetThermalSettings,
    Unload,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialize => "Initialize",
            Self::EnumPhysicalGpus => "EnumPhysicalGpus",
            Self::GetUsages => "GetUsages",
            Self::GetThermalSettings => "GetThermalSettings",
            Self::Unload => "Unload",
        };

        f.write_str(name)
    }
}

/// Vendor assigned identifier of a capability.
///
/// Only stable within a driver release family, never computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(pub u32);

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010X}", self.0)
    }
}

/// Identifier of each capability for the targeted driver family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityIds {
    pub initialize: CapabilityId,
    pub enum_physical_gpus: CapabilityId,
    pub get_usages: CapabilityId,
    pub get_thermal_settings: CapabilityId,
    pub unload: CapabilityId,
}

impl Default for CapabilityIds {
    fn default() -> Self {
        Self {
            initialize: CapabilityId(0x0150_E828),
            enum_physical_gpus: CapabilityId(0xE5AC_921F),
            get_usages: CapabilityId(0x189A_1FDF),
            get_thermal_settings: CapabilityId(0xE364_0A56),
            unload: CapabilityId(0xD22B_DD7E),
        }
    }
}

/// Contract of a capability: where to find it and what it looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub capability: Capability,
    pub id: CapabilityId,
    pub signature: &'static str,
    pub required: bool,
}

/// The set of capabilities to resolve at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityRegistry {
    descriptors: Vec<CapabilityDescriptor>,
}

impl CapabilityRegistry {
    pub fn new(ids: &CapabilityIds) -> Self {
        let descriptors = vec![
            CapabilityDescriptor {
                capability: Capability::Initialize,
                id: ids.initialize,
                signature: "() -> status",
                required: true,
            },
            CapabilityDescriptor {
                capability: Capability::EnumPhysicalGpus,
                id: ids.enum_physical_gpus,
                signature: "(out handles[64], out count) -> status",
                required: true,
            },
            CapabilityDescriptor {
                capability: Capability::GetUsages,
                id: ids.get_usages,
                signature: "(handle, in/out usages[34]) -> status",
                required: true,
            },
            CapabilityDescriptor {
                capability: Capability::GetThermalSettings,
                id: ids.get_thermal_settings,
                signature: "(handle, sensor index, in/out settings) -> status",
                required: true,
            },
            CapabilityDescriptor {
                capability: Capability::Unload,
                id: ids.unload,
                signature: "() -> status",
                required: false,
            },
        ];

        Self { descriptors }
    }

    pub fn descriptors(&self) -> &[CapabilityDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, capability: Capability) -> Option<&CapabilityDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.capability == capability)
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new(&CapabilityIds::default())
    }
}
