use std::{ffi::c_void, ptr::NonNull};

use tracing::{debug, info, warn};

use crate::{
    capability_table::CapabilityTable,
    errors::SetupError,
    library::DriverModule,
    nvapi::{
        QueryInterfaceFn,
        capability::{Capability, CapabilityDescriptor, CapabilityId, CapabilityRegistry},
    },
};

/// Looks up private entry points through the bootstrap query function.
pub struct InterfaceResolver<'m> {
    module: &'m dyn DriverModule,
    query: QueryInterfaceFn,
}

impl<'m> InterfaceResolver<'m> {
    // Resolve the single named export everything else is looked up through
    pub fn bootstrap(
        module: &'m dyn DriverModule,
        symbol: &str,
    ) -> Result<Self, SetupError> {
        let query = module.query_interface(symbol).ok_or_else(|| {
            SetupError::InterfaceBootstrap {
                module: module.name().to_string(),
                symbol: symbol.to_string(),
            }
        })?;

        debug!("Bootstrap symbol \"{}\" resolved", symbol);

        Ok(Self { module, query })
    }

    // A null answer is a normal outcome: unknown id or incompatible driver
    pub fn query(&self, id: CapabilityId) -> Option<NonNull<c_void>> {
        let raw = unsafe { (self.query)(id.0) };

        NonNull::new(raw)
    }

    // Issue exactly one query per registered capability
    pub fn resolve_all(&self, registry: &CapabilityRegistry) -> Resolution<'m> {
        let entries = registry
            .descriptors()
            .iter()
            .map(|descriptor| {
                let entry = self.query(descriptor.id);

                debug!(
                    "{} ({}) {}: {}",
                    descriptor.capability,
                    descriptor.id,
                    descriptor.signature,
                    if entry.is_some() { "resolved" } else { "unresolved" }
                );

                (*descriptor, entry)
            })
            .collect();

        Resolution {
            module: self.module,
            entries,
        }
    }

    // Resolve every capability and build the table, failing on any
    // missing required entry
    pub fn resolve(
        &self,
        registry: &CapabilityRegistry,
    ) -> Result<CapabilityTable<'m>, SetupError> {
        self.resolve_all(registry).into_table()
    }
}

/// Outcome of the resolution pass, one entry per registered capability.
pub struct Resolution<'m> {
    module: &'m dyn DriverModule,
    entries: Vec<(CapabilityDescriptor, Option<NonNull<c_void>>)>,
}

impl<'m> Resolution<'m> {
    pub fn is_resolved(&self, capability: Capability) -> bool {
        self.entry(capability).is_some()
    }

    // Required capabilities the driver didn't provide
    pub fn missing_required(&self) -> Vec<Capability> {
        self.entries
            .iter()
            .filter(|(descriptor, entry)| descriptor.required && entry.is_none())
            .map(|(descriptor, _)| descriptor.capability)
            .collect()
    }

    pub fn entry(&self, capability: Capability) -> Option<NonNull<c_void>> {
        self.entries
            .iter()
            .find(|(descriptor, _)| descriptor.capability == capability)
            .and_then(|(_, entry)| *entry)
    }

    pub fn into_table(self) -> Result<CapabilityTable<'m>, SetupError> {
        let missing = self.missing_required();

        if !missing.is_empty() {
            for capability in &missing {
                warn!(
                    "Required capability {} missing from \"{}\"",
                    capability,
                    self.module.name()
                );
            }

            return Err(SetupError::InterfaceResolution { missing });
        }

        let resolved = self.entries.iter().filter(|(_, e)| e.is_some()).count();
        info!(
            "Resolved {}/{} driver capabilities from \"{}\"",
            resolved,
            self.entries.len(),
            self.module.name()
        );

        let table = CapabilityTable::from_resolution(&self).ok_or_else(|| {
            SetupError::InterfaceResolution {
                missing: self.missing_required(),
            }
        })?;

        Ok(table)
    }
}
