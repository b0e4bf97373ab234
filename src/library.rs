use libloading::Library;
use tracing::{debug, info, warn};

use crate::{errors::SetupError, nvapi::QueryInterfaceFn};

/// A loaded driver module able to hand out its bootstrap query function.
pub trait DriverModule {
    // Name the module was loaded under, used for reporting
    fn name(&self) -> &str;

    // Look up the bootstrap export by name
    fn query_interface(&self, symbol: &str) -> Option<QueryInterfaceFn>;
}

/// Owns the native driver module.
///
/// The module is released exactly once, either by `release` or when the
/// handle is dropped on an error path.
#[derive(Debug)]
pub struct LibraryHandle {
    name: String,
    library: Library,
}

impl LibraryHandle {
    // Load the named module through the platform library search path
    pub fn acquire(name: &str) -> Result<Self, SetupError> {
        info!("Loading driver library \"{}\"", name);

        // Loading a library runs its initialisation routines, nothing
        // more can be checked up front
        let library = unsafe { Library::new(name) }.map_err(|source| {
            SetupError::LibraryLoad {
                name: name.to_string(),
                source,
            }
        })?;

        Ok(Self {
            name: name.to_string(),
            library,
        })
    }

    // Explicitly close the module and report close failures
    pub fn release(self) -> Result<(), libloading::Error> {
        debug!("Releasing driver library \"{}\"", self.name);

        self.library.close()
    }
}

impl DriverModule for LibraryHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn query_interface(&self, symbol: &str) -> Option<QueryInterfaceFn> {
        // The symbol type is dictated by the vendor, the returned pointer
        // is only valid while `self.library` stays loaded
        let lookup =
            unsafe { self.library.get::<QueryInterfaceFn>(symbol.as_bytes()) };

        match lookup {
            Ok(func) => Some(*func),
            Err(err) => {
                warn!("Symbol \"{}\" not found in \"{}\": {}", symbol, self.name, err);
                None
            }
        }
    }
}
