//! Expansion loading using libloading.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{ExpansionError, Result};

use super::instance::ExpansionInstance;

#[cfg(feature = "dynamic-loading")]
pub(crate) type LibraryHandle = libloading::Library;
#[cfg(not(feature = "dynamic-loading"))]
pub(crate) type LibraryHandle = ();

/// Handles loading expansions from dynamic libraries.
pub struct ExpansionLoader;

impl ExpansionLoader {
    /// Loads an expansion and performs the version handshake. The returned
    /// instance is not initialized.
    ///
    /// The version symbol is resolved and checked before any other symbol,
    /// so an expansion built for another ABI revision is rejected without
    /// touching the rest of its exports.
    ///
    /// This runs code from the library (its constructors and
    /// `api_version`). Only load expansions from trusted sources.
    #[cfg(feature = "dynamic-loading")]
    pub fn load(library_path: &Path) -> Result<ExpansionInstance> {
        use libloading::{Library, Symbol};

        use crate::abi::{
            symbol_name, ApiVersionFn, LifecycleFn, TriggeredFn, API_VERSION_SYMBOL,
            ON_DEINIT_SYMBOL, ON_INIT_SYMBOL, TRIGGERED_SYMBOL,
        };
        use crate::host::{negotiate, EntryPoints};

        debug!("Loading expansion from {:?}", library_path);

        let library = unsafe { Library::new(library_path) }.map_err(|e| {
            ExpansionError::LibraryLoad {
                path: library_path.to_path_buf(),
                source: Box::new(e),
            }
        })?;

        // Fn pointers are copied out of the symbols; they stay valid because
        // the instance keeps `library` alive.
        fn resolve<T: Copy>(library: &Library, path: &Path, name: &[u8]) -> Result<T> {
            let symbol: Symbol<T> = unsafe { library.get(name) }.map_err(|_| {
                ExpansionError::SymbolNotPresent {
                    path: path.to_path_buf(),
                    symbol: symbol_name(name),
                }
            })?;
            Ok(*symbol)
        }

        let name = expansion_name(library_path);

        let api_version: ApiVersionFn = resolve(&library, library_path, API_VERSION_SYMBOL)?;
        negotiate(&name, unsafe { api_version() })?;

        let entry_points = EntryPoints {
            api_version,
            on_init: resolve::<LifecycleFn>(&library, library_path, ON_INIT_SYMBOL)?,
            on_deinit: resolve::<LifecycleFn>(&library, library_path, ON_DEINIT_SYMBOL)?,
            triggered: resolve::<TriggeredFn>(&library, library_path, TRIGGERED_SYMBOL)?,
        };

        let instance = unsafe { ExpansionInstance::from_entry_points(name, entry_points) }?
            .with_library(library_path.to_path_buf(), library);

        info!(
            "Loaded expansion '{}' (API v{}) from {}",
            instance.name(),
            instance.negotiated_version(),
            library_path.display()
        );

        Ok(instance)
    }

    #[cfg(not(feature = "dynamic-loading"))]
    pub fn load(_library_path: &Path) -> Result<ExpansionInstance> {
        Err(ExpansionError::DynamicLoadingDisabled)
    }
}

/// Derives a display name from a library path: the file stem without the
/// platform's `lib` prefix.
pub fn expansion_name(library_path: &Path) -> String {
    let stem = library_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| library_path.display().to_string());
    match stem.strip_prefix(std::env::consts::DLL_PREFIX) {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => stem,
    }
}
