//! Module loader for hosted pages.
//!
//! A page may only import modules published in its own blob store. Network,
//! filesystem and data URLs are all rejected, and so is any blob minted under
//! a different origin.

use crate::blob::BlobStore;
use deno_core::{
    anyhow::{anyhow, Error},
    ModuleLoadResponse, ModuleLoader, ModuleSource, ModuleSourceCode, ModuleSpecifier,
    ModuleType, RequestedModuleType, ResolutionKind,
};

const SCRIPT_TYPES: &[&str] = &["text/javascript", "application/javascript"];

/// A module loader that restricts all imports to one page's blob origin.
pub struct BlobModuleLoader {
    store: BlobStore,
    origin: String,
}

impl BlobModuleLoader {
    pub fn new(store: BlobStore) -> Result<Self, Error> {
        let origin = ModuleSpecifier::parse(store.origin())
            .map_err(|e| anyhow!("Invalid page origin '{}': {}", store.origin(), e))?
            .origin()
            .ascii_serialization();
        Ok(Self { store, origin })
    }

    fn is_same_origin(&self, specifier: &ModuleSpecifier) -> bool {
        specifier.scheme() == "blob" && specifier.origin().ascii_serialization() == self.origin
    }
}

impl ModuleLoader for BlobModuleLoader {
    fn resolve(
        &self,
        specifier: &str,
        _referrer: &str,
        _kind: ResolutionKind,
    ) -> Result<ModuleSpecifier, Error> {
        if !specifier.starts_with("blob:") {
            return Err(anyhow!(
                "Import blocked: only same-origin blob: modules can be loaded, got '{}'",
                specifier
            ));
        }

        let resolved = ModuleSpecifier::parse(specifier)
            .map_err(|e| anyhow!("Invalid blob URL '{}': {}", specifier, e))?;

        if !self.is_same_origin(&resolved) {
            return Err(anyhow!(
                "Import blocked: '{}' is outside the page origin {}",
                specifier,
                self.origin
            ));
        }

        Ok(resolved)
    }

    fn load(
        &self,
        module_specifier: &ModuleSpecifier,
        _maybe_referrer: Option<&ModuleSpecifier>,
        _is_dyn_import: bool,
        _requested_module_type: RequestedModuleType,
    ) -> ModuleLoadResponse {
        // Re-check: specifiers can reach load() without going through resolve()
        if !self.is_same_origin(module_specifier) {
            return ModuleLoadResponse::Sync(Err(anyhow!(
                "Access denied: {}",
                module_specifier
            )));
        }

        let Some(blob) = self.store.resolve(module_specifier.as_str()) else {
            return ModuleLoadResponse::Sync(Err(anyhow!(
                "Failed to load '{}': object URL has been revoked",
                module_specifier
            )));
        };

        if !SCRIPT_TYPES.contains(&blob.content_type.as_str()) {
            return ModuleLoadResponse::Sync(Err(anyhow!(
                "Refused to load '{}' as a module: content type {}",
                module_specifier,
                blob.content_type
            )));
        }

        let code = String::from_utf8_lossy(&blob.data).into_owned();

        ModuleLoadResponse::Sync(Ok(ModuleSource::new(
            ModuleType::JavaScript,
            ModuleSourceCode::String(code.into()),
            module_specifier,
            None,
        )))
    }
}
