use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::debug;

use crate::backend::BackendDevice;
use crate::cache::KernelCache;
use crate::kernel::{KernelHandle, KernelSpec, LaunchCapability};
use crate::Result;

/// Process-scoped entry point for obtaining ready-to-launch kernels.
///
/// Owns one [`KernelCache`] per device ordinal, created lazily the first time
/// that device is addressed, and routes every request to the matching cache.
/// It holds no kernel logic of its own.
///
/// The runtime is an explicit value rather than an ambient global: normal
/// operation constructs one per process and passes it by reference to every
/// component that requests kernels, and tests can hold several independent
/// runtimes side by side.
pub struct KernelRuntime<B: BackendDevice> {
    backend: Arc<B>,
    caches: RwLock<HashMap<usize, Arc<KernelCache<B>>>>,
}

impl<B: BackendDevice> KernelRuntime<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            caches: RwLock::new(HashMap::new()),
        }
    }

    /// The cache for `ordinal`, created on first use.
    pub fn cache(&self, ordinal: usize) -> Arc<KernelCache<B>> {
        if let Some(cache) = self.caches.read().unwrap().get(&ordinal) {
            return cache.clone();
        }
        let mut caches = self.caches.write().unwrap();
        caches
            .entry(ordinal)
            .or_insert_with(|| {
                debug!("creating kernel cache for device {ordinal}");
                Arc::new(KernelCache::new(ordinal, self.backend.clone()))
            })
            .clone()
    }

    /// Look up or load the kernel for `spec` at `capability` on `ordinal`.
    pub fn kernel(
        &self,
        ordinal: usize,
        spec: &KernelSpec,
        capability: LaunchCapability,
    ) -> Result<Arc<KernelHandle<B>>> {
        self.cache(ordinal).kernel(spec, capability)
    }
}
