use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::backend::{BackendDevice, LoadError};
use crate::error::KernelLoadFailure;
use crate::kernel::{KernelHandle, KernelKey, KernelSpec, LaunchCapability};
use crate::{Error, Result};

enum SlotState<B: BackendDevice> {
    Vacant,
    Loaded(Arc<KernelHandle<B>>),
    Failed(KernelLoadFailure),
}

/// Per-device registry of loaded kernels.
///
/// Each distinct (module, kernel, entry, capability) key is loaded at most
/// once; concurrent requests for the same key serialize on that key's slot
/// and all observe the single resulting handle or failure. Requests for
/// different keys load concurrently.
///
/// A request for [`LaunchCapability::DynamicParallelism`] on a platform that
/// cannot satisfy it degrades to `ExtendedLinkage` for the same kernel. The
/// degraded handle is cached under the `ExtendedLinkage` key only, so a later
/// dynamic-parallelism request probes the platform again rather than
/// pretending the higher capability had succeeded.
pub struct KernelCache<B: BackendDevice> {
    ordinal: usize,
    backend: Arc<B>,
    slots: Mutex<HashMap<KernelKey, Arc<Mutex<SlotState<B>>>>>,
}

impl<B: BackendDevice> KernelCache<B> {
    pub(crate) fn new(ordinal: usize, backend: Arc<B>) -> Self {
        Self {
            ordinal,
            backend,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Device this cache is scoped to.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Look up or load the kernel for `spec` at `capability`.
    pub fn kernel(
        &self,
        spec: &KernelSpec,
        capability: LaunchCapability,
    ) -> Result<Arc<KernelHandle<B>>> {
        let key = KernelKey {
            spec: spec.clone(),
            capability,
        };
        let slot = {
            let mut slots = self.slots.lock().unwrap();
            slots
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(SlotState::Vacant)))
                .clone()
        };

        // Per-key lock: concurrent requests for an identical key wait here
        // and observe the outcome of the single load below. Unrelated keys
        // hold unrelated locks.
        let mut state = slot.lock().unwrap();
        match &*state {
            SlotState::Loaded(handle) => {
                debug!(
                    "cache hit for kernel '{}' at {capability:?} on device {}",
                    spec.kernel_name, self.ordinal
                );
                return Ok(handle.clone());
            }
            SlotState::Failed(failure) => return Err(Error::KernelLoad(failure.clone())),
            SlotState::Vacant => {}
        }

        match self.backend.load_module(self.ordinal, spec, capability) {
            Ok(module) => {
                let handle = Arc::new(KernelHandle::new(
                    self.ordinal,
                    spec.clone(),
                    capability,
                    module,
                ));
                debug!(
                    "loaded kernel '{}' (entry '{}') from {} at {capability:?} on device {}",
                    spec.kernel_name,
                    spec.entry_point,
                    spec.module_path.display(),
                    self.ordinal
                );
                *state = SlotState::Loaded(handle.clone());
                Ok(handle)
            }
            Err(cause @ LoadError::PlatformCapabilityUnavailable { .. }) => {
                match capability.fallback() {
                    Some(lower) => {
                        // Single fallback hop: a second lookup-or-load under
                        // the lower key. This slot stays vacant so a later
                        // request at the original capability probes the
                        // platform again. The lock order is strictly
                        // higher-capability slot, then lower, so the nested
                        // acquisition cannot cycle.
                        warn!(
                            "{cause}; degrading kernel '{}' to {lower:?} on device {}",
                            spec.kernel_name, self.ordinal
                        );
                        self.kernel(spec, lower)
                    }
                    None => Err(self.fail(&mut state, spec, capability, cause)),
                }
            }
            Err(cause) => Err(self.fail(&mut state, spec, capability, cause)),
        }
    }

    /// Record a terminal failure in the slot and surface it.
    fn fail(
        &self,
        state: &mut SlotState<B>,
        spec: &KernelSpec,
        requested: LaunchCapability,
        cause: LoadError,
    ) -> Error {
        let failure = KernelLoadFailure {
            ordinal: self.ordinal,
            module_path: spec.module_path.clone(),
            kernel_name: spec.kernel_name.clone(),
            entry_point: spec.entry_point.clone(),
            requested,
            cause,
        };
        *state = SlotState::Failed(failure.clone());
        Error::KernelLoad(failure)
    }
}
