use std::path::PathBuf;

use crate::backend::BackendDevice;
use crate::TensorShape;

/// Feature level at which a kernel is linked and loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaunchCapability {
    /// Self-contained module, no cross-module calls.
    Basic,
    /// The kernel calls into the device-side runtime library.
    ExtendedLinkage,
    /// The kernel launches further kernels from device code. Requires
    /// extended linkage as a prerequisite.
    DynamicParallelism,
}

impl LaunchCapability {
    /// The documented degradation for this capability, if any.
    ///
    /// Only dynamic parallelism degrades; a caller that asked for `Basic` or
    /// `ExtendedLinkage` must get exactly that or an error.
    pub fn fallback(self) -> Option<Self> {
        match self {
            Self::DynamicParallelism => Some(Self::ExtendedLinkage),
            Self::Basic | Self::ExtendedLinkage => None,
        }
    }
}

/// Identifies a kernel inside a precompiled module image on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelSpec {
    /// Filesystem location of the compiled module.
    pub module_path: PathBuf,
    /// Name the rest of the system knows the kernel by.
    pub kernel_name: String,
    /// Symbol to resolve within the module.
    pub entry_point: String,
}

impl KernelSpec {
    pub fn new(
        module_path: impl Into<PathBuf>,
        kernel_name: impl Into<String>,
        entry_point: impl Into<String>,
    ) -> Self {
        Self {
            module_path: module_path.into(),
            kernel_name: kernel_name.into(),
            entry_point: entry_point.into(),
        }
    }
}

/// Cache key for a load request. The requested capability is part of the key:
/// the same kernel loaded at two capabilities is two distinct entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct KernelKey {
    pub spec: KernelSpec,
    pub capability: LaunchCapability,
}

/// A loaded, launch-ready kernel bound to exactly one device.
///
/// Handles are only ever produced by a fully successful load; there is no
/// partially loaded state. The achieved capability may be lower than what the
/// caller requested (see [`KernelCache`](crate::KernelCache)); callers that
/// care must inspect [`KernelHandle::achieved_capability`].
pub struct KernelHandle<B: BackendDevice> {
    ordinal: usize,
    spec: KernelSpec,
    achieved: LaunchCapability,
    module: B::Module,
}

impl<B: BackendDevice> std::fmt::Debug for KernelHandle<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelHandle")
            .field("ordinal", &self.ordinal)
            .field("spec", &self.spec)
            .field("achieved", &self.achieved)
            .finish()
    }
}

impl<B: BackendDevice> KernelHandle<B> {
    pub(crate) fn new(
        ordinal: usize,
        spec: KernelSpec,
        achieved: LaunchCapability,
        module: B::Module,
    ) -> Self {
        Self {
            ordinal,
            spec,
            achieved,
            module,
        }
    }

    /// Device this kernel is loaded on.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn spec(&self) -> &KernelSpec {
        &self.spec
    }

    /// Linkage mode the kernel was actually loaded at.
    pub fn achieved_capability(&self) -> LaunchCapability {
        self.achieved
    }

    /// The loaded module, for the launch layer.
    pub fn module(&self) -> &B::Module {
        &self.module
    }
}

const BLOCK_SIZE: u32 = 256;

/// Grid and block sizing for a launch over a flat element range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchDims {
    pub grid: (u32, u32, u32),
    pub block: (u32, u32, u32),
    pub shared_mem_bytes: u32,
}

impl LaunchDims {
    /// One thread per element, rounded up to whole blocks. Zero elements still
    /// launch a single block so the kernel's own bounds check runs.
    pub fn for_element_count(count: usize) -> Self {
        let blocks = (count as u32).div_ceil(BLOCK_SIZE).max(1);
        Self {
            grid: (blocks, 1, 1),
            block: (BLOCK_SIZE, 1, 1),
            shared_mem_bytes: 0,
        }
    }

    /// Sizing for a kernel iterating one shaped memory block.
    pub fn for_shape(shape: &TensorShape) -> Self {
        Self::for_element_count(shape.element_count())
    }
}
