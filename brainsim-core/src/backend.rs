use crate::kernel::{KernelSpec, LaunchCapability};

/// Classified cause of a single failed load attempt.
///
/// The classification is what makes the fallback decision in
/// [`KernelCache`](crate::KernelCache) decidable: a missing platform feature
/// can be degraded around, a broken module never can.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The platform or toolchain lacks the requested feature (the device-side
    /// runtime library, or device-side launch support).
    #[error("{capability:?} is unavailable on this platform: {detail}")]
    PlatformCapabilityUnavailable {
        capability: LaunchCapability,
        detail: String,
    },

    /// The module image is missing or malformed, or the entry point does not
    /// exist within it. No capability downgrade can fix this.
    #[error("module load error: {detail}")]
    ModuleLoad { detail: String },
}

/// A device runtime that loads precompiled kernel modules.
///
/// Implementations load at exactly the capability they are asked for and
/// report failures through the [`LoadError`] classification; the degradation
/// policy lives entirely in the cache above this trait.
pub trait BackendDevice: Send + Sync {
    /// A loaded, launch-ready module handed to the external execution layer.
    type Module: Send + Sync;

    /// Load `spec` on device `ordinal` at `capability`.
    ///
    /// This is a blocking device-runtime call; callers must expect it to
    /// occupy the thread for the duration of a driver call.
    fn load_module(
        &self,
        ordinal: usize,
        spec: &KernelSpec,
        capability: LaunchCapability,
    ) -> std::result::Result<Self::Module, LoadError>;
}
