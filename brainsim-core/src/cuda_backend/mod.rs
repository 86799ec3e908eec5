use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use cudarc::driver::sys::CUdevice_attribute;
use cudarc::driver::{CudaContext, CudaFunction, CudaModule};
use cudarc::nvrtc::Ptx;

use crate::backend::{BackendDevice, LoadError};
use crate::kernel::{KernelSpec, LaunchCapability};

pub(crate) mod error;

use error::CudaError;

// Dynamic parallelism needs compute capability 3.5 or newer.
const DYN_LAUNCH_MIN_CC: (i32, i32) = (3, 5);

/// Kernel loader backed by the CUDA driver.
///
/// Keeps one primary context per device ordinal for the lifetime of the
/// process; contexts are never migrated between ordinals.
pub struct CudaBackend {
    contexts: RwLock<HashMap<usize, Arc<CudaContext>>>,
}

/// A loaded module plus its resolved entry function, ready for the launch
/// layer to build argument lists against.
pub struct CudaKernel {
    pub module: Arc<CudaModule>,
    pub func: CudaFunction,
}

impl CudaBackend {
    pub fn new() -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
        }
    }

    fn context(&self, ordinal: usize) -> Result<Arc<CudaContext>, LoadError> {
        {
            let contexts = self.contexts.read().unwrap();
            if let Some(context) = contexts.get(&ordinal) {
                return Ok(context.clone());
            }
        }
        let context =
            CudaContext::new(ordinal).map_err(|cuda| CudaError::DeviceInit { cuda, ordinal })?;
        let mut contexts = self.contexts.write().unwrap();
        Ok(contexts.entry(ordinal).or_insert(context).clone())
    }

    fn supports_device_side_launch(&self, context: &CudaContext) -> Result<bool, LoadError> {
        let major = context
            .attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR)
            .map_err(CudaError::Cuda)?;
        let minor = context
            .attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR)
            .map_err(CudaError::Cuda)?;
        Ok((major, minor) >= DYN_LAUNCH_MIN_CC)
    }

    fn load(&self, context: &Arc<CudaContext>, spec: &KernelSpec) -> Result<CudaKernel, LoadError> {
        if !spec.module_path.is_file() {
            return Err(LoadError::ModuleLoad {
                detail: format!("no module image at {}", spec.module_path.display()),
            });
        }
        let module = context
            .load_module(Ptx::from_file(&spec.module_path))
            .map_err(|cuda| CudaError::Load {
                cuda,
                module_path: spec.module_path.display().to_string(),
            })?;
        let func =
            module
                .load_function(&spec.entry_point)
                .map_err(|_| CudaError::MissingEntryPoint {
                    entry_point: spec.entry_point.clone(),
                    module_path: spec.module_path.display().to_string(),
                })?;
        Ok(CudaKernel { module, func })
    }
}

impl Default for CudaBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendDevice for CudaBackend {
    type Module = CudaKernel;

    fn load_module(
        &self,
        ordinal: usize,
        spec: &KernelSpec,
        capability: LaunchCapability,
    ) -> Result<CudaKernel, LoadError> {
        let context = self.context(ordinal)?;
        match capability {
            LaunchCapability::Basic => {}
            LaunchCapability::ExtendedLinkage => {
                if device_runtime_library().is_none() {
                    return Err(LoadError::PlatformCapabilityUnavailable {
                        capability,
                        detail: "device runtime library not found in the CUDA installation"
                            .to_string(),
                    });
                }
            }
            LaunchCapability::DynamicParallelism => {
                if !self.supports_device_side_launch(&context)? {
                    return Err(LoadError::PlatformCapabilityUnavailable {
                        capability,
                        detail: format!(
                            "device {ordinal} is below compute capability {}.{}",
                            DYN_LAUNCH_MIN_CC.0, DYN_LAUNCH_MIN_CC.1
                        ),
                    });
                }
                if device_runtime_library().is_none() {
                    return Err(LoadError::PlatformCapabilityUnavailable {
                        capability,
                        detail: "device runtime library not found in the CUDA installation"
                            .to_string(),
                    });
                }
            }
        }
        self.load(&context, spec)
    }
}

/// Locate the device runtime library (`cudadevrt`) under the configured CUDA
/// installation. Extended linkage and device-side launches both link against
/// it, so its absence is exactly the platform-capability-unavailable case.
fn device_runtime_library() -> Option<PathBuf> {
    let env_vars = ["CUDA_PATH", "CUDA_ROOT", "CUDA_TOOLKIT_ROOT_DIR"];
    let env_vars = env_vars
        .into_iter()
        .map(env::var)
        .filter_map(std::result::Result::ok)
        .map(Into::<PathBuf>::into);

    let roots = [
        "/usr",
        "/usr/local/cuda",
        "/opt/cuda",
        "/usr/lib/cuda",
        "C:/Program Files/NVIDIA GPU Computing Toolkit/CUDA",
    ];
    let roots = roots.into_iter().map(Into::<PathBuf>::into);

    env_vars.chain(roots).find_map(|root| {
        [
            "lib64/libcudadevrt.a",
            "lib/libcudadevrt.a",
            "targets/x86_64-linux/lib/libcudadevrt.a",
            "lib/x64/cudadevrt.lib",
        ]
        .into_iter()
        .map(|rel| root.join(rel))
        .find(|path| path.is_file())
    })
}
