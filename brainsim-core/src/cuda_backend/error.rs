use cudarc::driver::DriverError;

use crate::backend::LoadError;

/// cudarc related errors
#[derive(thiserror::Error, Debug)]
pub enum CudaError {
    #[error(transparent)]
    Cuda(#[from] DriverError),

    #[error("{cuda} when loading {module_path}")]
    Load {
        cuda: DriverError,
        module_path: String,
    },

    #[error("missing entry point '{entry_point}' in {module_path}")]
    MissingEntryPoint {
        entry_point: String,
        module_path: String,
    },

    #[error("cannot initialise CUDA device {ordinal}: {cuda}")]
    DeviceInit { cuda: DriverError, ordinal: usize },
}

// Every driver-level failure is a genuine load error for the module at hand;
// capability gaps are detected before the driver is ever called and never
// reach this conversion.
impl From<CudaError> for LoadError {
    fn from(value: CudaError) -> Self {
        LoadError::ModuleLoad {
            detail: value.to_string(),
        }
    }
}
