//! Brainsim's GPU compute-kernel runtime.
//!
//! The simulation executes its neural-network graphs through precompiled
//! device kernels. This crate is the piece that loads those kernels and keeps
//! them alive: a [`KernelRuntime`] routes every "give me the kernel for
//! operation X on device D" request to a per-device [`KernelCache`], which
//! loads each distinct kernel once and hands the same [`KernelHandle`] to
//! every requester. A kernel that asks for device-side dynamic launches
//! degrades to plain extended linkage when the platform toolchain cannot
//! provide them, without the caller having to care.
//!
//! [`TensorShape`] is the immutable dimension description every memory block
//! in the system is sized by; kernels receive their arguments as blocks
//! described by shapes.
//!
//! ## A quick guide
//! - Construct one [`KernelRuntime`] per process over a [`BackendDevice`]
//!   (the `cuda` feature provides `CudaBackend`) and pass it to whatever
//!   requests kernels.
//! - Ask for kernels with a [`KernelSpec`] and a [`LaunchCapability`]. The
//!   handle you get back tells you the capability actually achieved.
//! - Size launches and buffers with [`TensorShape`] and [`LaunchDims`].
//!
//! ```
//! use brainsim_core::{
//!     BackendDevice, KernelRuntime, KernelSpec, LaunchCapability, LoadError, TensorShape,
//! };
//!
//! struct NullBackend;
//!
//! impl BackendDevice for NullBackend {
//!     type Module = ();
//!
//!     fn load_module(
//!         &self,
//!         _ordinal: usize,
//!         _spec: &KernelSpec,
//!         _capability: LaunchCapability,
//!     ) -> Result<(), LoadError> {
//!         Ok(())
//!     }
//! }
//!
//! let runtime = KernelRuntime::new(NullBackend);
//! let spec = KernelSpec::new("kernels/agents.ptx", "step_agents", "StepAgents");
//! let kernel = runtime.kernel(0, &spec, LaunchCapability::Basic).unwrap();
//! assert_eq!(kernel.achieved_capability(), LaunchCapability::Basic);
//!
//! let shape = TensorShape::new([2, 3, 4]).unwrap();
//! assert_eq!(shape.element_count(), 24);
//! ```

mod backend;
mod cache;
#[cfg(feature = "cuda")]
mod cuda_backend;
mod error;
mod kernel;
mod runtime;
mod shape;

pub use backend::{BackendDevice, LoadError};
pub use cache::KernelCache;
#[cfg(feature = "cuda")]
pub use cuda_backend::{CudaBackend, CudaKernel};
pub use error::{Error, KernelLoadFailure, Result};
pub use kernel::{KernelHandle, KernelSpec, LaunchCapability, LaunchDims};
pub use runtime::KernelRuntime;
pub use shape::{TensorShape, MAX_RANK};
