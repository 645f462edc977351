//! Kernel execution seam for the stitching pipeline.
//!
//! A kernel engine compiles named kernel programs with `-D` build options
//! and dispatches them over a 2D work grid with bound image views and scalar
//! arguments. The pipeline only ever sees the [`KernelEngine`] trait.
//!
//! # Architecture
//!
//! ```text
//! KernelGraph (stitch-blend)
//!     └── KernelEngine trait
//!             ├── CpuEngine (registered native bodies, rayon)
//!             └── device engines (OpenCL, ...) outside this workspace
//! ```
//!
//! # Example
//!
//! ```rust
//! use stitch_compute::{CpuEngine, CpuInvocation, ComputeResult, KernelArgs, KernelEngine,
//!     KernelInfo, KernelOptions, WorkSize};
//!
//! fn noop(inv: &CpuInvocation<'_>) -> ComputeResult<()> {
//!     let _ = inv.u32(0)?;
//!     Ok(())
//! }
//!
//! let engine = CpuEngine::new().with_kernel("kernel_noop", noop);
//! let info = KernelInfo::new("kernel_noop", "noop.cl");
//! let kernel = engine.compile(&info, &KernelOptions::new()).unwrap();
//!
//! let mut args = KernelArgs::new();
//! args.push_u32(7);
//! let event = engine.dispatch(&kernel, &args, &WorkSize::for_image(16, 2, [16, 2])).unwrap();
//! engine.wait(event).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backend;

pub use backend::{
    CpuEngine, CpuInvocation, CpuKernel, CpuKernelFn, KernelArg, KernelArgs, KernelCache,
    KernelEngine, KernelEvent, KernelInfo, KernelOptions, WorkSize,
};

use thiserror::Error;

/// Kernel build and dispatch errors
#[derive(Error, Debug)]
pub enum ComputeError {
    /// No kernel body or program is known under this name.
    #[error("Unknown kernel: {0}")]
    UnknownKernel(String),

    /// The kernel program failed to build.
    #[error("Failed to build kernel {kernel}: {reason}")]
    BuildFailed {
        /// Kernel name
        kernel: String,
        /// Build log or cause
        reason: String,
    },

    /// An argument is missing or has the wrong type.
    #[error("Kernel {kernel} argument {index}: {reason}")]
    InvalidArgument {
        /// Kernel name
        kernel: String,
        /// Argument position
        index: usize,
        /// What was wrong
        reason: String,
    },

    /// Grid dimensions are empty or not a multiple of the work group.
    #[error("Invalid work size: {0}")]
    InvalidWorkSize(String),

    /// The kernel body reported an error.
    #[error("Dispatch of {kernel} failed: {reason}")]
    DispatchFailed {
        /// Kernel name
        kernel: String,
        /// Cause
        reason: String,
    },

    /// Waiting on an event failed.
    #[error("Wait failed: {0}")]
    WaitFailed(String),

    /// Buffer or view failure.
    #[error(transparent)]
    Core(#[from] stitch_core::Error),
}

/// Result type for kernel engine operations.
pub type ComputeResult<T> = Result<T, ComputeError>;
