//! Kernel engines and the types they share.
//!
//! # Architecture
//!
//! ```text
//! KernelEngine (compile / dispatch / wait / finish)
//!     +-- KernelInfo + KernelOptions  -> Kernel
//!     +-- KernelArgs + WorkSize       -> KernelEvent
//!     +-- CpuEngine (native bodies, in-order queue)
//! ```
//!
//! Compiled kernels are memoized by callers through [`KernelCache`].

mod args;
mod cache;
mod cpu_backend;
mod engine;
mod work_size;

pub use args::{KernelArg, KernelArgs};
pub use cache::KernelCache;
pub use cpu_backend::{CpuEngine, CpuInvocation, CpuKernel, CpuKernelFn};
pub use engine::{KernelEngine, KernelEvent, KernelInfo, KernelOptions};
pub use work_size::{WorkSize, MAX_WORK_DIM};
