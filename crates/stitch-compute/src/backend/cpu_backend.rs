//! CPU kernel engine.
//!
//! Kernel programs are native Rust functions registered under their entry
//! point name. `compile` resolves the name and captures the build options;
//! `dispatch` validates the work size and runs the body to completion, so the
//! queue is trivially in-order. Bodies parallelize internally with rayon; an
//! engine built with [`CpuEngine::with_threads`] runs them on its own pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use bytemuck::Pod;
use stitch_core::ImageView;
use tracing::trace;

use super::args::{KernelArg, KernelArgs};
use super::engine::{KernelEngine, KernelEvent, KernelInfo, KernelOptions};
use super::work_size::WorkSize;
use crate::{ComputeError, ComputeResult};

/// Native kernel body.
pub type CpuKernelFn = fn(&CpuInvocation<'_>) -> ComputeResult<()>;

/// A kernel resolved against the registry.
#[derive(Debug, Clone)]
pub struct CpuKernel {
    info: KernelInfo,
    options: KernelOptions,
    body: CpuKernelFn,
}

impl CpuKernel {
    /// Program entry this kernel was compiled from.
    pub fn info(&self) -> &KernelInfo {
        &self.info
    }

    /// Build options of this kernel.
    pub fn options(&self) -> &KernelOptions {
        &self.options
    }
}

/// Arguments and grid of one dispatch, as seen by a kernel body.
pub struct CpuInvocation<'a> {
    kernel: &'a CpuKernel,
    args: &'a KernelArgs,
    work_size: &'a WorkSize,
}

impl<'a> CpuInvocation<'a> {
    /// Name of the running kernel.
    pub fn kernel_name(&self) -> &'static str {
        self.kernel.info.name
    }

    /// Build-time define, e.g. `PYRAMID_UV`.
    pub fn define(&self, name: &str) -> Option<&str> {
        self.kernel.options.get(name)
    }

    /// Build-time define parsed as a flag (`0` is false, anything else true).
    pub fn flag(&self, name: &str) -> bool {
        self.define(name).is_some_and(|v| v != "0")
    }

    /// Grid of this dispatch.
    pub fn work_size(&self) -> &WorkSize {
        self.work_size
    }

    /// Fails unless exactly `count` arguments are bound.
    pub fn expect_args(&self, count: usize) -> ComputeResult<()> {
        if self.args.len() != count {
            return Err(self.invalid(
                self.args.len(),
                format!("expected {} arguments, got {}", count, self.args.len()),
            ));
        }
        Ok(())
    }

    /// Image argument at `index`.
    pub fn image(&self, index: usize) -> ComputeResult<&'a ImageView> {
        match self.args.get(index) {
            Some(KernelArg::Image(view)) => Ok(view),
            other => Err(self.mismatch(index, "image", other)),
        }
    }

    /// Scalar argument at `index`.
    pub fn u32(&self, index: usize) -> ComputeResult<u32> {
        match self.args.get(index) {
            Some(KernelArg::U32(v)) => Ok(*v),
            other => Err(self.mismatch(index, "u32", other)),
        }
    }

    /// Reads a raw argument block as `T`.
    pub fn pod<T: Pod>(&self, index: usize) -> ComputeResult<T> {
        match self.args.get(index) {
            Some(KernelArg::Bytes(b)) if b.len() == std::mem::size_of::<T>() => {
                Ok(bytemuck::pod_read_unaligned(b))
            }
            Some(KernelArg::Bytes(b)) => Err(self.invalid(
                index,
                format!("{} bytes for a {}-byte block", b.len(), std::mem::size_of::<T>()),
            )),
            other => Err(self.mismatch(index, "bytes", other)),
        }
    }

    fn mismatch(&self, index: usize, want: &str, got: Option<&KernelArg>) -> ComputeError {
        let got = got.map_or("nothing", KernelArg::kind);
        self.invalid(index, format!("expected {}, got {}", want, got))
    }

    fn invalid(&self, index: usize, reason: String) -> ComputeError {
        ComputeError::InvalidArgument {
            kernel: self.kernel.info.name.to_string(),
            index,
            reason,
        }
    }
}

/// Engine that runs registered native kernel bodies.
pub struct CpuEngine {
    registry: RwLock<HashMap<String, CpuKernelFn>>,
    pool: Option<rayon::ThreadPool>,
    submitted: AtomicU64,
    completed: AtomicU64,
}

impl CpuEngine {
    /// Engine on the global rayon pool with no kernels registered.
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            pool: None,
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        }
    }

    /// Engine with a dedicated rayon pool of `threads` workers.
    pub fn with_threads(threads: usize) -> ComputeResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("stitch-cpu-{}", i))
            .build()
            .map_err(|e| ComputeError::DispatchFailed {
                kernel: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            pool: Some(pool),
            ..Self::new()
        })
    }

    /// Registers a kernel body under its entry point name.
    pub fn register(&self, name: impl Into<String>, body: CpuKernelFn) {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), body);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_kernel(self, name: impl Into<String>, body: CpuKernelFn) -> Self {
        self.register(name, body);
        self
    }

    /// Returns `true` if a body is registered under `name`.
    pub fn is_registered(&self, name: &str) -> bool {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Number of dispatches submitted so far.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }

    /// Number of dispatches completed so far.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }
}

impl Default for CpuEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelEngine for CpuEngine {
    type Kernel = CpuKernel;

    fn name(&self) -> &str {
        "CPU"
    }

    fn compile(&self, info: &KernelInfo, options: &KernelOptions) -> ComputeResult<CpuKernel> {
        let body = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(info.name)
            .copied()
            .ok_or_else(|| ComputeError::UnknownKernel(info.name.to_string()))?;
        Ok(CpuKernel {
            info: *info,
            options: options.clone(),
            body,
        })
    }

    fn dispatch(
        &self,
        kernel: &CpuKernel,
        args: &KernelArgs,
        work_size: &WorkSize,
    ) -> ComputeResult<KernelEvent> {
        work_size.validate()?;
        let seq = self.submitted.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(kernel = kernel.info.name, seq, args = args.len(), "cpu dispatch");

        let inv = CpuInvocation {
            kernel,
            args,
            work_size,
        };
        let result = match &self.pool {
            Some(pool) => pool.install(|| (kernel.body)(&inv)),
            None => (kernel.body)(&inv),
        };
        self.completed.fetch_max(seq, Ordering::AcqRel);
        result.map(|()| KernelEvent::new(seq))
    }

    fn wait(&self, event: KernelEvent) -> ComputeResult<()> {
        if event.seq() == 0 || event.seq() > self.completed() {
            return Err(ComputeError::WaitFailed(format!(
                "event {} was never submitted",
                event.seq()
            )));
        }
        Ok(())
    }

    fn finish(&self) -> ComputeResult<()> {
        let (submitted, completed) = (self.submitted(), self.completed());
        if completed < submitted {
            return Err(ComputeError::WaitFailed(format!(
                "{} of {} dispatches pending",
                submitted - completed,
                submitted
            )));
        }
        Ok(())
    }
}
