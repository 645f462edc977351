//! Host buffer objects and the allocator seam.
//!
//! A [`BufferObject`] is a zero-initialised block of host memory guarded by
//! an `RwLock`. It is always handled through `Arc`, so any number of image
//! views can alias it. [`HostAllocator`] hands out buffers under a byte
//! budget; the bytes return to the budget when the last holder drops.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::memory::{available_memory, format_bytes};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// A block of host memory shared by image views and video frames.
#[derive(Debug)]
pub struct BufferObject {
    id: u64,
    size: usize,
    data: RwLock<Vec<u8>>,
    accounting: Option<Arc<AtomicUsize>>,
}

impl BufferObject {
    /// Allocates a zeroed buffer outside any budget.
    pub fn new(size: usize) -> Result<Self> {
        Self::with_accounting(size, None)
    }

    fn with_accounting(size: usize, accounting: Option<Arc<AtomicUsize>>) -> Result<Self> {
        if size == 0 {
            return Err(Error::allocation_failed(0, "zero-sized buffer"));
        }
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|e| Error::allocation_failed(size, e.to_string()))?;
        data.resize(size, 0);

        Ok(Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            size,
            data: RwLock::new(data),
            accounting,
        })
    }

    /// Process-unique buffer id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns `true` if a writer panicked while holding the buffer.
    pub fn is_poisoned(&self) -> bool {
        self.data.is_poisoned()
    }

    /// Runs `f` with shared access to the bytes.
    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let guard = self.data.read().map_err(|_| Error::LockPoisoned(self.id))?;
        Ok(f(&guard))
    }

    /// Runs `f` with exclusive access to the bytes.
    pub fn write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let mut guard = self.data.write().map_err(|_| Error::LockPoisoned(self.id))?;
        Ok(f(&mut guard))
    }
}

impl Drop for BufferObject {
    fn drop(&mut self) {
        if let Some(in_use) = &self.accounting {
            in_use.fetch_sub(self.size, Ordering::AcqRel);
            trace!(id = self.id, size = self.size, "buffer released");
        }
    }
}

/// Source of backing storage for images and frames.
pub trait BufferAllocator: Send + Sync {
    /// Allocates `size` zeroed bytes.
    fn allocate(&self, size: usize) -> Result<Arc<BufferObject>>;

    /// Checks that a buffer is usable as kernel memory.
    fn is_valid(&self, buffer: &BufferObject) -> bool;
}

/// Heap allocator with a byte budget.
#[derive(Debug)]
pub struct HostAllocator {
    budget: usize,
    in_use: Arc<AtomicUsize>,
}

impl HostAllocator {
    /// Creates an allocator capped at `budget` bytes.
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            in_use: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates an allocator capped at the detected memory budget.
    ///
    /// See [`crate::memory::available_memory`] for the environment overrides.
    pub fn from_system() -> Self {
        let budget = usize::try_from(available_memory()).unwrap_or(usize::MAX);
        debug!(budget = %format_bytes(budget as u64), "host allocator budget");
        Self::new(budget)
    }

    /// Budget in bytes.
    #[inline]
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Bytes held by live buffers from this allocator.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    fn reserve(&self, size: usize) -> Result<()> {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size).filter(|&total| total <= self.budget)
            })
            .map(|_| ())
            .map_err(|used| {
                Error::allocation_failed(
                    size,
                    format!(
                        "budget exhausted ({} of {} in use)",
                        format_bytes(used as u64),
                        format_bytes(self.budget as u64)
                    ),
                )
            })
    }
}

impl Default for HostAllocator {
    fn default() -> Self {
        Self::from_system()
    }
}

impl BufferAllocator for HostAllocator {
    fn allocate(&self, size: usize) -> Result<Arc<BufferObject>> {
        self.reserve(size)?;
        match BufferObject::with_accounting(size, Some(Arc::clone(&self.in_use))) {
            Ok(bo) => {
                trace!(id = bo.id(), size, "buffer allocated");
                Ok(Arc::new(bo))
            }
            Err(e) => {
                self.in_use.fetch_sub(size, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    fn is_valid(&self, buffer: &BufferObject) -> bool {
        buffer.size() > 0 && !buffer.is_poisoned()
    }
}
