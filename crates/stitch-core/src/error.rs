//! Error types for stitch-core operations.
//!
//! Covers every failure that can happen below the kernel layer:
//! - Buffer allocation (budget exhausted, host allocation refused)
//! - Image view construction and reinterpretation
//! - Video buffer geometry and pool state
//!
//! # Usage
//!
//! ```rust
//! use stitch_core::{Error, Result};
//!
//! fn check_pitch(width: u32, pixel_bytes: usize, pitch: usize) -> Result<()> {
//!     let min = width as usize * pixel_bytes;
//!     if pitch < min {
//!         return Err(Error::InvalidStride { stride: pitch, min_stride: min, width });
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by buffers, video frames and image views.
#[derive(Debug, Error)]
pub enum Error {
    /// Memory allocation failed or the allocator budget is exhausted.
    ///
    /// # Fields
    ///
    /// - `requested` - Number of bytes requested
    /// - `reason` - Description of why allocation failed
    #[error("failed to allocate {requested} bytes: {reason}")]
    AllocationFailed {
        /// Bytes requested
        requested: usize,
        /// Failure reason
        reason: String,
    },

    /// Invalid image dimensions (zero, or overflowing a size computation).
    #[error("invalid dimensions: {width}x{height} ({reason})")]
    InvalidDimensions {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
        /// Reason why dimensions are invalid
        reason: String,
    },

    /// Row pitch is smaller than one row of pixels.
    #[error("stride {stride} is less than minimum {min_stride} for width {width}")]
    InvalidStride {
        /// Provided stride
        stride: usize,
        /// Minimum required stride
        min_stride: usize,
        /// Image width
        width: u32,
    },

    /// A view would reach past the end of its backing buffer.
    #[error("view needs {required} bytes at offset {offset}, backing buffer holds {available}")]
    ViewOutOfRange {
        /// Byte offset of the view inside the buffer
        offset: usize,
        /// Bytes the view spans from its offset
        required: usize,
        /// Size of the backing buffer
        available: usize,
    },

    /// The view aliases imported storage and cannot change its shape.
    #[error("view over imported buffer {buffer_id} cannot be reinterpreted")]
    NotReinterpretable {
        /// Id of the imported backing buffer
        buffer_id: u64,
    },

    /// Pixel or video format is not supported for this operation.
    #[error("unsupported format: {format}")]
    UnsupportedFormat {
        /// Format name or description
        format: String,
    },

    /// The buffer pool has been stopped or has no free buffer.
    #[error("buffer pool unavailable: {0}")]
    PoolUnavailable(String),

    /// A buffer lock was poisoned by a panicking writer.
    #[error("buffer {0} lock poisoned")]
    LockPoisoned(u64),

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Creates an [`Error::AllocationFailed`] error.
    #[inline]
    pub fn allocation_failed(requested: usize, reason: impl Into<String>) -> Self {
        Self::AllocationFailed {
            requested,
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::InvalidDimensions`] error.
    #[inline]
    pub fn invalid_dimensions(width: u32, height: u32, reason: impl Into<String>) -> Self {
        Self::InvalidDimensions {
            width,
            height,
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::UnsupportedFormat`] error.
    #[inline]
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Creates an [`Error::Other`] error.
    #[inline]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Returns `true` if this is an allocation error.
    #[inline]
    pub fn is_allocation_error(&self) -> bool {
        matches!(self, Self::AllocationFailed { .. })
    }

    /// Returns `true` if this error comes from view geometry or aliasing.
    #[inline]
    pub fn is_view_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidStride { .. } | Self::ViewOutOfRange { .. } | Self::NotReinterpretable { .. }
        )
    }
}
