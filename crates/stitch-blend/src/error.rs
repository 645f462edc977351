//! Error types for the pyramid blender.

use stitch_compute::ComputeError;
use stitch_core::{Rect, VideoFormat};
use thiserror::Error;

/// Coarse failure class reported to the surrounding pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid argument, missing companion buffer or violated geometry.
    Parameter,
    /// Allocation or view construction failed.
    Memory,
    /// Kernel build, dispatch or wait failed.
    Compute,
    /// Called before the blender was configured.
    NotReady,
}

/// Error type for blender operations.
#[derive(Error, Debug)]
pub enum BlendError {
    /// Pyramid level outside `0..levels`.
    #[error("invalid level {level} (pyramid has {levels})")]
    InvalidLevel {
        /// Requested level
        level: usize,
        /// Configured level count
        levels: usize,
    },

    /// The first input carries no attached second input.
    #[error("input buffer has no attached companion buffer")]
    MissingAttachment,

    /// Input/output sizes violate the blending preconditions.
    #[error("geometry mismatch: {0}")]
    Geometry(String),

    /// A merge window does not fit its level.
    #[error("merge window {window} at level {level} exceeds blend width {blend_width}")]
    InvalidMergeWindow {
        /// Offending window
        window: Rect,
        /// Pyramid level
        level: usize,
        /// Output width at that level
        blend_width: u32,
    },

    /// Frame format cannot be blended with the current configuration.
    #[error("unsupported video format {0:?}")]
    UnsupportedFormat(VideoFormat),

    /// A frame's storage was rejected by the allocator.
    #[error("buffer {buffer_id} is not usable as kernel memory")]
    InvalidBuffer {
        /// Id of the rejected buffer object
        buffer_id: u64,
    },

    /// Operation needs a configured blender.
    #[error("blender not ready: {0}")]
    NotReady(&'static str),

    /// Buffer, view or pool failure.
    #[error(transparent)]
    Core(#[from] stitch_core::Error),

    /// Kernel engine failure.
    #[error(transparent)]
    Compute(#[from] ComputeError),
}

impl BlendError {
    /// Failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidLevel { .. }
            | Self::MissingAttachment
            | Self::Geometry(_)
            | Self::InvalidMergeWindow { .. }
            | Self::UnsupportedFormat(_) => ErrorKind::Parameter,
            Self::NotReady(_) => ErrorKind::NotReady,
            Self::InvalidBuffer { .. }
            | Self::Core(_)
            | Self::Compute(ComputeError::Core(_)) => ErrorKind::Memory,
            Self::Compute(_) => ErrorKind::Compute,
        }
    }
}

/// Result type for blender operations.
pub type BlendResult<T> = Result<T, BlendError>;
