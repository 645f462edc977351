//! # stitch-core
//!
//! Leaf types for the stitching pipeline.
//!
//! - [`BufferObject`], [`BufferAllocator`], [`HostAllocator`] - Host backing storage with a byte budget
//! - [`VideoBufferInfo`], [`VideoBuffer`], [`VideoBufferPool`] - Planar video frames and their pool
//! - [`ImageView`] - Format/width descriptor bound to a region of a buffer, with checked reinterpretation
//! - [`ImageFormat`], [`Rect`] - Pixel formats and rectangles shared by every kernel
//!
//! ## Crate Structure
//!
//! ```text
//! stitch-core (this crate)
//!    ^
//!    |
//!    +-- stitch-compute (kernel engine, arguments, work sizes)
//!    +-- stitch-blend (pyramid blender)
//! ```
//!
//! ## Zero-copy views
//!
//! One physical allocation may be seen through several [`ImageView`]s with
//! different widths and formats. Views hold an `Arc` on the buffer, so the
//! storage lives as long as the longest holder.
//!
//! ```rust
//! use stitch_core::{ChannelOrder, ChannelType, HostAllocator, ImageFormat, ImageView};
//!
//! let alloc = HostAllocator::new(1 << 20);
//! let packed = ImageFormat::new(ChannelOrder::Rgba, ChannelType::UnsignedInt16);
//! let view = ImageView::allocate(&alloc, packed, 8, 4, 0).unwrap();
//!
//! // Same bytes, one byte per pixel at 8x the width.
//! let wide = view.reinterpret(64, ImageFormat::R8).unwrap();
//! assert!(wide.shares_buffer(&view));
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod buffer;
pub mod error;
pub mod format;
pub mod memory;
pub mod rect;
pub mod video;
pub mod view;

// Re-exports for convenience
pub use buffer::{BufferAllocator, BufferObject, HostAllocator};
pub use error::{Error, Result};
pub use format::{align_down, align_up, ChannelOrder, ChannelType, ImageFormat};
pub use rect::Rect;
pub use video::{PlaneInfo, VideoBuffer, VideoBufferInfo, VideoBufferPool, VideoFormat};
pub use view::{ImageDesc, ImageView, ViewOrigin};

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```
/// use stitch_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::buffer::{BufferAllocator, BufferObject, HostAllocator};
    pub use crate::error::{Error, Result};
    pub use crate::format::{ChannelOrder, ChannelType, ImageFormat};
    pub use crate::rect::Rect;
    pub use crate::video::{VideoBuffer, VideoBufferInfo, VideoBufferPool, VideoFormat};
    pub use crate::view::ImageView;
}
