//! Planar video frames, attachments and the output buffer pool.
//!
//! # Layout
//!
//! [`VideoBufferInfo::init`] fixes strides, plane offsets and total size the
//! way the producing pipeline lays frames out:
//!
//! ```text
//! NV12, aligned_width x aligned_height
//! offset 0                        Y   plane, stride = aligned_width
//! offset aligned_w * aligned_h    UV  plane (interleaved), half height
//! size = aligned_w * aligned_h * 3 / 2
//! ```
//!
//! A [`VideoBuffer`] can carry companion buffers as attachments. The blender
//! receives its second input this way.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::buffer::{BufferAllocator, BufferObject};
use crate::error::{Error, Result};
use crate::format::align_up;

/// Planar video formats understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoFormat {
    /// 8-bit Y plane followed by interleaved 8-bit UV at half resolution.
    Nv12,
    /// Single 8-bit Y plane.
    Grey,
}

impl VideoFormat {
    /// Number of planes.
    #[inline]
    pub const fn plane_count(self) -> usize {
        match self {
            Self::Nv12 => 2,
            Self::Grey => 1,
        }
    }
}

/// Geometry of one plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneInfo {
    /// Width in plane pixels (UV pairs for the chroma plane)
    pub width: u32,
    /// Height in rows
    pub height: u32,
    /// Bytes per plane pixel
    pub pixel_bytes: usize,
}

impl PlaneInfo {
    /// Bytes of pixel data in one row.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.pixel_bytes
    }
}

/// Format, dimensions and plane layout of a video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoBufferInfo {
    /// Pixel format
    pub format: VideoFormat,
    /// Visible width
    pub width: u32,
    /// Visible height
    pub height: u32,
    /// Allocated width (stride of the luma plane)
    pub aligned_width: u32,
    /// Allocated height
    pub aligned_height: u32,
    /// Total byte size
    pub size: usize,
    /// Number of planes
    pub components: usize,
    /// Row stride per plane
    pub strides: [usize; 2],
    /// Byte offset per plane
    pub offsets: [usize; 2],
}

impl VideoBufferInfo {
    /// Computes the plane layout of a frame.
    ///
    /// A zero `aligned_width` / `aligned_height` means "align to 16".
    pub fn init(
        format: VideoFormat,
        width: u32,
        height: u32,
        aligned_width: u32,
        aligned_height: u32,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_dimensions(width, height, "empty frame"));
        }
        let aligned_width = if aligned_width == 0 { align_up(width, 16) } else { aligned_width };
        let aligned_height = if aligned_height == 0 { align_up(height, 16) } else { aligned_height };
        if aligned_width < width || aligned_height < height {
            return Err(Error::invalid_dimensions(
                aligned_width,
                aligned_height,
                format!("aligned size smaller than {}x{}", width, height),
            ));
        }

        let luma = aligned_width as usize * aligned_height as usize;
        let (size, strides, offsets) = match format {
            VideoFormat::Nv12 => {
                let stride = aligned_width as usize;
                (luma * 3 / 2, [stride, stride], [0, luma])
            }
            VideoFormat::Grey => (luma, [aligned_width as usize, 0], [0, 0]),
        };

        Ok(Self {
            format,
            width,
            height,
            aligned_width,
            aligned_height,
            size,
            components: format.plane_count(),
            strides,
            offsets,
        })
    }

    /// Geometry of plane `index`, or `None` past the last plane.
    pub fn planar_info(&self, index: usize) -> Option<PlaneInfo> {
        match (self.format, index) {
            (_, 0) => Some(PlaneInfo {
                width: self.width,
                height: self.height,
                pixel_bytes: 1,
            }),
            (VideoFormat::Nv12, 1) => Some(PlaneInfo {
                width: self.width.div_ceil(2),
                height: self.height.div_ceil(2),
                pixel_bytes: 2,
            }),
            _ => None,
        }
    }
}

/// A video frame backed by a shared [`BufferObject`].
#[derive(Debug)]
pub struct VideoBuffer {
    info: VideoBufferInfo,
    bo: Arc<BufferObject>,
    attachments: RwLock<Vec<Arc<VideoBuffer>>>,
}

impl VideoBuffer {
    /// Wraps an existing buffer object.
    pub fn new(info: VideoBufferInfo, bo: Arc<BufferObject>) -> Result<Self> {
        if bo.size() < info.size {
            return Err(Error::ViewOutOfRange {
                offset: 0,
                required: info.size,
                available: bo.size(),
            });
        }
        Ok(Self {
            info,
            bo,
            attachments: RwLock::new(Vec::new()),
        })
    }

    /// Allocates a fresh frame.
    pub fn allocate(allocator: &dyn BufferAllocator, info: VideoBufferInfo) -> Result<Self> {
        let bo = allocator.allocate(info.size)?;
        Self::new(info, bo)
    }

    /// Format and layout of this frame.
    #[inline]
    pub fn video_info(&self) -> &VideoBufferInfo {
        &self.info
    }

    /// Backing storage.
    #[inline]
    pub fn buffer(&self) -> &Arc<BufferObject> {
        &self.bo
    }

    /// Associates a companion frame with this one.
    pub fn attach_buffer(&self, buffer: Arc<VideoBuffer>) {
        self.attachments
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(buffer);
    }

    /// Returns the first attached companion frame.
    pub fn find_attached(&self) -> Option<Arc<VideoBuffer>> {
        self.attachments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .first()
            .cloned()
    }

    /// Removes every attachment.
    pub fn detach_all(&self) {
        self.attachments
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Copies plane `index` into a tightly packed vector (`row_bytes * height`).
    pub fn read_plane(&self, index: usize) -> Result<Vec<u8>> {
        let plane = self.plane(index)?;
        let (stride, offset) = (self.info.strides[index], self.info.offsets[index]);
        let row = plane.row_bytes();
        self.bo.read(|data| {
            let mut out = Vec::with_capacity(row * plane.height as usize);
            for y in 0..plane.height as usize {
                let start = offset + y * stride;
                out.extend_from_slice(&data[start..start + row]);
            }
            out
        })
    }

    /// Overwrites plane `index` from tightly packed rows.
    pub fn write_plane(&self, index: usize, src: &[u8]) -> Result<()> {
        let plane = self.plane(index)?;
        let (stride, offset) = (self.info.strides[index], self.info.offsets[index]);
        let row = plane.row_bytes();
        if src.len() != row * plane.height as usize {
            return Err(Error::other(format!(
                "plane {} expects {} bytes, got {}",
                index,
                row * plane.height as usize,
                src.len()
            )));
        }
        self.bo.write(|data| {
            for (y, line) in src.chunks_exact(row).enumerate() {
                let start = offset + y * stride;
                data[start..start + row].copy_from_slice(line);
            }
        })
    }

    /// Fills plane `index` with one byte value.
    pub fn fill_plane(&self, index: usize, value: u8) -> Result<()> {
        let plane = self.plane(index)?;
        self.write_plane(index, &vec![value; plane.row_bytes() * plane.height as usize])
    }

    fn plane(&self, index: usize) -> Result<PlaneInfo> {
        self.info
            .planar_info(index)
            .ok_or_else(|| Error::unsupported_format(format!("{:?} plane {}", self.info.format, index)))
    }
}

/// Fixed-size pool of output frames.
///
/// A buffer is free when the pool holds the only reference to it.
pub struct VideoBufferPool {
    allocator: Arc<dyn BufferAllocator>,
    info: Mutex<Option<VideoBufferInfo>>,
    buffers: Mutex<Vec<Arc<BufferObject>>>,
    stopped: AtomicBool,
}

impl VideoBufferPool {
    /// Creates an empty pool drawing from `allocator`.
    pub fn new(allocator: Arc<dyn BufferAllocator>) -> Self {
        Self {
            allocator,
            info: Mutex::new(None),
            buffers: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Sets the frame geometry. Buffers of a previous geometry are released.
    pub fn set_video_info(&self, info: VideoBufferInfo) {
        let mut current = self.info.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref() != Some(&info) {
            self.buffers.lock().unwrap_or_else(PoisonError::into_inner).clear();
            *current = Some(info);
        }
    }

    /// Current frame geometry.
    pub fn video_info(&self) -> Option<VideoBufferInfo> {
        *self.info.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates buffers until the pool holds `count`.
    pub fn reserve(&self, count: usize) -> Result<()> {
        let info = self
            .video_info()
            .ok_or_else(|| Error::PoolUnavailable("video info not set".into()))?;
        let mut buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        while buffers.len() < count {
            buffers.push(self.allocator.allocate(info.size)?);
        }
        self.stopped.store(false, Ordering::Release);
        debug!(count, size = info.size, "buffer pool reserved");
        Ok(())
    }

    /// Hands out a frame whose storage nobody else references.
    pub fn get_buffer(&self) -> Result<VideoBuffer> {
        if self.is_stopped() {
            return Err(Error::PoolUnavailable("pool stopped".into()));
        }
        let info = self
            .video_info()
            .ok_or_else(|| Error::PoolUnavailable("video info not set".into()))?;
        let buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        let free = buffers
            .iter()
            .find(|bo| Arc::strong_count(bo) == 1)
            .ok_or_else(|| Error::PoolUnavailable(format!("all {} buffers in use", buffers.len())))?;
        VideoBuffer::new(info, Arc::clone(free))
    }

    /// Stops the pool; pending and future requests fail.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            warn!("buffer pool stopped");
        }
    }

    /// Returns `true` once [`stop`](Self::stop) was called.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Number of buffers owned by the pool.
    pub fn len(&self) -> usize {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if the pool owns no buffers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for VideoBufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoBufferPool")
            .field("info", &self.video_info())
            .field("len", &self.len())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
