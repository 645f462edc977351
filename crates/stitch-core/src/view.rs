//! Image views over shared buffers.
//!
//! An [`ImageView`] is a descriptor (format, width, height, row pitch) bound
//! to a byte offset inside a [`BufferObject`]. Creating, cloning or
//! reinterpreting a view never copies pixel data.
//!
//! # Origins
//!
//! - [`ViewOrigin::Allocated`] - storage owned by the pipeline; the view may
//!   be reinterpreted with a different width/format over the same bytes.
//! - [`ViewOrigin::Imported`] - storage borrowed from a video frame; its
//!   layout belongs to the producer and cannot be reinterpreted.
//!
//! # Footprint
//!
//! A view of height `h` touches `row_pitch * (h - 1) + width * pixel_bytes`
//! bytes from its offset. Every constructor checks that this fits the
//! backing buffer.

use std::sync::Arc;

use crate::buffer::{BufferAllocator, BufferObject};
use crate::error::{Error, Result};
use crate::format::ImageFormat;

/// Logical shape of an image view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    /// Texel format
    pub format: ImageFormat,
    /// Width in texels
    pub width: u32,
    /// Height in rows
    pub height: u32,
    /// Bytes between the starts of consecutive rows
    pub row_pitch: usize,
}

impl ImageDesc {
    /// Bytes of texel data in one row.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.pixel_bytes()
    }

    /// Bytes spanned from the first texel to the last.
    #[inline]
    pub fn footprint(&self) -> usize {
        if self.height == 0 {
            return 0;
        }
        self.row_pitch * (self.height as usize - 1) + self.row_bytes()
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::invalid_dimensions(self.width, self.height, "empty view"));
        }
        if self.row_pitch < self.row_bytes() {
            return Err(Error::InvalidStride {
                stride: self.row_pitch,
                min_stride: self.row_bytes(),
                width: self.width,
            });
        }
        Ok(())
    }
}

/// Where a view's storage came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewOrigin {
    /// Pipeline-owned storage
    Allocated,
    /// Storage imported from a video frame
    Imported,
}

/// A descriptor bound to a region of a shared buffer.
#[derive(Debug, Clone)]
pub struct ImageView {
    desc: ImageDesc,
    buffer: Arc<BufferObject>,
    offset: usize,
    origin: ViewOrigin,
}

impl ImageView {
    /// Binds a reinterpretable view to pipeline-owned storage.
    ///
    /// # Errors
    ///
    /// Fails if `row_pitch` is shorter than one row or the footprint runs
    /// past the end of `buffer`.
    pub fn create(
        buffer: Arc<BufferObject>,
        format: ImageFormat,
        width: u32,
        height: u32,
        row_pitch: usize,
        offset: usize,
    ) -> Result<Self> {
        Self::bind(buffer, format, width, height, row_pitch, offset, ViewOrigin::Allocated)
    }

    /// Binds a view to storage imported from a video frame.
    pub fn import(
        buffer: Arc<BufferObject>,
        format: ImageFormat,
        width: u32,
        height: u32,
        row_pitch: usize,
        offset: usize,
    ) -> Result<Self> {
        Self::bind(buffer, format, width, height, row_pitch, offset, ViewOrigin::Imported)
    }

    /// Allocates storage for a fresh view.
    ///
    /// A zero `row_pitch` means tightly packed rows.
    pub fn allocate(
        allocator: &dyn BufferAllocator,
        format: ImageFormat,
        width: u32,
        height: u32,
        row_pitch: usize,
    ) -> Result<Self> {
        let row_pitch = if row_pitch == 0 {
            width as usize * format.pixel_bytes()
        } else {
            row_pitch
        };
        let desc = ImageDesc {
            format,
            width,
            height,
            row_pitch,
        };
        desc.validate()?;
        let buffer = allocator.allocate(desc.footprint())?;
        Self::create(buffer, format, width, height, row_pitch, 0)
    }

    fn bind(
        buffer: Arc<BufferObject>,
        format: ImageFormat,
        width: u32,
        height: u32,
        row_pitch: usize,
        offset: usize,
        origin: ViewOrigin,
    ) -> Result<Self> {
        let desc = ImageDesc {
            format,
            width,
            height,
            row_pitch,
        };
        desc.validate()?;
        check_range(&buffer, offset, desc.footprint())?;
        Ok(Self {
            desc,
            buffer,
            offset,
            origin,
        })
    }

    /// Derives a view with a new width and format over the same bytes.
    ///
    /// Height, row pitch and offset are kept.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReinterpretable`] for views over imported storage
    /// - [`Error::InvalidStride`] if the new row no longer fits the pitch
    /// - [`Error::ViewOutOfRange`] if the new footprint exceeds the buffer
    pub fn reinterpret(&self, new_width: u32, new_format: ImageFormat) -> Result<Self> {
        if self.origin == ViewOrigin::Imported {
            return Err(Error::NotReinterpretable {
                buffer_id: self.buffer.id(),
            });
        }
        Self::bind(
            Arc::clone(&self.buffer),
            new_format,
            new_width,
            self.desc.height,
            self.desc.row_pitch,
            self.offset,
            ViewOrigin::Allocated,
        )
    }

    /// Returns `true` if both views start at the same byte of the same buffer.
    #[inline]
    pub fn shares_buffer(&self, other: &ImageView) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer) && self.offset == other.offset
    }

    /// Shape of this view.
    #[inline]
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    /// Texel format.
    #[inline]
    pub fn format(&self) -> ImageFormat {
        self.desc.format
    }

    /// Width in texels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.desc.width
    }

    /// Height in rows.
    #[inline]
    pub fn height(&self) -> u32 {
        self.desc.height
    }

    /// Row pitch in bytes.
    #[inline]
    pub fn row_pitch(&self) -> usize {
        self.desc.row_pitch
    }

    /// Byte offset inside the backing buffer.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Storage origin.
    #[inline]
    pub fn origin(&self) -> ViewOrigin {
        self.origin
    }

    /// Backing buffer.
    #[inline]
    pub fn buffer(&self) -> &Arc<BufferObject> {
        &self.buffer
    }

    /// Copies the view's rows into a tightly packed vector.
    pub fn read_rows(&self) -> Result<Vec<u8>> {
        let row = self.desc.row_bytes();
        let (pitch, height) = (self.desc.row_pitch, self.desc.height as usize);
        self.buffer.read(|data| {
            let mut out = Vec::with_capacity(row * height);
            for y in 0..height {
                let start = self.offset + y * pitch;
                out.extend_from_slice(&data[start..start + row]);
            }
            out
        })
    }

    /// Overwrites the view's rows from a tightly packed slice.
    pub fn write_rows(&self, src: &[u8]) -> Result<()> {
        let row = self.desc.row_bytes();
        let expected = row * self.desc.height as usize;
        if src.len() != expected {
            return Err(Error::ViewOutOfRange {
                offset: self.offset,
                required: expected,
                available: src.len(),
            });
        }
        let pitch = self.desc.row_pitch;
        self.buffer.write(|data| {
            for (y, line) in src.chunks_exact(row).enumerate() {
                let start = self.offset + y * pitch;
                data[start..start + row].copy_from_slice(line);
            }
        })
    }
}

fn check_range(buffer: &BufferObject, offset: usize, required: usize) -> Result<()> {
    match offset.checked_add(required) {
        Some(end) if end <= buffer.size() => Ok(()),
        _ => Err(Error::ViewOutOfRange {
            offset,
            required,
            available: buffer.size(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::HostAllocator;

    fn packed(alloc: &HostAllocator, w: u32, h: u32) -> ImageView {
        ImageView::allocate(alloc, ImageFormat::PACKED_U8, w, h, 0).unwrap()
    }

    #[test]
    fn test_create_checks_pitch() {
        let bo = Arc::new(BufferObject::new(256).unwrap());
        let err = ImageView::create(bo.clone(), ImageFormat::PACKED_U8, 4, 2, 16, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidStride { min_stride: 32, .. }));
        assert!(ImageView::create(bo, ImageFormat::PACKED_U8, 4, 2, 32, 0).is_ok());
    }

    #[test]
    fn test_create_checks_range() {
        let bo = Arc::new(BufferObject::new(100).unwrap());
        // 32 * 2 + 32 = 96 bytes from offset 8
        let err = ImageView::create(bo.clone(), ImageFormat::PACKED_U8, 4, 3, 32, 8).unwrap_err();
        assert!(matches!(err, Error::ViewOutOfRange { required: 96, .. }));
        assert!(ImageView::create(bo, ImageFormat::PACKED_U8, 4, 3, 32, 4).is_ok());
    }

    #[test]
    fn test_reinterpret_shares_bytes() {
        let alloc = HostAllocator::new(1 << 16);
        let view = packed(&alloc, 4, 2);
        let wide = view.reinterpret(32, ImageFormat::R8).unwrap();
        assert!(wide.shares_buffer(&view));
        assert_eq!(wide.row_pitch(), view.row_pitch());
        assert_eq!(alloc.in_use(), 64);

        wide.write_rows(&(0..64).collect::<Vec<u8>>()).unwrap();
        let back = view.read_rows().unwrap();
        assert_eq!(back[9], 9);
        assert_eq!(back[63], 63);
    }

    #[test]
    fn test_reinterpret_overflow() {
        let alloc = HostAllocator::new(1 << 16);
        let view = packed(&alloc, 4, 2);
        let err = view.reinterpret(33, ImageFormat::R8).unwrap_err();
        assert!(err.is_view_error());
    }

    #[test]
    fn test_reinterpret_imported() {
        let bo = Arc::new(BufferObject::new(64).unwrap());
        let view = ImageView::import(bo, ImageFormat::PACKED_U8, 4, 2, 32, 0).unwrap();
        assert_eq!(view.origin(), ViewOrigin::Imported);
        assert!(matches!(
            view.reinterpret(32, ImageFormat::R8),
            Err(Error::NotReinterpretable { .. })
        ));
    }

    #[test]
    fn test_pitched_rows() {
        let bo = Arc::new(BufferObject::new(64).unwrap());
        let view = ImageView::create(bo.clone(), ImageFormat::R8, 3, 2, 8, 16).unwrap();
        view.write_rows(&[1, 2, 3, 4, 5, 6]).unwrap();
        let raw = bo.read(|d| d.to_vec()).unwrap();
        assert_eq!(&raw[16..19], &[1, 2, 3]);
        assert_eq!(&raw[24..27], &[4, 5, 6]);
        assert_eq!(raw[19], 0);
        assert_eq!(view.read_rows().unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_lifetime_longest_holder() {
        let alloc = HostAllocator::new(1 << 16);
        let view = packed(&alloc, 2, 2);
        let alias = view.clone();
        drop(view);
        assert_eq!(alloc.in_use(), 32);
        drop(alias);
        assert_eq!(alloc.in_use(), 0);
    }
}
