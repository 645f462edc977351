//! Pyramid allocation.
//!
//! Builds every level bottom-up from two input frames and one output frame.
//! Level 0 imports the frames' planes without copying; deeper levels own
//! storage at `(prev + 1) / 2` resolution. 8-bit planes use packed
//! `RGBA/UnsignedInt16` texels, detail and intermediate blend planes use
//! packed `RGBA/SignedInt16` texels, all rows padded to 8 pixels.
//!
//! Nothing is published until the whole set is built, so a failed call
//! leaves no partially allocated layers behind.

use stitch_core::{
    align_up, BufferAllocator, ImageFormat, ImageView, Rect, VideoBuffer, VideoBufferInfo,
    VideoFormat,
};
use tracing::debug;

use crate::config::{PACKED_I16_SAMPLES, PACKED_U8_SAMPLES, PYRAMID_MAX_LEVEL};
use crate::error::{BlendError, BlendResult};
use crate::layer::{Plane, PlaneImages, PyramidLayer, PyramidLayers};
use crate::seam::{compute_merge_window, validate_merge_window};

/// Builds [`PyramidLayers`] for a frame geometry.
pub struct PyramidAllocator<'a> {
    allocator: &'a dyn BufferAllocator,
    levels: usize,
    need_uv: bool,
}

impl<'a> PyramidAllocator<'a> {
    /// Creates an allocator for `levels` levels (already clamped to `1..=4`).
    pub fn new(allocator: &'a dyn BufferAllocator, levels: usize, need_uv: bool) -> Self {
        Self {
            allocator,
            levels: levels.clamp(1, PYRAMID_MAX_LEVEL),
            need_uv,
        }
    }

    /// Builds all levels.
    ///
    /// `overrides[level]` replaces the computed merge window of that level.
    ///
    /// # Errors
    ///
    /// - Parameter errors when the inputs do not share a height, cannot
    ///   cover the output, or an override does not fit its level
    /// - Memory errors when storage or a view cannot be created
    pub fn allocate(
        &self,
        input0: &VideoBuffer,
        input1: &VideoBuffer,
        output: &VideoBuffer,
        overrides: &[Option<Rect>],
    ) -> BlendResult<PyramidLayers> {
        let (in0, in1, out) = (input0.video_info(), input1.video_info(), output.video_info());
        self.check_geometry(in0, in1, out)?;

        let mut layers: Vec<PyramidLayer> = Vec::with_capacity(self.levels);
        for level in 0..self.levels {
            let last = level + 1 == self.levels;
            let (width, height, blend_width, blend_height) = match layers.last() {
                None => ([in0.width, in1.width], [in0.height, in1.height], out.width, out.height),
                Some(prev) => (
                    prev.width.map(halve),
                    prev.height.map(halve),
                    halve(prev.blend_width),
                    halve(prev.blend_height),
                ),
            };

            let luma = if level == 0 {
                self.bind_level0(Plane::Luma, [input0, input1], output, last)?
            } else {
                self.alloc_level(Plane::Luma, width, height, blend_width, blend_height, last)?
            };
            let chroma = if !self.need_uv {
                None
            } else if level == 0 {
                Some(self.bind_level0(Plane::Chroma, [input0, input1], output, last)?)
            } else {
                Some(self.alloc_level(Plane::Chroma, width, height, blend_width, blend_height, last)?)
            };

            // a zero-width override means "no window": fall back to the computed seam
            let merge_window = match overrides.get(level).copied().flatten().filter(|w| w.width != 0) {
                Some(window) => {
                    validate_merge_window(&window, level, blend_width)?;
                    window
                }
                None => compute_merge_window(width[0], width[1], blend_width)?,
            };
            let merge_window = Rect::new(merge_window.x, 0, merge_window.width, blend_height);

            debug!(
                level,
                width0 = width[0],
                width1 = width[1],
                height = height[0],
                blend_width,
                blend_height,
                window = %merge_window,
                "pyramid level allocated"
            );

            layers.push(PyramidLayer {
                width,
                height,
                blend_width,
                blend_height,
                merge_window,
                luma,
                chroma,
            });
        }

        Ok(PyramidLayers {
            layers,
            inputs: [*in0, *in1],
            output: *out,
        })
    }

    /// Points the level-0 views at a new frame triple of the same geometry.
    ///
    /// Level-0 detail and blend scratch storage is kept.
    pub fn rebind(
        &self,
        layers: &mut PyramidLayers,
        input0: &VideoBuffer,
        input1: &VideoBuffer,
        output: &VideoBuffer,
    ) -> BlendResult<()> {
        if !layers.matches(input0.video_info(), input1.video_info(), output.video_info()) {
            return Err(BlendError::Geometry("frames differ from allocated layers".into()));
        }
        let mut fresh = Vec::with_capacity(2);
        for &plane in Plane::active(self.need_uv) {
            fresh.push((plane, import_level0(plane, [input0, input1], output)?));
        }

        let Some(level0) = layers.get_mut(0) else {
            return Err(BlendError::NotReady("no pyramid levels"));
        };
        for (plane, (gauss, reconstruct)) in fresh {
            if let Some(images) = level0.plane_mut(plane) {
                images.bind_frames(gauss, reconstruct);
            }
        }
        Ok(())
    }

    fn check_geometry(
        &self,
        in0: &VideoBufferInfo,
        in1: &VideoBufferInfo,
        out: &VideoBufferInfo,
    ) -> BlendResult<()> {
        if in0.height != in1.height {
            return Err(BlendError::Geometry(format!(
                "input heights differ: {} vs {}",
                in0.height, in1.height
            )));
        }
        if u64::from(in0.width) + u64::from(in1.width) < u64::from(out.width) {
            return Err(BlendError::Geometry(format!(
                "inputs {} + {} cannot cover output width {}",
                in0.width, in1.width, out.width
            )));
        }
        if out.height != in0.height {
            return Err(BlendError::Geometry(format!(
                "output height {} differs from input height {}",
                out.height, in0.height
            )));
        }
        for info in [in0, in1, out] {
            if info.format != in0.format {
                return Err(BlendError::UnsupportedFormat(info.format));
            }
            if self.need_uv && info.format != VideoFormat::Nv12 {
                return Err(BlendError::UnsupportedFormat(info.format));
            }
        }
        Ok(())
    }

    fn bind_level0(
        &self,
        plane: Plane,
        inputs: [&VideoBuffer; 2],
        output: &VideoBuffer,
        last: bool,
    ) -> BlendResult<PlaneImages> {
        let (gauss, reconstruct) = import_level0(plane, inputs, output)?;
        if last {
            return Ok(PlaneImages::coarsest(gauss, reconstruct));
        }

        let out = output.video_info();
        let lap = [
            self.detail_image(inputs[0].video_info().width, plane.rows(inputs[0].video_info().height))?,
            self.detail_image(inputs[1].video_info().width, plane.rows(inputs[1].video_info().height))?,
        ];
        let blend = self.detail_image(out.width, plane.rows(out.height))?;
        Ok(PlaneImages::new(gauss, lap, blend, reconstruct))
    }

    fn alloc_level(
        &self,
        plane: Plane,
        width: [u32; 2],
        height: [u32; 2],
        blend_width: u32,
        blend_height: u32,
        last: bool,
    ) -> BlendResult<PlaneImages> {
        let gauss = [
            self.packed_image(width[0], plane.rows(height[0]))?,
            self.packed_image(width[1], plane.rows(height[1]))?,
        ];
        let reconstruct = self.packed_image(blend_width, plane.rows(blend_height))?;
        if last {
            return Ok(PlaneImages::coarsest(gauss, reconstruct));
        }

        let lap = [
            self.detail_image(width[0], plane.rows(height[0]))?,
            self.detail_image(width[1], plane.rows(height[1]))?,
        ];
        let blend = self.detail_image(blend_width, plane.rows(blend_height))?;
        Ok(PlaneImages::new(gauss, lap, blend, reconstruct))
    }

    /// 8-bit plane of `width` pixels, 8 pixels per texel.
    fn packed_image(&self, width: u32, rows: u32) -> BlendResult<ImageView> {
        let texels = align_up(width, PACKED_U8_SAMPLES) / PACKED_U8_SAMPLES;
        Ok(ImageView::allocate(self.allocator, ImageFormat::PACKED_U8, texels, rows, 0)?)
    }

    /// Signed 16-bit plane of `width` pixels, 4 pixels per texel.
    fn detail_image(&self, width: u32, rows: u32) -> BlendResult<ImageView> {
        let texels = align_up(width, PACKED_U8_SAMPLES) / PACKED_I16_SAMPLES;
        Ok(ImageView::allocate(self.allocator, ImageFormat::PACKED_I16, texels, rows, 0)?)
    }
}

/// Imports the input planes (gauss) and the output plane (reconstruct).
fn import_level0(
    plane: Plane,
    inputs: [&VideoBuffer; 2],
    output: &VideoBuffer,
) -> BlendResult<([ImageView; 2], ImageView)> {
    let gauss = [import_plane(inputs[0], plane)?, import_plane(inputs[1], plane)?];
    Ok((gauss, import_plane(output, plane)?))
}

/// Imports one plane of a frame as a packed 8-bit view.
fn import_plane(frame: &VideoBuffer, plane: Plane) -> BlendResult<ImageView> {
    let info = frame.video_info();
    let index = usize::from(plane.is_chroma());
    let texels = align_up(info.width, PACKED_U8_SAMPLES) / PACKED_U8_SAMPLES;
    Ok(ImageView::import(
        std::sync::Arc::clone(frame.buffer()),
        ImageFormat::PACKED_U8,
        texels,
        plane.rows(info.height),
        info.strides[index],
        info.offsets[index],
    )?)
}

#[inline]
fn halve(v: u32) -> u32 {
    v.div_ceil(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_core::HostAllocator;

    fn frame(alloc: &HostAllocator, width: u32, height: u32) -> VideoBuffer {
        let info = VideoBufferInfo::init(VideoFormat::Nv12, width, height, 0, 0).unwrap();
        VideoBuffer::allocate(alloc, info).unwrap()
    }

    fn bound(view: &Option<ImageView>) -> &ImageView {
        view.as_ref().unwrap()
    }

    #[test]
    fn test_single_level_aliases() {
        let alloc = HostAllocator::new(1 << 24);
        let (a, b, out) = (frame(&alloc, 64, 16), frame(&alloc, 64, 16), frame(&alloc, 96, 16));
        let used = alloc.in_use();

        let layers = PyramidAllocator::new(&alloc, 1, true)
            .allocate(&a, &b, &out, &[])
            .unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(alloc.in_use(), used);

        let l0 = layers.get(0).unwrap();
        for plane in [Plane::Luma, Plane::Chroma] {
            let p = l0.plane(plane).unwrap();
            assert!(bound(&p.lap[0]).shares_buffer(bound(&p.gauss[0])));
            assert!(bound(&p.blend).shares_buffer(bound(&p.reconstruct)));
        }
        let chroma = l0.plane(Plane::Chroma).unwrap();
        assert_eq!(bound(&chroma.gauss[0]).height(), 8);
        assert_eq!(bound(&chroma.gauss[0]).offset(), 64 * 16);
    }

    #[test]
    fn test_release_and_rebind_frames() {
        let alloc = HostAllocator::new(1 << 24);
        let (a, b, out) = (frame(&alloc, 64, 16), frame(&alloc, 64, 16), frame(&alloc, 96, 16));
        let pa = PyramidAllocator::new(&alloc, 1, true);
        let mut layers = pa.allocate(&a, &b, &out, &[]).unwrap();
        assert!(layers.frames_bound());

        layers.release_frames();
        assert!(!layers.frames_bound());
        for frame in [&a, &b, &out] {
            assert_eq!(std::sync::Arc::strong_count(frame.buffer()), 1);
        }
        let l0 = layers.get(0).unwrap().plane(Plane::Chroma).unwrap();
        assert!(l0.lap[0].is_none() && l0.blend.is_none());

        pa.rebind(&mut layers, &a, &b, &out).unwrap();
        let l0 = layers.get(0).unwrap().plane(Plane::Chroma).unwrap();
        assert!(bound(&l0.lap[1]).shares_buffer(bound(&l0.gauss[1])));
        assert!(std::sync::Arc::ptr_eq(bound(&l0.reconstruct).buffer(), out.buffer()));
    }

    #[test]
    fn test_zero_width_override_recomputed() {
        let alloc = HostAllocator::new(1 << 24);
        let (a, b, out) = (frame(&alloc, 64, 16), frame(&alloc, 64, 16), frame(&alloc, 96, 16));
        let layers = PyramidAllocator::new(&alloc, 2, false)
            .allocate(&a, &b, &out, &[Some(Rect::new(8, 0, 0, 0)), None])
            .unwrap();
        assert_eq!(layers.get(0).unwrap().merge_window, Rect::new(32, 0, 16, 16));
    }

    #[test]
    fn test_override_validated() {
        let alloc = HostAllocator::new(1 << 24);
        let (a, b, out) = (frame(&alloc, 64, 16), frame(&alloc, 64, 16), frame(&alloc, 96, 16));
        let pa = PyramidAllocator::new(&alloc, 2, false);

        let layers = pa
            .allocate(&a, &b, &out, &[None, Some(Rect::new(16, 0, 8, 0))])
            .unwrap();
        assert_eq!(layers.get(1).unwrap().merge_window, Rect::new(16, 0, 8, 8));

        let err = pa
            .allocate(&a, &b, &out, &[Some(Rect::new(96, 0, 8, 0))])
            .unwrap_err();
        assert!(matches!(err, BlendError::InvalidMergeWindow { level: 0, .. }));
    }

    #[test]
    fn test_failure_releases_storage() {
        let frames = HostAllocator::new(1 << 24);
        let (a, b, out) = (frame(&frames, 640, 64), frame(&frames, 640, 64), frame(&frames, 960, 64));

        let tight = HostAllocator::new(64 * 1024);
        let err = PyramidAllocator::new(&tight, 4, true)
            .allocate(&a, &b, &out, &[])
            .unwrap_err();
        assert!(matches!(err, BlendError::Core(ref e) if e.is_allocation_error()));
        assert_eq!(tight.in_use(), 0);
    }

    #[test]
    fn test_grey_rejected_with_uv() {
        let alloc = HostAllocator::new(1 << 24);
        let grey = VideoBufferInfo::init(VideoFormat::Grey, 64, 16, 0, 0).unwrap();
        let a = VideoBuffer::allocate(&alloc, grey).unwrap();
        let b = VideoBuffer::allocate(&alloc, grey).unwrap();
        let out = VideoBuffer::allocate(
            &alloc,
            VideoBufferInfo::init(VideoFormat::Grey, 96, 16, 0, 0).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            PyramidAllocator::new(&alloc, 2, true).allocate(&a, &b, &out, &[]),
            Err(BlendError::UnsupportedFormat(VideoFormat::Grey))
        ));
        assert!(PyramidAllocator::new(&alloc, 2, false).allocate(&a, &b, &out, &[]).is_ok());
    }
}
