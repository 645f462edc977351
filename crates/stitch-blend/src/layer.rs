//! Pyramid layers and their image views.
//!
//! Each level holds, per plane, two gauss views and two laplacian views (one
//! per input), a blend view and a reconstruct view. Views are cheap handles:
//! several of them may alias the same storage.
//!
//! ```text
//! level 0      gauss[i] = input i          reconstruct = output
//!              lap[i]   = own i16          blend       = own i16
//! level 1..L-2 gauss[i] = own u8           reconstruct = own u8
//!              lap[i]   = own i16          blend       = own i16
//! level L-1    lap[i]  -> gauss[i]         blend      -> reconstruct
//! ```
//!
//! Level-0 frame views exist only for the duration of one frame.
//! Kernels reach the views through [`PyramidImages`] only.

use stitch_core::{ImageView, Rect, VideoBufferInfo};

use crate::config::BLENDER_IMAGE_NUM;

/// Image plane a view belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Plane {
    /// Y plane
    Luma,
    /// Interleaved UV plane at half height
    Chroma,
}

impl Plane {
    /// Planes blended for a configuration, luma first.
    pub fn active(need_uv: bool) -> &'static [Plane] {
        if need_uv {
            &[Plane::Luma, Plane::Chroma]
        } else {
            &[Plane::Luma]
        }
    }

    /// Returns `true` for the chroma plane.
    #[inline]
    pub const fn is_chroma(self) -> bool {
        matches!(self, Plane::Chroma)
    }

    /// Row count of this plane for a luma height.
    #[inline]
    pub const fn rows(self, luma_height: u32) -> u32 {
        match self {
            Plane::Luma => luma_height,
            Plane::Chroma => luma_height.div_ceil(2),
        }
    }
}

/// Views of one plane at one level.
///
/// Level-0 views that import a frame are only set while that frame is being
/// blended; between frames they are `None` so the frames go back to their
/// owners.
#[derive(Debug, Clone)]
pub struct PlaneImages {
    /// Down-sampled input per slot.
    pub gauss: [Option<ImageView>; BLENDER_IMAGE_NUM],
    /// Detail residual per slot.
    pub lap: [Option<ImageView>; BLENDER_IMAGE_NUM],
    /// Blend result.
    pub blend: Option<ImageView>,
    /// Reconstructed result.
    pub reconstruct: Option<ImageView>,
    coarsest: bool,
}

impl PlaneImages {
    /// Views of an inner level with its own detail and blend storage.
    pub(crate) fn new(
        gauss: [ImageView; BLENDER_IMAGE_NUM],
        lap: [ImageView; BLENDER_IMAGE_NUM],
        blend: ImageView,
        reconstruct: ImageView,
    ) -> Self {
        Self {
            gauss: gauss.map(Some),
            lap: lap.map(Some),
            blend: Some(blend),
            reconstruct: Some(reconstruct),
            coarsest: false,
        }
    }

    /// Views of the coarsest level: lap aliases gauss, blend aliases reconstruct.
    pub(crate) fn coarsest(gauss: [ImageView; BLENDER_IMAGE_NUM], reconstruct: ImageView) -> Self {
        let mut images = Self {
            gauss: [None, None],
            lap: [None, None],
            blend: None,
            reconstruct: None,
            coarsest: true,
        };
        images.bind_frames(gauss, reconstruct);
        images
    }

    /// Points the frame-backed views at new gauss inputs and a new output.
    pub(crate) fn bind_frames(&mut self, gauss: [ImageView; BLENDER_IMAGE_NUM], reconstruct: ImageView) {
        if self.coarsest {
            self.lap = gauss.clone().map(Some);
            self.blend = Some(reconstruct.clone());
        }
        self.gauss = gauss.map(Some);
        self.reconstruct = Some(reconstruct);
    }

    /// Drops the frame-backed views; owned scratch storage stays.
    pub(crate) fn release_frames(&mut self) {
        if self.coarsest {
            self.lap = [None, None];
            self.blend = None;
        }
        self.gauss = [None, None];
        self.reconstruct = None;
    }

    /// Returns `true` while frame views are bound.
    pub fn is_bound(&self) -> bool {
        self.reconstruct.is_some()
    }
}

/// State of one pyramid level.
#[derive(Debug, Clone)]
pub struct PyramidLayer {
    /// Input widths.
    pub width: [u32; BLENDER_IMAGE_NUM],
    /// Input heights.
    pub height: [u32; BLENDER_IMAGE_NUM],
    /// Output width at this level.
    pub blend_width: u32,
    /// Output height at this level.
    pub blend_height: u32,
    /// Seam rectangle in output coordinates.
    pub merge_window: Rect,
    pub(crate) luma: PlaneImages,
    pub(crate) chroma: Option<PlaneImages>,
}

impl PyramidLayer {
    /// Views of a plane, `None` for chroma when chroma blending is off.
    pub fn plane(&self, plane: Plane) -> Option<&PlaneImages> {
        match plane {
            Plane::Luma => Some(&self.luma),
            Plane::Chroma => self.chroma.as_ref(),
        }
    }

    pub(crate) fn plane_mut(&mut self, plane: Plane) -> Option<&mut PlaneImages> {
        match plane {
            Plane::Luma => Some(&mut self.luma),
            Plane::Chroma => self.chroma.as_mut(),
        }
    }

    fn planes_mut(&mut self) -> impl Iterator<Item = &mut PlaneImages> {
        std::iter::once(&mut self.luma).chain(self.chroma.as_mut())
    }

    /// Returns `true` if the chroma plane is blended.
    pub fn has_chroma(&self) -> bool {
        self.chroma.is_some()
    }
}

/// A complete set of pyramid levels for one frame geometry.
#[derive(Debug, Clone)]
pub struct PyramidLayers {
    pub(crate) layers: Vec<PyramidLayer>,
    pub(crate) inputs: [VideoBufferInfo; BLENDER_IMAGE_NUM],
    pub(crate) output: VideoBufferInfo,
}

impl PyramidLayers {
    /// Number of levels.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns `true` if no level was built.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Level `level`, if built.
    pub fn get(&self, level: usize) -> Option<&PyramidLayer> {
        self.layers.get(level)
    }

    /// Levels from finest to coarsest.
    pub fn iter(&self) -> impl Iterator<Item = &PyramidLayer> {
        self.layers.iter()
    }

    /// Coarsest level.
    pub fn last(&self) -> Option<&PyramidLayer> {
        self.layers.last()
    }

    /// Returns `true` if the frames have the geometry these layers were built for.
    pub fn matches(
        &self,
        input0: &VideoBufferInfo,
        input1: &VideoBufferInfo,
        output: &VideoBufferInfo,
    ) -> bool {
        self.inputs[0] == *input0 && self.inputs[1] == *input1 && self.output == *output
    }

    /// Returns `true` while level 0 references a frame triple.
    pub fn frames_bound(&self) -> bool {
        self.layers.first().is_some_and(|l| l.luma.is_bound())
    }

    /// Drops the level-0 views of the frames last blended.
    pub(crate) fn release_frames(&mut self) {
        if let Some(level0) = self.layers.first_mut() {
            level0.planes_mut().for_each(PlaneImages::release_frames);
        }
    }

    pub(crate) fn get_mut(&mut self, level: usize) -> Option<&mut PyramidLayer> {
        self.layers.get_mut(level)
    }
}

/// Read access to pyramid views by level, plane and input slot.
///
/// Every accessor returns `None` for a level, plane or slot that does not
/// exist in the current configuration.
pub trait PyramidImages {
    /// Level geometry and merge window.
    fn layer(&self, level: usize) -> Option<&PyramidLayer>;

    /// Down-sampled image of input `slot`.
    fn gauss_image(&self, level: usize, plane: Plane, slot: usize) -> Option<ImageView> {
        self.layer(level)?.plane(plane)?.gauss.get(slot)?.clone()
    }

    /// Detail image of input `slot`.
    fn lap_image(&self, level: usize, plane: Plane, slot: usize) -> Option<ImageView> {
        self.layer(level)?.plane(plane)?.lap.get(slot)?.clone()
    }

    /// Blend output of a level.
    fn blend_image(&self, level: usize, plane: Plane) -> Option<ImageView> {
        self.layer(level)?.plane(plane)?.blend.clone()
    }

    /// Reconstruct output of a level.
    fn reconstruct_image(&self, level: usize, plane: Plane) -> Option<ImageView> {
        self.layer(level)?.plane(plane)?.reconstruct.clone()
    }

    /// Seam rectangle of a level.
    fn merge_window(&self, level: usize) -> Option<Rect> {
        Some(self.layer(level)?.merge_window)
    }
}

impl PyramidImages for PyramidLayers {
    fn layer(&self, level: usize) -> Option<&PyramidLayer> {
        self.get(level)
    }
}
