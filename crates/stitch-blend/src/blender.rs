//! The pyramid blender handler.
//!
//! # Lifecycle
//!
//! ```text
//!            set_output_size / geometry change
//!   Unconfigured <---------------------------- Allocated / Ready
//!        |                                          ^
//!        | process(): allocate layers               |
//!        +---------------> Allocated ---------------+
//!                              | kernel graph compiled
//!                              v
//!                            Ready --- process(): rebind level 0, dispatch graph
//! ```
//!
//! The kernel graph is compiled once at construction; only the image views
//! change with geometry and frames.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use stitch_blend::{create_pyramid_blender, reference_engine, BlenderConfig};
//! use stitch_core::{HostAllocator, VideoBuffer, VideoBufferInfo, VideoFormat};
//!
//! let alloc = Arc::new(HostAllocator::new(64 << 20));
//! let mut blender =
//!     create_pyramid_blender(Arc::new(reference_engine()), alloc.clone(), BlenderConfig::new(2, true))
//!         .unwrap();
//! blender.set_output_size(96, 16).unwrap();
//!
//! let info = VideoBufferInfo::init(VideoFormat::Nv12, 64, 16, 0, 0).unwrap();
//! let left = VideoBuffer::allocate(alloc.as_ref(), info).unwrap();
//! let right = Arc::new(VideoBuffer::allocate(alloc.as_ref(), info).unwrap());
//! left.attach_buffer(right);
//!
//! let output = blender.execute(&left).unwrap();
//! assert_eq!(output.video_info().width, 96);
//! ```

use std::sync::Arc;

use stitch_compute::KernelEngine;
use stitch_core::{align_up, BufferAllocator, Rect, VideoBuffer, VideoBufferInfo, VideoBufferPool};
use tracing::{debug, info, warn};

use crate::allocator::PyramidAllocator;
use crate::config::{BlenderConfig, PYRAMID_MAX_LEVEL};
use crate::error::{BlendError, BlendResult};
use crate::kernels::graph::KernelGraph;
use crate::layer::{PyramidImages, PyramidLayer, PyramidLayers};
use crate::seam::{compute_merge_window, validate_merge_window};

/// Configuration state of a [`PyramidBlender`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlenderState {
    /// No layers built.
    Unconfigured,
    /// Layers built for the current geometry.
    Allocated,
    /// Layers built and every kernel compiled.
    Ready,
}

/// Two-input multi-band blender.
pub struct PyramidBlender<E: KernelEngine> {
    engine: Arc<E>,
    allocator: Arc<dyn BufferAllocator>,
    config: BlenderConfig,
    output_size: Option<(u32, u32)>,
    overrides: [Option<Rect>; PYRAMID_MAX_LEVEL],
    layers: Option<PyramidLayers>,
    graph: KernelGraph<E::Kernel>,
    pool: VideoBufferPool,
    state: BlenderState,
}

/// Creates a blender and compiles its kernel graph.
///
/// `config.levels` is clamped to `1..=4`.
pub fn create_pyramid_blender<E: KernelEngine>(
    engine: Arc<E>,
    allocator: Arc<dyn BufferAllocator>,
    config: BlenderConfig,
) -> BlendResult<PyramidBlender<E>> {
    PyramidBlender::new(engine, allocator, config)
}

impl<E: KernelEngine> PyramidBlender<E> {
    /// Creates a blender and compiles its kernel graph.
    pub fn new(
        engine: Arc<E>,
        allocator: Arc<dyn BufferAllocator>,
        config: BlenderConfig,
    ) -> BlendResult<Self> {
        let config = BlenderConfig::new(config.levels, config.need_uv)
            .with_work_group(config.work_group)
            .with_pool_size(config.pool_size);
        let graph = KernelGraph::build(engine.as_ref(), config.levels, config.need_uv)?;
        let pool = VideoBufferPool::new(Arc::clone(&allocator));
        Ok(Self {
            engine,
            allocator,
            config,
            output_size: None,
            overrides: [None; PYRAMID_MAX_LEVEL],
            layers: None,
            graph,
            pool,
            state: BlenderState::Unconfigured,
        })
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Sets the composite resolution. Must precede the first frame.
    pub fn set_output_size(&mut self, width: u32, height: u32) -> BlendResult<()> {
        if width == 0 || height == 0 {
            return Err(BlendError::Geometry(format!("output size {}x{}", width, height)));
        }
        if self.output_size != Some((width, height)) {
            debug!(width, height, "output size changed");
            self.output_size = Some((width, height));
            self.invalidate();
        }
        Ok(())
    }

    /// Configured composite resolution.
    pub fn output_size(&self) -> Option<(u32, u32)> {
        self.output_size
    }

    /// Overrides the seam of `level`.
    ///
    /// The override survives re-allocation. With layers already built it is
    /// validated against the level width and applied at once. A zero-width
    /// window drops the override and restores the computed seam.
    pub fn set_merge_window(&mut self, window: Rect, level: usize) -> BlendResult<()> {
        self.check_level(level)?;
        if window.width == 0 {
            self.overrides[level] = None;
            if let Some(layer) = self.layers.as_mut().and_then(|l| l.get_mut(level)) {
                let computed = compute_merge_window(layer.width[0], layer.width[1], layer.blend_width)?;
                layer.merge_window = Rect::new(computed.x, 0, computed.width, layer.blend_height);
            }
            debug!(level, "merge window override dropped");
            return Ok(());
        }
        if let Some(layer) = self.layers.as_mut().and_then(|l| l.get_mut(level)) {
            validate_merge_window(&window, level, layer.blend_width)?;
            layer.merge_window = Rect::new(window.x, 0, window.width, layer.blend_height);
        }
        self.overrides[level] = Some(window);
        info!(level, pos_x = window.x, width = window.width, "merge window set");
        Ok(())
    }

    /// Drops the override of `level`; the computed seam applies from the next allocation.
    pub fn clear_merge_window(&mut self, level: usize) -> BlendResult<()> {
        self.check_level(level)?;
        if self.overrides[level].take().is_some() {
            self.invalidate();
        }
        Ok(())
    }

    /// Returns `true` if `level` has a non-empty merge window.
    pub fn has_merge_window(&self, level: usize) -> bool {
        self.merge_window(level).is_some_and(|w| w.width != 0)
    }

    /// Current seam of `level`: the built layer's window, else the override.
    pub fn merge_window(&self, level: usize) -> Option<Rect> {
        match &self.layers {
            Some(layers) => layers.merge_window(level),
            None => self.overrides.get(level).copied().flatten(),
        }
    }

    /// Current configuration state.
    pub fn state(&self) -> BlenderState {
        self.state
    }

    /// Configuration after clamping.
    pub fn config(&self) -> &BlenderConfig {
        &self.config
    }

    /// Number of pyramid levels.
    pub fn levels(&self) -> usize {
        self.config.levels
    }

    /// Returns `true` if the chroma plane is blended.
    pub fn need_uv(&self) -> bool {
        self.config.need_uv
    }

    /// Pyramid layers of the current geometry, if allocated.
    pub fn layers(&self) -> Option<&PyramidLayers> {
        self.layers.as_ref()
    }

    /// Compiled kernel graph.
    pub fn graph(&self) -> &KernelGraph<E::Kernel> {
        &self.graph
    }

    /// Engine the graph runs on.
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    // =========================================================================
    // Frames
    // =========================================================================

    /// Output frame geometry for an input frame: input format, output width,
    /// input height, aligned to 16.
    pub fn prepare_buffer_pool_video_info(&self, input: &VideoBufferInfo) -> BlendResult<VideoBufferInfo> {
        let (width, _) = self.output_size.ok_or(BlendError::NotReady("output size not set"))?;
        Ok(VideoBufferInfo::init(
            input.format,
            width,
            input.height,
            align_up(width, 16),
            align_up(input.height, 16),
        )?)
    }

    /// Blends `input` and its attached companion into `output`.
    ///
    /// On error the output content is undefined.
    pub fn process(&mut self, input: &VideoBuffer, output: &VideoBuffer) -> BlendResult<()> {
        let (width, height) = self.output_size.ok_or(BlendError::NotReady("output size not set"))?;
        let companion = input.find_attached().ok_or_else(|| {
            warn!("input has no attached companion buffer");
            BlendError::MissingAttachment
        })?;
        let out_info = output.video_info();
        if (out_info.width, out_info.height) != (width, height) {
            return Err(BlendError::Geometry(format!(
                "output frame {}x{} differs from configured {}x{}",
                out_info.width, out_info.height, width, height
            )));
        }

        for frame in [input, &*companion, output] {
            if !self.allocator.is_valid(frame.buffer()) {
                return Err(BlendError::InvalidBuffer {
                    buffer_id: frame.buffer().id(),
                });
            }
        }

        self.bind(input, &companion, output)?;

        let layers = self.layers.as_mut().ok_or(BlendError::NotReady("layers missing"))?;
        let result = self
            .graph
            .execute(self.engine.as_ref(), &*layers, self.config.work_group);
        // the frames belong to the caller again once the graph has run
        layers.release_frames();
        result
    }

    /// Takes an output frame from the pool and blends into it.
    pub fn execute(&mut self, input: &VideoBuffer) -> BlendResult<VideoBuffer> {
        let info = self.prepare_buffer_pool_video_info(input.video_info())?;
        self.pool.set_video_info(info);
        if self.pool.is_empty() && !self.pool.is_stopped() {
            self.pool.reserve(self.config.pool_size)?;
        }
        let output = self.pool.get_buffer()?;
        self.process(input, &output)?;
        Ok(output)
    }

    /// Stops the output pool; later [`execute`](Self::execute) calls fail.
    pub fn pre_stop(&self) {
        self.pool.stop();
    }

    /// Output buffer pool.
    pub fn pool(&self) -> &VideoBufferPool {
        &self.pool
    }

    fn bind(&mut self, input0: &VideoBuffer, input1: &VideoBuffer, output: &VideoBuffer) -> BlendResult<()> {
        let (levels, need_uv) = (self.config.levels, self.config.need_uv);
        let reusable = self
            .layers
            .as_ref()
            .is_some_and(|l| l.matches(input0.video_info(), input1.video_info(), output.video_info()));

        if reusable {
            let pyramid = PyramidAllocator::new(self.allocator.as_ref(), levels, need_uv);
            let result = match self.layers.as_mut() {
                Some(layers) => pyramid.rebind(layers, input0, input1, output),
                None => Err(BlendError::NotReady("layers missing")),
            };
            if result.is_err() {
                self.invalidate();
            }
            return result;
        }

        self.invalidate();
        let layers = PyramidAllocator::new(self.allocator.as_ref(), levels, need_uv)
            .allocate(input0, input1, output, &self.overrides)?;
        self.layers = Some(layers);
        self.state = BlenderState::Allocated;
        if !self.graph.is_empty() {
            self.state = BlenderState::Ready;
        }
        Ok(())
    }

    fn invalidate(&mut self) {
        if self.layers.take().is_some() {
            debug!("pyramid layers released");
        }
        self.state = BlenderState::Unconfigured;
    }

    fn check_level(&self, level: usize) -> BlendResult<()> {
        if level >= self.config.levels {
            return Err(BlendError::InvalidLevel {
                level,
                levels: self.config.levels,
            });
        }
        Ok(())
    }
}

impl<E: KernelEngine> PyramidImages for PyramidBlender<E> {
    fn layer(&self, level: usize) -> Option<&PyramidLayer> {
        self.layers.as_ref()?.get(level)
    }
}

impl<E: KernelEngine> std::fmt::Debug for PyramidBlender<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PyramidBlender")
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .field("output_size", &self.output_size)
            .field("state", &self.state)
            .field("nodes", &self.graph.len())
            .finish()
    }
}
