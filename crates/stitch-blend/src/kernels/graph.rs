//! Kernel graph construction and execution.
//!
//! The graph is a flat list of nodes in dependency order:
//!
//! ```text
//! for slot in 0..2, level in 0..L-1, plane:   Transform(level, slot)
//! for level in 0..L, plane:                   Blend(level)
//! for level in L-2 down to 0, plane:          Reconstruct(level)
//! ```
//!
//! Executing a frame dispatches the nodes in exactly this order on one
//! engine queue. Nodes hold compiled kernels only; image views are resolved
//! through [`PyramidImages`] each time a node is prepared, so the same graph
//! serves every frame and every geometry.

use std::sync::Arc;

use stitch_compute::{KernelArgs, KernelCache, KernelEngine, KernelEvent, WorkSize};
use stitch_core::{ImageFormat, ImageView, Rect};
use tracing::{debug, error, trace};

use super::{build_options, KernelKind};
use crate::config::{BLENDER_IMAGE_NUM, PACKED_U8_SAMPLES};
use crate::error::{BlendError, BlendResult};
use crate::layer::{Plane, PyramidImages};

/// What a node computes and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    /// Gauss `level` of input `slot` to gauss `level + 1` and lap `level`.
    Transform {
        /// Source level
        level: usize,
        /// Input slot
        slot: usize,
    },
    /// Lap `level` of both inputs to blend `level`.
    Blend {
        /// Blended level
        level: usize,
    },
    /// Reconstruct `level + 1` and blend `level` to reconstruct `level`.
    Reconstruct {
        /// Output level
        level: usize,
    },
}

impl NodeRole {
    /// Kernel program this role runs.
    pub fn kind(&self) -> KernelKind {
        match self {
            Self::Transform { .. } => KernelKind::Transform,
            Self::Blend { .. } => KernelKind::LinearBlend,
            Self::Reconstruct { .. } => KernelKind::Reconstruct,
        }
    }

    /// Pyramid level the node writes.
    pub fn level(&self) -> usize {
        match *self {
            Self::Transform { level, .. } | Self::Blend { level } | Self::Reconstruct { level } => {
                level
            }
        }
    }
}

/// Arguments and grid of one dispatch.
///
/// Holding the prepared arguments keeps their views alive until the
/// dispatch completes.
#[derive(Debug)]
pub struct PreparedDispatch {
    /// Bound arguments in kernel order.
    pub args: KernelArgs,
    /// Dispatch grid.
    pub work_size: WorkSize,
}

/// One kernel instance of the graph.
#[derive(Debug)]
pub struct KernelNode<K> {
    role: NodeRole,
    plane: Plane,
    kernel: Arc<K>,
}

impl<K> KernelNode<K> {
    /// Role of this node.
    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Plane this node processes.
    pub fn plane(&self) -> Plane {
        self.plane
    }

    /// Kernel program of this node.
    pub fn kind(&self) -> KernelKind {
        self.role.kind()
    }

    /// Compiled kernel, shared with nodes of the same kind and plane.
    pub fn kernel(&self) -> &Arc<K> {
        &self.kernel
    }

    /// Resolves current views and computes the dispatch grid.
    pub fn prepare(
        &self,
        images: &dyn PyramidImages,
        work_group: [usize; 2],
    ) -> BlendResult<PreparedDispatch> {
        let mut args = KernelArgs::with_capacity(6);
        let out = match self.role {
            NodeRole::Transform { level, slot } => {
                let input = view(images.gauss_image(level, self.plane, slot), "gauss input")?;
                let next = view(images.gauss_image(level + 1, self.plane, slot), "gauss output")?;
                let lap = view(images.lap_image(level, self.plane, slot), "laplacian output")?;
                // one byte per pixel for the down-sample write
                let next_wide = next.reinterpret(next.width() * PACKED_U8_SAMPLES, ImageFormat::R8)?;
                args.push_image(input).push_image(next_wide).push_image(lap);
                next
            }
            NodeRole::Blend { level } => {
                let layer = images
                    .layer(level)
                    .ok_or(BlendError::NotReady("pyramid level missing"))?;
                let in0 = view(images.lap_image(level, self.plane, 0), "blend input 0")?;
                let in1 = view(images.lap_image(level, self.plane, 1), "blend input 1")?;
                let out = view(images.blend_image(level, self.plane), "blend output")?;

                let window = layer.merge_window;
                let window = Rect::new(window.x, 0, window.width, self.plane.rows(layer.blend_height));
                let widths: [u32; BLENDER_IMAGE_NUM] = layer.width;
                args.push_image(in0)
                    .push_image(in1)
                    .push_image(out.clone())
                    .push_pod(&window)
                    .push_u32(layer.blend_width)
                    .push_pod(&widths);
                out
            }
            NodeRole::Reconstruct { level } => {
                let coarse = view(images.reconstruct_image(level + 1, self.plane), "coarse input")?;
                let detail = view(images.blend_image(level, self.plane), "detail input")?;
                let out = view(images.reconstruct_image(level, self.plane), "reconstruct output")?;
                args.push_image(coarse).push_image(detail).push_image(out.clone());
                out
            }
        };

        Ok(PreparedDispatch {
            args,
            work_size: WorkSize::for_image(out.width(), out.height(), work_group),
        })
    }
}

fn view(image: Option<ImageView>, what: &'static str) -> BlendResult<ImageView> {
    image.ok_or(BlendError::NotReady(what))
}

/// Ordered kernel instances for a fixed level count and plane set.
pub struct KernelGraph<K> {
    nodes: Vec<KernelNode<K>>,
    cache: KernelCache<(KernelKind, Plane), K>,
    levels: usize,
    need_uv: bool,
}

impl<K: Send + Sync> KernelGraph<K> {
    /// Builds and compiles every node.
    ///
    /// Kernels sharing a kind and plane are compiled once.
    pub fn build<E>(engine: &E, levels: usize, need_uv: bool) -> BlendResult<Self>
    where
        E: KernelEngine<Kernel = K>,
    {
        let mut graph = Self {
            nodes: Vec::new(),
            cache: KernelCache::new(),
            levels,
            need_uv,
        };
        let planes = Plane::active(need_uv);

        for slot in 0..BLENDER_IMAGE_NUM {
            for level in 0..levels.saturating_sub(1) {
                for &plane in planes {
                    graph.push(engine, NodeRole::Transform { level, slot }, plane)?;
                }
            }
        }
        for level in 0..levels {
            for &plane in planes {
                graph.push(engine, NodeRole::Blend { level }, plane)?;
            }
        }
        for level in (0..levels.saturating_sub(1)).rev() {
            for &plane in planes {
                graph.push(engine, NodeRole::Reconstruct { level }, plane)?;
            }
        }

        debug!(
            engine = engine.name(),
            levels,
            need_uv,
            nodes = graph.nodes.len(),
            compiled = graph.cache.len(),
            reuse = graph.cache.hit_ratio(),
            "kernel graph built"
        );
        Ok(graph)
    }

    fn push<E>(&mut self, engine: &E, role: NodeRole, plane: Plane) -> BlendResult<()>
    where
        E: KernelEngine<Kernel = K>,
    {
        let kind = role.kind();
        let kernel = self
            .cache
            .get_or_try_insert_with((kind, plane), || {
                let options = build_options(plane);
                engine.compile(kind.info(), &options).inspect_err(|e| {
                    error!(kernel = kind.info().name, options = %options, error = %e, "kernel build failed");
                })
            })?;
        self.nodes.push(KernelNode { role, plane, kernel });
        Ok(())
    }

    /// Dispatches every node for one frame and waits for the last one.
    pub fn execute<E>(
        &self,
        engine: &E,
        images: &dyn PyramidImages,
        work_group: [usize; 2],
    ) -> BlendResult<()>
    where
        E: KernelEngine<Kernel = K>,
    {
        let mut last: Option<KernelEvent> = None;
        for node in &self.nodes {
            let prepared = node.prepare(images, work_group)?;
            trace!(
                role = ?node.role,
                plane = ?node.plane,
                global = ?&prepared.work_size.global[..prepared.work_size.dim],
                "dispatch"
            );
            last = Some(engine.dispatch(&node.kernel, &prepared.args, &prepared.work_size)?);
        }
        if let Some(event) = last {
            engine.wait(event)?;
        }
        engine.finish()?;
        Ok(())
    }

    /// Nodes in dispatch order.
    pub fn nodes(&self) -> &[KernelNode<K>] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Level count the graph was built for.
    pub fn levels(&self) -> usize {
        self.levels
    }

    /// Returns `true` if chroma nodes are present.
    pub fn need_uv(&self) -> bool {
        self.need_uv
    }

    /// Number of distinct compiled kernels.
    pub fn compiled_kernels(&self) -> usize {
        self.cache.len()
    }

    /// Nodes that reused an already compiled kernel.
    pub fn cache_hits(&self) -> u64 {
        self.cache.hits()
    }
}
