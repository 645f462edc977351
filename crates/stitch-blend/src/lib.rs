//! # stitch-blend
//!
//! Multi-band blending of two overlapping camera frames into one wider
//! composite.
//!
//! Each input is decomposed into a Gaussian/Laplacian pyramid, the detail
//! bands are cross-faded over a per-level merge window, and the result is
//! collapsed back into the output frame. Low frequencies mix over a wide
//! region at coarse levels while fine detail mixes over a narrow one, which
//! hides the seam without ghosting.
//!
//! ## Pipeline
//!
//! ```text
//! input0 ──┐                  ┌── lap0[i] ──┐
//!          ├─ Transform(i) ───┤             ├─ Blend(i) ── blend[i] ──┐
//! input1 ──┘                  └── lap1[i] ──┘                         │
//!                                                                     v
//! output <── Reconstruct(0) <── ... <── Reconstruct(L-2) <── blend[L-1]
//! ```
//!
//! ## Modules
//!
//! - [`seam`] - merge window placement
//! - [`layer`] - per-level geometry and image views
//! - [`allocator`] - builds the level set for a frame geometry
//! - [`kernels`] - kernel table, graph and CPU reference bodies
//! - [`blender`] - the handler state machine

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod allocator;
pub mod blender;
pub mod config;
pub mod error;
pub mod kernels;
pub mod layer;
pub mod seam;

pub use allocator::PyramidAllocator;
pub use blender::{create_pyramid_blender, BlenderState, PyramidBlender};
pub use config::{
    BlenderConfig, BLENDER_IMAGE_NUM, DEFAULT_POOL_SIZE, DEFAULT_WORK_GROUP, MERGE_WINDOW_ALIGN,
    PYRAMID_MAX_LEVEL,
};
pub use error::{BlendError, BlendResult, ErrorKind};
pub use kernels::graph::{KernelGraph, KernelNode, NodeRole};
pub use kernels::reference::{reference_engine, register_reference_kernels};
pub use kernels::KernelKind;
pub use layer::{Plane, PlaneImages, PyramidImages, PyramidLayer, PyramidLayers};
pub use seam::{compute_merge_window, validate_merge_window};
