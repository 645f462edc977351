//! Pyramid kernels: program table, build options, graph and CPU bodies.
//!
//! Three programs live in one source file:
//!
//! | kind | entry point | reads | writes |
//! |------|-------------|-------|--------|
//! | [`KernelKind::Transform`] | `kernel_pyramid_transform` | gauss `i` | gauss `i+1`, lap `i` |
//! | [`KernelKind::LinearBlend`] | `kernel_linear_blender` | lap `i` x2 | blend `i` |
//! | [`KernelKind::Reconstruct`] | `kernel_pyramid_reconstruct` | reconstruct `i+1`, blend `i` | reconstruct `i` |
//!
//! Each is built once per plane with `-DPYRAMID_UV=0|1`.

pub mod graph;
pub mod reference;

use stitch_compute::{KernelInfo, KernelOptions};

use crate::layer::Plane;

/// Program source shared by all pyramid kernels.
pub const PYRAMID_SOURCE: &str = "pyramid_blend.cl";

/// Plane selector define.
pub const PYRAMID_UV: &str = "PYRAMID_UV";

/// Kind of pyramid kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KernelKind {
    /// Down-sample plus detail residual.
    Transform,
    /// Cross-fade of two detail images across the merge window.
    LinearBlend,
    /// Up-sample of the coarser result plus blended detail.
    Reconstruct,
}

const KERNEL_INFOS: [KernelInfo; 3] = [
    KernelInfo::new("kernel_pyramid_transform", PYRAMID_SOURCE),
    KernelInfo::new("kernel_linear_blender", PYRAMID_SOURCE),
    KernelInfo::new("kernel_pyramid_reconstruct", PYRAMID_SOURCE),
];

impl KernelKind {
    /// Every kind, in graph order.
    pub const ALL: [KernelKind; 3] = [Self::Transform, Self::LinearBlend, Self::Reconstruct];

    /// Program entry of this kind.
    pub fn info(self) -> &'static KernelInfo {
        &KERNEL_INFOS[self as usize]
    }
}

/// Build options selecting the plane.
pub fn build_options(plane: Plane) -> KernelOptions {
    KernelOptions::new().define(PYRAMID_UV, u32::from(plane.is_chroma()))
}
