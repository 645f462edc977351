//! Native bodies of the pyramid kernels for [`CpuEngine`].
//!
//! All arithmetic is integer:
//!
//! - down-sample: 2x2 box average, `(a + b + c + d + 2) / 4`
//! - up-sample: bilinear at half-pixel steps with the same rounding; even
//!   output positions copy the coarse sample
//! - laplacian: `src - up(down(src))`, stored as signed 16-bit
//! - reconstruct: `up(coarse) + detail`, clamped to the output type
//!
//! With these rules `up(down(x)) + lap` equals `x` exactly, so an unblended
//! pyramid reconstructs its input bit for bit.
//!
//! Chroma planes are interleaved UV; with `-DPYRAMID_UV=1` every horizontal
//! neighbour lookup steps over one UV pair so U only mixes with U.

use rayon::prelude::*;
use stitch_compute::{ComputeError, ComputeResult, CpuEngine, CpuInvocation};
use stitch_core::{ImageView, Rect};

use super::{KernelKind, PYRAMID_UV};

/// Sample grid of one plane, widened to `i32`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Samples {
    /// Samples per row
    pub width: usize,
    /// Rows
    pub height: usize,
    /// Row-major samples
    pub data: Vec<i32>,
}

impl Samples {
    /// Zeroed grid.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    #[inline]
    fn at(&self, x: usize, y: usize) -> i32 {
        self.data[y.min(self.height - 1) * self.width + x.min(self.width - 1)]
    }
}

/// Registers the transform, blend and reconstruct bodies.
pub fn register_reference_kernels(engine: &CpuEngine) {
    engine.register(KernelKind::Transform.info().name, pyramid_transform);
    engine.register(KernelKind::LinearBlend.info().name, linear_blend);
    engine.register(KernelKind::Reconstruct.info().name, pyramid_reconstruct);
}

/// CPU engine with the pyramid kernels registered.
pub fn reference_engine() -> CpuEngine {
    let engine = CpuEngine::new();
    register_reference_kernels(&engine);
    engine
}

// =============================================================================
// Plane I/O
// =============================================================================

/// Bytes per sample of a view: signed views hold `i16` samples, all others bytes.
#[inline]
fn sample_bytes(view: &ImageView) -> usize {
    if view.format().data_type.is_signed() { 2 } else { 1 }
}

/// Sample grid size of a view.
pub fn sample_dims(view: &ImageView) -> (usize, usize) {
    (view.desc().row_bytes() / sample_bytes(view), view.height() as usize)
}

/// Reads a view into a sample grid.
pub fn load(view: &ImageView) -> ComputeResult<Samples> {
    let (width, height) = sample_dims(view);
    let bytes = view.read_rows()?;
    let data = if sample_bytes(view) == 2 {
        bytes
            .chunks_exact(2)
            .map(|c| i32::from(i16::from_ne_bytes([c[0], c[1]])))
            .collect()
    } else {
        bytes.iter().map(|&b| i32::from(b)).collect()
    };
    Ok(Samples {
        width,
        height,
        data,
    })
}

/// Writes a sample grid into a view, saturating to its sample type.
pub fn store(view: &ImageView, samples: &Samples) -> ComputeResult<()> {
    let dims = sample_dims(view);
    if dims != (samples.width, samples.height) {
        return Err(ComputeError::DispatchFailed {
            kernel: String::new(),
            reason: format!(
                "{}x{} samples for a {}x{} view",
                samples.width, samples.height, dims.0, dims.1
            ),
        });
    }
    if sample_bytes(view) == 2 {
        let wide: Vec<i16> = samples
            .data
            .iter()
            .map(|&v| v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16)
            .collect();
        view.write_rows(bytemuck::cast_slice(&wide))?;
    } else {
        let narrow: Vec<u8> = samples.data.iter().map(|&v| v.clamp(0, 255) as u8).collect();
        view.write_rows(&narrow)?;
    }
    Ok(())
}

// =============================================================================
// Resampling
// =============================================================================

/// Horizontal sample step: 2 for interleaved UV, 1 otherwise.
#[inline]
fn plane_step(inv: &CpuInvocation<'_>) -> usize {
    if inv.flag(PYRAMID_UV) { 2 } else { 1 }
}

/// Index of the `pos`-th sample of channel `ch`, clamped to the row.
#[inline]
fn column(pos: usize, ch: usize, step: usize, width: usize) -> usize {
    let groups = (width / step).max(1);
    pos.min(groups - 1) * step + ch
}

/// 2x2 box down-sample into a `width x height` grid.
pub fn downsample(src: &Samples, width: usize, height: usize, step: usize) -> Samples {
    let mut out = Samples::new(width, height);
    out.data
        .par_chunks_mut(width.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            let (y0, y1) = (2 * y, 2 * y + 1);
            for (x, px) in row.iter_mut().enumerate() {
                let (pos, ch) = (x / step, x % step);
                let x0 = column(2 * pos, ch, step, src.width);
                let x1 = column(2 * pos + 1, ch, step, src.width);
                let sum = src.at(x0, y0) + src.at(x1, y0) + src.at(x0, y1) + src.at(x1, y1);
                *px = (sum + 2).div_euclid(4);
            }
        });
    out
}

/// Bilinear 2x up-sample into a `width x height` grid.
pub fn upsample(src: &Samples, width: usize, height: usize, step: usize) -> Samples {
    let mut out = Samples::new(width, height);
    out.data
        .par_chunks_mut(width.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            let y0 = y / 2;
            let y1 = if y % 2 == 1 { y0 + 1 } else { y0 };
            for (x, px) in row.iter_mut().enumerate() {
                let (pos, ch) = (x / step, x % step);
                let p0 = pos / 2;
                let p1 = if pos % 2 == 1 { p0 + 1 } else { p0 };
                let x0 = column(p0, ch, step, src.width);
                let x1 = column(p1, ch, step, src.width);
                let sum = src.at(x0, y0) + src.at(x1, y0) + src.at(x0, y1) + src.at(x1, y1);
                *px = (sum + 2).div_euclid(4);
            }
        });
    out
}

// =============================================================================
// Kernel bodies
// =============================================================================

/// `(gauss_in, gauss_out_wide, lap_out)`
fn pyramid_transform(inv: &CpuInvocation<'_>) -> ComputeResult<()> {
    inv.expect_args(3)?;
    let step = plane_step(inv);
    let src = load(inv.image(0)?)?;
    let gauss_out = inv.image(1)?;
    let lap_out = inv.image(2)?;

    let (dw, dh) = sample_dims(gauss_out);
    let down = downsample(&src, dw, dh, step);
    let up = upsample(&down, src.width, src.height, step);

    let mut lap = Samples::new(src.width, src.height);
    lap.data
        .par_iter_mut()
        .zip(src.data.par_iter().zip(up.data.par_iter()))
        .for_each(|(d, (s, u))| *d = s - u);

    store(gauss_out, &down).map_err(|e| named(inv, e))?;
    store(lap_out, &lap).map_err(|e| named(inv, e))
}

/// `(in0, in1, out, merge_window, blend_width, [width0, width1])`
fn linear_blend(inv: &CpuInvocation<'_>) -> ComputeResult<()> {
    inv.expect_args(6)?;
    let step = plane_step(inv);
    let in0 = load(inv.image(0)?)?;
    let in1 = load(inv.image(1)?)?;
    let out_view = inv.image(2)?;
    let window: Rect = inv.pod(3)?;
    let blend_width = inv.u32(4)?;
    let widths: [u32; 2] = inv.pod(5)?;

    let (width, height) = sample_dims(out_view);
    let out = blend_planes(&in0, &in1, width, height, &window, blend_width, widths[1], step);
    store(out_view, &out).map_err(|e| named(inv, e))
}

/// Cross-fades two sample grids across `window`.
///
/// Input 0 is anchored at output column 0 and input 1 at column
/// `blend_width - width1`. Left of the window the output is input 0,
/// from `window.right()` on it is input 1, inside it the weight of input 1
/// grows linearly from 0.
#[allow(clippy::too_many_arguments)]
pub fn blend_planes(
    in0: &Samples,
    in1: &Samples,
    width: usize,
    height: usize,
    window: &Rect,
    blend_width: u32,
    width1: u32,
    step: usize,
) -> Samples {
    let mut offset = i64::from(blend_width) - i64::from(width1);
    // keep U and V columns in phase
    offset -= offset.rem_euclid(step as i64);
    let (start, span) = (i64::from(window.x), i64::from(window.width));

    let mut out = Samples::new(width, height);
    out.data
        .par_chunks_mut(width.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.iter_mut().enumerate() {
                let col = (x - x % step) as i64;
                let x1 = (x as i64 - offset).clamp(0, in1.width as i64 - 1) as usize;
                *px = if col < start {
                    in0.at(x, y)
                } else if col >= start + span {
                    in1.at(x1, y)
                } else {
                    let t = col - start;
                    let a = i64::from(in0.at(x, y));
                    let b = i64::from(in1.at(x1, y));
                    ((a * (span - t) + b * t + span / 2).div_euclid(span)) as i32
                };
            }
        });
    out
}

/// `(coarse, detail, out)`
fn pyramid_reconstruct(inv: &CpuInvocation<'_>) -> ComputeResult<()> {
    inv.expect_args(3)?;
    let step = plane_step(inv);
    let coarse = load(inv.image(0)?)?;
    let detail = load(inv.image(1)?)?;
    let out_view = inv.image(2)?;

    let (width, height) = sample_dims(out_view);
    if (detail.width, detail.height) != (width, height) {
        return Err(ComputeError::InvalidArgument {
            kernel: inv.kernel_name().into(),
            index: 1,
            reason: format!(
                "detail {}x{} does not match output {}x{}",
                detail.width, detail.height, width, height
            ),
        });
    }

    let mut out = upsample(&coarse, width, height, step);
    out.data
        .par_iter_mut()
        .zip(detail.data.par_iter())
        .for_each(|(o, d)| *o += d);
    store(out_view, &out).map_err(|e| named(inv, e))
}

fn named(inv: &CpuInvocation<'_>, err: ComputeError) -> ComputeError {
    match err {
        ComputeError::DispatchFailed { reason, .. } => ComputeError::DispatchFailed {
            kernel: inv.kernel_name().into(),
            reason,
        },
        other => other,
    }
}
