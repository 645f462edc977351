//! Merge-window (seam) computation.
//!
//! Input 0 is placed at the left edge of the output and input 1 at the right
//! edge, so the columns `[blend_width - width1, width0)` see both images. The
//! merge window starts where input 1 begins and spans half of that overlap:
//!
//! ```text
//! output   |<-------------------- blend_width -------------------->|
//! input 0  |<------------- width0 ------------->|
//! input 1                    |<------------- width1 -------------->|
//! window                     |<-- overlap/2 -->|
//!                          pos_x
//! ```
//!
//! Both `pos_x` and `width` are aligned down to [`MERGE_WINDOW_ALIGN`].

use stitch_core::{align_down, Rect};

use crate::config::MERGE_WINDOW_ALIGN;
use crate::error::{BlendError, BlendResult};

/// Computes the merge window of one pyramid level.
///
/// Returns a window with `y = 0` and `height = 0`; the caller stretches it
/// over the level height.
///
/// # Errors
///
/// [`BlendError::Geometry`] if the inputs cannot cover the output
/// (`width0 + width1 < blend_width`).
///
/// # Example
///
/// ```rust
/// use stitch_blend::compute_merge_window;
///
/// let w = compute_merge_window(1280, 1280, 1920).unwrap();
/// assert_eq!((w.x, w.width), (640, 320));
/// ```
pub fn compute_merge_window(width0: u32, width1: u32, blend_width: u32) -> BlendResult<Rect> {
    let total = u64::from(width0) + u64::from(width1);
    if total < u64::from(blend_width) {
        return Err(BlendError::Geometry(format!(
            "inputs {} + {} cannot cover output width {}",
            width0, width1, blend_width
        )));
    }

    let pos_x = align_down(blend_width.saturating_sub(width1), MERGE_WINDOW_ALIGN);
    let half_overlap = ((total - u64::from(blend_width)) / 2) as u32;
    // a window reaching past the output is cut at its right edge
    let width = align_down(half_overlap.min(blend_width - pos_x), MERGE_WINDOW_ALIGN);

    debug_assert!(width <= blend_width);
    debug_assert!(pos_x <= blend_width);

    Ok(Rect::new(pos_x, 0, width, 0))
}

/// Checks that a window lies inside a level of width `blend_width`.
pub fn validate_merge_window(window: &Rect, level: usize, blend_width: u32) -> BlendResult<()> {
    if u64::from(window.x) + u64::from(window.width) > u64::from(blend_width) {
        return Err(BlendError::InvalidMergeWindow {
            window: *window,
            level,
            blend_width,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stitch_geometry() {
        assert_eq!(compute_merge_window(1280, 1280, 1920).unwrap(), Rect::new(640, 0, 320, 0));
        assert_eq!(compute_merge_window(640, 640, 960).unwrap(), Rect::new(320, 0, 160, 0));
        // 1000 - 600 = 400, (600 + 600 - 1000) / 2 = 100 -> 96
        assert_eq!(compute_merge_window(600, 600, 1000).unwrap(), Rect::new(400, 0, 96, 0));
    }

    #[test]
    fn test_unaligned_rounds_down() {
        let w = compute_merge_window(1001, 1003, 1500).unwrap();
        assert_eq!(w.x, 496); // 497
        assert_eq!(w.width, 248); // 252
    }

    #[test]
    fn test_no_overlap() {
        let w = compute_merge_window(500, 500, 1000).unwrap();
        assert_eq!((w.x, w.width), (496, 0));
        assert!(compute_merge_window(400, 500, 1000).is_err());
    }

    #[test]
    fn test_wide_inputs_clamped() {
        let w = compute_merge_window(1000, 1000, 100).unwrap();
        assert_eq!(w.x, 0);
        assert_eq!(w.width, 96);
    }

    #[test]
    fn test_property_grid() {
        for bw in (1..=520).step_by(7) {
            for w0 in (0..=bw + 20).step_by(11) {
                for w1 in (0..=bw + 20).step_by(13) {
                    let res = compute_merge_window(w0, w1, bw);
                    if w0 + w1 < bw {
                        assert!(res.is_err());
                        continue;
                    }
                    let w = res.unwrap();
                    assert_eq!(w.x % 8, 0, "pos_x {} for {} {} {}", w.x, w0, w1, bw);
                    assert_eq!(w.width % 8, 0);
                    assert!(w.width <= bw);
                    assert!(w.x <= bw);
                    assert!(validate_merge_window(&w, 0, bw).is_ok());
                }
            }
        }
    }

    #[test]
    fn test_validate() {
        assert!(validate_merge_window(&Rect::new(8, 0, 16, 0), 1, 24).is_ok());
        assert!(matches!(
            validate_merge_window(&Rect::new(16, 0, 16, 0), 1, 24),
            Err(BlendError::InvalidMergeWindow { level: 1, .. })
        ));
    }
}
