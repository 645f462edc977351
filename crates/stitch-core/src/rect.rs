//! Rectangle type for image regions and merge windows.
//!
//! Coordinates follow the image convention: origin at the top-left corner,
//! X grows right, Y grows down.
//!
//! ```rust
//! use stitch_core::Rect;
//!
//! let seam = Rect::new(320, 0, 160, 32);
//! assert_eq!(seam.right(), 480);
//! assert!(seam.contains(400, 10));
//! ```
//!
//! [`Rect`] is `#[repr(C)]` and [`bytemuck::Pod`], so it can be passed to a
//! kernel as a raw argument block.

use bytemuck::{Pod, Zeroable};

/// An axis-aligned rectangle in pixel coordinates.
///
/// The rectangle spans `[x, x + width)` horizontally and `[y, y + height)`
/// vertically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
#[repr(C)]
pub struct Rect {
    /// Left column
    pub x: u32,
    /// Top row
    pub y: u32,
    /// Columns covered
    pub width: u32,
    /// Rows covered
    pub height: u32,
}

impl Rect {
    /// Rectangle at `(x, y)` of `width x height`.
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns the X coordinate one past the right edge.
    #[inline]
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Returns the Y coordinate one past the bottom edge.
    #[inline]
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Checks if a point lies inside the rectangle.
    #[inline]
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}
