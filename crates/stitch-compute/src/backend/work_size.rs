//! Dispatch grids.
//!
//! A work size is a global grid split into fixed-size local work groups.
//! Image kernels cover the output image with one invocation per texel, the
//! global size rounded up to whole groups.

use crate::{ComputeError, ComputeResult};

/// Maximum grid dimensionality.
pub const MAX_WORK_DIM: usize = 3;

/// Global and local dispatch sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkSize {
    /// Number of used dimensions (1..=3).
    pub dim: usize,
    /// Global invocation count per dimension.
    pub global: [usize; MAX_WORK_DIM],
    /// Work-group size per dimension.
    pub local: [usize; MAX_WORK_DIM],
}

impl WorkSize {
    /// Two-dimensional grid, taken as given.
    pub fn new_2d(global: [usize; 2], local: [usize; 2]) -> Self {
        Self {
            dim: 2,
            global: [global[0], global[1], 1],
            local: [local[0], local[1], 1],
        }
    }

    /// Covers a `width x height` image, rounding up to whole work groups.
    pub fn for_image(width: u32, height: u32, local: [usize; 2]) -> Self {
        let gx = (width as usize).div_ceil(local[0].max(1)) * local[0].max(1);
        let gy = (height as usize).div_ceil(local[1].max(1)) * local[1].max(1);
        Self::new_2d([gx, gy], local)
    }

    /// Checks the grid is a whole number of non-empty work groups.
    pub fn validate(&self) -> ComputeResult<()> {
        if self.dim == 0 || self.dim > MAX_WORK_DIM {
            return Err(ComputeError::InvalidWorkSize(format!("dim {}", self.dim)));
        }
        for d in 0..self.dim {
            let (g, l) = (self.global[d], self.local[d]);
            if g == 0 || l == 0 || g % l != 0 {
                return Err(ComputeError::InvalidWorkSize(format!(
                    "global {} not a multiple of local {} in dim {}",
                    g, l, d
                )));
            }
        }
        Ok(())
    }

    /// Work-group count per dimension.
    pub fn groups(&self) -> [usize; MAX_WORK_DIM] {
        let mut groups = [1; MAX_WORK_DIM];
        for (d, g) in groups.iter_mut().enumerate().take(self.dim) {
            *g = self.global[d] / self.local[d].max(1);
        }
        groups
    }

    /// Total invocation count.
    pub fn invocations(&self) -> usize {
        self.global[..self.dim].iter().product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_image_aligns_up() {
        // 1920 / 8 texels wide, 960 rows
        let ws = WorkSize::for_image(240, 960, [16, 2]);
        assert_eq!(ws.global[..2], [240, 960]);
        assert_eq!(ws.groups()[..2], [15, 480]);

        let ws = WorkSize::for_image(81, 481, [16, 2]);
        assert_eq!(ws.global[..2], [96, 482]);
        assert!(ws.validate().is_ok());
        assert_eq!(ws.invocations(), 96 * 482);
    }

    #[test]
    fn test_validate() {
        assert!(WorkSize::new_2d([30, 4], [16, 2]).validate().is_err());
        assert!(WorkSize::new_2d([32, 4], [0, 2]).validate().is_err());
        let mut ws = WorkSize::new_2d([32, 4], [16, 2]);
        ws.dim = 4;
        assert!(ws.validate().is_err());
    }
}
