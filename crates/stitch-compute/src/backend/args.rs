//! Kernel argument lists.
//!
//! Arguments are positional. Images are bound as views; scalars and small
//! structs travel as raw bytes so any `#[repr(C)]` [`bytemuck::Pod`] type can
//! be passed the way a device kernel expects it.

use bytemuck::Pod;
use stitch_core::ImageView;

/// One positional kernel argument.
#[derive(Debug, Clone)]
pub enum KernelArg {
    /// Image memory object.
    Image(ImageView),
    /// 32-bit unsigned scalar.
    U32(u32),
    /// Raw argument block (struct or array).
    Bytes(Vec<u8>),
}

impl KernelArg {
    /// Short name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::U32(_) => "u32",
            Self::Bytes(_) => "bytes",
        }
    }
}

/// Ordered kernel arguments.
#[derive(Debug, Clone, Default)]
pub struct KernelArgs {
    args: Vec<KernelArg>,
}

impl KernelArgs {
    /// Empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty list with room for `n` arguments.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            args: Vec::with_capacity(n),
        }
    }

    /// Appends an image view.
    pub fn push_image(&mut self, view: ImageView) -> &mut Self {
        self.args.push(KernelArg::Image(view));
        self
    }

    /// Appends a scalar.
    pub fn push_u32(&mut self, value: u32) -> &mut Self {
        self.args.push(KernelArg::U32(value));
        self
    }

    /// Pushes a plain-old-data value as a raw argument block.
    pub fn push_pod<T: Pod>(&mut self, value: &T) -> &mut Self {
        self.args.push(KernelArg::Bytes(bytemuck::bytes_of(value).to_vec()));
        self
    }

    /// Argument at `index`.
    pub fn get(&self, index: usize) -> Option<&KernelArg> {
        self.args.get(index)
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Returns `true` if no argument was pushed.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Arguments in order.
    pub fn iter(&self) -> impl Iterator<Item = &KernelArg> {
        self.args.iter()
    }

    /// All bound image views, in argument order.
    pub fn images(&self) -> impl Iterator<Item = &ImageView> {
        self.args.iter().filter_map(|a| match a {
            KernelArg::Image(v) => Some(v),
            _ => None,
        })
    }
}
