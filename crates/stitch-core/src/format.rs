//! Image formats and alignment helpers.
//!
//! An [`ImageFormat`] is a channel order plus a channel data type, the same
//! pair a compute image descriptor carries. The pyramid stores 8-bit planes
//! packed into `RGBA/UnsignedInt16` texels (8 samples per texel) and signed
//! detail planes as `RGBA/SignedInt16` texels (4 samples per texel).

use std::fmt;

/// Channel layout of one texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelOrder {
    /// Single channel
    R,
    /// Two channels
    Rg,
    /// Four channels
    Rgba,
}

impl ChannelOrder {
    /// Number of channels per texel.
    #[inline]
    pub const fn channels(self) -> usize {
        match self {
            Self::R => 1,
            Self::Rg => 2,
            Self::Rgba => 4,
        }
    }
}

/// Storage type of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    /// 8-bit unsigned
    UnsignedInt8,
    /// 16-bit unsigned
    UnsignedInt16,
    /// 16-bit signed
    SignedInt16,
}

impl ChannelType {
    /// Bytes per channel.
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            Self::UnsignedInt8 => 1,
            Self::UnsignedInt16 | Self::SignedInt16 => 2,
        }
    }

    /// Returns `true` for signed channel types.
    #[inline]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::SignedInt16)
    }
}

/// Texel format of an image view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageFormat {
    /// Channel layout
    pub order: ChannelOrder,
    /// Channel storage type
    pub data_type: ChannelType,
}

impl ImageFormat {
    /// One unsigned byte per texel.
    pub const R8: Self = Self::new(ChannelOrder::R, ChannelType::UnsignedInt8);

    /// Eight packed unsigned bytes per texel.
    pub const PACKED_U8: Self = Self::new(ChannelOrder::Rgba, ChannelType::UnsignedInt16);

    /// Four signed 16-bit samples per texel.
    pub const PACKED_I16: Self = Self::new(ChannelOrder::Rgba, ChannelType::SignedInt16);

    /// Creates a format from channel order and type.
    #[inline]
    pub const fn new(order: ChannelOrder, data_type: ChannelType) -> Self {
        Self { order, data_type }
    }

    /// Bytes per texel.
    #[inline]
    pub const fn pixel_bytes(&self) -> usize {
        self.order.channels() * self.data_type.bytes()
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.order, self.data_type)
    }
}

/// Rounds `value` up to a multiple of `align`.
///
/// `align` must be non-zero.
#[inline]
pub const fn align_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

/// Rounds `value` down to a multiple of `align`.
///
/// `align` must be non-zero.
#[inline]
pub const fn align_down(value: u32, align: u32) -> u32 {
    value / align * align
}
