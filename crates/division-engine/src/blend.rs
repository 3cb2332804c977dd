//! Per-pass color blending and channel write mask.

use bitflags::bitflags;

use crate::color::Color;
use crate::error::EngineError;

/// Multiplier applied to the source or destination color before combining.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    SrcAlpha,
    /// `min(src.a, 1 - dst.a)`
    SrcAlphaSaturated,
    DstColor,
    DstAlpha,
    ConstantColor,
    ConstantAlpha,
    OneMinusSrcColor,
    OneMinusSrcAlpha,
    OneMinusDstColor,
    OneMinusDstAlpha,
    OneMinusConstantColor,
    OneMinusConstantAlpha,
}

impl BlendFactor {
    /// Reads the blend constant color.
    #[inline]
    pub const fn uses_constant_color(self) -> bool {
        matches!(self, Self::ConstantColor | Self::OneMinusConstantColor)
    }

    /// Reads only the alpha of the blend constant.
    #[inline]
    pub const fn uses_constant_alpha(self) -> bool {
        matches!(self, Self::ConstantAlpha | Self::OneMinusConstantAlpha)
    }
}

impl TryFrom<i32> for BlendFactor {
    type Error = EngineError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Zero,
            1 => Self::One,
            2 => Self::SrcColor,
            3 => Self::SrcAlpha,
            4 => Self::SrcAlphaSaturated,
            5 => Self::DstColor,
            6 => Self::DstAlpha,
            7 => Self::ConstantColor,
            8 => Self::ConstantAlpha,
            9 => Self::OneMinusSrcColor,
            10 => Self::OneMinusSrcAlpha,
            11 => Self::OneMinusDstColor,
            12 => Self::OneMinusDstAlpha,
            13 => Self::OneMinusConstantColor,
            14 => Self::OneMinusConstantAlpha,
            other => return Err(EngineError::configuration(format!("unknown blend factor {other}"))),
        })
    }
}

/// How the weighted source and destination are combined.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum BlendOperation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

impl TryFrom<i32> for BlendOperation {
    type Error = EngineError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => Self::Add,
            2 => Self::Subtract,
            3 => Self::ReverseSubtract,
            4 => Self::Min,
            5 => Self::Max,
            other => {
                return Err(EngineError::configuration(format!("unknown blend operation {other}")));
            }
        })
    }
}

/// `out = operation(src * src_factor, dst * dst_factor)`, applied to color and alpha alike.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Blend {
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub operation: BlendOperation,
    /// Only read by the constant factors.
    pub constant: Color,
}

impl Blend {
    /// The source overwrites the target.
    pub const REPLACE: Self = Self::new(BlendFactor::One, BlendFactor::Zero, BlendOperation::Add);

    /// Straight-alpha "over".
    pub const ALPHA: Self =
        Self::new(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha, BlendOperation::Add);

    #[inline]
    pub const fn new(src: BlendFactor, dst: BlendFactor, operation: BlendOperation) -> Self {
        Self { src, dst, operation, constant: Color::TRANSPARENT }
    }

    #[inline]
    pub const fn with_constant(mut self, constant: Color) -> Self {
        self.constant = constant;
        self
    }

    pub fn uses_constant(&self) -> bool {
        [self.src, self.dst]
            .iter()
            .any(|f| f.uses_constant_color() || f.uses_constant_alpha())
    }
}

impl Default for Blend {
    fn default() -> Self {
        Self::REPLACE
    }
}

bitflags! {
    /// Color channels a pass writes to the target.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorMask: u8 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
        const RGB = Self::R.bits() | Self::G.bits() | Self::B.bits();
        const RGBA = Self::RGB.bits() | Self::A.bits();
    }
}

/// Alpha is left untouched unless asked for.
impl Default for ColorMask {
    fn default() -> Self {
        Self::RGB
    }
}
