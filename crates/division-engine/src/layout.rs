//! Interleaved vertex layout calculation.
//!
//! Attributes are packed in declaration order without padding:
//! `offset[i] = sum(width[0..i])` and `stride = sum(width[..])`. Matching the
//! shader's expected layout is the caller's responsibility.

use crate::error::EngineError;

/// Type of a single vertex attribute.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AttributeType {
    Float,
    Double,
    Integer,
    Vec2,
    Vec3,
    Vec4,
    Mat4x4,
}

impl AttributeType {
    /// Returns `(base_size, component_count)` in bytes / components.
    #[inline]
    pub const fn traits(self) -> (u32, u32) {
        match self {
            Self::Float => (4, 1),
            Self::Double => (8, 1),
            Self::Integer => (4, 1),
            Self::Vec2 => (4, 2),
            Self::Vec3 => (4, 3),
            Self::Vec4 => (4, 4),
            Self::Mat4x4 => (4, 16),
        }
    }

    /// Byte width of one value of this type.
    #[inline]
    pub const fn width(self) -> u32 {
        let (base, count) = self.traits();
        base * count
    }

    /// Scalar type the shader reads from each component.
    #[inline]
    pub const fn scalar(self) -> ScalarType {
        match self {
            Self::Double => ScalarType::Float64,
            Self::Integer => ScalarType::Sint32,
            _ => ScalarType::Float32,
        }
    }

    /// Number of shader input locations this type occupies.
    #[inline]
    pub const fn location_span(self) -> u32 {
        match self {
            Self::Mat4x4 => 4,
            _ => 1,
        }
    }
}

impl TryFrom<i32> for AttributeType {
    type Error = EngineError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Float,
            1 => Self::Double,
            2 => Self::Integer,
            3 => Self::Vec2,
            4 => Self::Vec3,
            5 => Self::Vec4,
            6 => Self::Mat4x4,
            other => {
                return Err(EngineError::configuration(format!("unknown attribute type {other}")));
            }
        })
    }
}

/// Component type of a vertex attribute or shader input.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ScalarType {
    Float32,
    Float64,
    Sint32,
}

/// Caller-side attribute declaration: type plus shader input location.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct AttributeDescriptor {
    pub ty: AttributeType,
    pub location: u32,
}

impl AttributeDescriptor {
    #[inline]
    pub const fn new(ty: AttributeType, location: u32) -> Self {
        Self { ty, location }
    }
}

/// Resolved attribute inside an interleaved vertex.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    /// Byte offset from the start of the vertex.
    pub offset: u32,
    pub base_size: u32,
    pub component_count: u32,
    pub ty: AttributeType,
}

impl VertexAttribute {
    #[inline]
    pub const fn width(&self) -> u32 {
        self.base_size * self.component_count
    }

    /// Shader input locations covered by this attribute.
    #[inline]
    pub fn locations(&self) -> core::ops::Range<u32> {
        self.location..self.location + self.ty.location_span()
    }
}

/// Packed per-vertex layout of a buffer.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct VertexLayout {
    attributes: Vec<VertexAttribute>,
    stride: u32,
}

impl VertexLayout {
    /// Computes offsets with a single left-to-right scan.
    pub fn new(descriptors: &[AttributeDescriptor]) -> Self {
        let mut attributes = Vec::with_capacity(descriptors.len());
        let mut offset = 0u32;

        for d in descriptors {
            let (base_size, component_count) = d.ty.traits();
            attributes.push(VertexAttribute {
                location: d.location,
                offset,
                base_size,
                component_count,
                ty: d.ty,
            });
            offset += base_size * component_count;
        }

        Self { attributes, stride: offset }
    }

    #[inline]
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    #[inline]
    pub fn attribute(&self, index: usize) -> Option<&VertexAttribute> {
        self.attributes.get(index)
    }

    /// Bytes per vertex.
    #[inline]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// The attribute feeding shader input `location`, if any.
    pub fn attribute_at(&self, location: u32) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.locations().contains(&location))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    use AttributeType::*;

    fn layout(types: &[AttributeType]) -> VertexLayout {
        let descs: Vec<_> = types
            .iter()
            .enumerate()
            .map(|(i, &ty)| AttributeDescriptor::new(ty, i as u32))
            .collect();
        VertexLayout::new(&descs)
    }

    #[rstest]
    #[case(Float, 4, 1)]
    #[case(Double, 8, 1)]
    #[case(Integer, 4, 1)]
    #[case(Vec2, 4, 2)]
    #[case(Vec3, 4, 3)]
    #[case(Vec4, 4, 4)]
    #[case(Mat4x4, 4, 16)]
    fn attribute_traits(#[case] ty: AttributeType, #[case] base: u32, #[case] count: u32) {
        assert_eq!(ty.traits(), (base, count));
        assert_eq!(ty.width(), base * count);
    }

    #[test]
    fn position_color_layout() {
        let l = layout(&[Vec3, Vec4]);
        assert_eq!(l.stride(), 28);
        assert_eq!(l.attributes()[0].offset, 0);
        assert_eq!(l.attributes()[1].offset, 12);
    }

    #[rstest]
    #[case(&[Float])]
    #[case(&[Vec2, Vec2, Float])]
    #[case(&[Double, Integer, Vec3])]
    #[case(&[Mat4x4, Vec4, Double, Float])]
    fn packing_law_holds(#[case] types: &[AttributeType]) {
        let l = layout(types);

        let mut running = 0;
        for a in l.attributes() {
            assert_eq!(a.offset, running);
            running += a.width();
        }
        assert_eq!(l.stride(), running);
    }

    #[test]
    fn caller_locations_are_kept() {
        let l = VertexLayout::new(&[
            AttributeDescriptor::new(Vec3, 4),
            AttributeDescriptor::new(Vec2, 1),
        ]);
        assert_eq!(l.attributes()[0].location, 4);
        assert_eq!(l.attributes()[1].location, 1);
    }

    #[test]
    fn matrix_spans_four_locations() {
        let l = VertexLayout::new(&[AttributeDescriptor::new(Mat4x4, 2)]);
        assert_eq!(l.attribute_at(2).map(|a| a.ty), Some(Mat4x4));
        assert_eq!(l.attribute_at(5).map(|a| a.ty), Some(Mat4x4));
        assert!(l.attribute_at(6).is_none());
    }

    #[rstest]
    #[case(Float, ScalarType::Float32)]
    #[case(Mat4x4, ScalarType::Float32)]
    #[case(Double, ScalarType::Float64)]
    #[case(Integer, ScalarType::Sint32)]
    fn scalar_read_by_the_shader(#[case] ty: AttributeType, #[case] scalar: ScalarType) {
        assert_eq!(ty.scalar(), scalar);
    }

    #[test]
    fn unknown_code_is_configuration_error() {
        assert_eq!(AttributeType::try_from(4).unwrap(), Vec3);
        let err = AttributeType::try_from(7).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }
}
