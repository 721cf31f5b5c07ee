//! Typed values with std140/std430 buffer layout math.

use crate::error::vr_fatal;

/// Scalar base type a [`BoxType`] is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    /// 2 bytes, decoded as IEEE half.
    Float16,
    Float32,
    Float64,
}

impl BaseType {
    /// Size of one scalar of this type, in bytes.
    pub fn size_bytes(self) -> u32 {
        match self {
            BaseType::Int8 | BaseType::Uint8 => 1,
            BaseType::Int16 | BaseType::Uint16 | BaseType::Float16 => 2,
            BaseType::Int32 | BaseType::Uint32 | BaseType::Float32 => 4,
            BaseType::Int64 | BaseType::Uint64 | BaseType::Float64 => 8,
        }
    }

    fn is_float(self) -> bool {
        matches!(self, BaseType::Float16 | BaseType::Float32 | BaseType::Float64)
    }

    /// Decode one little-endian scalar of this type into a double.
    fn load(self, bytes: &[u8]) -> f64 {
        match self {
            BaseType::Int8 => bytes[0] as i8 as f64,
            BaseType::Uint8 => bytes[0] as f64,
            BaseType::Int16 => i16::from_le_bytes(bytes[..2].try_into().unwrap()) as f64,
            BaseType::Uint16 => u16::from_le_bytes(bytes[..2].try_into().unwrap()) as f64,
            BaseType::Int32 => i32::from_le_bytes(bytes[..4].try_into().unwrap()) as f64,
            BaseType::Uint32 => u32::from_le_bytes(bytes[..4].try_into().unwrap()) as f64,
            BaseType::Int64 => i64::from_le_bytes(bytes[..8].try_into().unwrap()) as f64,
            BaseType::Uint64 => u64::from_le_bytes(bytes[..8].try_into().unwrap()) as f64,
            BaseType::Float16 => half::f16::from_bits(u16::from_le_bytes(bytes[..2].try_into().unwrap())).to_f64(),
            BaseType::Float32 => f32::from_le_bytes(bytes[..4].try_into().unwrap()) as f64,
            BaseType::Float64 => f64::from_le_bytes(bytes[..8].try_into().unwrap()),
        }
    }
}

/// A scalar, vector, or (for float base types) matrix box type.
///
/// `Matrix` is stored as `(base, cols, rows)`; GLSL matrices are only
/// defined over `Float32`/`Float64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxType {
    Scalar(BaseType),
    Vector(BaseType, u32),
    Matrix(BaseType, u32, u32),
}

impl BoxType {
    fn base(self) -> BaseType {
        match self {
            BoxType::Scalar(b) | BoxType::Vector(b, _) | BoxType::Matrix(b, _, _) => b,
        }
    }

    /// `(major_count, minor_count)` per `layout.major` — the number of
    /// "slices" (columns for `COLUMN`, rows for `ROW`) and the element
    /// count within one slice.
    fn major_minor(self, layout: BoxLayout) -> (u32, u32) {
        match self {
            BoxType::Scalar(_) => (1, 1),
            BoxType::Vector(_, n) => (1, n),
            BoxType::Matrix(_, cols, rows) => match layout.major {
                Major::Column => (cols, rows),
                Major::Row => (rows, cols),
            },
        }
    }
}

/// GLSL buffer layout standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Std {
    Std140,
    Std430,
}

/// Matrix storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Major {
    Column,
    Row,
}

/// A buffer layout: the std variant plus matrix storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxLayout {
    pub std: Std,
    pub major: Major,
}

/// Round `minor` up to 4 when it's 3 — a `vec3`'s base alignment is always
/// that of a `vec4`.
fn round_minor(minor: u32) -> u32 {
    if minor == 3 {
        4
    } else {
        minor
    }
}

fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) / alignment * alignment
}

/// Base alignment of `ty` under `layout`, in bytes.
pub fn base_alignment(ty: BoxType, layout: BoxLayout) -> u32 {
    let (_, minor) = ty.major_minor(layout);
    ty.base().size_bytes() * round_minor(minor)
}

/// Stride between consecutive major slices (matrix columns/rows, or array
/// elements of a scalar/vector type). std140 rounds this up to 16 bytes;
/// std430 does not.
pub fn matrix_stride(ty: BoxType, layout: BoxLayout) -> u32 {
    let alignment = base_alignment(ty, layout);
    match layout.std {
        Std::Std140 => align_up(alignment, 16),
        Std::Std430 => alignment,
    }
}

/// Stride between consecutive array elements of `ty`.
pub fn array_stride(ty: BoxType, layout: BoxLayout) -> u32 {
    let (major, _) = ty.major_minor(layout);
    matrix_stride(ty, layout) * major
}

/// Total size in bytes of one value of `ty` under `layout`.
pub fn size(ty: BoxType, layout: BoxLayout) -> u32 {
    let (major, minor) = ty.major_minor(layout);
    (major - 1) * matrix_stride(ty, layout) + ty.base().size_bytes() * minor
}

/// Visit every scalar component of `ty`, calling `cb(major_index,
/// minor_index, byte_offset)`.
pub fn for_each_component(ty: BoxType, layout: BoxLayout, mut cb: impl FnMut(u32, u32, u32)) {
    let (major, minor) = ty.major_minor(layout);
    let stride = matrix_stride(ty, layout);
    let base_size = ty.base().size_bytes();

    for major_index in 0..major {
        for minor_index in 0..minor {
            let offset = major_index * stride + minor_index * base_size;
            cb(major_index, minor_index, offset);
        }
    }
}

/// Comparison operator applied to each component of a probed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    FuzzyEqual,
    NotEqual,
    Less,
    Leq,
    Greater,
    Geq,
}

/// Per-component tolerance for `FUZZY_EQUAL` comparisons.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    pub absolute: f64,
    pub relative: f64,
}

impl Default for Tolerance {
    /// Default absolute tolerance of `0.01`.
    fn default() -> Self {
        Self {
            absolute: 0.01,
            relative: 0.0,
        }
    }
}

/// Compare every scalar component of `a_bytes` against `b_bytes`
/// interpreted as `ty` under `layout`. Integer base types ignore
/// `tolerance` even for `FUZZY_EQUAL` — only float/double comparisons are
/// fuzzy.
pub fn compare(comparison: Comparison, tolerance: Tolerance, ty: BoxType, layout: BoxLayout, a_bytes: &[u8], b_bytes: &[u8]) -> bool {
    let base = ty.base();
    let base_size = base.size_bytes() as usize;
    let mut ok = true;

    for_each_component(ty, layout, |_major, _minor, offset| {
        let offset = offset as usize;
        let a = base.load(&a_bytes[offset..offset + base_size]);
        let b = base.load(&b_bytes[offset..offset + base_size]);
        if !compare_scalar(comparison, tolerance, base, a, b) {
            ok = false;
        }
    });

    ok
}

fn compare_scalar(comparison: Comparison, tolerance: Tolerance, base: BaseType, a: f64, b: f64) -> bool {
    match comparison {
        Comparison::Equal => a == b,
        Comparison::NotEqual => a != b,
        Comparison::Less => a < b,
        Comparison::Leq => a <= b,
        Comparison::Greater => a > b,
        Comparison::Geq => a >= b,
        Comparison::FuzzyEqual => {
            if base.is_float() {
                approx::relative_eq!(a, b, epsilon = tolerance.absolute, max_relative = tolerance.relative)
            } else {
                a == b
            }
        }
    }
}

/// Format every scalar component of `bytes` (interpreted as `ty` under
/// `layout`) as a decoded value, in the order [`for_each_component`] visits
/// them.
pub fn format_components(ty: BoxType, layout: BoxLayout, bytes: &[u8]) -> String {
    let base = ty.base();
    let base_size = base.size_bytes() as usize;
    let mut parts = Vec::new();
    for_each_component(ty, layout, |_major, _minor, offset| {
        let offset = offset as usize;
        parts.push(format!("{}", base.load(&bytes[offset..offset + base_size])));
    });
    format!("({})", parts.join(", "))
}

/// Genuine programmer error: a caller asked for a matrix over a non-float
/// base type, which GLSL has no representation for.
pub fn require_float_base(base: BaseType) {
    if !base.is_float() {
        vr_fatal!("matrix box type requires a float base type, got {base:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STD140_COLUMN: BoxLayout = BoxLayout { std: Std::Std140, major: Major::Column };
    const STD430_COLUMN: BoxLayout = BoxLayout { std: Std::Std430, major: Major::Column };

    #[test]
    fn vec3_base_alignment_rounds_to_vec4() {
        let ty = BoxType::Vector(BaseType::Float32, 3);
        assert_eq!(base_alignment(ty, STD140_COLUMN), 16);
    }

    #[test]
    fn std140_matrix_stride_is_multiple_of_16() {
        let ty = BoxType::Matrix(BaseType::Float32, 3, 3);
        assert_eq!(matrix_stride(ty, STD140_COLUMN) % 16, 0);
    }

    #[test]
    fn std430_matrix_stride_skips_16_rounding_when_alignment_is_smaller() {
        let ty = BoxType::Matrix(BaseType::Float32, 2, 2);
        // vec2 alignment = 8 bytes; std430 doesn't round this up to 16.
        assert_eq!(matrix_stride(ty, STD430_COLUMN), 8);
    }

    #[test]
    fn array_stride_is_never_smaller_than_size() {
        for ty in [
            BoxType::Scalar(BaseType::Float32),
            BoxType::Vector(BaseType::Float32, 3),
            BoxType::Matrix(BaseType::Float32, 4, 4),
            BoxType::Matrix(BaseType::Float64, 3, 2),
        ] {
            for layout in [STD140_COLUMN, STD430_COLUMN] {
                assert!(array_stride(ty, layout) >= size(ty, layout));
            }
        }
    }

    #[test]
    fn for_each_component_pads_vec3_row() {
        let ty = BoxType::Matrix(BaseType::Float32, 2, 3);
        let mut offsets = Vec::new();
        for_each_component(ty, STD140_COLUMN, |major, minor, offset| {
            offsets.push((major, minor, offset));
        });
        // Two columns, each a vec3 padded to a 16-byte stride.
        assert_eq!(offsets.len(), 6);
        assert_eq!(offsets[3].2, 16);
    }

    #[test]
    fn compare_fuzzy_equal_uses_absolute_tolerance_for_floats() {
        let ty = BoxType::Scalar(BaseType::Float32);
        let a = 1.0f32.to_le_bytes();
        let b = 1.005f32.to_le_bytes();
        assert!(compare(Comparison::FuzzyEqual, Tolerance::default(), ty, STD140_COLUMN, &a, &b));
    }

    #[test]
    fn format_components_decodes_each_scalar() {
        let ty = BoxType::Vector(BaseType::Uint32, 2);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.extend_from_slice(&9u32.to_le_bytes());
        assert_eq!(format_components(ty, STD140_COLUMN, &bytes), "(7, 9)");
    }

    #[test]
    fn compare_fuzzy_equal_ignores_tolerance_for_integers() {
        let ty = BoxType::Scalar(BaseType::Uint32);
        let a = 8u32.to_le_bytes();
        let b = 9u32.to_le_bytes();
        assert!(!compare(Comparison::FuzzyEqual, Tolerance::default(), ty, STD140_COLUMN, &a, &b));
    }
}
