//! Core data types for decoded OCT members

use byteorder::{ByteOrder, LittleEndian};
use ndarray::{Array, Dimension, Ix2, Ix3, ShapeBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage class declared by the `Type` attribute of a data-file entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    /// Color or video data (signed integers)
    Colored,
    /// Processed floating point data
    Real,
    /// Raw detector counts; signedness comes from the instrument section
    Raw,
    /// Any other `Type` literal found in the header
    Unknown(String),
}

impl ElementKind {
    /// Parse the `Type` attribute literal (case-sensitive)
    pub fn parse(literal: &str) -> Self {
        match literal {
            "Colored" => ElementKind::Colored,
            "Real" => ElementKind::Real,
            "Raw" => ElementKind::Raw,
            other => ElementKind::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Colored => f.write_str("Colored"),
            ElementKind::Real => f.write_str("Real"),
            ElementKind::Raw => f.write_str("Raw"),
            ElementKind::Unknown(s) => f.write_str(s),
        }
    }
}

/// Resolved numeric element type of a raw member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ElementType {
    /// Signed 8-bit integer
    Int8 = 0,
    /// Unsigned 8-bit integer
    UInt8 = 1,
    /// Signed 16-bit integer
    Int16 = 2,
    /// Unsigned 16-bit integer
    UInt16 = 3,
    /// Signed 32-bit integer
    Int32 = 4,
    /// 32-bit floating point
    Float32 = 5,
}

impl ElementType {
    /// Size in bytes of this element type
    pub fn size_in_bytes(&self) -> usize {
        match self {
            ElementType::Int8 | ElementType::UInt8 => 1,
            ElementType::Int16 | ElementType::UInt16 => 2,
            ElementType::Int32 | ElementType::Float32 => 4,
        }
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, ElementType::Float32)
    }

    /// Check if values of this type carry a sign
    pub fn is_signed(&self) -> bool {
        !matches!(self, ElementType::UInt8 | ElementType::UInt16)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Int8 => "int8",
            ElementType::UInt8 => "uint8",
            ElementType::Int16 => "int16",
            ElementType::UInt16 => "uint16",
            ElementType::Int32 => "int32",
            ElementType::Float32 => "float32",
        };
        f.write_str(name)
    }
}

/// Dense numeric array whose element type is only known at runtime
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NumericArray<D: Dimension> {
    I8(Array<i8, D>),
    U8(Array<u8, D>),
    I16(Array<i16, D>),
    U16(Array<u16, D>),
    I32(Array<i32, D>),
    F32(Array<f32, D>),
}

/// A decoded 2-D member, row-major `(size_x, size_z)`
pub type DecodedArray = NumericArray<Ix2>;

/// A stacked 3-D array, `(outer, rows, size_z)`
pub type DecodedVolume = NumericArray<Ix3>;

macro_rules! map_numeric {
    ($value:expr, $a:ident => $body:expr) => {
        match $value {
            NumericArray::I8($a) => $body,
            NumericArray::U8($a) => $body,
            NumericArray::I16($a) => $body,
            NumericArray::U16($a) => $body,
            NumericArray::I32($a) => $body,
            NumericArray::F32($a) => $body,
        }
    };
}

impl<D: Dimension> NumericArray<D> {
    /// Zero-filled array of the given element type
    pub fn zeros<Sh>(element_type: ElementType, shape: Sh) -> Self
    where
        Sh: ShapeBuilder<Dim = D>,
    {
        match element_type {
            ElementType::Int8 => NumericArray::I8(Array::zeros(shape)),
            ElementType::UInt8 => NumericArray::U8(Array::zeros(shape)),
            ElementType::Int16 => NumericArray::I16(Array::zeros(shape)),
            ElementType::UInt16 => NumericArray::U16(Array::zeros(shape)),
            ElementType::Int32 => NumericArray::I32(Array::zeros(shape)),
            ElementType::Float32 => NumericArray::F32(Array::zeros(shape)),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            NumericArray::I8(_) => ElementType::Int8,
            NumericArray::U8(_) => ElementType::UInt8,
            NumericArray::I16(_) => ElementType::Int16,
            NumericArray::U16(_) => ElementType::UInt16,
            NumericArray::I32(_) => ElementType::Int32,
            NumericArray::F32(_) => ElementType::Float32,
        }
    }

    pub fn shape(&self) -> &[usize] {
        map_numeric!(self, a => a.shape())
    }

    pub fn len(&self) -> usize {
        map_numeric!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the element data in bytes
    pub fn size_in_bytes(&self) -> usize {
        self.len() * self.element_type().size_in_bytes()
    }

    /// Borrow the underlying array if it holds `T`
    pub fn as_typed<T: Sample>(&self) -> Option<&Array<T, D>> {
        T::view(self)
    }

    /// Convert every element to `T` with `as` semantics
    pub fn cast<T: Sample>(&self) -> Array<T, D> {
        T::cast_from(self)
    }

    /// Convert to another runtime element type with `as` semantics
    pub fn cast_to(&self, element_type: ElementType) -> Self {
        if element_type == self.element_type() {
            return self.clone();
        }
        match element_type {
            ElementType::Int8 => i8::wrap(self.cast()),
            ElementType::UInt8 => u8::wrap(self.cast()),
            ElementType::Int16 => i16::wrap(self.cast()),
            ElementType::UInt16 => u16::wrap(self.cast()),
            ElementType::Int32 => i32::wrap(self.cast()),
            ElementType::Float32 => f32::wrap(self.cast()),
        }
    }

    pub fn to_f64(&self) -> Array<f64, D> {
        map_numeric!(self, a => a.mapv(|v| v as f64))
    }

    /// `abs(x) / max(abs(x))`, or all zeros when the array is zero everywhere
    pub fn normalized_magnitude(&self) -> Array<f64, D> {
        let magnitude = self.to_f64().mapv(f64::abs);
        let max = magnitude.iter().cloned().fold(0.0_f64, f64::max);
        if max > 0.0 {
            magnitude / max
        } else {
            magnitude
        }
    }
}

/// Primitive element types a member can decode into
pub trait Sample: Copy + Default + num_traits::Zero + fmt::Debug + 'static {
    const ELEMENT_TYPE: ElementType;

    /// Fill `dst` from little-endian bytes; `src.len()` must equal `dst.len() * size`
    fn decode_le(src: &[u8], dst: &mut [Self]);

    fn wrap<D: Dimension>(array: Array<Self, D>) -> NumericArray<D>;

    fn view<D: Dimension>(array: &NumericArray<D>) -> Option<&Array<Self, D>>;

    fn cast_from<D: Dimension>(array: &NumericArray<D>) -> Array<Self, D>;
}

macro_rules! impl_sample {
    ($t:ty, $variant:ident, $element_type:expr, $decode:expr) => {
        impl Sample for $t {
            const ELEMENT_TYPE: ElementType = $element_type;

            fn decode_le(src: &[u8], dst: &mut [Self]) {
                ($decode)(src, dst)
            }

            fn wrap<D: Dimension>(array: Array<Self, D>) -> NumericArray<D> {
                NumericArray::$variant(array)
            }

            fn view<D: Dimension>(array: &NumericArray<D>) -> Option<&Array<Self, D>> {
                match array {
                    NumericArray::$variant(a) => Some(a),
                    _ => None,
                }
            }

            fn cast_from<D: Dimension>(array: &NumericArray<D>) -> Array<Self, D> {
                map_numeric!(array, a => a.mapv(|v| v as $t))
            }
        }
    };
}

impl_sample!(i8, I8, ElementType::Int8, |src: &[u8], dst: &mut [i8]| {
    for (d, s) in dst.iter_mut().zip(src) {
        *d = *s as i8;
    }
});
impl_sample!(u8, U8, ElementType::UInt8, |src: &[u8], dst: &mut [u8]| {
    dst.copy_from_slice(src)
});
impl_sample!(i16, I16, ElementType::Int16, |src: &[u8], dst: &mut [i16]| {
    LittleEndian::read_i16_into(src, dst)
});
impl_sample!(u16, U16, ElementType::UInt16, |src: &[u8], dst: &mut [u16]| {
    LittleEndian::read_u16_into(src, dst)
});
impl_sample!(i32, I32, ElementType::Int32, |src: &[u8], dst: &mut [i32]| {
    LittleEndian::read_i32_into(src, dst)
});
impl_sample!(f32, F32, ElementType::Float32, |src: &[u8], dst: &mut [f32]| {
    LittleEndian::read_f32_into(src, dst)
});

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_element_type_sizes() {
        assert_eq!(ElementType::Int8.size_in_bytes(), 1);
        assert_eq!(ElementType::UInt16.size_in_bytes(), 2);
        assert_eq!(ElementType::Int32.size_in_bytes(), 4);
        assert_eq!(ElementType::Float32.size_in_bytes(), 4);
        assert!(ElementType::Float32.is_float());
        assert!(!ElementType::UInt16.is_signed());
    }

    #[test]
    fn test_element_kind_parse_is_case_sensitive() {
        assert_eq!(ElementKind::parse("Raw"), ElementKind::Raw);
        assert_eq!(ElementKind::parse("raw"), ElementKind::Unknown("raw".to_string()));
    }

    #[test]
    fn test_decode_le_u16() {
        let mut out = [0u16; 2];
        u16::decode_le(&[0x01, 0x00, 0xff, 0xff], &mut out);
        assert_eq!(out, [1, 65535]);
    }

    #[test]
    fn test_cast_wraps_like_as() {
        let a = DecodedArray::U16(array![[65535u16, 1]]);
        let cast = a.cast_to(ElementType::Int16);
        assert_eq!(cast, DecodedArray::I16(array![[-1i16, 1]]));
    }

    #[test]
    fn test_normalized_magnitude() {
        let a = DecodedArray::I32(array![[-4, 2], [0, 1]]);
        let n = a.normalized_magnitude();
        assert_eq!(n, array![[1.0, 0.5], [0.0, 0.25]]);

        let zeros = DecodedArray::zeros(ElementType::Float32, (2, 2));
        assert_eq!(zeros.normalized_magnitude(), ndarray::Array2::<f64>::zeros((2, 2)));
    }
}
