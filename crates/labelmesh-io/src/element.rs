//! Voxel element types shared by the volume formats.

use std::io::{self, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use labelmesh_core::Voxel;

/// Scalar type of the voxels stored in a volume file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ScalarKind {
    /// Size of one element in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    /// Whether values of this kind are always whole numbers.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        !matches!(self, Self::F32 | Self::F64)
    }

    /// MetaImage `ElementType` name.
    #[must_use]
    pub const fn met_name(self) -> &'static str {
        match self {
            Self::U8 => "MET_UCHAR",
            Self::I8 => "MET_CHAR",
            Self::U16 => "MET_USHORT",
            Self::I16 => "MET_SHORT",
            Self::U32 => "MET_UINT",
            Self::I32 => "MET_INT",
            Self::U64 => "MET_ULONG_LONG",
            Self::I64 => "MET_LONG_LONG",
            Self::F32 => "MET_FLOAT",
            Self::F64 => "MET_DOUBLE",
        }
    }

    /// Parses a MetaImage `ElementType` name.
    #[must_use]
    pub fn from_met_name(name: &str) -> Option<Self> {
        Some(match name {
            "MET_UCHAR" => Self::U8,
            "MET_CHAR" => Self::I8,
            "MET_USHORT" => Self::U16,
            "MET_SHORT" => Self::I16,
            "MET_UINT" | "MET_ULONG" => Self::U32,
            "MET_INT" | "MET_LONG" => Self::I32,
            "MET_ULONG_LONG" => Self::U64,
            "MET_LONG_LONG" => Self::I64,
            "MET_FLOAT" => Self::F32,
            "MET_DOUBLE" => Self::F64,
            _ => return None,
        })
    }

    /// NIfTI-1 `datatype` code.
    #[must_use]
    pub const fn nifti_code(self) -> i16 {
        match self {
            Self::U8 => 2,
            Self::I16 => 4,
            Self::I32 => 8,
            Self::F32 => 16,
            Self::F64 => 64,
            Self::I8 => 256,
            Self::U16 => 512,
            Self::U32 => 768,
            Self::I64 => 1024,
            Self::U64 => 1280,
        }
    }

    /// Parses a NIfTI-1 `datatype` code.
    #[must_use]
    pub fn from_nifti_code(code: i16) -> Option<Self> {
        Some(match code {
            2 => Self::U8,
            4 => Self::I16,
            8 => Self::I32,
            16 => Self::F32,
            64 => Self::F64,
            256 => Self::I8,
            512 => Self::U16,
            768 => Self::U32,
            1024 => Self::I64,
            1280 => Self::U64,
            _ => return None,
        })
    }

    /// Decodes `count` elements from `bytes` in byte order `E`.
    ///
    /// Returns `None` if `bytes` is too short.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
    #[must_use]
    pub fn decode<E: ByteOrder>(self, bytes: &[u8], count: usize) -> Option<Vec<f64>> {
        let size = self.size();
        let bytes = bytes.get(..count.checked_mul(size)?)?;
        let chunks = bytes.chunks_exact(size);
        let values = match self {
            Self::U8 => chunks.map(|c| f64::from(c[0])).collect(),
            Self::I8 => chunks.map(|c| f64::from(c[0] as i8)).collect(),
            Self::U16 => chunks.map(|c| f64::from(E::read_u16(c))).collect(),
            Self::I16 => chunks.map(|c| f64::from(E::read_i16(c))).collect(),
            Self::U32 => chunks.map(|c| f64::from(E::read_u32(c))).collect(),
            Self::I32 => chunks.map(|c| f64::from(E::read_i32(c))).collect(),
            Self::U64 => chunks.map(|c| E::read_u64(c) as f64).collect(),
            Self::I64 => chunks.map(|c| E::read_i64(c) as f64).collect(),
            Self::F32 => chunks.map(|c| f64::from(E::read_f32(c))).collect(),
            Self::F64 => chunks.map(E::read_f64).collect(),
        };
        Some(values)
    }
}

/// A [`Voxel`] type that can be written to volume files.
pub trait Element: Voxel {
    /// On-disk scalar kind.
    const KIND: ScalarKind;

    /// Appends the little-endian encoding of `self`.
    fn write_le<W: Write>(self, out: &mut W) -> io::Result<()>;
}

macro_rules! impl_element {
    ($t:ty, $kind:ident, $write:ident) => {
        impl Element for $t {
            const KIND: ScalarKind = ScalarKind::$kind;

            #[inline]
            fn write_le<W: Write>(self, out: &mut W) -> io::Result<()> {
                out.$write::<LittleEndian>(self)
            }
        }
    };
}

impl Element for u8 {
    const KIND: ScalarKind = ScalarKind::U8;

    #[inline]
    fn write_le<W: Write>(self, out: &mut W) -> io::Result<()> {
        out.write_u8(self)
    }
}

impl Element for i8 {
    const KIND: ScalarKind = ScalarKind::I8;

    #[inline]
    fn write_le<W: Write>(self, out: &mut W) -> io::Result<()> {
        out.write_i8(self)
    }
}

impl_element!(u16, U16, write_u16);
impl_element!(i16, I16, write_i16);
impl_element!(u32, U32, write_u32);
impl_element!(i32, I32, write_i32);
impl_element!(u64, U64, write_u64);
impl_element!(i64, I64, write_i64);
impl_element!(f32, F32, write_f32);
impl_element!(f64, F64, write_f64);

/// Encodes a voxel buffer as little-endian bytes.
pub(crate) fn encode_le<T: Element>(data: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * T::KIND.size());
    for &v in data {
        // Writing into a Vec cannot fail.
        let _ = v.write_le(&mut out);
    }
    out
}
