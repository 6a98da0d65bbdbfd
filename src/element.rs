//! Element types and their external (big-endian) representation.

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use num_traits::Zero;
use std::fmt;
use std::io;
use std::mem;

/// The external type of a variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NcType {
    Byte,
    Short,
    Int,
    Float,
    Double,
    UByte,
    UShort,
    UInt,
    Int64,
    UInt64,
}

impl NcType {
    /// Size in bytes of one element.
    pub fn size(self) -> usize {
        use NcType::*;
        match self {
            Byte | UByte => 1,
            Short | UShort => 2,
            Int | UInt | Float => 4,
            Int64 | UInt64 | Double => 8,
        }
    }

    /// Returns `true` iff the type exists in the classic (CDF-1 and CDF-2)
    /// formats. The remaining types need CDF-5.
    pub fn is_classic(self) -> bool {
        use NcType::*;
        matches!(self, Byte | Short | Int | Float | Double)
    }

    pub fn name(self) -> &'static str {
        use NcType::*;
        match self {
            Byte => "NC_BYTE",
            Short => "NC_SHORT",
            Int => "NC_INT",
            Float => "NC_FLOAT",
            Double => "NC_DOUBLE",
            UByte => "NC_UBYTE",
            UShort => "NC_USHORT",
            UInt => "NC_UINT",
            Int64 => "NC_INT64",
            UInt64 => "NC_UINT64",
        }
    }
}

impl fmt::Display for NcType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An array element type that can be stored in a variable.
///
/// Values cross the [`Store`](crate::Store) boundary in their external
/// representation: big-endian, packed, with no padding.
pub trait Element: Copy + Zero + fmt::Debug + Send + 'static {
    /// The external type this element is stored as.
    const NC_TYPE: NcType;

    /// Writes `slice` to `writer` in external representation.
    fn write_external<W: io::Write>(slice: &[Self], writer: W) -> io::Result<()>;

    /// Fills `out` from `reader`, which must hold at least `out.len()`
    /// elements in external representation.
    fn read_external<R: io::Read>(reader: R, out: &mut [Self]) -> io::Result<()>;

    /// Encodes `slice` into a new byte vector.
    fn to_external(slice: &[Self]) -> Vec<u8> {
        let mut out = Vec::with_capacity(slice.len() * mem::size_of::<Self>());
        // Writing to a `Vec` never fails.
        let _ = Self::write_external(slice, &mut out);
        out
    }

    /// Decodes `bytes`, which must contain a whole number of elements and
    /// nothing else.
    fn from_external(bytes: &[u8]) -> io::Result<Vec<Self>> {
        let size = Self::NC_TYPE.size();
        if bytes.len() % size != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{} bytes is not a whole number of {} elements",
                    bytes.len(),
                    Self::NC_TYPE
                ),
            ));
        }
        let mut out = vec![Self::zero(); bytes.len() / size];
        Self::read_external(bytes, &mut out)?;
        Ok(out)
    }
}

macro_rules! impl_element_one_byte {
    ($elem:ty, $nc_type:ident, $read_into:ident) => {
        impl Element for $elem {
            const NC_TYPE: NcType = NcType::$nc_type;

            fn write_external<W: io::Write>(slice: &[Self], mut writer: W) -> io::Result<()> {
                let bytes: Vec<u8> = slice.iter().map(|&v| v as u8).collect();
                writer.write_all(&bytes)
            }

            fn read_external<R: io::Read>(mut reader: R, out: &mut [Self]) -> io::Result<()> {
                reader.$read_into(out)
            }
        }
    };
}

impl_element_one_byte!(i8, Byte, read_i8_into);
impl_element_one_byte!(u8, UByte, read_exact);

macro_rules! impl_element_multi_byte {
    ($elem:ty, $nc_type:ident, $write_into:ident, $read_into:ident) => {
        impl Element for $elem {
            const NC_TYPE: NcType = NcType::$nc_type;

            fn write_external<W: io::Write>(slice: &[Self], mut writer: W) -> io::Result<()> {
                let mut bytes = vec![0; slice.len() * mem::size_of::<$elem>()];
                BigEndian::$write_into(slice, &mut bytes);
                writer.write_all(&bytes)
            }

            fn read_external<R: io::Read>(mut reader: R, out: &mut [Self]) -> io::Result<()> {
                reader.$read_into::<BigEndian>(out)
            }
        }
    };
}

impl_element_multi_byte!(i16, Short, write_i16_into, read_i16_into);
impl_element_multi_byte!(i32, Int, write_i32_into, read_i32_into);
impl_element_multi_byte!(i64, Int64, write_i64_into, read_i64_into);

impl_element_multi_byte!(u16, UShort, write_u16_into, read_u16_into);
impl_element_multi_byte!(u32, UInt, write_u32_into, read_u32_into);
impl_element_multi_byte!(u64, UInt64, write_u64_into, read_u64_into);

impl_element_multi_byte!(f32, Float, write_f32_into, read_f32_into);
impl_element_multi_byte!(f64, Double, write_f64_into, read_f64_into);
