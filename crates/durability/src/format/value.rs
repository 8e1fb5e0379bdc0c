//! Keyword values and column element types.
//!
//! Numeric column cells are little-endian; strings are fixed-width,
//! NUL-padded UTF-8.

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

/// Value of a record keyword
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    /// UTF-8 string
    Str(String),
    /// Signed integer
    Int(i64),
    /// Double-precision float
    Float(f64),
    /// Boolean
    Logical(bool),
}

impl KeyValue {
    pub(crate) const TAG_STR: u8 = 1;
    pub(crate) const TAG_INT: u8 = 2;
    pub(crate) const TAG_FLOAT: u8 = 3;
    pub(crate) const TAG_LOGICAL: u8 = 4;

    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            KeyValue::Str(_) => "string",
            KeyValue::Int(_) => "integer",
            KeyValue::Float(_) => "float",
            KeyValue::Logical(_) => "logical",
        }
    }

    pub(crate) fn tag(&self) -> u8 {
        match self {
            KeyValue::Str(_) => Self::TAG_STR,
            KeyValue::Int(_) => Self::TAG_INT,
            KeyValue::Float(_) => Self::TAG_FLOAT,
            KeyValue::Logical(_) => Self::TAG_LOGICAL,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Str(s) => write!(f, "'{}'", s),
            KeyValue::Int(i) => write!(f, "{}", i),
            KeyValue::Float(x) => write!(f, "{}", x),
            KeyValue::Logical(b) => write!(f, "{}", if *b { "T" } else { "F" }),
        }
    }
}

impl From<&str> for KeyValue {
    fn from(s: &str) -> Self {
        KeyValue::Str(s.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(s: String) -> Self {
        KeyValue::Str(s)
    }
}

impl From<i64> for KeyValue {
    fn from(i: i64) -> Self {
        KeyValue::Int(i)
    }
}

impl From<f64> for KeyValue {
    fn from(x: f64) -> Self {
        KeyValue::Float(x)
    }
}

impl From<bool> for KeyValue {
    fn from(b: bool) -> Self {
        KeyValue::Logical(b)
    }
}

/// Element type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 32-bit unsigned integer
    U32,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// Fixed-width string; `repeat` is the byte capacity
    Str,
}

impl ColumnType {
    /// Bytes per element
    pub fn width(self) -> usize {
        match self {
            ColumnType::I16 => 2,
            ColumnType::I32 | ColumnType::U32 | ColumnType::F32 => 4,
            ColumnType::I64 | ColumnType::F64 => 8,
            ColumnType::Str => 1,
        }
    }

    /// On-disk type code
    pub fn code(self) -> u8 {
        match self {
            ColumnType::I16 => 1,
            ColumnType::I32 => 2,
            ColumnType::I64 => 3,
            ColumnType::U32 => 4,
            ColumnType::F32 => 5,
            ColumnType::F64 => 6,
            ColumnType::Str => 7,
        }
    }

    /// Inverse of [`ColumnType::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => ColumnType::I16,
            2 => ColumnType::I32,
            3 => ColumnType::I64,
            4 => ColumnType::U32,
            5 => ColumnType::F32,
            6 => ColumnType::F64,
            7 => ColumnType::Str,
            _ => return None,
        })
    }

    /// Name used in templates and error messages
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::I16 => "i16",
            ColumnType::I32 => "i32",
            ColumnType::I64 => "i64",
            ColumnType::U32 => "u32",
            ColumnType::F32 => "f32",
            ColumnType::F64 => "f64",
            ColumnType::Str => "str",
        }
    }

    /// Inverse of [`ColumnType::name`]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "i16" => ColumnType::I16,
            "i32" => ColumnType::I32,
            "i64" => ColumnType::I64,
            "u32" => ColumnType::U32,
            "f32" => ColumnType::F32,
            "f64" => ColumnType::F64,
            "str" => ColumnType::Str,
            _ => return None,
        })
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A numeric type that can be stored in a column cell
pub trait Element: Copy + Default + sealed::Sealed {
    /// Column type this element is stored as
    const TYPE: ColumnType;

    /// Decode one element from exactly `TYPE.width()` bytes
    fn read(bytes: &[u8]) -> Self;

    /// Encode one element into exactly `TYPE.width()` bytes
    fn write(self, out: &mut [u8]);
}

macro_rules! impl_element {
    ($ty:ty, $col:ident, $read:ident, $write:ident) => {
        impl sealed::Sealed for $ty {}

        impl Element for $ty {
            const TYPE: ColumnType = ColumnType::$col;

            fn read(bytes: &[u8]) -> Self {
                LittleEndian::$read(bytes)
            }

            fn write(self, out: &mut [u8]) {
                LittleEndian::$write(out, self)
            }
        }
    };
}

impl_element!(i16, I16, read_i16, write_i16);
impl_element!(i32, I32, read_i32, write_i32);
impl_element!(i64, I64, read_i64, write_i64);
impl_element!(u32, U32, read_u32, write_u32);
impl_element!(f32, F32, read_f32, write_f32);
impl_element!(f64, F64, read_f64, write_f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_code_round_trip() {
        for ty in [
            ColumnType::I16,
            ColumnType::I32,
            ColumnType::I64,
            ColumnType::U32,
            ColumnType::F32,
            ColumnType::F64,
            ColumnType::Str,
        ] {
            assert_eq!(ColumnType::from_code(ty.code()), Some(ty));
            assert_eq!(ColumnType::parse(ty.name()), Some(ty));
        }
        assert_eq!(ColumnType::from_code(0), None);
        assert_eq!(ColumnType::parse("complex"), None);
    }

    #[test]
    fn test_element_little_endian() {
        let mut buf = [0u8; 2];
        0x0102i16.write(&mut buf);
        assert_eq!(buf, [0x02, 0x01]);
        assert_eq!(i16::read(&buf), 0x0102);

        let mut buf = [0u8; 8];
        (-1.5f64).write(&mut buf);
        assert_eq!(f64::read(&buf), -1.5);
    }

    #[test]
    fn test_key_value_display() {
        assert_eq!(KeyValue::from("PSR").to_string(), "'PSR'");
        assert_eq!(KeyValue::from(true).to_string(), "T");
        assert_eq!(KeyValue::from(3i64).to_string(), "3");
    }
}
