//! Little-endian, bounds-checked primitive reads.
//!
//! Every immediate, displacement and relative offset in an x86 instruction stream is stored
//! in little-endian byte order. The [`ByteIO`] trait abstracts over the primitive integer
//! types the decoder needs, and [`read_le_at`] performs a checked read that advances a
//! caller-owned offset only when the full value is available.
//!
//! # Examples
//!
//! ```rust,ignore
//! use x86scope::stream::io::read_le_at;
//!
//! let data = [0x05, 0x00, 0x00, 0x00, 0xFF];
//! let mut offset = 0;
//!
//! let imm: u32 = read_le_at(&data, &mut offset)?;
//! assert_eq!(imm, 5);
//! assert_eq!(offset, 4);
//!
//! // Only one byte left - a u16 read fails and the offset is untouched
//! assert!(read_le_at::<u16>(&data, &mut offset).is_err());
//! assert_eq!(offset, 4);
//! # Ok::<(), x86scope::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Trait for primitive types that can be decoded from a little-endian byte array.
///
/// Each implementation defines a `Bytes` associated type that represents the fixed-size
/// byte array required for that particular type (e.g., `[u8; 4]` for `u32`).
pub trait ByteIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_byte_io {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ByteIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

impl_byte_io!(u8, i8, u16, i16, u32, i32, u64, i64);

/// Safely reads a value of type `T` in little-endian byte order at a specific offset.
///
/// The offset is advanced by the size of `T` on success and left untouched on failure.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le_at<T: ByteIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}
