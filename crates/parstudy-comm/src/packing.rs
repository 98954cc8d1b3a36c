//! Wire codec: little-endian primitives and counted ranges.
//!
//! A packed range is a `u32` object count followed by each object's
//! own packing, back to back:
//!
//! ```text
//! [count: u32 LE][object 0][object 1]...[object count-1]
//! ```

use std::error::Error;
use std::fmt;

/// Errors decoding a byte stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodecError {
    /// The input ended before a value was complete.
    Truncated {
        /// Bytes the next value required.
        needed: usize,
        /// Bytes left in the input.
        remaining: usize,
    },
    /// Bytes were left over after the last object of a range.
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },
    /// The bytes decoded to a value the type does not accept.
    Invalid {
        /// What was wrong.
        detail: String,
    },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { needed, remaining } => {
                write!(f, "truncated input: needed {needed} bytes, {remaining} remaining")
            }
            Self::TrailingBytes { count } => write!(f, "{count} trailing bytes after range"),
            Self::Invalid { detail } => write!(f, "invalid encoding: {detail}"),
        }
    }
}

impl Error for CodecError {}

/// A value with a self-delimiting byte encoding.
pub trait Packing: Sized {
    /// Exact number of bytes [`pack`](Packing::pack) appends.
    fn packed_size(&self) -> usize;

    /// Append the encoding of `self` to `out`.
    fn pack(&self, out: &mut Vec<u8>);

    /// Decode one value from the front of `input`, advancing it.
    fn unpack(input: &mut &[u8]) -> Result<Self, CodecError>;
}

fn take<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], CodecError> {
    if input.len() < n {
        return Err(CodecError::Truncated {
            needed: n,
            remaining: input.len(),
        });
    }
    let (head, tail) = input.split_at(n);
    *input = tail;
    Ok(head)
}

fn take_array<const N: usize>(input: &mut &[u8]) -> Result<[u8; N], CodecError> {
    let mut word = [0u8; N];
    word.copy_from_slice(take(input, N)?);
    Ok(word)
}

/// Append `v` as 4 little-endian bytes.
pub fn write_u32_le(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Append `v` as 8 little-endian bytes.
pub fn write_u64_le(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Append `v` as 8 little-endian bytes.
pub fn write_f64_le(out: &mut Vec<u8>, v: f64) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Read a little-endian `u32`.
pub fn read_u32_le(input: &mut &[u8]) -> Result<u32, CodecError> {
    take_array(input).map(u32::from_le_bytes)
}

/// Read a little-endian `u64`.
pub fn read_u64_le(input: &mut &[u8]) -> Result<u64, CodecError> {
    take_array(input).map(u64::from_le_bytes)
}

/// Read a little-endian `f64`.
pub fn read_f64_le(input: &mut &[u8]) -> Result<f64, CodecError> {
    take_array(input).map(f64::from_le_bytes)
}

impl Packing for u32 {
    fn packed_size(&self) -> usize {
        4
    }

    fn pack(&self, out: &mut Vec<u8>) {
        write_u32_le(out, *self);
    }

    fn unpack(input: &mut &[u8]) -> Result<Self, CodecError> {
        read_u32_le(input)
    }
}

impl Packing for u64 {
    fn packed_size(&self) -> usize {
        8
    }

    fn pack(&self, out: &mut Vec<u8>) {
        write_u64_le(out, *self);
    }

    fn unpack(input: &mut &[u8]) -> Result<Self, CodecError> {
        read_u64_le(input)
    }
}

impl Packing for f64 {
    fn packed_size(&self) -> usize {
        8
    }

    fn pack(&self, out: &mut Vec<u8>) {
        write_f64_le(out, *self);
    }

    fn unpack(input: &mut &[u8]) -> Result<Self, CodecError> {
        read_f64_le(input)
    }
}

/// Append a counted range, packing each item with `pack_one`.
///
/// # Panics
///
/// Panics if `items` holds more than `u32::MAX` objects.
pub fn pack_range<T>(items: &[T], out: &mut Vec<u8>, mut pack_one: impl FnMut(&T, &mut Vec<u8>)) {
    let count = u32::try_from(items.len()).expect("range length exceeds u32");
    write_u32_le(out, count);
    for item in items {
        pack_one(item, out);
    }
}

/// Decode a counted range that must span all of `bytes`, pushing each
/// object onto `out`. Returns the number of objects decoded.
pub fn unpack_range_into<T>(
    mut bytes: &[u8],
    out: &mut Vec<T>,
    mut unpack_one: impl FnMut(&mut &[u8]) -> Result<T, CodecError>,
) -> Result<usize, CodecError> {
    let input = &mut bytes;
    let count = read_u32_le(input)? as usize;
    // Each object is at least one byte; never reserve past the input.
    out.reserve(count.min(input.len()));
    for _ in 0..count {
        out.push(unpack_one(input)?);
    }
    if !input.is_empty() {
        return Err(CodecError::TrailingBytes { count: input.len() });
    }
    Ok(count)
}

/// Decode a counted range that must span all of `bytes`.
pub fn unpack_range<T>(
    bytes: &[u8],
    unpack_one: impl FnMut(&mut &[u8]) -> Result<T, CodecError>,
) -> Result<Vec<T>, CodecError> {
    let mut out = Vec::new();
    unpack_range_into(bytes, &mut out, unpack_one)?;
    Ok(out)
}

/// Pack a slice of [`Packing`] values as a counted range.
pub fn pack_all<T: Packing>(items: &[T]) -> Vec<u8> {
    let size = 4 + items.iter().map(Packing::packed_size).sum::<usize>();
    let mut out = Vec::with_capacity(size);
    pack_range(items, &mut out, T::pack);
    out
}

/// Decode a counted range of [`Packing`] values.
pub fn unpack_all<T: Packing>(bytes: &[u8]) -> Result<Vec<T>, CodecError> {
    unpack_range(bytes, T::unpack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn range_layout() {
        let bytes = pack_all(&[1u32, 2]);
        assert_eq!(bytes, vec![2, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0]);
    }

    #[test]
    fn empty_range_is_just_a_count() {
        let bytes = pack_all::<u64>(&[]);
        assert_eq!(bytes, vec![0; 4]);
        assert_eq!(unpack_all::<u64>(&bytes).unwrap(), Vec::<u64>::new());
    }

    #[test]
    fn truncated_range_reports_shortfall() {
        let mut bytes = pack_all(&[7u64, 8]);
        bytes.truncate(bytes.len() - 3);
        assert_eq!(
            unpack_all::<u64>(&bytes),
            Err(CodecError::Truncated {
                needed: 8,
                remaining: 5
            })
        );
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = pack_all(&[7u32]);
        bytes.push(0);
        assert_eq!(
            unpack_all::<u32>(&bytes),
            Err(CodecError::TrailingBytes { count: 1 })
        );
    }

    #[test]
    fn huge_count_does_not_over_reserve() {
        let bytes = u32::MAX.to_le_bytes();
        let err = unpack_all::<u64>(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));
    }

    #[test]
    fn display_names_the_problem() {
        let e = CodecError::Invalid {
            detail: "bad flag".into(),
        };
        assert_eq!(e.to_string(), "invalid encoding: bad flag");
    }

    proptest! {
        #[test]
        fn f64_values_survive_bit_exact(values in proptest::collection::vec(any::<f64>(), 0..32)) {
            let decoded = unpack_all::<f64>(&pack_all(&values)).unwrap();
            prop_assert_eq!(decoded.len(), values.len());
            for (a, b) in decoded.iter().zip(&values) {
                prop_assert_eq!(a.to_bits(), b.to_bits());
            }
        }
    }
}
