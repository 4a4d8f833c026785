//! Binary encoding and decoding traits for deterministic serialization.
//!
//! All encoded data uses little-endian byte order for cross-platform
//! consistency; the format carries no self-description, so every honest
//! node producing the same value produces the same bytes. That property is
//! what allows encoded values to be hashed directly.
//!
//! # Binary Format
//!
//! - Integers: little-endian, fixed-width
//! - `usize`: encoded as `u64` for portability
//! - `f64`: raw IEEE-754 bits, little-endian (bit-exact round trips)
//! - `bool`: single byte (0 = false, 1 = true)
//! - `Vec<T>`/`String`: 8-byte length prefix followed by elements
//! - `Option<T>`: 1-byte tag (0 = None, 1 = Some) followed by the value
//! - `BTreeMap<String, T>`: length prefix, then sorted `(key, value)` pairs
//! - Arrays `[T; N]`: elements serialized sequentially without a prefix

use std::collections::BTreeMap;

/// Sink for writing encoded bytes.
///
/// Implemented by byte buffers and hashers so encodable types can be
/// written straight into the target without intermediate allocations.
pub trait EncodeSink {
    /// Writes the given bytes to the sink.
    fn write(&mut self, bytes: &[u8]);
}

/// Counter for computing encoded size without allocating memory.
///
/// Used by `Encode::to_bytes` to pre-allocate exact capacity before encoding.
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    pub fn new() -> Self {
        Self { len: 0 }
    }

    /// Returns the total number of bytes counted.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for SizeCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeSink for SizeCounter {
    fn write(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }
}

impl EncodeSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Trait for types that can be serialized to the deterministic binary format.
pub trait Encode {
    /// Writes the binary representation to the given sink.
    fn encode<S: EncodeSink>(&self, out: &mut S);

    /// Serializes to a new byte vector with exact capacity.
    ///
    /// Performs two passes: first to count bytes, then to encode.
    fn to_bytes(&self) -> Vec<u8> {
        let mut counter = SizeCounter::new();
        self.encode(&mut counter);

        let mut out = Vec::with_capacity(counter.len());
        self.encode(&mut out);
        out
    }
}

/// Errors that can occur during decoding.
#[derive(Debug, PartialEq, Eq, appchain_derive::Error)]
pub enum DecodeError {
    /// Input ended before expected data was read.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// Data does not represent a valid value for the target type.
    #[error("invalid value for target type")]
    InvalidValue,
    /// Length prefix exceeds maximum allowed size.
    #[error("length prefix exceeds maximum allowed size")]
    LengthOverflow,
}

/// Trait for types that can be deserialized from the binary format.
pub trait Decode: Sized {
    /// Reads and decodes a value, advancing the input past consumed bytes.
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError>;

    /// Decodes a value from a byte slice, requiring all bytes to be consumed.
    fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let mut input = data;
        let value = Self::decode(&mut input)?;

        if !input.is_empty() {
            return Err(DecodeError::InvalidValue);
        }

        Ok(value)
    }
}

/// Reads exactly `n` bytes from the input, advancing the slice.
fn read_bytes<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    if input.len() < n {
        return Err(DecodeError::UnexpectedEof);
    }
    let (bytes, rest) = input.split_at(n);
    *input = rest;
    Ok(bytes)
}

impl Encode for u8 {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self]);
    }
}

impl Decode for u8 {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(read_bytes(input, 1)?[0])
    }
}

macro_rules! impl_int {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode<S: EncodeSink>(&self, out: &mut S) {
                    out.write(&self.to_le_bytes());
                }
            }

            impl Decode for $t {
                fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
                    let bytes = read_bytes(input, std::mem::size_of::<$t>())?;
                    Ok(<$t>::from_le_bytes(bytes.try_into().unwrap()))
                }
            }
        )*
    };
}

impl_int!(u16, u32, u64, u128, i16, i32, i64, i128);

// Floats travel as raw IEEE-754 bits so round trips are bit-exact,
// including NaN payloads and signed zeros.
impl Encode for f64 {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.to_bits().to_le_bytes());
    }
}

impl Decode for f64 {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = read_bytes(input, 8)?;
        Ok(f64::from_bits(u64::from_le_bytes(bytes.try_into().unwrap())))
    }
}

// usize as u64
impl Encode for usize {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        (*self as u64).encode(out);
    }
}

impl Decode for usize {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let v = u64::decode(input)?;
        usize::try_from(v).map_err(|_| DecodeError::LengthOverflow)
    }
}

impl Encode for bool {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self as u8]);
    }
}

impl Decode for bool {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

/// Maximum allowed element count for decoded containers, bounding memory
/// allocation from untrusted input.
const MAX_CONTAINER_LEN: usize = 1_000_000;

impl<T: Encode> Encode for Vec<T> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = usize::decode(input)?;
        if len > MAX_CONTAINER_LEN {
            return Err(DecodeError::LengthOverflow);
        }

        let mut vec = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            vec.push(T::decode(input)?);
        }
        Ok(vec)
    }
}

impl Encode for String {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        out.write(self.as_bytes());
    }
}

impl Decode for String {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = Vec::<u8>::decode(input)?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidValue)
    }
}

impl Encode for &str {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        let bytes = self.as_bytes();
        bytes.len().encode(out);
        out.write(bytes);
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        match self {
            None => 0u8.encode(out),
            Some(v) => {
                1u8.encode(out);
                v.encode(out);
            }
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(input)?)),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

// BTreeMap keeps keys sorted, so encoding iteration order is canonical.
impl<V: Encode> Encode for BTreeMap<String, V> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        for (key, value) in self {
            key.encode(out);
            value.encode(out);
        }
    }
}

impl<V: Decode> Decode for BTreeMap<String, V> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = usize::decode(input)?;
        if len > MAX_CONTAINER_LEN {
            return Err(DecodeError::LengthOverflow);
        }

        let mut map = BTreeMap::new();
        let mut previous: Option<String> = None;
        for _ in 0..len {
            let key = String::decode(input)?;
            // Reject unsorted or duplicate keys: the encoding is canonical.
            if previous.as_ref().is_some_and(|p| *p >= key) {
                return Err(DecodeError::InvalidValue);
            }
            let value = V::decode(input)?;
            previous = Some(key.clone());
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let mut vec = Vec::with_capacity(N);
        for _ in 0..N {
            vec.push(T::decode(input)?);
        }
        vec.try_into().map_err(|_| DecodeError::InvalidValue)
    }
}

impl<A: Encode, B: Encode> Encode for (A, B) {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.0.encode(out);
        self.1.encode(out);
    }
}

impl<A: Decode, B: Decode> Decode for (A, B) {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok((A::decode(input)?, B::decode(input)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_counter_accumulates() {
        let mut counter = SizeCounter::new();
        counter.write(&[1, 2, 3]);
        counter.write(&[4, 5]);
        assert_eq!(counter.len(), 5);
    }

    #[test]
    fn to_bytes_preallocates_exact_capacity() {
        let data: Vec<u8> = vec![1, 2, 3, 4, 5];
        let bytes = data.to_bytes();
        assert_eq!(bytes.len(), 8 + 5);
        assert_eq!(bytes.capacity(), bytes.len());
    }

    #[test]
    fn u32_little_endian() {
        let val: u32 = 0x12345678;
        let bytes = val.to_bytes();
        assert_eq!(bytes, vec![0x78, 0x56, 0x34, 0x12]);
        assert_eq!(u32::from_bytes(&bytes).unwrap(), val);
    }

    #[test]
    fn u128_roundtrip() {
        for val in [0u128, 1, u128::MAX / 2, u128::MAX] {
            let bytes = val.to_bytes();
            assert_eq!(bytes.len(), 16);
            assert_eq!(u128::from_bytes(&bytes).unwrap(), val);
        }
    }

    #[test]
    fn f64_bit_exact_roundtrip() {
        for val in [0.0f64, -0.0, 1.5, f64::MIN_POSITIVE, f64::NAN, f64::INFINITY] {
            let bytes = val.to_bytes();
            let decoded = f64::from_bytes(&bytes).unwrap();
            assert_eq!(val.to_bits(), decoded.to_bits());
        }
    }

    #[test]
    fn bool_invalid_value() {
        for invalid in [2u8, 128, 255] {
            assert_eq!(bool::from_bytes(&[invalid]), Err(DecodeError::InvalidValue));
        }
    }

    #[test]
    fn vec_roundtrip() {
        let original: Vec<u32> = vec![1, 2, 3, 4, 5];
        let bytes = original.to_bytes();
        assert_eq!(Vec::<u32>::from_bytes(&bytes).unwrap(), original);
    }

    #[test]
    fn vec_length_overflow() {
        let huge_len: u64 = (MAX_CONTAINER_LEN as u64) + 1;
        let bytes = huge_len.to_bytes();
        assert_eq!(
            Vec::<u8>::from_bytes(&bytes),
            Err(DecodeError::LengthOverflow)
        );
    }

    #[test]
    fn string_roundtrip() {
        let original = "Hello, \u{4e16}\u{754c}!".to_string();
        let bytes = original.to_bytes();
        assert_eq!(String::from_bytes(&bytes).unwrap(), original);
    }

    #[test]
    fn string_invalid_utf8() {
        let mut bytes = Vec::new();
        3u64.encode(&mut bytes);
        bytes.extend_from_slice(&[0xFF, 0xFE, 0x00]);
        assert_eq!(String::from_bytes(&bytes), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn option_roundtrip() {
        let none: Option<u64> = None;
        assert_eq!(
            Option::<u64>::from_bytes(&none.to_bytes()).unwrap(),
            none
        );

        let some: Option<u64> = Some(42);
        assert_eq!(
            Option::<u64>::from_bytes(&some.to_bytes()).unwrap(),
            some
        );
    }

    #[test]
    fn map_roundtrip_preserves_entries() {
        let mut map = BTreeMap::new();
        map.insert("alpha".to_string(), 1u64);
        map.insert("beta".to_string(), 2u64);
        map.insert("gamma".to_string(), 3u64);

        let bytes = map.to_bytes();
        assert_eq!(BTreeMap::<String, u64>::from_bytes(&bytes).unwrap(), map);
    }

    #[test]
    fn map_encoding_is_sorted_and_canonical() {
        let mut a = BTreeMap::new();
        a.insert("z".to_string(), 1u8);
        a.insert("a".to_string(), 2u8);

        let mut b = BTreeMap::new();
        b.insert("a".to_string(), 2u8);
        b.insert("z".to_string(), 1u8);

        assert_eq!(a.to_bytes(), b.to_bytes());
    }

    #[test]
    fn map_rejects_unsorted_input() {
        let mut bytes = Vec::new();
        2u64.encode(&mut bytes);
        "b".encode(&mut bytes);
        1u8.encode(&mut bytes);
        "a".encode(&mut bytes);
        2u8.encode(&mut bytes);

        assert_eq!(
            BTreeMap::<String, u8>::from_bytes(&bytes),
            Err(DecodeError::InvalidValue)
        );
    }

    #[test]
    fn trailing_bytes_rejected() {
        let bytes = &[42u8, 0xFF];
        assert_eq!(u8::from_bytes(bytes), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn unexpected_eof() {
        assert_eq!(u32::from_bytes(&[0x12, 0x34]), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn decode_advances_input() {
        let mut input: &[u8] = &[0x01, 0x02, 0x03, 0x04, 0x05];

        assert_eq!(u8::decode(&mut input).unwrap(), 0x01);
        assert_eq!(input.len(), 4);

        assert_eq!(u16::decode(&mut input).unwrap(), 0x0302);
        assert_eq!(input.len(), 2);
    }
}
