/*!
A CBOR decoder for parsing byte streams, per
[RFC 8949](https://www.rfc-editor.org/rfc/rfc8949.html).

There are two ways to use the decoder:

1.  **Direct deserialization with [`FromCbor`]:** implement the trait for a
    type and convert a CBOR byte slice straight into it.

2.  **Streaming parsing with the `parse_*` functions:** [`parse_value`],
    [`parse_array`] and [`parse_sequence`] hand a [`Value`] or [`Series`] to
    a closure, processing the stream piece by piece without intermediate
    allocation.

Incomplete input is reported as [`Error::NeedMoreData`], carrying a lower
bound on the number of missing bytes.  The bundle stream parsers rely on
this to resume once more data arrives from a convergence layer.

Floating-point items (major type 7, minors 25..=27) are rejected: nothing
in the bundle protocol encodes fractions, and refusing them keeps the
decoder total over adversarial input.
*/
use core::{ops::Range, str::Utf8Error};
use thiserror::Error;

/// An error that can occur during CBOR decoding.
#[derive(Error, Debug)]
pub enum Error {
    /// An encoded item's length exceeds `usize::MAX` or available memory.
    #[error("An encoded item requires more memory than available")]
    TooBig,

    /// The input data is incomplete and more bytes are needed to decode the value.
    #[error("Need at least {0} more bytes to decode value")]
    NeedMoreData(usize),

    /// The input data contains extra, unread items after a sequence has been fully parsed.
    #[error("Additional unread items in sequence")]
    AdditionalItems,

    /// An attempt was made to parse an item from a sequence that has already ended.
    #[error("No more items in sequence")]
    NoMoreItems,

    /// The CBOR item has an invalid minor type value for its major type.
    #[error("Invalid minor-type value {0}")]
    InvalidMinorValue(u8),

    /// The CBOR item's type does not match the expected type.
    #[error("Incorrect type, expecting {0}, found {1}")]
    IncorrectType(String, String),

    /// An indefinite-length string contains an invalid chunk.
    #[error("Chunked string contains an invalid chunk")]
    InvalidChunk,

    /// A simple value was found that is unassigned or reserved.
    #[error("Invalid simple type {0}")]
    InvalidSimpleType(u8),

    /// A floating-point item was found; the decoder does not support them.
    #[error("Floating-point values are not supported")]
    UnsupportedFloat,

    /// An indefinite-length map is missing a value for a key.
    #[error("Map has key but no value")]
    PartialMap,

    /// The maximum recursion depth was reached while decoding nested structures.
    #[error("Maximum recursion depth reached")]
    MaxRecursion,

    /// A text string contains invalid UTF-8.
    #[error(transparent)]
    InvalidUtf8(#[from] Utf8Error),

    /// An integer conversion failed, typically due to an out-of-range value.
    #[error(transparent)]
    TryFromIntError(#[from] core::num::TryFromIntError),
}

/// A trait for types that can be decoded from a CBOR byte slice.
///
/// On success, `from_cbor` returns the decoded value and the number of bytes
/// consumed from the front of the slice.
pub trait FromCbor: Sized {
    type Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error>;
}

/// A type alias for a generic, untyped CBOR sequence.
pub type Sequence<'a> = super::decode_seq::Series<'a, 0>;
/// A type alias for a [`Series`] that represents a CBOR array.
pub type Array<'a> = super::decode_seq::Series<'a, 1>;
/// A type alias for a [`Series`] that represents a CBOR map.
pub type Map<'a> = super::decode_seq::Series<'a, 2>;
/// A stateful iterator for decoding a sequence of CBOR items.
pub use super::decode_seq::Series;

/// Represents a single, decoded CBOR data item.
pub enum Value<'a, 'b: 'a> {
    UnsignedInteger(u64),
    NegativeInteger(u64),
    Bytes(Range<usize>),
    ByteStream(Vec<Range<usize>>),
    Text(&'b str),
    TextStream(&'a [&'b str]),
    Array(&'a mut Array<'b>),
    Map(&'a mut Map<'b>),
    False,
    True,
    Null,
    Undefined,
    Simple(u8),
}

impl<'a, 'b: 'a> Value<'a, 'b> {
    /// Returns a human-readable string describing the type of the CBOR value.
    pub fn type_name(&self, tagged: bool) -> String {
        let prefix = if tagged { "Tagged " } else { "Untagged " }.to_string();
        match self {
            Value::UnsignedInteger(_) => prefix + "Unsigned Integer",
            Value::NegativeInteger(_) => prefix + "Negative Integer",
            Value::Bytes(_) => prefix + "Definite-length Byte String",
            Value::ByteStream(_) => prefix + "Indefinite-length Byte String",
            Value::Text(_) => prefix + "Definite-length Text String",
            Value::TextStream(_) => prefix + "Indefinite-length Text String",
            Value::Array(a) if a.is_definite() => prefix + "Definite-length Array",
            Value::Array(_) => prefix + "Indefinite-length Array",
            Value::Map(m) if m.is_definite() => prefix + "Definite-length Map",
            Value::Map(_) => prefix + "Indefinite-length Map",
            Value::False => prefix + "False",
            Value::True => prefix + "True",
            Value::Null => prefix + "Null",
            Value::Undefined => prefix + "Undefined",
            Value::Simple(v) => format!("{prefix}Simple Value {v}"),
        }
    }

    /// Skips over the content of the current value.
    ///
    /// For simple types, this does nothing.  For arrays and maps, it consumes
    /// all nested items until the end of the sequence is reached.
    pub fn skip(&mut self, mut max_recursion: usize) -> Result<(), Error> {
        match self {
            Value::Array(a) => {
                if max_recursion == 0 {
                    return Err(Error::MaxRecursion);
                }
                max_recursion -= 1;
                a.skip_to_end(max_recursion)
            }
            Value::Map(m) => {
                if max_recursion == 0 {
                    return Err(Error::MaxRecursion);
                }
                max_recursion -= 1;
                m.skip_to_end(max_recursion)
            }
            _ => Ok(()),
        }
    }
}

impl<'a, 'b: 'a> core::fmt::Debug for Value<'a, 'b> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Value::UnsignedInteger(n) => write!(f, "{n:?}"),
            Value::NegativeInteger(n) => write!(f, "-{n:?}"),
            Value::Bytes(b) => write!(f, "bytes[{b:?}]"),
            Value::ByteStream(b) => write!(f, "byte_stream{b:?}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::TextStream(s) => write!(f, "{s:?}"),
            Value::Array(a) => write!(f, "{a:?}"),
            Value::Map(m) => write!(f, "{m:?}"),
            Value::False => f.write_str("false"),
            Value::True => f.write_str("true"),
            Value::Null => f.write_str("null"),
            Value::Undefined => f.write_str("undefined"),
            Value::Simple(v) => write!(f, "simple value {v}"),
        }
    }
}

fn parse_tags(data: &[u8]) -> Result<(Vec<u64>, usize), Error> {
    let mut tags = Vec::new();
    let mut offset = 0;

    while let Some(marker) = data.get(offset) {
        match (marker >> 5, marker & 0x1F) {
            (6, minor) => {
                offset += 1;
                let (tag, o) = parse_uint_minor(minor, &data[offset..])?;
                tags.push(tag);
                offset += o;
            }
            _ => break,
        }
    }
    Ok((tags, offset))
}

fn to_array<const N: usize>(data: &[u8]) -> Result<[u8; N], Error> {
    match data.len().cmp(&N) {
        core::cmp::Ordering::Less => Err(Error::NeedMoreData(N - data.len())),
        core::cmp::Ordering::Equal => Ok(data.try_into().unwrap()),
        core::cmp::Ordering::Greater => Ok(data[0..N].try_into().unwrap()),
    }
}

fn parse_uint_minor(minor: u8, data: &[u8]) -> Result<(u64, usize), Error> {
    match minor {
        24 => {
            if let Some(val) = data.first() {
                Ok((*val as u64, 1))
            } else {
                Err(Error::NeedMoreData(1))
            }
        }
        25 => Ok((u16::from_be_bytes(to_array(data)?) as u64, 2)),
        26 => Ok((u32::from_be_bytes(to_array(data)?) as u64, 4)),
        27 => Ok((u64::from_be_bytes(to_array(data)?), 8)),
        val if val < 24 => Ok((val as u64, 0)),
        _ => Err(Error::InvalidMinorValue(minor)),
    }
}

fn parse_data_minor(minor: u8, data: &[u8]) -> Result<(Range<usize>, usize), Error> {
    let (data_len, len) = parse_uint_minor(minor, data)?;
    let data_len = data_len
        .checked_add(len as u64)
        .and_then(|data_len| (data_len <= usize::MAX as u64).then_some(data_len as usize))
        .ok_or(Error::TooBig)?;

    if data_len > data.len() {
        Err(Error::NeedMoreData(data_len - data.len()))
    } else {
        Ok((len..data_len, data_len))
    }
}

fn parse_data_chunked(major: u8, data: &[u8]) -> Result<(Vec<Range<usize>>, usize), Error> {
    let mut chunks = Vec::new();
    let mut offset = 0;
    while let Some(v) = data.get(offset) {
        offset += 1;

        if *v == 0xFF {
            return Ok((chunks, offset));
        }

        if v >> 5 != major {
            return Err(Error::InvalidChunk);
        }

        let (chunk, chunk_len) = parse_data_minor(v & 0x1F, &data[offset..])?;
        chunks.push(chunk.start + offset..chunk.end + offset);
        offset += chunk_len;
    }

    Err(Error::NeedMoreData(1))
}

/// Parses a single CBOR value from a byte slice and processes it with a closure.
///
/// This is the core low-level parsing function.  It handles tags and
/// determines the major type of the next item in the slice, then passes a
/// [`Value`] representation to the provided closure `f`.
///
/// On success, it returns a tuple containing the result of the closure and
/// the total number of bytes consumed from the input slice.
pub fn parse_value<T, F, E>(data: &[u8], f: F) -> Result<(T, usize), E>
where
    F: FnOnce(Value, &[u64]) -> Result<T, E>,
    E: From<Error>,
{
    let (tags, mut offset) = parse_tags(data)?;
    let Some(marker) = data.get(offset) else {
        return Err(Error::NeedMoreData(1).into());
    };
    offset += 1;

    match (marker >> 5, marker & 0x1F) {
        (0, minor) => {
            let (v, len) = parse_uint_minor(minor, &data[offset..])?;
            offset += len;
            f(Value::UnsignedInteger(v), &tags)
        }
        (1, minor) => {
            let (v, len) = parse_uint_minor(minor, &data[offset..])?;
            offset += len;
            f(Value::NegativeInteger(v), &tags)
        }
        (2, 31) => {
            /* Indefinite length byte string */
            let (mut v, len) = parse_data_chunked(2, &data[offset..])?;
            for t in v.iter_mut() {
                t.start += offset;
                t.end += offset;
            }
            offset += len;
            f(Value::ByteStream(v), &tags)
        }
        (2, minor) => {
            /* Known length byte string */
            let (t, len) = parse_data_minor(minor, &data[offset..])?;
            let t = t.start + offset..t.end + offset;
            offset += len;
            f(Value::Bytes(t), &tags)
        }
        (3, 31) => {
            /* Indefinite length text string */
            let data = &data[offset..];
            let (v, len) = parse_data_chunked(3, data)?;
            offset += len;
            let mut t = Vec::with_capacity(v.len());
            for b in v {
                t.push(core::str::from_utf8(&data[b]).map_err(Error::from)?);
            }
            f(Value::TextStream(&t), &tags)
        }
        (3, minor) => {
            /* Known length text string */
            let data = &data[offset..];
            let (t, len) = parse_data_minor(minor, data)?;
            offset += len;
            f(
                Value::Text(core::str::from_utf8(&data[t]).map_err(Error::from)?),
                &tags,
            )
        }
        (4, 31) => {
            /* Indefinite length array */
            let mut a = Array::new(data, None, &mut offset);
            let r = f(Value::Array(&mut a), &tags)?;
            a.complete(r).map_err(Into::into)
        }
        (4, minor) => {
            /* Known length array */
            let (count, len) = parse_uint_minor(minor, &data[offset..])?;
            offset += len;
            if count > usize::MAX as u64 {
                return Err(Error::TooBig.into());
            }
            let mut a = Array::new(data, Some(count as usize), &mut offset);
            let r = f(Value::Array(&mut a), &tags)?;
            a.complete(r).map_err(Into::into)
        }
        (5, 31) => {
            /* Indefinite length map */
            let mut m = Map::new(data, None, &mut offset);
            let r = f(Value::Map(&mut m), &tags)?;
            m.complete(r).map_err(Into::into)
        }
        (5, minor) => {
            /* Known length map */
            let (count, len) = parse_uint_minor(minor, &data[offset..])?;
            offset += len;
            if count > (usize::MAX as u64) / 2 {
                return Err(Error::TooBig.into());
            }
            let mut m = Map::new(data, Some((count * 2) as usize), &mut offset);
            let r = f(Value::Map(&mut m), &tags)?;
            m.complete(r).map_err(Into::into)
        }
        (6, _) => unreachable!(),
        (7, 20) => f(Value::False, &tags),
        (7, 21) => f(Value::True, &tags),
        (7, 22) => f(Value::Null, &tags),
        (7, 23) => f(Value::Undefined, &tags),
        (7, minor @ 0..=19) => {
            /* Unassigned simple type */
            f(Value::Simple(minor), &tags)
        }
        (7, 24) => {
            /* Unassigned simple type, 1 byte */
            let Some(v) = data.get(offset) else {
                return Err(Error::NeedMoreData(1).into());
            };
            offset += 1;
            if *v < 32 {
                return Err(Error::InvalidSimpleType(*v).into());
            }
            f(Value::Simple(*v), &tags)
        }
        (7, 25..=27) => {
            return Err(Error::UnsupportedFloat.into());
        }
        (7, minor) => {
            return Err(Error::InvalidSimpleType(minor).into());
        }
        _ => unreachable!(),
    }
    .map(|r| (r, offset))
}

/// Parses a generic, untyped CBOR sequence from a byte slice.
///
/// A CBOR sequence is a series of top-level data items not enclosed in an
/// array.  This function provides a [`Sequence`] iterator to the closure `f`
/// to process each item.
pub fn parse_sequence<T, F, E>(data: &[u8], f: F) -> Result<(T, usize), E>
where
    F: FnOnce(&mut Sequence) -> Result<T, E>,
    E: From<Error>,
{
    let mut offset = 0;
    let mut s = Sequence::new(data, None, &mut offset);
    let r = f(&mut s)?;
    s.complete(()).map(|_| (r, offset)).map_err(Into::into)
}

/// Parses a CBOR array from a byte slice.
///
/// This is a convenience wrapper around [`parse_value`] that ensures the next
/// item in the stream is a CBOR array, then provides an [`Array`] iterator to
/// the closure `f` for processing the array's elements.
pub fn parse_array<T, F, E>(data: &[u8], f: F) -> Result<(T, usize), E>
where
    F: FnOnce(&mut Array, &[u64]) -> Result<T, E>,
    E: From<Error>,
{
    parse_value(data, |value, tags| match value {
        Value::Array(a) => f(a, tags),
        _ => {
            Err(Error::IncorrectType("Array".to_string(), value.type_name(!tags.is_empty())).into())
        }
    })
}

/// A convenience function to decode a single value that implements [`FromCbor`].
///
/// Decodes the value and discards the length information, returning only the
/// decoded object.
pub fn parse<T>(data: &[u8]) -> Result<T, T::Error>
where
    T: FromCbor,
    T::Error: From<self::Error>,
{
    T::from_cbor(data).map(|v| v.0)
}

macro_rules! impl_uint_from_cbor {
    ($($ty:ty),*) => {
        $(
            impl FromCbor for $ty {
                type Error = self::Error;

                fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
                    let (v, len) = u64::from_cbor(data)?;
                    Ok((v.try_into()?, len))
                }
            }
        )*
    };
}

impl_uint_from_cbor!(u8, u16, u32, usize);

impl FromCbor for u64 {
    type Error = self::Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        parse_value(data, |value, tags| match value {
            Value::UnsignedInteger(n) if tags.is_empty() => Ok(n),
            value => Err(Error::IncorrectType(
                "Untagged Unsigned Integer".to_string(),
                value.type_name(!tags.is_empty()),
            )),
        })
    }
}

macro_rules! impl_int_from_cbor {
    ($($ty:ty),*) => {
        $(
            impl FromCbor for $ty {
                type Error = self::Error;

                fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
                    let (v, len) = i64::from_cbor(data)?;
                    Ok((v.try_into()?, len))
                }
            }
        )*
    };
}

impl_int_from_cbor!(i8, i16, i32, isize);

impl FromCbor for i64 {
    type Error = self::Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        parse_value(data, |value, tags| match value {
            Value::UnsignedInteger(n) if tags.is_empty() => Ok(i64::try_from(n)?),
            Value::NegativeInteger(n) if tags.is_empty() => Ok(-1i64 - i64::try_from(n)?),
            value => Err(Error::IncorrectType(
                "Untagged Integer".to_string(),
                value.type_name(!tags.is_empty()),
            )),
        })
    }
}

impl FromCbor for bool {
    type Error = self::Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        parse_value(data, |value, tags| match value {
            Value::False if tags.is_empty() => Ok(false),
            Value::True if tags.is_empty() => Ok(true),
            value => Err(Error::IncorrectType(
                "Untagged Boolean".to_string(),
                value.type_name(!tags.is_empty()),
            )),
        })
    }
}

impl FromCbor for String {
    type Error = self::Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        parse_value(data, |value, tags| match value {
            Value::Text(s) if tags.is_empty() => Ok(s.to_string()),
            Value::TextStream(s) if tags.is_empty() => Ok(s.concat()),
            value => Err(Error::IncorrectType(
                "Untagged Text String".to_string(),
                value.type_name(!tags.is_empty()),
            )),
        })
    }
}

impl FromCbor for Box<[u8]> {
    type Error = self::Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        parse_value(data, |value, tags| match value {
            Value::Bytes(r) if tags.is_empty() => Ok(data[r].into()),
            Value::ByteStream(ranges) if tags.is_empty() => Ok(ranges
                .into_iter()
                .fold(Vec::new(), |mut acc, r| {
                    acc.extend_from_slice(&data[r]);
                    acc
                })
                .into()),
            value => Err(Error::IncorrectType(
                "Untagged Byte String".to_string(),
                value.type_name(!tags.is_empty()),
            )),
        })
    }
}

impl<T> FromCbor for Option<T>
where
    T: FromCbor,
    T::Error: From<self::Error>,
{
    type Error = T::Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        match parse_value(data, |value, tags| match value {
            Value::Undefined if tags.is_empty() => Ok(true),
            _ => Ok(false),
        })? {
            (true, len) => Ok((None, len)),
            (false, _) => T::from_cbor(data).map(|(v, len)| (Some(v), len)),
        }
    }
}

impl<T> FromCbor for (T, usize)
where
    T: FromCbor,
    T::Error: From<self::Error>,
{
    type Error = T::Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        T::from_cbor(data).map(|(value, length)| ((value, length), length))
    }
}
