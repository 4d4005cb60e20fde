/*!
A CBOR encoder producing canonical, shortest-form output, per
[RFC 8949](https://www.rfc-editor.org/rfc/rfc8949.html).

The two primary components are the [`ToCbor`] trait, implemented by types
that know how to encode themselves, and the [`Encoder`] struct, a stateful
builder used for procedural encoding of arrays and maps.

The [`Bytes`] and [`Raw`] wrappers control how byte slices are written: as a
definite-length byte string, or verbatim with no CBOR framing.  Both report
the [`Range`] of the written bytes within the output buffer, which the
bundle codecs use to track block extents.
*/
use core::ops::Range;

/// A trait for types that can be encoded into CBOR format.
pub trait ToCbor {
    /// The result type returned by the encoding operation.
    ///
    /// For most types this is `()`.  For types that wrap borrowed data (like
    /// [`Bytes`] or [`Raw`]) it is a `Range<usize>` locating the encoded data
    /// within the final byte buffer.
    type Result;

    /// Encodes the value into the given [`Encoder`].
    fn to_cbor(&self, encoder: &mut Encoder) -> Self::Result;
}

/// A stateful, streaming encoder for building a CBOR byte stream.
pub struct Encoder {
    data: Vec<u8>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    /// Creates a new, empty `Encoder`.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Consumes the encoder and returns the generated CBOR byte vector.
    pub fn build(self) -> Vec<u8> {
        self.data
    }

    /// Returns the current length of the encoded data in bytes.
    #[inline]
    pub fn offset(&self) -> usize {
        self.data.len()
    }

    fn emit_extend(&mut self, b: &[u8]) -> Range<usize> {
        let start = self.offset();
        self.data.extend_from_slice(b);
        start..self.offset()
    }

    fn emit_uint_minor(&mut self, major: u8, val: u64) {
        const U8_MAX: u64 = (u8::MAX as u64) + 1;
        const U16_MAX: u64 = (u16::MAX as u64) + 1;
        const U32_MAX: u64 = (u32::MAX as u64) + 1;

        match val {
            0..24 => self.data.push((major << 5) | (val as u8)),
            24..U8_MAX => {
                self.data.push((major << 5) | 24u8);
                self.data.push(val as u8)
            }
            U8_MAX..U16_MAX => {
                self.data.push((major << 5) | 25u8);
                self.data.extend((val as u16).to_be_bytes())
            }
            U16_MAX..U32_MAX => {
                self.data.push((major << 5) | 26u8);
                self.data.extend((val as u32).to_be_bytes())
            }
            _ => {
                self.data.push((major << 5) | 27u8);
                self.data.extend(val.to_be_bytes())
            }
        }
    }

    /// Encodes a value that implements the [`ToCbor`] trait.
    pub fn emit<T>(&mut self, value: &T) -> T::Result
    where
        T: ToCbor + ?Sized,
    {
        value.to_cbor(self)
    }

    fn emit_raw<V>(&mut self, data: &V) -> Range<usize>
    where
        V: AsRef<[u8]> + ?Sized,
    {
        let start = self.offset();
        self.data.extend_from_slice(data.as_ref());
        start..self.offset()
    }

    fn emit_bytes<V>(&mut self, value: &V) -> Range<usize>
    where
        V: AsRef<[u8]> + ?Sized,
    {
        let value = value.as_ref();
        self.emit_uint_minor(2, value.len() as u64);
        self.emit_extend(value)
    }

    fn emit_string<V>(&mut self, value: &V) -> Range<usize>
    where
        V: AsRef<str> + ?Sized,
    {
        let value = value.as_ref().as_bytes();
        self.emit_uint_minor(3, value.len() as u64);
        self.emit_extend(value)
    }

    /// Emits a CBOR array.
    ///
    /// If `count` is `Some`, a definite-length array is created, otherwise an
    /// indefinite-length array.  The closure receives an [`Array`] helper to
    /// emit the array's elements.
    pub fn emit_array<F>(&mut self, count: Option<usize>, f: F)
    where
        F: FnOnce(&mut Array),
    {
        let mut a = Array::new(self, count);
        f(&mut a);
        a.end();
    }

    /// Emits a CBOR array, where the closure may fail.
    pub fn try_emit_array<F, E>(&mut self, count: Option<usize>, f: F) -> Result<(), E>
    where
        F: FnOnce(&mut Array) -> Result<(), E>,
    {
        let mut a = Array::new(self, count);
        f(&mut a)?;
        a.end();
        Ok(())
    }

    fn emit_array_slice<V, T>(&mut self, values: &V)
    where
        V: AsRef<[T]> + ?Sized,
        T: ToCbor + Sized,
    {
        let values = values.as_ref();
        let mut a = Array::new(self, Some(values.len()));
        for value in values {
            a.emit(value);
        }
        a.end()
    }
}

/// A wrapper to write raw bytes directly into the stream without any CBOR framing.
///
/// This is useful for embedding pre-encoded CBOR data within a CBOR stream.
pub struct Raw<'a, V>(pub &'a V)
where
    V: AsRef<[u8]> + ?Sized;

impl<'a, V> ToCbor for Raw<'a, V>
where
    V: AsRef<[u8]> + ?Sized,
{
    type Result = Range<usize>;

    fn to_cbor(&self, encoder: &mut Encoder) -> Self::Result {
        encoder.emit_raw(self.0)
    }
}

/// A wrapper to encode a byte slice as a definite-length CBOR byte string.
///
/// By default a `&[u8]` is encoded as a CBOR array of integers; use this
/// wrapper to encode it as a byte string instead.
pub struct Bytes<'a, V>(pub &'a V)
where
    V: AsRef<[u8]> + ?Sized;

impl<'a, V> ToCbor for Bytes<'a, V>
where
    V: AsRef<[u8]> + ?Sized,
{
    type Result = Range<usize>;

    fn to_cbor(&self, encoder: &mut Encoder) -> Self::Result {
        encoder.emit_bytes(self.0)
    }
}

/// A helper for building a CBOR array.
pub struct Array<'a> {
    encoder: &'a mut Encoder,
    count: Option<usize>,
    emitted: usize,
}

impl<'a> Array<'a> {
    fn new(encoder: &'a mut Encoder, count: Option<usize>) -> Self {
        match count {
            Some(count) => encoder.emit_uint_minor(4, count as u64),
            None => encoder.data.push((4 << 5) | 31),
        }
        Self {
            encoder,
            count,
            emitted: 0,
        }
    }

    /// The current length of the encoded data in bytes.
    pub fn offset(&self) -> usize {
        self.encoder.offset()
    }

    /// Encodes a value as the next element of the array.
    pub fn emit<T>(&mut self, value: &T) -> T::Result
    where
        T: ToCbor + ?Sized,
    {
        self.emitted += 1;
        self.encoder.emit(value)
    }

    /// Emits a nested CBOR array as the next element.
    pub fn emit_array<F>(&mut self, count: Option<usize>, f: F)
    where
        F: FnOnce(&mut Array),
    {
        self.emitted += 1;
        self.encoder.emit_array(count, f)
    }

    /// Accounts for an element that will be appended to the buffer by other
    /// means, such as a CRC value written after the fact.
    pub fn skip_value(&mut self) {
        self.emitted += 1;
    }

    fn end(self) {
        if let Some(count) = self.count {
            debug_assert_eq!(count, self.emitted, "definite array element count mismatch");
        } else {
            self.encoder.data.push(0xFF)
        }
    }
}

/// Encodes a single value into a new byte vector.
pub fn emit<T>(value: &T) -> Vec<u8>
where
    T: ToCbor + ?Sized,
{
    let mut e = Encoder::new();
    e.emit(value);
    e.build()
}

/// Encodes a CBOR array into a new byte vector.
pub fn emit_array<F>(count: Option<usize>, f: F) -> Vec<u8>
where
    F: FnOnce(&mut Array),
{
    let mut e = Encoder::new();
    e.emit_array(count, f);
    e.build()
}

macro_rules! impl_uint_to_cbor {
    ($($ty:ty),*) => {
        $(
            impl ToCbor for $ty {
                type Result = ();

                fn to_cbor(&self, encoder: &mut Encoder) -> Self::Result {
                    encoder.emit_uint_minor(0, *self as u64)
                }
            }
        )*
    };
}

impl_uint_to_cbor!(u8, u16, u32, u64, usize);

macro_rules! impl_int_to_cbor {
    ($($ty:ty),*) => {
        $(
            impl ToCbor for $ty {
                type Result = ();

                fn to_cbor(&self, encoder: &mut Encoder) -> Self::Result {
                    let v = *self as i64;
                    if v >= 0 {
                        encoder.emit_uint_minor(0, v as u64)
                    } else {
                        encoder.emit_uint_minor(1, !(v as u64))
                    }
                }
            }
        )*
    };
}

impl_int_to_cbor!(i8, i16, i32, i64, isize);

impl ToCbor for bool {
    type Result = ();

    fn to_cbor(&self, encoder: &mut Encoder) -> Self::Result {
        encoder
            .data
            .push((7 << 5) | if *self { 21 } else { 20 })
    }
}

impl ToCbor for str {
    type Result = Range<usize>;

    fn to_cbor(&self, encoder: &mut Encoder) -> Self::Result {
        encoder.emit_string(self)
    }
}

impl ToCbor for String {
    type Result = Range<usize>;

    fn to_cbor(&self, encoder: &mut Encoder) -> Self::Result {
        encoder.emit_string(self)
    }
}

impl<T> ToCbor for [T]
where
    T: ToCbor,
{
    type Result = ();

    fn to_cbor(&self, encoder: &mut Encoder) -> Self::Result {
        encoder.emit_array_slice(self)
    }
}

impl<T> ToCbor for Vec<T>
where
    T: ToCbor,
{
    type Result = ();

    fn to_cbor(&self, encoder: &mut Encoder) -> Self::Result {
        encoder.emit_array_slice(self)
    }
}

impl<T> ToCbor for &T
where
    T: ToCbor + ?Sized,
{
    type Result = T::Result;

    fn to_cbor(&self, encoder: &mut Encoder) -> Self::Result {
        (*self).to_cbor(encoder)
    }
}

macro_rules! impl_tuple_to_cbor {
    ($(($($ty:ident . $idx:tt),+ ; $count:expr)),* $(,)?) => {
        $(
            impl<$($ty),+> ToCbor for ($($ty,)+)
            where
                $($ty: ToCbor),+
            {
                type Result = ();

                fn to_cbor(&self, encoder: &mut Encoder) -> Self::Result {
                    encoder.emit_array(Some($count), |a| {
                        $( a.emit(&self.$idx); )+
                    })
                }
            }
        )*
    };
}

impl_tuple_to_cbor!(
    (T0.0; 1),
    (T0.0, T1.1; 2),
    (T0.0, T1.1, T2.2; 3),
    (T0.0, T1.1, T2.2, T3.3; 4),
    (T0.0, T1.1, T2.2, T3.3, T4.4; 5),
    (T0.0, T1.1, T2.2, T3.3, T4.4, T5.5; 6),
);
