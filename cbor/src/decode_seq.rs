use super::decode::*;

/// A stateful iterator over the items of a CBOR array, map or sequence.
///
/// The const parameter `D` is the number of CBOR items per logical element:
/// 0 for a top-level sequence, 1 for an array, 2 for a map.
pub struct Series<'a, const D: usize> {
    data: &'a [u8],
    count: Option<usize>,
    offset: &'a mut usize,
    parsed: usize,
}

impl<'a, const D: usize> Series<'a, D> {
    pub(super) fn new(data: &'a [u8], count: Option<usize>, offset: &'a mut usize) -> Self {
        Self {
            data,
            count,
            offset,
            parsed: 0,
        }
    }

    /// Returns the number of logical elements, if the container is
    /// definite-length or has been fully consumed.
    pub fn count(&self) -> Option<usize> {
        self.count.map(|c| if D == 0 { c } else { c / D.max(1) })
    }

    /// Returns `true` if the container was encoded with a definite length.
    pub fn is_definite(&self) -> bool {
        self.count.is_some()
    }

    fn check_for_end(&mut self) -> Result<bool, Error> {
        if let Some(count) = self.count {
            Ok(self.parsed >= count)
        } else if *self.offset >= self.data.len() {
            if D == 0 {
                self.count = Some(self.parsed);
                Ok(true)
            } else {
                Err(Error::NeedMoreData(1))
            }
        } else if D > 0 && self.data[*self.offset] == 0xFF {
            if D == 2 && self.parsed % 2 == 1 {
                Err(Error::PartialMap)
            } else {
                *self.offset += 1;
                self.count = Some(self.parsed);
                Ok(true)
            }
        } else {
            Ok(false)
        }
    }

    /// The current offset into the underlying byte slice.
    pub fn offset(&self) -> usize {
        *self.offset
    }

    /// Checks whether the series has reached its end, consuming the break
    /// byte of an indefinite-length container if present.
    pub fn at_end(&mut self) -> Result<bool, Error> {
        self.check_for_end()
    }

    pub(super) fn complete<T>(mut self, result: T) -> Result<T, Error> {
        if !self.check_for_end()? {
            return Err(Error::AdditionalItems);
        }
        Ok(result)
    }

    /// Skips a single value, returning `false` if the series had ended.
    pub fn skip_value(&mut self, max_recursion: usize) -> Result<bool, Error> {
        self.try_parse_value(|mut value, _| value.skip(max_recursion))
            .map(|r| r.is_some())
    }

    /// Skips every remaining value in the series.
    pub fn skip_to_end(&mut self, max_recursion: usize) -> Result<(), Error> {
        while self
            .try_parse_value(|mut value, _| value.skip(max_recursion))?
            .is_some()
        {}
        Ok(())
    }

    /// Parses the next value in the series with a closure, returning `None`
    /// if the series has ended.
    pub fn try_parse_value<T, F, E>(&mut self, f: F) -> Result<Option<(T, usize)>, E>
    where
        F: FnOnce(Value, &[u64]) -> Result<T, E>,
        E: From<Error>,
    {
        if self.check_for_end()? {
            Ok(None)
        } else {
            let r = parse_value(&self.data[*self.offset..], f)?;
            self.parsed += 1;
            *self.offset += r.1;
            Ok(Some(r))
        }
    }

    /// Parses the next value in the series with a closure, failing with
    /// [`Error::NoMoreItems`] if the series has ended.
    #[inline]
    pub fn parse_value<T, F, E>(&mut self, f: F) -> Result<(T, usize), E>
    where
        F: FnOnce(Value, &[u64]) -> Result<T, E>,
        E: From<Error>,
    {
        self.try_parse_value(f)?
            .ok_or(Error::NoMoreItems.into())
    }

    /// Parses the next item as a `T`, returning `None` if the series has ended.
    pub fn try_parse<T>(&mut self) -> Result<Option<T>, T::Error>
    where
        T: FromCbor,
        T::Error: From<self::Error>,
    {
        if self.check_for_end()? {
            Ok(None)
        } else {
            let (value, len) = T::from_cbor(&self.data[*self.offset..])?;
            self.parsed += 1;
            *self.offset += len;
            Ok(Some(value))
        }
    }

    /// Parses the next item as a `T`, failing with [`Error::NoMoreItems`] if
    /// the series has ended.
    pub fn parse<T>(&mut self) -> Result<T, T::Error>
    where
        T: FromCbor,
        T::Error: From<self::Error>,
    {
        self.try_parse::<T>()?.ok_or(Error::NoMoreItems.into())
    }

    /// Parses the next item as an array, handing it to the closure `f`.
    pub fn parse_array<T, F, E>(&mut self, f: F) -> Result<(T, usize), E>
    where
        F: FnOnce(&mut Array, &[u64]) -> Result<T, E>,
        E: From<Error>,
    {
        self.parse_value(|value, tags| match value {
            Value::Array(a) => f(a, tags),
            _ => Err(
                Error::IncorrectType("Array".to_string(), value.type_name(!tags.is_empty())).into(),
            ),
        })
    }
}

impl<const D: usize> core::fmt::Debug for Series<'_, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Series")
            .field("count", &self.count)
            .field("offset", &self.offset)
            .field("parsed", &self.parsed)
            .finish()
    }
}
