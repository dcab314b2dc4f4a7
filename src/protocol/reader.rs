//! Typed decoding of bulk payloads.
//!
//! [`FromBulk`] is the read-side extension point: a type implementing it
//! can be decoded with [`Reader`] without the decoder knowing anything
//! about it. The reader is chosen from the target type at the call site.
use std::{marker::PhantomData, str::FromStr};

use bytes::Bytes;

use super::{Bulk, Error, Unsupported, Visitor};

/// Conversion of a raw bulk payload into an application value.
///
/// Implementations must consume the whole payload, even when conversion
/// fails afterwards.
pub trait FromBulk: Sized {
    fn from_bulk(bulk: &mut Bulk<'_>) -> Result<Self, Error>;
}

impl FromBulk for Vec<u8> {
    fn from_bulk(bulk: &mut Bulk<'_>) -> Result<Self, Error> {
        bulk.read_to_vec()
    }
}

impl FromBulk for Bytes {
    fn from_bulk(bulk: &mut Bulk<'_>) -> Result<Self, Error> {
        bulk.read_to_bytes()
    }
}

impl FromBulk for String {
    fn from_bulk(bulk: &mut Bulk<'_>) -> Result<Self, Error> {
        String::from_utf8(bulk.read_to_vec()?).map_err(|e| Error::Conversion(e.to_string()))
    }
}

fn parse_decimal<T>(bulk: &mut Bulk<'_>) -> Result<T, Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = bulk.read_to_vec()?;
    let text = std::str::from_utf8(&raw).map_err(|e| Error::Conversion(e.to_string()))?;
    text.parse::<T>()
        .map_err(|e| Error::Conversion(format!("'{text}': {e}")))
}

macro_rules! decimal_reader {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromBulk for $ty {
                fn from_bulk(bulk: &mut Bulk<'_>) -> Result<Self, Error> {
                    parse_decimal(bulk)
                }
            }
        )*
    };
}

decimal_reader!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

/// Visitor accepting a single bulk reply decoded as `A`.
pub struct Reader<A>(PhantomData<fn() -> A>);

impl<A> Reader<A> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<A> Default for Reader<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for Reader<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A> Copy for Reader<A> {}

impl<A: FromBulk> Visitor for Reader<A> {
    type Output = A;
    type Array = Unsupported<A>;

    fn visit_bulk(self, bulk: &mut Bulk<'_>) -> Result<A, Error> {
        A::from_bulk(bulk)
    }
}

/// Accepts only integer replies.
#[derive(Debug, Default, Clone, Copy)]
pub struct Integer;

impl Visitor for Integer {
    type Output = i64;
    type Array = Unsupported<i64>;

    fn visit_integer(self, value: i64) -> Result<i64, Error> {
        Ok(value)
    }
}

/// Accepts only status replies.
#[derive(Debug, Default, Clone, Copy)]
pub struct Status;

impl Visitor for Status {
    type Output = String;
    type Array = Unsupported<String>;

    fn visit_status(self, status: &str) -> Result<String, Error> {
        Ok(status.to_string())
    }
}

/// Accepts status or bulk replies as UTF-8 text.
#[derive(Debug, Default, Clone, Copy)]
pub struct Text;

impl Visitor for Text {
    type Output = String;
    type Array = Unsupported<String>;

    fn visit_status(self, status: &str) -> Result<String, Error> {
        Ok(status.to_string())
    }

    fn visit_bulk(self, bulk: &mut Bulk<'_>) -> Result<String, Error> {
        String::from_bulk(bulk)
    }
}
