//! Request framing.
//!
//! A request is an array of bulk strings. Every argument is turned into an
//! [`Arg`] before anything is written, so its byte length is fixed up front
//! and the header can never disagree with the payload that follows it.
use std::{borrow::Cow, io::Write};

use bytes::Bytes;

use super::{ARRAY, BULK, CRLF, Error};

/// A single request argument: a byte string of known length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg<'a>(Cow<'a, [u8]>);

impl<'a> Arg<'a> {
    pub fn borrowed(bytes: &'a [u8]) -> Self {
        Self(Cow::Borrowed(bytes))
    }

    pub fn owned(bytes: Vec<u8>) -> Self {
        Self(Cow::Owned(bytes))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Conversion of an application value into a request argument.
///
/// This is the write-side extension point: implement it for a type to make
/// it usable in [`cmd!`](crate::cmd) argument lists. Numbers are written in
/// their canonical decimal form.
pub trait ToArg {
    fn to_arg(&self) -> Arg<'_>;
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Arg<'_> {
        (**self).to_arg()
    }
}

impl ToArg for str {
    fn to_arg(&self) -> Arg<'_> {
        Arg::borrowed(self.as_bytes())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Arg<'_> {
        Arg::borrowed(self.as_bytes())
    }
}

impl ToArg for [u8] {
    fn to_arg(&self) -> Arg<'_> {
        Arg::borrowed(self)
    }
}

impl<const N: usize> ToArg for [u8; N] {
    fn to_arg(&self) -> Arg<'_> {
        Arg::borrowed(self)
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Arg<'_> {
        Arg::borrowed(self)
    }
}

impl ToArg for Bytes {
    fn to_arg(&self) -> Arg<'_> {
        Arg::borrowed(self)
    }
}

impl ToArg for Arg<'_> {
    fn to_arg(&self) -> Arg<'_> {
        Arg::borrowed(self.as_bytes())
    }
}

macro_rules! decimal_arg {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToArg for $ty {
                fn to_arg(&self) -> Arg<'_> {
                    Arg::owned(self.to_string().into_bytes())
                }
            }
        )*
    };
}

decimal_arg!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

/// Builds a `Vec<Arg>` from heterogeneous [`ToArg`] values.
///
/// ```
/// use respite::cmd;
///
/// let args = cmd!["SET", "counter", 42];
/// assert_eq!(args.len(), 3);
/// assert_eq!(args[2].as_bytes(), b"42");
/// ```
#[macro_export]
macro_rules! cmd {
    ($($arg:expr),+ $(,)?) => {
        vec![$($crate::ToArg::to_arg(&$arg)),+]
    };
}

/// Writes `args` as one request: `*<argc>\r\n` followed by
/// `$<len>\r\n<bytes>\r\n` for every argument.
pub fn write_command<W: Write>(writer: &mut W, args: &[Arg<'_>]) -> Result<(), Error> {
    if args.is_empty() {
        return Err(Error::Conversion("a request needs at least one argument".into()));
    }

    write_header(writer, ARRAY, args.len())?;
    for arg in args {
        write_header(writer, BULK, arg.len())?;
        writer.write_all(arg.as_bytes())?;
        writer.write_all(CRLF)?;
    }

    Ok(())
}

fn write_header<W: Write>(writer: &mut W, tag: u8, len: usize) -> Result<(), Error> {
    writer.write_all(&[tag])?;
    writer.write_all(len.to_string().as_bytes())?;
    writer.write_all(CRLF)?;
    Ok(())
}
