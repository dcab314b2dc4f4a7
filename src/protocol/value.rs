use std::fmt::{self, Write};

use bytes::Bytes;

use super::Error;

/// The six reply shapes that can arrive on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Status,
    Error,
    Integer,
    Bulk,
    Null,
    Array,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Status => "status",
            Kind::Error => "error",
            Kind::Integer => "integer",
            Kind::Bulk => "bulk",
            Kind::Null => "null",
            Kind::Array => "array",
        };
        f.write_str(name)
    }
}

/// A fully materialized reply.
///
/// Error replies never become a `Value`; the decoder turns them into
/// [`Error::Remote`]. A null bulk string and a null array both decode to
/// [`Value::Null`], while an empty array stays `Array(vec![])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Status(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Value>),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Status(_) => Kind::Status,
            Value::Integer(_) => Kind::Integer,
            Value::Bulk(_) => Kind::Bulk,
            Value::Null => Kind::Null,
            Value::Array(_) => Kind::Array,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn shape_error(&self, expected: Kind) -> Error {
        Error::InvalidShape {
            expected,
            actual: self.kind(),
        }
    }

    pub fn as_status(&self) -> Result<&str, Error> {
        match self {
            Value::Status(s) => Ok(s),
            other => Err(other.shape_error(Kind::Status)),
        }
    }

    pub fn as_integer(&self) -> Result<i64, Error> {
        match self {
            Value::Integer(i) => Ok(*i),
            other => Err(other.shape_error(Kind::Integer)),
        }
    }

    pub fn as_bulk(&self) -> Result<&Bytes, Error> {
        match self {
            Value::Bulk(b) => Ok(b),
            other => Err(other.shape_error(Kind::Bulk)),
        }
    }

    pub fn as_array(&self) -> Result<&[Value], Error> {
        match self {
            Value::Array(items) => Ok(items),
            other => Err(other.shape_error(Kind::Array)),
        }
    }

    pub fn into_bulk(self) -> Result<Bytes, Error> {
        match self {
            Value::Bulk(b) => Ok(b),
            other => Err(other.shape_error(Kind::Bulk)),
        }
    }

    pub fn into_array(self) -> Result<Vec<Value>, Error> {
        match self {
            Value::Array(items) => Ok(items),
            other => Err(other.shape_error(Kind::Array)),
        }
    }

    /// Text form of a status or bulk reply.
    pub fn as_text(&self) -> Result<&str, Error> {
        match self {
            Value::Status(s) => Ok(s),
            Value::Bulk(b) => std::str::from_utf8(b).map_err(|e| Error::Conversion(e.to_string())),
            other => Err(other.shape_error(Kind::Bulk)),
        }
    }

    fn render(&self, indent: usize, out: &mut String) -> fmt::Result {
        match self {
            Value::Status(s) => out.push_str(s),
            Value::Integer(i) => write!(out, "(integer) {i}")?,
            Value::Bulk(b) => write!(out, "\"{}\"", b.escape_ascii())?,
            Value::Null => out.push_str("(nil)"),
            Value::Array(items) if items.is_empty() => out.push_str("(empty array)"),
            Value::Array(items) => {
                let width = digits(items.len() - 1);
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                        out.extend(std::iter::repeat_n(' ', indent));
                    }
                    write!(out, "{i:>width$}) ")?;
                    item.render(indent + width + 2, out)?;
                }
            }
        }
        Ok(())
    }
}

fn digits(mut n: usize) -> usize {
    let mut count = 1;
    while n >= 10 {
        n /= 10;
        count += 1;
    }
    count
}

/// Renders the value the way an interactive client shows replies: nested
/// arrays are labelled with zero-based indices and indented under them.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.render(0, &mut out)?;
        f.write_str(&out)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Bulk(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}
