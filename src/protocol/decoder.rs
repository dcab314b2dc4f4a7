//! Streaming reply decoder.
//!
//! The decoder reads one reply from a [`BufRead`] source in a single pass
//! and drives a [`Visitor`] with it. Only the current line (a status, an
//! error or a length header) is held in memory; bulk payloads stream
//! straight from the source into the visitor.
//!
//! # Stream accounting
//!
//! After `decode` returns `Ok`, or any error that is not fatal, the source
//! is positioned exactly at the start of the next reply:
//!
//! - a visitor rejecting a shape has the rest of that shape skipped,
//! - an error inside an array (including a nested error line) is reported
//!   only after the remaining elements were walked and dropped,
//! - a bulk payload is always followed by its `\r\n` check.
//!
//! Fatal errors ([`Error::Fault`]) leave the position undefined.
//!
//! # Limits
//!
//! Lines longer than `MAX_LINE` bytes and arrays nested deeper than
//! `MAX_DEPTH` levels are protocol violations.
use std::io::{self, BufRead, Read};

use log::trace;

use super::{
    ARRAY, ArrayVisitor, BULK, Bulk, CRLF, Discard, ERROR, Error, Fault, INTEGER, MAX_DEPTH,
    MAX_LINE, NULL_LENGTH, STATUS, Value, ValueVisitor, Visitor,
};

pub struct Decoder<R> {
    source: R,
    line: Vec<u8>,
    depth: usize,
}

impl<R: BufRead> Decoder<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            line: Vec::with_capacity(64),
            depth: 0,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.source
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    /// Decodes one reply into a [`Value`] tree.
    pub fn decode_value(&mut self) -> Result<Value, Error> {
        self.decode(ValueVisitor)
    }

    /// Decodes one reply, letting `visitor` decide its representation.
    ///
    /// An error reply never reaches the visitor; it is returned as
    /// [`Error::Remote`].
    pub fn decode<V: Visitor>(&mut self, visitor: V) -> Result<V::Output, Error> {
        let tag = self.read_tag()?;
        match tag {
            STATUS => {
                self.read_line()?;
                let status = std::str::from_utf8(&self.line)
                    .map_err(|_| Error::protocol("status line is not valid UTF-8"))?;
                trace!("status reply: {status}");
                visitor.visit_status(status)
            }
            ERROR => {
                self.read_line()?;
                let message = String::from_utf8_lossy(&self.line).into_owned();
                trace!("error reply: {message}");
                Err(Error::Remote(message))
            }
            INTEGER => {
                let value = self.read_number()?;
                visitor.visit_integer(value)
            }
            BULK => match self.read_length()? {
                None => visitor.visit_null(),
                Some(len) => self.decode_bulk(visitor, len),
            },
            ARRAY => match self.read_length()? {
                None => visitor.visit_null(),
                Some(len) => self.decode_array(visitor, len),
            },
            other => Err(Error::protocol(format!(
                "unknown type tag {:?}",
                char::from(other)
            ))),
        }
    }

    fn decode_bulk<V: Visitor>(&mut self, visitor: V, len: usize) -> Result<V::Output, Error> {
        trace!("bulk reply of {len} bytes");
        let mut bulk = Bulk::new(&mut self.source, len);
        let result = visitor.visit_bulk(&mut bulk);
        let remaining = bulk.remaining();

        let result = match result {
            Err(e) if e.is_fatal() => return Err(e),
            Ok(_) if remaining > 0 => return Err(Fault::Unconsumed(remaining).into()),
            Err(e) => {
                bulk.skip()?;
                Err(e)
            }
            ok => ok,
        };

        self.expect_crlf()?;
        result
    }

    fn decode_array<V: Visitor>(&mut self, visitor: V, len: usize) -> Result<V::Output, Error> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::protocol("unsupported nesting depth"));
        }

        self.depth += 1;
        let result = self.decode_elements(visitor, len);
        self.depth -= 1;
        result
    }

    fn decode_elements<V: Visitor>(&mut self, visitor: V, len: usize) -> Result<V::Output, Error> {
        trace!("array reply of {len} elements at depth {}", self.depth);
        let mut array = match visitor.visit_array(len) {
            Ok(array) => array,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                self.skip(len)?;
                return Err(e);
            }
        };

        for index in 0..len {
            array.visit_index(index);
            let child = array.child();
            let outcome = self
                .decode(child)
                .and_then(|value| array.visit_value(value));

            if let Err(e) = outcome {
                if !e.is_fatal() {
                    self.skip(len - index - 1)?;
                }
                return Err(e);
            }
        }

        array.visit_end()
    }

    /// Walks and drops `count` replies, keeping only fatal errors.
    fn skip(&mut self, count: usize) -> Result<(), Error> {
        for _ in 0..count {
            match self.decode(Discard) {
                Err(e) if e.is_fatal() => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }

    fn read_tag(&mut self) -> Result<u8, Error> {
        let mut tag = [0; 1];
        self.source.read_exact(&mut tag).map_err(eof_as_protocol)?;
        Ok(tag[0])
    }

    /// Reads one line into the reusable buffer, without its terminator.
    fn read_line(&mut self) -> Result<(), Error> {
        let limit = (MAX_LINE + CRLF.len()) as u64;
        self.line.clear();
        (&mut self.source).take(limit).read_until(b'\n', &mut self.line)?;

        if !self.line.ends_with(b"\n") {
            if self.line.len() as u64 == limit {
                return Err(Error::protocol(format!("line exceeds {MAX_LINE} bytes")));
            }
            return Err(Error::protocol("stream ended too soon"));
        }
        if !self.line.ends_with(CRLF) {
            return Err(Error::protocol("line is not terminated by CRLF"));
        }

        self.line.truncate(self.line.len() - CRLF.len());
        Ok(())
    }

    fn read_number(&mut self) -> Result<i64, Error> {
        self.read_line()?;
        parse_signed(&self.line).ok_or_else(|| {
            Error::protocol(format!(
                "invalid number '{}'",
                String::from_utf8_lossy(&self.line)
            ))
        })
    }

    /// `None` for the null sentinel, the length otherwise.
    fn read_length(&mut self) -> Result<Option<usize>, Error> {
        match self.read_number()? {
            NULL_LENGTH => Ok(None),
            n if n < 0 => Err(Error::protocol(format!("invalid length {n}"))),
            n => usize::try_from(n)
                .ok()
                .filter(|len| *len <= isize::MAX as usize)
                .map(Some)
                .ok_or_else(|| Error::protocol(format!("unsupported length {n}"))),
        }
    }

    fn expect_crlf(&mut self) -> Result<(), Error> {
        let mut end = [0; 2];
        self.source.read_exact(&mut end).map_err(eof_as_protocol)?;
        if end != *CRLF {
            return Err(Error::protocol("bulk payload is not followed by CRLF"));
        }
        Ok(())
    }
}

fn eof_as_protocol(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::protocol("stream ended too soon")
    } else {
        Error::Fault(Fault::Io(e))
    }
}

/// Parses a decimal number with an optional leading `-`, with overflow
/// checks.
pub(crate) fn parse_signed(text: &[u8]) -> Option<i64> {
    let (negative, digits) = match text.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, text),
    };
    if digits.is_empty() {
        return None;
    }

    let mut value: i64 = 0;
    for &d in digits {
        if !d.is_ascii_digit() {
            return None;
        }
        let d = i64::from(d - b'0');
        value = value.checked_mul(10)?;
        // Accumulating negatives directly keeps i64::MIN representable.
        value = if negative {
            value.checked_sub(d)?
        } else {
            value.checked_add(d)?
        };
    }
    Some(value)
}
