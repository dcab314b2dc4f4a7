//! Double dispatch between the decoder and the caller.
//!
//! The decoder reads a type tag and calls the matching method on a
//! [`Visitor`]; the visitor decides what to build. Every method has a
//! default that fails with [`Error::UnexpectedShape`], so a visitor only
//! spells out the shapes it expects.
//!
//! Arrays are decoded through a second level [`ArrayVisitor`] which hands
//! out one child visitor per element and folds the decoded children into
//! the final result.
use std::{
    convert::Infallible,
    io::{self, Read},
    marker::PhantomData,
};

use bytes::Bytes;

use super::{Error, Kind, PREALLOC_LIMIT, Value};

/// Bounded view over the bytes of one bulk payload.
///
/// Reads never go past the declared length. The decoder checks that the
/// visitor consumed every byte before it looks at the trailing terminator.
pub struct Bulk<'a> {
    source: &'a mut dyn Read,
    len: usize,
    remaining: usize,
}

impl<'a> Bulk<'a> {
    pub(crate) fn new(source: &'a mut dyn Read, len: usize) -> Self {
        Self {
            source,
            len,
            remaining: len,
        }
    }

    /// Declared length of the payload.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Reads the rest of the payload into a freshly allocated buffer.
    pub fn read_to_vec(&mut self) -> Result<Vec<u8>, Error> {
        let want = self.remaining;
        let mut buf = Vec::with_capacity(want.min(PREALLOC_LIMIT));
        self.read_to_end(&mut buf)?;
        if buf.len() < want {
            return Err(Error::protocol("stream ended too soon"));
        }
        Ok(buf)
    }

    pub fn read_to_bytes(&mut self) -> Result<Bytes, Error> {
        self.read_to_vec().map(Bytes::from)
    }

    /// Consumes and drops the rest of the payload.
    pub fn skip(&mut self) -> Result<(), Error> {
        let want = self.remaining as u64;
        let skipped = io::copy(&mut self.by_ref().take(want), &mut io::sink())?;
        if skipped < want {
            return Err(Error::protocol("stream ended too soon"));
        }
        Ok(())
    }
}

impl Read for Bulk<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let max = buf.len().min(self.remaining);
        if max == 0 {
            return Ok(0);
        }
        let n = self.source.read(&mut buf[..max])?;
        self.remaining -= n;
        Ok(n)
    }
}

/// Builds a value of type `Output` from whichever shape arrives.
///
/// `visit_bulk` must consume exactly `bulk.len()` bytes before returning
/// `Ok`; leaving bytes behind is reported as a fatal `Unconsumed` fault.
pub trait Visitor: Sized {
    type Output;
    type Array: ArrayVisitor<Output = Self::Output>;

    fn visit_status(self, status: &str) -> Result<Self::Output, Error> {
        let _ = status;
        Err(Error::UnexpectedShape(Kind::Status))
    }

    fn visit_integer(self, value: i64) -> Result<Self::Output, Error> {
        let _ = value;
        Err(Error::UnexpectedShape(Kind::Integer))
    }

    fn visit_bulk(self, bulk: &mut Bulk<'_>) -> Result<Self::Output, Error> {
        let _ = bulk;
        Err(Error::UnexpectedShape(Kind::Bulk))
    }

    fn visit_null(self) -> Result<Self::Output, Error> {
        Err(Error::UnexpectedShape(Kind::Null))
    }

    /// Called with the element count of a non-null array. The returned
    /// visitor is driven exactly `len` times before `visit_end`.
    fn visit_array(self, len: usize) -> Result<Self::Array, Error> {
        let _ = len;
        Err(Error::UnexpectedShape(Kind::Array))
    }
}

pub trait ArrayVisitor: Sized {
    type Output;
    type Child: Visitor;

    /// Called before each element with its zero-based position.
    fn visit_index(&mut self, index: usize) {
        let _ = index;
    }

    /// Visitor used to decode the next element.
    fn child(&mut self) -> Self::Child;

    fn visit_value(&mut self, value: <Self::Child as Visitor>::Output) -> Result<(), Error>;

    fn visit_end(self) -> Result<Self::Output, Error>;
}

/// Array visitor for visitors that never accept arrays.
///
/// It cannot be constructed; naming it as `Visitor::Array` documents that
/// `visit_array` keeps its failing default.
pub struct Unsupported<O> {
    never: Infallible,
    _output: PhantomData<O>,
}

impl<O> Unsupported<O> {
    /// Converts the impossible value into any type.
    pub fn unreachable<T>(self) -> T {
        match self.never {}
    }
}

impl<O> ArrayVisitor for Unsupported<O> {
    type Output = O;
    type Child = Discard;

    fn child(&mut self) -> Self::Child {
        match self.never {}
    }

    fn visit_value(&mut self, _: ()) -> Result<(), Error> {
        match self.never {}
    }

    fn visit_end(self) -> Result<Self::Output, Error> {
        match self.never {}
    }
}

/// Materializes the reply as a [`Value`] tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValueVisitor;

impl Visitor for ValueVisitor {
    type Output = Value;
    type Array = ValueArray;

    fn visit_status(self, status: &str) -> Result<Value, Error> {
        Ok(Value::Status(status.to_string()))
    }

    fn visit_integer(self, value: i64) -> Result<Value, Error> {
        Ok(Value::Integer(value))
    }

    fn visit_bulk(self, bulk: &mut Bulk<'_>) -> Result<Value, Error> {
        bulk.read_to_bytes().map(Value::Bulk)
    }

    fn visit_null(self) -> Result<Value, Error> {
        Ok(Value::Null)
    }

    fn visit_array(self, len: usize) -> Result<ValueArray, Error> {
        Ok(ValueArray {
            items: Vec::with_capacity(len.min(PREALLOC_LIMIT)),
        })
    }
}

#[derive(Debug)]
pub struct ValueArray {
    items: Vec<Value>,
}

impl ArrayVisitor for ValueArray {
    type Output = Value;
    type Child = ValueVisitor;

    fn child(&mut self) -> ValueVisitor {
        ValueVisitor
    }

    fn visit_value(&mut self, value: Value) -> Result<(), Error> {
        self.items.push(value);
        Ok(())
    }

    fn visit_end(self) -> Result<Value, Error> {
        Ok(Value::Array(self.items))
    }
}

/// Walks any reply and drops it, keeping the stream position in sync.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl Visitor for Discard {
    type Output = ();
    type Array = Discard;

    fn visit_status(self, _: &str) -> Result<(), Error> {
        Ok(())
    }

    fn visit_integer(self, _: i64) -> Result<(), Error> {
        Ok(())
    }

    fn visit_bulk(self, bulk: &mut Bulk<'_>) -> Result<(), Error> {
        bulk.skip()
    }

    fn visit_null(self) -> Result<(), Error> {
        Ok(())
    }

    fn visit_array(self, _: usize) -> Result<Discard, Error> {
        Ok(Discard)
    }
}

impl ArrayVisitor for Discard {
    type Output = ();
    type Child = Discard;

    fn child(&mut self) -> Discard {
        Discard
    }

    fn visit_value(&mut self, _: ()) -> Result<(), Error> {
        Ok(())
    }

    fn visit_end(self) -> Result<(), Error> {
        Ok(())
    }
}

/// Maps a null reply to `None` and everything else to `Some`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Nullable<V>(pub V);

impl<V: Visitor> Visitor for Nullable<V> {
    type Output = Option<V::Output>;
    type Array = NullableArray<V::Array>;

    fn visit_status(self, status: &str) -> Result<Self::Output, Error> {
        self.0.visit_status(status).map(Some)
    }

    fn visit_integer(self, value: i64) -> Result<Self::Output, Error> {
        self.0.visit_integer(value).map(Some)
    }

    fn visit_bulk(self, bulk: &mut Bulk<'_>) -> Result<Self::Output, Error> {
        self.0.visit_bulk(bulk).map(Some)
    }

    fn visit_null(self) -> Result<Self::Output, Error> {
        Ok(None)
    }

    fn visit_array(self, len: usize) -> Result<Self::Array, Error> {
        self.0.visit_array(len).map(NullableArray)
    }
}

pub struct NullableArray<A>(A);

impl<A: ArrayVisitor> ArrayVisitor for NullableArray<A> {
    type Output = Option<A::Output>;
    type Child = A::Child;

    fn visit_index(&mut self, index: usize) {
        self.0.visit_index(index)
    }

    fn child(&mut self) -> Self::Child {
        self.0.child()
    }

    fn visit_value(&mut self, value: <Self::Child as Visitor>::Output) -> Result<(), Error> {
        self.0.visit_value(value)
    }

    fn visit_end(self) -> Result<Self::Output, Error> {
        self.0.visit_end().map(Some)
    }
}
