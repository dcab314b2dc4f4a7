//! Composite visitors for key/value shaped replies.
//!
//! Many commands answer with a flat array alternating keys and values
//! (`HGETALL`, `CONFIG GET`), or with an array of `[id, [field, value, ..]]`
//! entries (`XRANGE`). Both are decoded into [`IndexMap`]s so that keys keep
//! the order in which they arrived on the wire.
use indexmap::IndexMap;

use super::{ArrayVisitor, Bulk, Error, PREALLOC_LIMIT, Text, Visitor};

/// One element of an alternating array.
#[derive(Debug, PartialEq)]
pub enum Field<O> {
    Key(String),
    Value(O),
}

/// Child visitor of [`Pairs`]: decodes a key as text or a value with `V`.
#[derive(Debug, Clone, Copy)]
pub enum KeyOrValue<V> {
    Key,
    Value(V),
}

impl<V: Visitor> Visitor for KeyOrValue<V> {
    type Output = Field<V::Output>;
    type Array = FieldArray<V::Array>;

    fn visit_status(self, status: &str) -> Result<Self::Output, Error> {
        match self {
            KeyOrValue::Key => Text.visit_status(status).map(Field::Key),
            KeyOrValue::Value(v) => v.visit_status(status).map(Field::Value),
        }
    }

    fn visit_integer(self, value: i64) -> Result<Self::Output, Error> {
        match self {
            KeyOrValue::Key => Text.visit_integer(value).map(Field::Key),
            KeyOrValue::Value(v) => v.visit_integer(value).map(Field::Value),
        }
    }

    fn visit_bulk(self, bulk: &mut Bulk<'_>) -> Result<Self::Output, Error> {
        match self {
            KeyOrValue::Key => Text.visit_bulk(bulk).map(Field::Key),
            KeyOrValue::Value(v) => v.visit_bulk(bulk).map(Field::Value),
        }
    }

    fn visit_null(self) -> Result<Self::Output, Error> {
        match self {
            KeyOrValue::Key => Text.visit_null().map(Field::Key),
            KeyOrValue::Value(v) => v.visit_null().map(Field::Value),
        }
    }

    fn visit_array(self, len: usize) -> Result<Self::Array, Error> {
        match self {
            KeyOrValue::Key => Text.visit_array(len).map(|never| never.unreachable()),
            KeyOrValue::Value(v) => v.visit_array(len).map(FieldArray),
        }
    }
}

/// Array visitor of a value slot; tags its result as [`Field::Value`].
pub struct FieldArray<A>(A);

impl<A: ArrayVisitor> ArrayVisitor for FieldArray<A> {
    type Output = Field<A::Output>;
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
        self.0.visit_end().map(Field::Value)
    }
}

/// Decodes `[k1, v1, k2, v2, ..]` into an ordered map, values through `V`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Pairs<V>(pub V);

impl<V: Visitor + Clone> Visitor for Pairs<V> {
    type Output = IndexMap<String, V::Output>;
    type Array = PairsArray<V>;

    fn visit_array(self, len: usize) -> Result<Self::Array, Error> {
        Ok(PairsArray {
            map: IndexMap::with_capacity((len / 2).min(PREALLOC_LIMIT)),
            element: self.0,
            key: None,
            expect_key: true,
        })
    }
}

pub struct PairsArray<V: Visitor> {
    map: IndexMap<String, V::Output>,
    element: V,
    key: Option<String>,
    expect_key: bool,
}

impl<V: Visitor + Clone> ArrayVisitor for PairsArray<V> {
    type Output = IndexMap<String, V::Output>;
    type Child = KeyOrValue<V>;

    fn visit_index(&mut self, index: usize) {
        self.expect_key = index % 2 == 0;
    }

    fn child(&mut self) -> KeyOrValue<V> {
        if self.expect_key {
            KeyOrValue::Key
        } else {
            KeyOrValue::Value(self.element.clone())
        }
    }

    fn visit_value(&mut self, value: Field<V::Output>) -> Result<(), Error> {
        match value {
            Field::Key(key) => self.key = Some(key),
            Field::Value(value) => {
                if let Some(key) = self.key.take() {
                    self.map.insert(key, value);
                }
            }
        }
        Ok(())
    }

    fn visit_end(self) -> Result<Self::Output, Error> {
        match self.key {
            Some(key) => Err(Error::Conversion(format!("key '{key}' has no value"))),
            None => Ok(self.map),
        }
    }
}

/// Stream entries keyed by id, then by field.
pub type Entries<O> = IndexMap<String, IndexMap<String, O>>;

/// Decodes `[[id, [f1, v1, ..]], ..]` into [`Entries`], values through `V`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stream<V>(pub V);

impl<V: Visitor + Clone> Visitor for Stream<V> {
    type Output = Entries<V::Output>;
    type Array = StreamArray<V>;

    fn visit_array(self, len: usize) -> Result<Self::Array, Error> {
        Ok(StreamArray {
            entries: IndexMap::with_capacity(len.min(PREALLOC_LIMIT)),
            element: self.0,
        })
    }
}

pub struct StreamArray<V: Visitor> {
    entries: Entries<V::Output>,
    element: V,
}

impl<V: Visitor + Clone> ArrayVisitor for StreamArray<V> {
    type Output = Entries<V::Output>;
    type Child = Pairs<Pairs<V>>;

    fn child(&mut self) -> Self::Child {
        Pairs(Pairs(self.element.clone()))
    }

    fn visit_value(&mut self, entry: Entries<V::Output>) -> Result<(), Error> {
        self.entries.extend(entry);
        Ok(())
    }

    fn visit_end(self) -> Result<Self::Output, Error> {
        Ok(self.entries)
    }
}
