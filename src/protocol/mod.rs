//! RESP client protocol engine.
//!
//! This module implements the client side of the REdis Serialization
//! Protocol (RESP v2): framing requests, decoding replies, and the
//! connection and pooling layers that carry them over a byte stream.
//!
//! # Overview
//!
//! A request is a list of byte-string arguments. The [`encoder`] frames it
//! and writes it to the transport; the [`Decoder`] then reads exactly one
//! reply back and drives a caller supplied [`Visitor`] with it. The visitor
//! decides what the reply becomes: a generic [`Value`] tree, a single typed
//! value through a [`Reader`], an ordered map through [`Pairs`], or nothing
//! at all with [`Discard`].
//!
//! # Key Components
//!
//! - [`Value`]: a fully materialized reply.
//! - [`Visitor`] / [`ArrayVisitor`]: double dispatch interface driven by the decoder.
//! - [`FromBulk`] / [`ToArg`]: read and write extension points for application types.
//! - [`Connection`]: one transport, one request in flight at a time.
//! - [`FixedPool`] / [`GrowablePool`]: sharing connections across threads.
//!
//! # Wire Format
//!
//! - Request: `*<argc>\r\n` then `$<len>\r\n<bytes>\r\n` per argument.
//! - Replies: `+` status, `-` error, `:` integer, `$` bulk (`-1` is null),
//!   `*` array (`-1` is null). Lines end in `\r\n`; bulk payloads are
//!   followed by a `\r\n` that is not part of the declared length.
//!
//! # See Also
//!
//! - [`commands`](crate::commands): typed wrappers built on [`Connection::execute`].
mod connection;
mod decoder;
pub mod encoder;
mod error;
mod map;
mod pool;
mod reader;
mod transport;
mod value;
mod visitor;

pub use connection::Connection;
pub use decoder::Decoder;
pub use encoder::{Arg, ToArg, write_command};
pub use error::{Error, Fault};
pub use map::{Entries, Field, FieldArray, KeyOrValue, Pairs, PairsArray, Stream, StreamArray};
pub use pool::{FixedPool, GrowablePool, Pool};
pub use reader::{FromBulk, Integer, Reader, Status, Text};
pub use transport::{Connect, TcpConnector, Transport};
pub use value::{Kind, Value};
pub use visitor::{
    ArrayVisitor, Bulk, Discard, Nullable, NullableArray, Unsupported, ValueArray, ValueVisitor,
    Visitor,
};

pub(crate) const CRLF: &[u8; 2] = b"\r\n";

pub(crate) const STATUS: u8 = b'+';
pub(crate) const ERROR: u8 = b'-';
pub(crate) const INTEGER: u8 = b':';
pub(crate) const BULK: u8 = b'$';
pub(crate) const ARRAY: u8 = b'*';

/// Length announcing a null bulk string or a null array.
pub(crate) const NULL_LENGTH: i64 = -1;

/// Upper bound for capacity reserved from an untrusted length header.
pub(crate) const PREALLOC_LIMIT: usize = 4096;

/// Deepest array nesting a reply may use. Decoding recurses once per
/// level, so deeper replies are refused as a protocol violation before
/// they can exhaust the thread's stack.
pub(crate) const MAX_DEPTH: usize = 128;

/// Longest status, error or header line accepted, without its CRLF.
pub(crate) const MAX_LINE: usize = 64 * 1024;
