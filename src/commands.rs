//! Typed shortcuts for common commands.
//!
//! Each method only builds an argument list and picks a visitor; anything
//! not covered here goes through [`Connection::execute`] directly.
//!
//! ```no_run
//! use respite::{Commands, Connection, TcpConnector};
//!
//! let conn = Connection::open(&TcpConnector::new("127.0.0.1:6379"))?;
//! conn.set("greeting", "hello")?;
//! let greeting: Option<String> = conn.get("greeting")?;
//! # Ok::<(), respite::Error>(())
//! ```
use indexmap::IndexMap;

use crate::{
    Arg, Connection, Entries, Error, FromBulk, Integer, Nullable, Pairs, Reader, Status, Stream,
    Text, ToArg, Transport, Visitor, cmd,
};

pub trait Commands {
    fn exec<V: Visitor>(&self, args: &[Arg<'_>], visitor: V) -> Result<V::Output, Error>;

    fn ping(&self) -> Result<String, Error> {
        self.exec(&cmd!["PING"], Status)
    }

    fn echo(&self, message: &(impl ToArg + ?Sized)) -> Result<String, Error> {
        self.exec(&cmd!["ECHO", message], Text)
    }

    /// `None` when the key does not exist.
    fn get<A: FromBulk>(&self, key: &(impl ToArg + ?Sized)) -> Result<Option<A>, Error> {
        self.exec(&cmd!["GET", key], Nullable(Reader::<A>::new()))
    }

    fn set(&self, key: &(impl ToArg + ?Sized), value: &(impl ToArg + ?Sized)) -> Result<(), Error> {
        self.exec(&cmd!["SET", key, value], Status).map(drop)
    }

    /// Returns the number of keys removed.
    fn del<K: ToArg>(&self, keys: &[K]) -> Result<i64, Error> {
        self.exec(&with_keys("DEL", keys), Integer)
    }

    /// Returns how many of `keys` exist, counting repeats.
    fn exists<K: ToArg>(&self, keys: &[K]) -> Result<i64, Error> {
        self.exec(&with_keys("EXISTS", keys), Integer)
    }

    fn incr(&self, key: &(impl ToArg + ?Sized)) -> Result<i64, Error> {
        self.exec(&cmd!["INCR", key], Integer)
    }

    fn incr_by(&self, key: &(impl ToArg + ?Sized), delta: i64) -> Result<i64, Error> {
        self.exec(&cmd!["INCRBY", key, delta], Integer)
    }

    /// Returns the number of fields that were added rather than updated.
    fn hset(
        &self,
        key: &(impl ToArg + ?Sized),
        field: &(impl ToArg + ?Sized),
        value: &(impl ToArg + ?Sized),
    ) -> Result<i64, Error> {
        self.exec(&cmd!["HSET", key, field, value], Integer)
    }

    fn hgetall<A: FromBulk>(
        &self,
        key: &(impl ToArg + ?Sized),
    ) -> Result<IndexMap<String, A>, Error> {
        self.exec(&cmd!["HGETALL", key], Pairs(Reader::<A>::new()))
    }

    /// Appends an entry and returns its id; pass `"*"` to let the server pick.
    fn xadd<F: ToArg, V: ToArg>(
        &self,
        key: &(impl ToArg + ?Sized),
        id: &(impl ToArg + ?Sized),
        fields: &[(F, V)],
    ) -> Result<String, Error> {
        let mut args = cmd!["XADD", key, id];
        for (field, value) in fields {
            args.push(field.to_arg());
            args.push(value.to_arg());
        }
        self.exec(&args, Text)
    }

    fn xrange<A: FromBulk>(
        &self,
        key: &(impl ToArg + ?Sized),
        start: &(impl ToArg + ?Sized),
        end: &(impl ToArg + ?Sized),
    ) -> Result<Entries<A>, Error> {
        self.exec(&cmd!["XRANGE", key, start, end], Stream(Reader::<A>::new()))
    }
}

impl<T: Transport> Commands for Connection<T> {
    fn exec<V: Visitor>(&self, args: &[Arg<'_>], visitor: V) -> Result<V::Output, Error> {
        self.execute(args, visitor)
    }
}

fn with_keys<'a, K: ToArg>(name: &'static str, keys: &'a [K]) -> Vec<Arg<'a>> {
    let mut args = Vec::with_capacity(keys.len() + 1);
    args.push(Arg::borrowed(name.as_bytes()));
    args.extend(keys.iter().map(ToArg::to_arg));
    args
}
