use std::{
    io::{self, BufReader, Write},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use log::{debug, info, warn};

use super::{
    Arg, Connect, Decoder, Error, Fault, Transport, Value, ValueVisitor, Visitor, write_command,
};

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

/// Capacity of the request buffer each connection keeps for its lifetime.
const REQUEST_BUFFER: usize = 8 * 1024;

/// Both directions of a stream, each with its reusable buffer.
struct Channel<T> {
    decoder: Decoder<BufReader<T>>,
    request: Vec<u8>,
}

impl<T: Transport> Channel<T> {
    fn new(transport: T) -> Self {
        Self {
            decoder: Decoder::new(BufReader::new(transport)),
            request: Vec::with_capacity(REQUEST_BUFFER),
        }
    }

    fn round_trip<V: Visitor>(
        &mut self,
        args: &[Arg<'_>],
        visitor: V,
    ) -> Result<V::Output, Error> {
        self.request.clear();
        let mut out = Staged {
            buffer: &mut self.request,
            sink: self.decoder.get_mut().get_mut(),
        };
        write_command(&mut out, args)?;
        out.flush()?;

        self.decoder.decode(visitor)
    }
}

/// Collects request bytes in a borrowed buffer that never grows past
/// [`REQUEST_BUFFER`]; writes that would not fit go to the sink directly.
struct Staged<'a, W: Write> {
    buffer: &'a mut Vec<u8>,
    sink: &'a mut W,
}

impl<W: Write> Staged<'_, W> {
    fn drain(&mut self) -> io::Result<()> {
        self.sink.write_all(self.buffer.as_slice())?;
        self.buffer.clear();
        Ok(())
    }
}

impl<W: Write> Write for Staged<'_, W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.buffer.len() + data.len() > REQUEST_BUFFER {
            self.drain()?;
        }
        if data.len() >= REQUEST_BUFFER {
            return self.sink.write(data);
        }
        self.buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain()?;
        self.sink.flush()
    }
}

/// A single client connection.
///
/// One request/reply cycle runs at a time: [`Connection::execute`] holds an
/// internal lock from the first byte written until the reply has been fully
/// decoded, so concurrent callers queue up instead of interleaving on the
/// stream. Callers wanting parallelism use several connections through a
/// [`Pool`](super::Pool).
pub struct Connection<T: Transport> {
    id: usize,
    channel: Mutex<Option<Channel<T>>>,
    broken: AtomicBool,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!("connection {id} opened");
        Self {
            id,
            channel: Mutex::new(Some(Channel::new(transport))),
            broken: AtomicBool::new(false),
        }
    }

    pub fn open<C>(connector: &C) -> Result<Self, Error>
    where
        C: Connect<Transport = T> + ?Sized,
    {
        connector.connect().map(Self::new)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Sends `args` as one request and decodes the reply with `visitor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] for an error reply, the visitor's error if it
    /// rejects the reply, and a fatal [`Error::Fault`] when the stream broke.
    /// After a fault the connection reports [`Connection::is_broken`].
    pub fn execute<V: Visitor>(&self, args: &[Arg<'_>], visitor: V) -> Result<V::Output, Error> {
        let mut guard = self
            .channel
            .lock()
            .map_err(|_| Error::protocol("a previous request panicked mid-reply"))?;
        let channel = guard.as_mut().ok_or(Fault::Closed)?;

        if log::log_enabled!(log::Level::Debug) {
            let name = args
                .first()
                .map(|arg| String::from_utf8_lossy(arg.as_bytes()).into_owned())
                .unwrap_or_default();
            debug!("connection {} sending {name} with {} args", self.id, args.len());
        }

        let result = channel.round_trip(args, visitor);
        if let Err(e) = &result {
            if e.is_fatal() {
                warn!("connection {} is broken: {e}", self.id);
                self.broken.store(true, Ordering::Release);
            }
        }
        result
    }

    /// Like [`Connection::execute`], materializing the reply as a [`Value`].
    pub fn call(&self, args: &[Arg<'_>]) -> Result<Value, Error> {
        self.execute(args, ValueVisitor)
    }

    /// Shuts the transport down. Any later use fails with [`Fault::Closed`],
    /// including a second `close`.
    pub fn close(&self) -> Result<(), Error> {
        let channel = self.lock().take().ok_or(Fault::Closed)?;
        info!("closing connection {}", self.id);
        channel.decoder.into_inner().into_inner().shutdown()?;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Whether a fatal error or a panic left the stream position unknown.
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire) || self.channel.is_poisoned()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Channel<T>>> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
