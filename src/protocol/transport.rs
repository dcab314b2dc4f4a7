use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::{debug, info};

use super::Error;

/// An ordered, reliable byte stream in both directions.
pub trait Transport: Read + Write + Send {
    /// Closes both directions of the stream.
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn shutdown(&mut self) -> io::Result<()> {
        match TcpStream::shutdown(self, Shutdown::Both) {
            // The peer may already have gone away.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Manufactures fresh transports for connections and pools.
pub trait Connect: Send + Sync {
    type Transport: Transport;

    fn connect(&self) -> Result<Self::Transport, Error>;
}

impl<F, T> Connect for F
where
    F: Fn() -> io::Result<T> + Send + Sync,
    T: Transport,
{
    type Transport = T;

    fn connect(&self) -> Result<T, Error> {
        Ok(self()?)
    }
}

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens TCP connections to a fixed address.
///
/// The connect timeout is the only timeout applied; reads and writes on an
/// established connection block until the peer answers.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
    connect_timeout: Duration,
    nodelay: bool,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            nodelay: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn resolve(&self) -> Result<Vec<SocketAddr>, Error> {
        let addrs = self.address.to_socket_addrs()?.collect::<Vec<_>>();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("'{}' did not resolve to any address", self.address),
            )
            .into());
        }
        Ok(addrs)
    }
}

impl Connect for TcpConnector {
    type Transport = TcpStream;

    fn connect(&self) -> Result<TcpStream, Error> {
        let mut last = None;
        for addr in self.resolve()? {
            debug!("connecting to {addr}");
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(self.nodelay)?;
                    info!("connected to {addr}");
                    return Ok(stream);
                }
                Err(e) => last = Some(e),
            }
        }
        Err(last
            .unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable))
            .into())
    }
}
