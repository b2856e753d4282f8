//! Socket transport to the daemon.
//!
//! [`Stream`] wraps either a TCP or a Unix stream so the connection code can
//! stay transport agnostic.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
#[cfg(any(test, feature = "test-support"))]
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use mpdctl_config::SocketEndpoint;

use crate::ClientError;

#[derive(Debug)]
pub(crate) enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    pub(crate) fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(stream) => stream.try_clone().map(Self::Tcp),
            #[cfg(unix)]
            Self::Unix(stream) => stream.try_clone().map(Self::Unix),
        }
    }

    #[cfg(any(test, feature = "test-support"))]
    pub(crate) fn prepare_for_serving(&self, read_timeout: Duration) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => {
                stream.set_nonblocking(false)?;
                stream.set_read_timeout(Some(read_timeout))
            }
            #[cfg(unix)]
            Self::Unix(stream) => {
                stream.set_nonblocking(false)?;
                stream.set_read_timeout(Some(read_timeout))
            }
        }
    }

    pub(crate) fn shutdown(&self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Self::Unix(stream) => stream.shutdown(Shutdown::Both),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Opens a stream to `endpoint`. There is no connect timeout; an unreachable
/// host blocks for as long as the operating system allows.
pub(crate) fn open(endpoint: &SocketEndpoint) -> Result<Stream, ClientError> {
    match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let endpoint_display = endpoint.to_string();
            let addresses =
                resolve_tcp_addresses(host, *port).map_err(|error| ClientError::Resolve {
                    endpoint: endpoint_display.clone(),
                    source: error.into(),
                })?;
            TcpStream::connect(addresses.as_slice())
                .map(Stream::Tcp)
                .map_err(|source| ClientError::Connect {
                    endpoint: endpoint_display,
                    source: source.into(),
                })
        }
        #[cfg(unix)]
        SocketEndpoint::Unix { path } => UnixStream::connect(path.as_std_path())
            .map(Stream::Unix)
            .map_err(|source| ClientError::Connect {
                endpoint: endpoint.to_string(),
                source: source.into(),
            }),
        #[cfg(not(unix))]
        SocketEndpoint::Unix { .. } => {
            Err(ClientError::UnsupportedUnixTransport(endpoint.to_string()))
        }
    }
}

fn resolve_tcp_addresses(host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
    let addresses: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
    if addresses.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no resolved addresses",
        ));
    }
    Ok(addresses)
}
