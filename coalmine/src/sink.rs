//! Destinations for serialized points.
//!
//! [`Destination`] is the seam between the writer and the transport. The
//! [`Sink`] enum implements it for the three supported transports: standard
//! output, a TCP stream and a connected UDP socket.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;

use crate::error::{ConfigError, WriteError};
use crate::mtu;

/// A byte destination shared by all workers of a run.
pub trait Destination: Send + Sync + 'static {
    /// Largest payload accepted by one [`send`](Destination::send), or
    /// `None` for stream destinations without a packet limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the limit cannot be determined.
    fn max_payload(&self) -> io::Result<Option<usize>>;

    /// Writes a prefix of `buf`, returning how many bytes were accepted.
    ///
    /// Packet destinations send `buf` as one datagram. Stream destinations
    /// may accept fewer bytes than offered; an error after a partial write
    /// is reported as `Ok` with the partial count.
    fn send(&self, buf: &[u8]) -> impl Future<Output = io::Result<usize>> + Send;
}

/// Parsed destination address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkAddress {
    /// `-`: standard output.
    Stdout,
    /// `tcp://host:port`.
    Tcp(String),
    /// `udp://host:port`.
    Udp(String),
}

impl SinkAddress {
    /// Parses `-`, `tcp://host:port` or `udp://host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSink`] for any other form.
    pub fn parse(address: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidSink {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        if address == "-" {
            return Ok(Self::Stdout);
        }
        let (scheme, target) = address
            .split_once("://")
            .ok_or_else(|| invalid("expected '-', 'tcp://host:port' or 'udp://host:port'"))?;
        let (host, port) = target
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;
        if host.is_empty() || host == "[]" {
            return Err(invalid("missing host"));
        }
        port.parse::<u16>()
            .map_err(|_| invalid("port must be a number in [0, 65535]"))?;

        match scheme {
            "tcp" => Ok(Self::Tcp(target.to_string())),
            "udp" => Ok(Self::Udp(target.to_string())),
            other => Err(invalid(&format!("unsupported scheme '{other}'"))),
        }
    }
}

impl FromStr for SinkAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("-"),
            Self::Tcp(target) => write!(f, "tcp://{target}"),
            Self::Udp(target) => write!(f, "udp://{target}"),
        }
    }
}

/// An open connection to one of the supported transports.
///
/// Stream transports are guarded by an async mutex so a whole buffer is
/// written contiguously even when several workers share the sink.
#[derive(Debug)]
pub enum Sink {
    /// Process standard output.
    Stdout(Mutex<tokio::io::Stdout>),
    /// A TCP connection.
    Tcp(Mutex<TcpStream>),
    /// A connected UDP socket.
    Udp(UdpSocket),
}

impl Sink {
    /// Opens the transport named by `address`.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Connect`] if the host cannot be resolved or
    /// the connection cannot be established.
    pub async fn connect(address: &SinkAddress) -> Result<Self, WriteError> {
        let connect_err = |source: io::Error| WriteError::Connect {
            address: address.to_string(),
            source,
        };

        match address {
            SinkAddress::Stdout => Ok(Self::Stdout(Mutex::new(tokio::io::stdout()))),
            SinkAddress::Tcp(target) => {
                let stream = TcpStream::connect(target.as_str())
                    .await
                    .map_err(connect_err)?;
                Ok(Self::Tcp(Mutex::new(stream)))
            }
            SinkAddress::Udp(target) => {
                let remote = tokio::net::lookup_host(target.as_str())
                    .await
                    .map_err(connect_err)?
                    .next()
                    .ok_or_else(|| {
                        connect_err(io::Error::new(
                            io::ErrorKind::NotFound,
                            "host resolved to no addresses",
                        ))
                    })?;
                let local = if remote.is_ipv4() {
                    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
                } else {
                    SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
                };
                let socket = UdpSocket::bind(local).await.map_err(connect_err)?;
                socket.connect(remote).await.map_err(connect_err)?;
                Ok(Self::Udp(socket))
            }
        }
    }
}

impl Destination for Sink {
    fn max_payload(&self) -> io::Result<Option<usize>> {
        match self {
            Self::Stdout(_) | Self::Tcp(_) => Ok(None),
            Self::Udp(socket) => mtu::udp_payload_size(socket.local_addr()?.ip()).map(Some),
        }
    }

    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout(stdout) => {
                let mut stdout = stdout.lock().await;
                let written = write_locked(&mut *stdout, buf).await?;
                stdout.flush().await?;
                Ok(written)
            }
            Self::Tcp(stream) => {
                let mut stream = stream.lock().await;
                write_locked(&mut *stream, buf).await
            }
            Self::Udp(socket) => socket.send(buf).await,
        }
    }
}

/// Writes as much of `buf` as possible while holding the stream lock.
///
/// An error after some bytes went out is returned as the partial count so
/// the caller can account for them; the next call surfaces the error.
async fn write_locked<W>(writer: &mut W, buf: &[u8]) -> io::Result<usize>
where
    W: tokio::io::AsyncWrite + Unpin + ?Sized,
{
    let mut written = 0;
    while written < buf.len() {
        match writer.write(&buf[written..]).await {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if written == 0 => return Err(e),
            Err(_) => break,
        }
    }
    Ok(written)
}
