//! # Endpoints and socket streams.
//!
//! An [`Endpoint`] names where a subscriber listens:
//!
//! ```text
//! tcp://127.0.0.1:5000     ─► Endpoint::Tcp
//! ipc:///tmp/nos/l2.sock   ─► Endpoint::Unix
//! unix:///tmp/nos/l2.sock  ─► Endpoint::Unix
//! ```
//!
//! [`Stream`] unifies the two socket families behind one type so the reactor and
//! the client do not care which one they hold.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Address of a listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Endpoint {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl Endpoint {
    fn invalid(raw: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason: reason.into(),
        }
    }
}

impl FromStr for Endpoint {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if let Some(addr) = raw.strip_prefix("tcp://") {
            let resolved = addr
                .to_socket_addrs()
                .map_err(|e| Self::invalid(raw, e.to_string()))?
                .next()
                .ok_or_else(|| Self::invalid(raw, "address resolves to nothing"))?;
            return Ok(Endpoint::Tcp(resolved));
        }
        let path = raw
            .strip_prefix("ipc://")
            .or_else(|| raw.strip_prefix("unix://"))
            .ok_or_else(|| Self::invalid(raw, "expected tcp://, ipc:// or unix://"))?;
        if path.is_empty() {
            return Err(Self::invalid(raw, "empty socket path"));
        }
        Ok(Endpoint::Unix(PathBuf::from(path)))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = ConfigError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Endpoint> for String {
    fn from(ep: Endpoint) -> Self {
        ep.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            Endpoint::Unix(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}

/// Connected socket of either family.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Stream {
    /// Opens a blocking connection, bounded by `timeout` for TCP.
    pub fn connect(endpoint: &Endpoint, timeout: Duration) -> io::Result<Stream> {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let s = TcpStream::connect_timeout(addr, timeout)?;
                s.set_nodelay(true)?;
                Ok(Stream::Tcp(s))
            }
            Endpoint::Unix(path) => Ok(Stream::Unix(UnixStream::connect(path)?)),
        }
    }

    pub fn set_nonblocking(&self, on: bool) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.set_nonblocking(on),
            Stream::Unix(s) => s.set_nonblocking(on),
        }
    }

    /// Sets both read and write timeouts (`None` blocks forever).
    pub fn set_timeouts(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
            Stream::Unix(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
        }
    }

    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.shutdown(Shutdown::Both),
            Stream::Unix(s) => s.shutdown(Shutdown::Both),
        }
    }

    /// Peer address for logs.
    pub fn peer(&self) -> String {
        match self {
            Stream::Tcp(s) => s
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "tcp:?".to_string()),
            Stream::Unix(_) => "unix".to_string(),
        }
    }
}

impl Read for &Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => (&*s).read(buf),
            Stream::Unix(s) => (&*s).read(buf),
        }
    }
}

impl Write for &Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => (&*s).write(buf),
            Stream::Unix(s) => (&*s).write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => (&*s).flush(),
            Stream::Unix(s) => (&*s).flush(),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&*self).read(buf)
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self).flush()
    }
}

impl AsFd for Stream {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            Stream::Tcp(s) => s.as_fd(),
            Stream::Unix(s) => s.as_fd(),
        }
    }
}

impl AsRawFd for Stream {
    fn as_raw_fd(&self) -> RawFd {
        self.as_fd().as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_and_unix() {
        let tcp: Endpoint = "tcp://127.0.0.1:7000".parse().unwrap();
        assert_eq!(tcp, Endpoint::Tcp("127.0.0.1:7000".parse().unwrap()));
        assert_eq!(tcp.to_string(), "tcp://127.0.0.1:7000");

        let ipc: Endpoint = "ipc:///tmp/nos.sock".parse().unwrap();
        assert_eq!(ipc, Endpoint::Unix(PathBuf::from("/tmp/nos.sock")));
        let unix: Endpoint = "unix:///tmp/nos.sock".parse().unwrap();
        assert_eq!(unix, ipc);
    }

    #[test]
    fn test_parse_rejects_unknown_scheme() {
        let err = "udp://127.0.0.1:1".parse::<Endpoint>().unwrap_err();
        assert_eq!(err.as_label(), "config_invalid_endpoint");
        assert!("ipc://".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_serde_uses_string_form() {
        let ep: Endpoint = serde_json::from_str("\"tcp://127.0.0.1:9\"").unwrap();
        assert_eq!(serde_json::to_string(&ep).unwrap(), "\"tcp://127.0.0.1:9\"");
    }
}
