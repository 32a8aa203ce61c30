use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::TcpConn;

/// TCP listener transport.
///
/// Provides bind/accept plus the client-side connect helpers. Addresses are
/// anything `ToSocketAddrs` accepts in string form (`host:port`).
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on `addr`.
    ///
    /// Port `0` asks the OS for an ephemeral port; see [`TcpTransport::local_addr`].
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;

        info!(%local_addr, "listening on tcp");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<TcpConn> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        Ok(TcpConn::from_std(stream))
    }

    /// Connect to a listening peer (blocking, OS default connect timeout).
    pub fn connect(addr: &str) -> Result<TcpConn> {
        let stream = TcpStream::connect(addr).map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;
        debug!(addr, "connected over tcp");
        Ok(TcpConn::from_std(stream))
    }

    /// Connect to a listening peer, giving up on each resolved address after `timeout`.
    pub fn connect_timeout(addr: &str, timeout: Duration) -> Result<TcpConn> {
        let candidates = addr.to_socket_addrs().map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;

        let mut last_err = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => {
                    debug!(addr, %candidate, "connected over tcp");
                    return Ok(TcpConn::from_std(stream));
                }
                Err(err) => {
                    debug!(addr, %candidate, error = %err, "connect attempt failed");
                    last_err = Some(err);
                }
            }
        }

        match last_err {
            Some(source) => Err(TransportError::Connect {
                addr: addr.to_string(),
                source,
            }),
            None => Err(TransportError::Unresolved {
                addr: addr.to_string(),
            }),
        }
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_bind_accept_connect() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().to_string();
        assert_ne!(listener.local_addr().port(), 0);

        let handle = std::thread::spawn(move || {
            let mut client = TcpTransport::connect(&addr).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        handle.join().unwrap();
    }

    #[test]
    fn test_connect_timeout_reaches_listener() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().to_string();

        let client = TcpTransport::connect_timeout(&addr, Duration::from_secs(2)).unwrap();
        let server = listener.accept().unwrap();

        assert_eq!(
            client.local_addr().unwrap(),
            server.peer_addr().unwrap()
        );
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on.
        let port = TcpTransport::bind("127.0.0.1:0").unwrap().local_addr().port();
        let result = TcpTransport::connect(&format!("127.0.0.1:{port}"));
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn test_bind_rejects_invalid_address() {
        let result = TcpTransport::bind("not-an-address");
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }

    #[test]
    fn test_shutdown_unblocks_reader_clone() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().to_string();
        let client = TcpTransport::connect(&addr).unwrap();
        let _server = listener.accept().unwrap();

        let mut reader = client.try_clone().unwrap();
        let blocked = std::thread::spawn(move || {
            let mut buf = [0u8; 1];
            reader.read(&mut buf)
        });

        std::thread::sleep(Duration::from_millis(50));
        client.shutdown().unwrap();

        let result = blocked.join().unwrap();
        assert!(matches!(result, Ok(0) | Err(_)));
    }

    #[test]
    fn test_read_timeout_applies() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().to_string();
        let mut client = TcpTransport::connect(&addr).unwrap();
        let _server = listener.accept().unwrap();

        client
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let mut buf = [0u8; 1];
        let err = client.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ));
    }
}
