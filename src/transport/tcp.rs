//! TCP link.
//!
//! Carries the same byte stream as the serial line, which lets the emulator
//! serve a controller on another host or stand behind a serial-to-TCP
//! bridge. Nagle is disabled: every frame is small and latency-bound.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use super::Link;
use crate::config::LinkConfig;
use crate::error::{Result, ScaleError};

/// Smallest timeout handed to the socket; zero means "block forever" there.
const MIN_SOCKET_TIMEOUT: Duration = Duration::from_millis(1);

/// How often an idle listener rechecks its stop flag.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct TcpLink {
    stream: Option<TcpStream>,
    addr: String,
}

impl TcpLink {
    /// Connect to a listening device at `addr` (`host:port`).
    pub fn connect(addr: &str, config: &LinkConfig) -> Result<Self> {
        let target = addr
            .to_socket_addrs()
            .map_err(|e| ScaleError::Transport(format!("cannot resolve {}: {}", addr, e)))?
            .next()
            .ok_or_else(|| ScaleError::Transport(format!("{} resolves to nothing", addr)))?;
        let stream = TcpStream::connect_timeout(&target, config.write_timeout())
            .map_err(|e| map_connect_error(e, addr))?;
        info!(addr = %addr, "TCP link connected");
        Self::from_stream(stream, addr, config)
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream, addr: &str, config: &LinkConfig) -> Result<Self> {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(addr = %addr, error = %e, "failed to set TCP_NODELAY (continuing anyway)");
        }
        stream.set_write_timeout(Some(config.write_timeout().max(MIN_SOCKET_TIMEOUT)))?;
        Ok(Self {
            stream: Some(stream),
            addr: addr.to_string(),
        })
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(ScaleError::TransportClosed)
    }
}

/// Device-side listening socket, bound once and accepting one controller
/// at a time.
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    /// Bind `addr` (`host:port`).
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| ScaleError::Transport(format!("cannot bind {}: {}", addr, e)))?;
        listener.set_nonblocking(true)?;
        info!(addr = %addr, "waiting for controller");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for the next controller. Returns `None` once `stop` is set.
    pub fn accept(&self, config: &LinkConfig, stop: &AtomicBool) -> Result<Option<TcpLink>> {
        loop {
            if stop.load(Ordering::Relaxed) {
                return Ok(None);
            }
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    // Some platforms hand out accepted sockets non-blocking.
                    stream.set_nonblocking(false)?;
                    info!(peer = %peer, "controller connected");
                    return TcpLink::from_stream(stream, &peer.to_string(), config).map(Some);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ScaleError::Io(e)),
            }
        }
    }
}

impl Link for TcpLink {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream()?;
        stream.write_all(data).map_err(map_io_error)?;
        stream.flush().map_err(map_io_error)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let stream = self.stream()?;
        stream.set_read_timeout(Some(timeout.max(MIN_SOCKET_TIMEOUT)))?;
        loop {
            match stream.read(buf) {
                Ok(0) => return Err(ScaleError::TransportClosed),
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_io_error(e)),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            info!(addr = %self.addr, "TCP link closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

fn map_io_error(e: io::Error) -> ScaleError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ScaleError::Unresponsive,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => ScaleError::TransportClosed,
        _ => ScaleError::Io(e),
    }
}

fn map_connect_error(e: io::Error, addr: &str) -> ScaleError {
    match e.kind() {
        io::ErrorKind::TimedOut => ScaleError::Unresponsive,
        io::ErrorKind::ConnectionRefused => {
            ScaleError::Transport(format!("connection refused by {}", addr))
        }
        _ => ScaleError::Transport(format!("cannot connect to {}: {}", addr, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_loopback_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let config = LinkConfig::default();

        let server = thread::spawn(move || {
            let (stream, peer) = listener.accept().unwrap();
            let mut link = TcpLink::from_stream(stream, &peer.to_string(), &config).unwrap();
            let byte = link.read_byte(Duration::from_secs(2)).unwrap();
            link.send(&[byte, 0x80]).unwrap();
        });

        let mut client = TcpLink::connect(&addr, &LinkConfig::default()).unwrap();
        client.send(&[0x85]).unwrap();
        let mut buf = [0u8; 2];
        client.read_exact(&mut buf, Duration::from_secs(2)).unwrap();
        assert_eq!(buf, [0x85, 0x80]);
        server.join().unwrap();
    }

    #[test]
    fn test_read_timeout_is_unresponsive() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let mut client = TcpLink::connect(&addr, &LinkConfig::default()).unwrap();
        let (_held, _) = listener.accept().unwrap();
        let mut buf = [0u8; 1];
        assert!(matches!(
            client.receive(&mut buf, Duration::from_millis(30)),
            Err(ScaleError::Unresponsive)
        ));
    }

    #[test]
    fn test_acceptor_serves_controller() {
        let acceptor = TcpAcceptor::bind("127.0.0.1:0").unwrap();
        let addr = acceptor.local_addr().unwrap().to_string();
        let client = thread::spawn(move || {
            let mut link = TcpLink::connect(&addr, &LinkConfig::default()).unwrap();
            link.send(&[0x89]).unwrap();
        });

        let stop = AtomicBool::new(false);
        let mut link = acceptor
            .accept(&LinkConfig::default(), &stop)
            .unwrap()
            .unwrap();
        assert_eq!(link.read_byte(Duration::from_secs(2)).unwrap(), 0x89);
        client.join().unwrap();
    }

    #[test]
    fn test_idle_acceptor_honours_stop() {
        let acceptor = TcpAcceptor::bind("127.0.0.1:0").unwrap();
        let stop = AtomicBool::new(false);
        let started = std::time::Instant::now();
        thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(50));
                stop.store(true, Ordering::Relaxed);
            });
            assert!(acceptor
                .accept(&LinkConfig::default(), &stop)
                .unwrap()
                .is_none());
        });
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_closed_link() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let mut client = TcpLink::connect(&addr, &LinkConfig::default()).unwrap();
        client.close().unwrap();
        assert!(!client.is_open());
        assert!(matches!(client.send(&[1]), Err(ScaleError::TransportClosed)));
    }
}
