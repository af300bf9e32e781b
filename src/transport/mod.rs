//! # Link Layer
//!
//! Byte-oriented duplex channels between controller and scale. A link knows
//! nothing about commands or markers: it moves bytes and enforces timeouts.
//!
//! ## Available Links
//!
//! | Link | Channel string | Use |
//! |------|----------------|-----|
//! | [`SerialLink`] | `/dev/ttyUSB0` | real scale, virtual COM pair |
//! | [`TcpLink`] | `tcp://host:port` | emulator over the network |
//! | [`MemoryLink`] | (in process) | tests, embedding |
//! | [`MockLink`] | (in process) | scripted byte-exact tests |
//!
//! ## Timeout Semantics
//!
//! `receive` waits up to `timeout` for at least one byte. No byte in time is
//! [`ScaleError::Unresponsive`]; a peer that went away is
//! [`ScaleError::TransportClosed`], and every later call fails the same way.

pub mod memory;
pub mod mock;
pub mod serial;
pub mod tcp;

pub use memory::MemoryLink;
pub use mock::MockLink;
pub use serial::SerialLink;
pub use tcp::{TcpAcceptor, TcpLink};

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::LinkConfig;
use crate::error::{Result, ScaleError};

/// Prefix selecting [`TcpLink`] in a channel string.
pub const TCP_PREFIX: &str = "tcp://";

/// Synchronous byte channel.
pub trait Link: Send {
    /// Write all of `data`, bounded by the link's write timeout.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Read at least one byte into `buf`, waiting up to `timeout`.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Tear the link down. Pending and later operations see `TransportClosed`.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Discard whatever input is already buffered.
    fn clear_input(&mut self) -> Result<()> {
        self.drain(Duration::ZERO).map(|_| ())
    }

    /// Fill `buf` completely before `timeout` elapses.
    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut filled = 0;
        while filled < buf.len() {
            let left = deadline.saturating_duration_since(Instant::now());
            filled += self.receive(&mut buf[filled..], left)?;
        }
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b, timeout)?;
        Ok(b[0])
    }

    /// Read and discard until the line stays silent for `quiet`.
    ///
    /// Returns the number of bytes thrown away.
    fn drain(&mut self, quiet: Duration) -> Result<usize> {
        let mut buf = [0u8; 64];
        let mut total = 0;
        loop {
            match self.receive(&mut buf, quiet) {
                Ok(n) => total += n,
                Err(ScaleError::Unresponsive) => break,
                Err(e) => return Err(e),
            }
        }
        if total > 0 {
            debug!(bytes = total, "drained stale input");
        }
        Ok(total)
    }
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        (**self).send(data)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).receive(buf, timeout)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn clear_input(&mut self) -> Result<()> {
        (**self).clear_input()
    }
}

/// Open the controller side of the channel named in `config`.
pub fn open_link(config: &LinkConfig) -> Result<Box<dyn Link>> {
    match config.channel.strip_prefix(TCP_PREFIX) {
        Some(addr) => Ok(Box::new(TcpLink::connect(addr, config)?)),
        None => Ok(Box::new(SerialLink::open(config)?)),
    }
}

/// Device side of the channel named in `config`.
///
/// A TCP channel binds once and yields one link per connecting controller.
/// A serial channel yields its single link once.
#[derive(Debug)]
pub struct Listener {
    config: LinkConfig,
    tcp: Option<TcpAcceptor>,
    served: bool,
}

impl Listener {
    pub fn open(config: &LinkConfig) -> Result<Self> {
        let tcp = match config.channel.strip_prefix(TCP_PREFIX) {
            Some(addr) => Some(TcpAcceptor::bind(addr)?),
            None => None,
        };
        Ok(Self {
            config: config.clone(),
            tcp,
            served: false,
        })
    }

    /// The next link to serve, or `None` once `stop` is set or a serial
    /// channel has already been handed out.
    pub fn next_link(&mut self, stop: &AtomicBool) -> Result<Option<Box<dyn Link>>> {
        if stop.load(Ordering::Relaxed) {
            return Ok(None);
        }
        match &self.tcp {
            Some(acceptor) => Ok(acceptor
                .accept(&self.config, stop)?
                .map(|link| Box::new(link) as Box<dyn Link>)),
            None if self.served => Ok(None),
            None => {
                self.served = true;
                Ok(Some(Box::new(SerialLink::open(&self.config)?)))
            }
        }
    }
}

/// Hex dump for frame logging.
pub(crate) fn hex(bytes: &[u8]) -> String {
    const MAX: usize = 32;
    let mut out: Vec<String> = bytes
        .iter()
        .take(MAX)
        .map(|b| format!("{:02X}", b))
        .collect();
    if bytes.len() > MAX {
        out.push(format!("... (+{} bytes)", bytes.len() - MAX));
    }
    out.join(" ")
}
