//! In-process duplex link pair.
//!
//! Each side owns a sender to its peer and a receiver for its own input.
//! Dropping or closing one side makes the other see `TransportClosed` once its
//! buffered input is consumed.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use super::Link;
use crate::error::{Result, ScaleError};

#[derive(Debug)]
pub struct MemoryLink {
    tx: Option<Sender<Vec<u8>>>,
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
    open: bool,
}

impl MemoryLink {
    /// Two connected ends: bytes sent on one are received on the other.
    pub fn pair() -> (MemoryLink, MemoryLink) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        (
            MemoryLink::new(a_tx, a_rx),
            MemoryLink::new(b_tx, b_rx),
        )
    }

    fn new(tx: Sender<Vec<u8>>, rx: Receiver<Vec<u8>>) -> Self {
        Self {
            tx: Some(tx),
            rx,
            pending: VecDeque::new(),
            open: true,
        }
    }

    fn take_pending(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.pending.len());
        for (slot, b) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = b;
        }
        n
    }
}

impl Link for MemoryLink {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(ScaleError::TransportClosed)?;
        tx.send(data.to_vec())
            .map_err(|_| ScaleError::TransportClosed)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.open {
            return Err(ScaleError::TransportClosed);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending.is_empty() {
            let chunk = match self.rx.recv_timeout(timeout) {
                Ok(chunk) => chunk,
                Err(RecvTimeoutError::Timeout) => return Err(ScaleError::Unresponsive),
                Err(RecvTimeoutError::Disconnected) => return Err(ScaleError::TransportClosed),
            };
            self.pending.extend(chunk);
        }
        while let Ok(chunk) = self.rx.try_recv() {
            self.pending.extend(chunk);
        }
        Ok(self.take_pending(buf))
    }

    fn close(&mut self) -> Result<()> {
        self.tx = None;
        self.open = false;
        self.pending.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn clear_input(&mut self) -> Result<()> {
        self.pending.clear();
        while self.rx.try_recv().is_ok() {}
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_duplex() {
        let (mut a, mut b) = MemoryLink::pair();
        a.send(b"ping").unwrap();
        b.send(b"pong").unwrap();
        let mut buf = [0u8; 8];
        let n = b.receive(&mut buf, Duration::from_millis(100)).unwrap();
        assert_eq!(&buf[..n], b"ping");
        let n = a.receive(&mut buf, Duration::from_millis(100)).unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[test]
    fn test_partial_reads_keep_remainder() {
        let (mut a, mut b) = MemoryLink::pair();
        a.send(&[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(b.receive(&mut buf, Duration::from_millis(50)).unwrap(), 3);
        assert_eq!(b.receive(&mut buf, Duration::from_millis(50)).unwrap(), 1);
        assert_eq!(buf[0], 4);
    }

    #[test]
    fn test_peer_close_is_transport_closed() {
        let (mut a, mut b) = MemoryLink::pair();
        a.close().unwrap();
        drop(a);
        let mut buf = [0u8; 1];
        assert!(matches!(
            b.receive(&mut buf, Duration::from_millis(50)),
            Err(ScaleError::TransportClosed)
        ));
        assert!(matches!(b.send(&[1]), Err(ScaleError::TransportClosed)));
    }

    #[test]
    fn test_closed_side_rejects_io() {
        let (mut a, _b) = MemoryLink::pair();
        a.close().unwrap();
        assert!(!a.is_open());
        assert!(matches!(a.send(&[1]), Err(ScaleError::TransportClosed)));
    }

    #[test]
    fn test_clear_input() {
        let (mut a, mut b) = MemoryLink::pair();
        a.send(&[9, 9, 9]).unwrap();
        b.clear_input().unwrap();
        let mut buf = [0u8; 1];
        assert!(matches!(
            b.receive(&mut buf, Duration::from_millis(10)),
            Err(ScaleError::Unresponsive)
        ));
    }
}
