//! Scripted link for byte-exact protocol tests.
//!
//! Each expectation pairs a request with the bytes the "device" answers.
//! `receive` never waits: once the queued bytes run out it reports a timeout
//! straight away, so tests that exercise `Unresponsive` stay fast.
//!
//! ```
//! use scalelink::transport::{Link, MockLink};
//! use std::time::Duration;
//!
//! let mut link = MockLink::new();
//! link.expect(&[0x86], &[0x80]);
//! link.send(&[0x86]).unwrap();
//! assert_eq!(link.read_byte(Duration::from_millis(10)).unwrap(), 0x80);
//! assert_eq!(link.remaining(), 0);
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use super::{Link, hex};
use crate::error::{Result, ScaleError};

#[derive(Debug)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

#[derive(Debug)]
pub struct MockLink {
    expectations: VecDeque<Expectation>,
    incoming: VecDeque<u8>,
    sent_log: Vec<Vec<u8>>,
    open: bool,
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLink {
    pub fn new() -> Self {
        MockLink {
            expectations: VecDeque::new(),
            incoming: VecDeque::new(),
            sent_log: Vec::new(),
            open: true,
        }
    }

    /// When exactly `request` is sent, queue `response` for reading.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Queue bytes that arrive without a request (stray markers, noise).
    pub fn push_incoming(&mut self, bytes: &[u8]) {
        self.incoming.extend(bytes);
    }

    /// Every `send` call in order.
    pub fn sent_data(&self) -> &[Vec<u8>] {
        &self.sent_log
    }

    /// Queued bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.incoming.len()
    }

    /// Expectations not yet consumed.
    pub fn pending_expectations(&self) -> usize {
        self.expectations.len()
    }
}

impl Link for MockLink {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(ScaleError::TransportClosed);
        }
        self.sent_log.push(data.to_vec());
        let next = self.expectations.pop_front().ok_or_else(|| {
            ScaleError::Transport(format!("unexpected send: {}", hex(data)))
        })?;
        if next.request != data {
            return Err(ScaleError::Transport(format!(
                "expected {}, got {}",
                hex(&next.request),
                hex(data)
            )));
        }
        self.incoming.extend(next.response);
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.open {
            return Err(ScaleError::TransportClosed);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        if self.incoming.is_empty() {
            return Err(ScaleError::Unresponsive);
        }
        let n = buf.len().min(self.incoming.len());
        for (slot, b) in buf.iter_mut().zip(self.incoming.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    /// Stray bytes are only dropped by an explicit drain, so tests can
    /// observe what the controller leaves behind.
    fn clear_input(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_exchange() {
        let mut link = MockLink::new();
        link.expect(&[0x81, 1, 0, 0, 0], &[0xEE, 0x80]);
        link.send(&[0x81, 1, 0, 0, 0]).unwrap();
        assert_eq!(link.remaining(), 2);
        assert_eq!(link.sent_data().len(), 1);
    }

    #[test]
    fn test_wrong_request_is_reported() {
        let mut link = MockLink::new();
        link.expect(&[0x85], &[]);
        assert!(matches!(link.send(&[0x86]), Err(ScaleError::Transport(_))));
    }

    #[test]
    fn test_empty_queue_times_out() {
        let mut link = MockLink::new();
        let mut buf = [0u8; 1];
        assert!(matches!(
            link.receive(&mut buf, Duration::from_secs(5)),
            Err(ScaleError::Unresponsive)
        ));
    }
}
