//! # Controller Engine
//!
//! [`ScaleClient`] drives a scale (or the emulator) one command at a time.
//! It owns its [`Link`]; sharing it with a background task means wrapping it
//! in a mutex (see [`SharedClient`] and [`poller`]).
//!
//! ## Exchange
//!
//! ```text
//! clear input -> Busy -> send [cmd][payload]
//!
//! response length L > 0:
//!   first byte 0xEE, next 0x80   -> DeviceError (2 bytes consumed)
//!   otherwise read L bytes       -> read ready byte -> Ready
//!                                   (missing/wrong ready byte: Unknown, payload still returned)
//! response length 0:
//!   0x80                         -> Ok, Ready
//!   0xEE, then 0x80              -> DeviceError, Ready
//!   anything else                -> ProtocolDesync, Unknown
//! timeout                        -> Unresponsive, Unknown
//! link closed                    -> TransportClosed, Error
//! ```
//!
//! A payload may legitimately begin with 0xEE (a price, a bitmap). This
//! client deliberately departs from the plain protocol rule, under which any
//! leading 0xEE on a response with L > 0 is a rejection: only the pair
//! `0xEE 0x80` is read as one, and any other second byte is kept as payload.
//! A rejected read still ends with the ready marker, so the pair is exactly
//! what a real rejection looks like on the wire.
//!
//! ## Link States
//!
//! | State | Meaning |
//! |-------|---------|
//! | `Unknown` | not yet handshaken, or the last exchange lost sync |
//! | `Ready` | the last ready marker arrived where expected |
//! | `Busy` | a command is in flight |
//! | `Error` | the link is closed |
//!
//! Every transition is published on a `tokio::sync::watch` channel; take a
//! receiver with [`ScaleClient::subscribe`].

pub mod poller;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::config::{AppConfig, ClientConfig};
use crate::error::{Result, ScaleError};
use crate::protocol::fields::{u16_le, u32_le};
use crate::protocol::keys::{self, KeyBinding, MAX_KEY, MIN_KEY};
use crate::protocol::logo::{PrimaryLogo, SecondaryLogo};
use crate::protocol::message::Message;
use crate::protocol::plu::{Plu, UpdateBorders};
use crate::protocol::settings::{FactorySettings, UserSettings};
use crate::protocol::status::LiveStatus;
use crate::protocol::totals::SalesTotals;
use crate::protocol::{Command, ERROR, READY, WireRecord, clock, commands};
use crate::transport::{self, Link, hex};

pub use poller::{StatusPoller, StatusUpdate};

/// Handshake state of the link as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Unknown,
    Ready,
    Busy,
    Error,
}

/// A client behind the mutex every link user must take.
pub type SharedClient<L = Box<dyn Link>> = Arc<Mutex<ScaleClient<L>>>;

pub struct ScaleClient<L: Link = Box<dyn Link>> {
    link: L,
    read_timeout: Duration,
    config: ClientConfig,
    state: watch::Sender<LinkState>,
}

impl ScaleClient<Box<dyn Link>> {
    /// Open the configured channel. No handshake yet; call [`connect`](Self::connect).
    pub fn open(config: &AppConfig) -> Result<Self> {
        let link = transport::open_link(&config.link)?;
        Ok(Self::new(link, config.link.read_timeout(), config.client.clone()))
    }
}

impl<L: Link> ScaleClient<L> {
    pub fn new(link: L, read_timeout: Duration, config: ClientConfig) -> Self {
        let (state, _) = watch::channel(LinkState::Unknown);
        Self {
            link,
            read_timeout,
            config,
            state,
        }
    }

    /// Wrap in the shared mutex used by background tasks.
    pub fn into_shared(self) -> SharedClient<L> {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    fn set_state(&self, new: LinkState) {
        self.state.send_if_modified(|current| {
            if *current == new {
                return false;
            }
            match new {
                LinkState::Busy => {}
                LinkState::Ready => debug!(from = ?*current, "link ready"),
                _ => info!(from = ?*current, to = ?new, "link state changed"),
            }
            *current = new;
            true
        });
    }

    // ========================================================================
    // HANDSHAKE
    // ========================================================================

    /// Announce readiness and wait for the scale's ready marker.
    ///
    /// Error markers and stray bytes before the ready marker are skipped.
    pub fn connect(&mut self) -> Result<()> {
        let result = self.handshake();
        self.settle(&result);
        if result.is_ok() {
            info!("scale ready");
        }
        result
    }

    fn handshake(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.config.ready_timeout();
        self.link.clear_input()?;
        self.set_state(LinkState::Busy);
        self.link.send(&[Command::ReadyAnnounce.code()])?;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.link.read_byte(left)? {
                READY => {
                    self.set_state(LinkState::Ready);
                    return Ok(());
                }
                ERROR => debug!("error marker during handshake, waiting for ready"),
                other => warn!("stray byte 0x{:02X} during handshake", other),
            }
        }
    }

    /// Drain until the line is quiet, then handshake again.
    pub fn resync(&mut self) -> Result<()> {
        self.set_state(LinkState::Unknown);
        let dropped = self.link.drain(self.config.resync_quiet())?;
        if dropped > 0 {
            warn!(bytes = dropped, "discarded stale bytes while resyncing");
        }
        self.connect()
    }

    pub fn close(&mut self) -> Result<()> {
        self.link.close()?;
        self.set_state(LinkState::Error);
        Ok(())
    }

    fn settle<T>(&self, result: &Result<T>) {
        match result {
            Ok(_) | Err(ScaleError::DeviceError { .. }) => {}
            Err(ScaleError::TransportClosed) => self.set_state(LinkState::Error),
            Err(_) => self.set_state(LinkState::Unknown),
        }
    }

    // ========================================================================
    // EXCHANGE
    // ========================================================================

    /// Run one command and return its response payload.
    pub fn execute(&mut self, command: Command, payload: &[u8]) -> Result<Vec<u8>> {
        let frame = commands::frame(command, payload)?;
        let result = self.exchange(command, &frame);
        self.settle(&result);
        if let Err(e) = &result {
            debug!(command = %command, error = %e, "command failed");
        }
        result
    }

    fn exchange(&mut self, command: Command, frame: &[u8]) -> Result<Vec<u8>> {
        self.link.clear_input()?;
        self.set_state(LinkState::Busy);
        debug!(command = %command, frame = %hex(frame), "request");
        self.link.send(frame)?;

        let len = command.response_len();
        if len == 0 {
            return match self.link.read_byte(self.read_timeout)? {
                READY => {
                    self.set_state(LinkState::Ready);
                    Ok(Vec::new())
                }
                ERROR => self.rejected(command),
                byte => Err(ScaleError::ProtocolDesync {
                    command: command.code(),
                    byte,
                }),
            };
        }

        let mut payload = vec![0u8; len];
        payload[0] = self.link.read_byte(self.read_timeout)?;
        let mut filled = 1;
        if payload[0] == ERROR {
            let second = self.link.read_byte(self.read_timeout)?;
            if second == READY {
                self.set_state(LinkState::Ready);
                return Err(ScaleError::DeviceError {
                    command: command.code(),
                });
            }
            payload[1] = second;
            filled = 2;
        }
        self.link
            .read_exact(&mut payload[filled..], self.read_timeout)?;
        debug!(command = %command, response = %hex(&payload), "response");

        match self.link.read_byte(self.read_timeout) {
            Ok(READY) => self.set_state(LinkState::Ready),
            Ok(byte) => {
                warn!(command = %command, "expected ready marker after response, got 0x{:02X}", byte);
                self.set_state(LinkState::Unknown);
            }
            Err(ScaleError::Unresponsive) => {
                warn!(command = %command, "no ready marker after response");
                self.set_state(LinkState::Unknown);
            }
            Err(e) => return Err(e),
        }
        Ok(payload)
    }

    /// Error marker seen on a zero-length command: the ready marker must follow.
    fn rejected(&mut self, command: Command) -> Result<Vec<u8>> {
        match self.link.read_byte(self.read_timeout)? {
            READY => {
                self.set_state(LinkState::Ready);
                Err(ScaleError::DeviceError {
                    command: command.code(),
                })
            }
            byte => Err(ScaleError::ProtocolDesync {
                command: command.code(),
                byte,
            }),
        }
    }

    fn run<R: WireRecord>(&mut self, command: Command) -> Result<R> {
        let bytes = self.execute(command, &[])?;
        R::decode(&bytes)
    }

    fn send_record<R: WireRecord>(&mut self, command: Command, record: &R) -> Result<()> {
        let payload = record.encode()?;
        self.execute(command, &payload).map(|_| ())
    }

    // ========================================================================
    // OPERATIONS
    // ========================================================================

    /// Bare ready announce (0x80).
    pub fn ping(&mut self) -> Result<()> {
        self.execute(Command::ReadyAnnounce, &[]).map(|_| ())
    }

    /// Read PLU `id`. An existing but unused slot comes back with
    /// [`Plu::is_unused`] set; an id without a slot is a `DeviceError`.
    pub fn read_plu(&mut self, id: u32) -> Result<Plu> {
        let bytes = self.execute(Command::ReadPlu, &u32_le(id))?;
        Plu::decode(&bytes)
    }

    pub fn write_plu(&mut self, plu: &Plu) -> Result<()> {
        let payload = plu.encode()?;
        self.execute(Command::WritePlu, &payload).map(|_| ())
    }

    pub fn delete_plu(&mut self, id: u32) -> Result<()> {
        self.execute(Command::DeletePlu, &u32_le(id)).map(|_| ())
    }

    pub fn reset_plu_totals(&mut self, id: u32) -> Result<()> {
        self.execute(Command::ResetPluTotals, &u32_le(id)).map(|_| ())
    }

    pub fn read_message(&mut self, id: u16) -> Result<Message> {
        let bytes = self.execute(Command::ReadMessage, &u16_le(id))?;
        Message::decode_body(id, &bytes)
    }

    pub fn write_message(&mut self, message: &Message) -> Result<()> {
        let payload = message.encode()?;
        self.execute(Command::WriteMessage, &payload).map(|_| ())
    }

    pub fn delete_message(&mut self, id: u16) -> Result<()> {
        self.execute(Command::DeleteMessage, &u16_le(id)).map(|_| ())
    }

    pub fn read_sales_totals(&mut self) -> Result<SalesTotals> {
        self.run(Command::ReadSalesTotals)
    }

    pub fn reset_sales_totals(&mut self) -> Result<()> {
        self.execute(Command::ResetSalesTotals, &[]).map(|_| ())
    }

    pub fn set_update_borders(&mut self, borders: UpdateBorders) -> Result<()> {
        self.send_record(Command::SetUpdateBorders, &borders)
    }

    pub fn clear_update_borders(&mut self) -> Result<()> {
        self.execute(Command::ClearUpdateBorders, &[]).map(|_| ())
    }

    pub fn read_status(&mut self) -> Result<LiveStatus> {
        self.run(Command::ReadStatus)
    }

    pub fn read_user_settings(&mut self) -> Result<UserSettings> {
        self.run(Command::ReadUserSettings)
    }

    pub fn write_user_settings(&mut self, settings: &UserSettings) -> Result<()> {
        self.send_record(Command::WriteUserSettings, settings)
    }

    pub fn read_factory_settings(&mut self) -> Result<FactorySettings> {
        self.run(Command::ReadFactorySettings)
    }

    pub fn bind_price_key(&mut self, key: u8, plu: u32) -> Result<()> {
        let binding = KeyBinding::new(key, plu)?;
        self.send_record(Command::BindPriceKey, &binding)
    }

    /// PLU bound to `key`, `None` when unbound.
    pub fn read_price_key(&mut self, key: u8) -> Result<Option<u32>> {
        keys::check_key(key)?;
        let bytes = self.execute(Command::ReadPriceKey, &[key])?;
        keys::decode_lookup(&bytes)
    }

    /// Scan every key and return the bound ones.
    pub fn price_keys(&mut self) -> Result<Vec<KeyBinding>> {
        let mut bound = Vec::new();
        for key in MIN_KEY..=MAX_KEY {
            if let Some(plu) = self.read_price_key(key)? {
                bound.push(KeyBinding { key, plu });
            }
        }
        Ok(bound)
    }

    pub fn write_primary_logo(&mut self, logo: &PrimaryLogo) -> Result<()> {
        self.send_record(Command::WritePrimaryLogo, logo)
    }

    /// The stored bitmap; all zeros when none was written.
    pub fn read_primary_logo(&mut self) -> Result<Vec<u8>> {
        let bytes = self.execute(Command::ReadPrimaryLogo, &[])?;
        PrimaryLogo::decode_bitmap(&bytes)
    }

    pub fn write_secondary_logo(&mut self, logo: &SecondaryLogo) -> Result<()> {
        self.send_record(Command::WriteSecondaryLogo, logo)
    }

    pub fn set_date(&mut self, date: NaiveDate) -> Result<()> {
        let payload = clock::encode_date(date)?;
        self.execute(Command::SetDate, &payload).map(|_| ())
    }

    pub fn set_time(&mut self, time: NaiveTime) -> Result<()> {
        self.execute(Command::SetTime, &clock::encode_time(time))
            .map(|_| ())
    }

    /// Set date and time in two commands.
    pub fn set_clock(&mut self, at: NaiveDateTime) -> Result<()> {
        self.set_date(at.date())?;
        self.set_time(at.time())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockLink;
    use pretty_assertions::assert_eq;

    fn client(link: MockLink) -> ScaleClient<MockLink> {
        ScaleClient::new(link, Duration::from_millis(50), ClientConfig::default())
    }

    #[test]
    fn test_zero_length_success() {
        let mut link = MockLink::new();
        link.expect(&[0x86], &[READY]);
        let mut c = client(link);
        c.reset_sales_totals().unwrap();
        assert_eq!(c.state(), LinkState::Ready);
    }

    #[test]
    fn test_zero_length_rejection_drains_ready() {
        let mut link = MockLink::new();
        link.expect(&[0x8D, 9, 0, 0, 0], &[ERROR, READY, 0x42]);
        let mut c = client(link);
        assert!(matches!(
            c.delete_plu(9),
            Err(ScaleError::DeviceError { command: 0x8D })
        ));
        assert_eq!(c.link().remaining(), 1);
        assert_eq!(c.state(), LinkState::Ready);
    }

    #[test]
    fn test_zero_length_desync() {
        let mut link = MockLink::new();
        link.expect(&[0x88], &[0x42]);
        let mut c = client(link);
        assert!(matches!(
            c.clear_update_borders(),
            Err(ScaleError::ProtocolDesync {
                command: 0x88,
                byte: 0x42
            })
        ));
        assert_eq!(c.state(), LinkState::Unknown);
    }

    #[test]
    fn test_read_rejection_consumes_two_bytes() {
        let mut link = MockLink::new();
        link.expect(&[0x81, 0xA0, 0x0F, 0, 0], &[ERROR, READY, 0x99, 0x99]);
        let mut c = client(link);
        assert!(matches!(
            c.read_plu(4000),
            Err(ScaleError::DeviceError { command: 0x81 })
        ));
        assert_eq!(c.link().remaining(), 2);
    }

    #[test]
    fn test_payload_starting_with_error_byte() {
        let mut response = vec![ERROR, 0x01, 0x00, 0x00];
        response.push(READY);
        let mut link = MockLink::new();
        link.expect(&[0x96, 3], &response);
        let mut c = client(link);
        assert_eq!(c.read_price_key(3).unwrap(), Some(0x01EE));
        assert_eq!(c.state(), LinkState::Ready);
    }

    #[test]
    fn test_unbound_key_is_none() {
        let mut link = MockLink::new();
        link.expect(&[0x96, 54], &[0, 0, 0, 0, READY]);
        let mut c = client(link);
        assert_eq!(c.read_price_key(54).unwrap(), None);
    }

    #[test]
    fn test_key_out_of_range_never_sent() {
        let mut c = client(MockLink::new());
        assert!(matches!(c.read_price_key(55), Err(ScaleError::InvalidValue(_))));
        assert!(c.link().sent_data().is_empty());
    }

    #[test]
    fn test_missing_ready_after_payload_keeps_record() {
        let status = LiveStatus {
            stable: true,
            weight: 1250,
            ..Default::default()
        };
        let mut link = MockLink::new();
        link.expect(&[0x89], &status.encode().unwrap());
        let mut c = client(link);
        assert_eq!(c.read_status().unwrap(), status);
        assert_eq!(c.state(), LinkState::Unknown);
    }

    #[test]
    fn test_timeout_is_unresponsive() {
        let mut link = MockLink::new();
        link.expect(&[0x85], &[]);
        let mut c = client(link);
        let err = c.read_sales_totals().unwrap_err();
        assert!(matches!(err, ScaleError::Unresponsive));
        assert!(!err.is_device_reachable());
        assert_eq!(c.state(), LinkState::Unknown);
    }

    #[test]
    fn test_connect_skips_error_marker() {
        let mut link = MockLink::new();
        link.expect(&[0x80], &[ERROR, READY]);
        let mut c = client(link);
        c.connect().unwrap();
        assert_eq!(c.state(), LinkState::Ready);
    }

    #[test]
    fn test_resync_drains_then_handshakes() {
        let mut link = MockLink::new();
        link.push_incoming(&[0x11, 0x22, 0x33]);
        link.expect(&[0x80], &[READY]);
        let mut c = client(link);
        c.resync().unwrap();
        assert_eq!(c.state(), LinkState::Ready);
        assert_eq!(c.link().remaining(), 0);
    }

    #[test]
    fn test_closed_link_is_error_state() {
        let mut c = client(MockLink::new());
        c.close().unwrap();
        assert!(matches!(c.ping(), Err(ScaleError::TransportClosed)));
        assert_eq!(c.state(), LinkState::Error);
    }

    #[test]
    fn test_state_notifications() {
        let mut link = MockLink::new();
        link.expect(&[0x80], &[READY]);
        let mut c = client(link);
        let rx = c.subscribe();
        c.ping().unwrap();
        assert_eq!(*rx.borrow(), LinkState::Ready);
    }

    #[test]
    fn test_write_frames() {
        let mut link = MockLink::new();
        let settings = UserSettings::default();
        let mut expected = vec![0x8A];
        expected.extend(settings.encode().unwrap());
        link.expect(&expected, &[READY]);
        link.expect(&[0x99, 0, 1, 0, 2, 2, 5], &[READY]);
        let mut c = client(link);
        c.write_user_settings(&settings).unwrap();
        c.set_date(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()).unwrap();
        assert_eq!(c.link().pending_expectations(), 0);
    }
}
