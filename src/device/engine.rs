//! # Device Engine
//!
//! Plays the scale's side of the link: reads a command byte and its fixed
//! payload, answers from the [`DataProvider`] and closes every exchange with
//! the ready marker.
//!
//! ## Exchange
//!
//! ```text
//! [cmd] -> unknown code          -> drain line, 0xEE, delay, 0x80
//!       -> payload short/late    -> 0xEE, delay, 0x80
//!       -> handler Ok(bytes)     -> bytes, delay, 0x80
//!       -> handler Err or panic  -> 0xEE, delay, 0x80
//! ```
//!
//! The delay before the ready marker keeps some USB-serial adapters from
//! merging it into the response.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime, TimeDelta};
use tracing::{debug, info, warn};

use super::live::StatusSource;
use super::provider::{DataProvider, PRIMARY_LOGO_ID, Record, RecordKind, SINGLETON_ID};
use crate::config::DeviceConfig;
use crate::error::{Result, ScaleError};
use crate::protocol::fields::{read_u16, read_u32};
use crate::protocol::keys::{self, KeyBinding};
use crate::protocol::logo::{PrimaryLogo, SecondaryLogo};
use crate::protocol::message::Message;
use crate::protocol::plu::{Plu, PluTotals, UpdateBorders};
use crate::protocol::settings::{FactorySettings, UserSettings};
use crate::protocol::totals::SalesTotals;
use crate::protocol::{Command, ERROR, READY, WireRecord, clock};
use crate::transport::{Link, hex};

/// How long `run` waits for a command before checking its stop flag.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Quiet period that ends the junk following an unknown command byte.
const UNKNOWN_QUIET: Duration = Duration::from_millis(50);

pub struct DeviceEngine {
    provider: Box<dyn DataProvider>,
    status: Box<dyn StatusSource>,
    ready_delay: Duration,
    frame_timeout: Duration,
    /// Device clock minus host clock, moved by 0x99 and 0x9A.
    clock_offset: TimeDelta,
}

impl DeviceEngine {
    /// Build an engine over `provider`, refreshing the stored sales totals
    /// from the PLU counters.
    pub fn new(
        provider: Box<dyn DataProvider>,
        status: Box<dyn StatusSource>,
        config: &DeviceConfig,
    ) -> Result<Self> {
        let mut engine = Self {
            provider,
            status,
            ready_delay: config.ready_delay(),
            frame_timeout: config.frame_timeout(),
            clock_offset: TimeDelta::zero(),
        };
        engine.recompute_totals()?;
        Ok(engine)
    }

    pub fn provider(&self) -> &dyn DataProvider {
        self.provider.as_ref()
    }

    pub fn provider_mut(&mut self) -> &mut dyn DataProvider {
        self.provider.as_mut()
    }

    /// Current device time.
    pub fn now(&self) -> NaiveDateTime {
        Local::now().naive_local() + self.clock_offset
    }

    fn set_clock(&mut self, target: NaiveDateTime) {
        self.clock_offset = target - Local::now().naive_local();
        info!(device_time = %target, "device clock set");
    }

    /// Tell the controller the device is up.
    pub fn announce_ready(&self, link: &mut dyn Link) -> Result<()> {
        link.send(&[READY])
    }

    /// Serve commands until `stop` is raised or the controller goes away.
    pub fn run(&mut self, link: &mut dyn Link, stop: &AtomicBool) -> Result<()> {
        self.announce_ready(link)?;
        info!("device engine running");
        while !stop.load(Ordering::Relaxed) {
            match self.serve_one(link, IDLE_POLL) {
                Ok(_) => {}
                Err(ScaleError::TransportClosed) => {
                    info!("controller disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        info!("device engine stopped");
        Ok(())
    }

    /// Wait up to `poll` for a command and answer it.
    ///
    /// Returns the command served, or `None` when the line stayed idle or the
    /// code was unknown.
    pub fn serve_one(&mut self, link: &mut dyn Link, poll: Duration) -> Result<Option<Command>> {
        let code = match link.read_byte(poll) {
            Ok(code) => code,
            Err(ScaleError::Unresponsive) => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(command) = Command::from_code(code) else {
            let junk = link.drain(UNKNOWN_QUIET)?;
            warn!(code = %format!("0x{:02X}", code), junk, "unknown command");
            self.reply(link, &[ERROR])?;
            return Ok(None);
        };

        let mut payload = vec![0u8; command.request_len()];
        let deadline = Instant::now() + self.frame_timeout;
        let mut filled = 0;
        while filled < payload.len() {
            let left = deadline.saturating_duration_since(Instant::now());
            match link.receive(&mut payload[filled..], left) {
                Ok(n) => filled += n,
                Err(ScaleError::Unresponsive) => {
                    let e = ScaleError::length(command.name(), payload.len(), filled);
                    warn!(command = %command, error = %e, "incomplete request");
                    self.reply(link, &[ERROR])?;
                    return Ok(Some(command));
                }
                Err(e) => return Err(e),
            }
        }
        debug!(command = %command, payload = %hex(&payload), "request");

        let response = match self.dispatch(command, &payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(command = %command, error = %e, "command rejected");
                vec![ERROR]
            }
        };
        self.reply(link, &response)?;
        Ok(Some(command))
    }

    fn reply(&self, link: &mut dyn Link, response: &[u8]) -> Result<()> {
        if !response.is_empty() {
            debug!(response = %hex(response), "response");
            link.send(response)?;
        }
        std::thread::sleep(self.ready_delay);
        link.send(&[READY])
    }

    /// Run the handler, turning panics and wrong-sized answers into faults.
    fn dispatch(&mut self, command: Command, payload: &[u8]) -> Result<Vec<u8>> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.handle(command, payload)))
            .map_err(|cause| {
                let msg = cause
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| cause.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                ScaleError::HandlerFault(msg)
            })??;
        if result.len() != command.response_len() {
            return Err(ScaleError::HandlerFault(format!(
                "{} produced {} bytes, expected {}",
                command,
                result.len(),
                command.response_len()
            )));
        }
        Ok(result)
    }

    fn handle(&mut self, command: Command, payload: &[u8]) -> Result<Vec<u8>> {
        match command {
            Command::ReadyAnnounce => Ok(Vec::new()),
            Command::ReadPlu => self.read_plu(read_u32("PLU number", payload)?),
            Command::WritePlu => self.write_plu(Plu::decode_record(payload)?),
            Command::DeletePlu => self.delete_plu(read_u32("PLU number", payload)?),
            Command::ResetPluTotals => self.reset_plu_totals(read_u32("PLU number", payload)?),
            Command::ReadMessage => {
                let id = read_u16("message number", payload)?;
                match self.provider.get(RecordKind::Message, id as u32)? {
                    Some(Record::Message(m)) => Ok(m.encode_body()),
                    _ => Err(ScaleError::Rejected(format!("no message {}", id))),
                }
            }
            Command::WriteMessage => {
                let message = Message::decode(payload)?;
                message.validate()?;
                self.provider.put(Record::Message(message))?;
                Ok(Vec::new())
            }
            Command::DeleteMessage => {
                let id = read_u16("message number", payload)?;
                if !self.provider.delete(RecordKind::Message, id as u32)? {
                    return Err(ScaleError::Rejected(format!("no message {}", id)));
                }
                Ok(Vec::new())
            }
            Command::ReadSalesTotals => {
                let mut totals = self.totals()?;
                let used = self.plus()?.iter().filter(|p| !p.is_unused()).count();
                let messages = self.provider.list(RecordKind::Message)?.len();
                totals.set_free(used, messages);
                totals.encode()
            }
            Command::ResetSalesTotals => {
                let mut totals = self.totals()?;
                totals.reset(self.now());
                self.provider.put(Record::SalesTotals(totals))?;
                Ok(Vec::new())
            }
            Command::SetUpdateBorders => {
                let borders = UpdateBorders::decode(payload)?;
                info!(start = borders.start, end = borders.end, "update borders set");
                self.provider.put(Record::UpdateBorders(borders))?;
                Ok(Vec::new())
            }
            Command::ClearUpdateBorders => {
                self.provider.delete(RecordKind::UpdateBorders, SINGLETON_ID)?;
                Ok(Vec::new())
            }
            Command::ReadStatus => self.status.reading().encode(),
            Command::WriteUserSettings => {
                let settings = UserSettings::decode(payload)?;
                settings.validate()?;
                self.provider.put(Record::UserSettings(settings))?;
                Ok(Vec::new())
            }
            Command::ReadUserSettings => {
                match self.provider.get(RecordKind::UserSettings, SINGLETON_ID)? {
                    Some(Record::UserSettings(s)) => s.encode(),
                    _ => UserSettings::default().encode(),
                }
            }
            Command::ReadFactorySettings => {
                match self.provider.get(RecordKind::FactorySettings, SINGLETON_ID)? {
                    Some(Record::FactorySettings(s)) => s.encode(),
                    _ => FactorySettings::default().encode(),
                }
            }
            Command::BindPriceKey => self.bind_price_key(KeyBinding::decode(payload)?),
            Command::ReadPriceKey => {
                let key = payload.first().copied().unwrap_or_default();
                keys::check_key(key)?;
                let plu = match self.provider.get(RecordKind::PriceKey, key as u32)? {
                    Some(Record::PriceKey(b)) if b.plu != 0 => Some(b.plu),
                    _ => None,
                };
                Ok(keys::encode_lookup(plu).to_vec())
            }
            Command::WritePrimaryLogo => {
                let logo = PrimaryLogo::decode(payload)?;
                self.provider.put(Record::PrimaryLogo(logo))?;
                Ok(Vec::new())
            }
            Command::ReadPrimaryLogo => match self.provider.get(RecordKind::Logo, PRIMARY_LOGO_ID)? {
                Some(Record::PrimaryLogo(logo)) => Ok(logo.bitmap),
                _ => Ok(PrimaryLogo::blank().bitmap),
            },
            Command::WriteSecondaryLogo => {
                let logo = SecondaryLogo::decode(payload)?;
                self.provider.put(Record::SecondaryLogo(logo))?;
                Ok(Vec::new())
            }
            Command::SetDate => {
                let date = clock::decode_date(payload)?;
                self.set_clock(date.and_time(self.now().time()));
                Ok(Vec::new())
            }
            Command::SetTime => {
                let time = clock::decode_time(payload)?;
                self.set_clock(self.now().date().and_time(time));
                Ok(Vec::new())
            }
        }
    }

    // ========================================================================
    // PLU handlers
    // ========================================================================

    fn stored_plu(&self, id: u32) -> Result<Plu> {
        match self.provider.get(RecordKind::Plu, id)? {
            Some(Record::Plu(p)) => Ok(p),
            _ => Err(ScaleError::Rejected(format!("no PLU {}", id))),
        }
    }

    fn read_plu(&self, id: u32) -> Result<Vec<u8>> {
        self.stored_plu(id)?.encode_response()
    }

    /// Upsert; cumulative totals of an existing slot are kept.
    fn write_plu(&mut self, mut plu: Plu) -> Result<Vec<u8>> {
        plu.validate()?;
        if let Some(Record::UpdateBorders(b)) =
            self.provider.get(RecordKind::UpdateBorders, SINGLETON_ID)?
        {
            if !b.contains(plu.id) {
                return Err(ScaleError::Rejected(format!(
                    "PLU {} outside update borders {}..={}",
                    plu.id, b.start, b.end
                )));
            }
        }
        if let Some(Record::Plu(existing)) = self.provider.get(RecordKind::Plu, plu.id)? {
            plu.totals = existing.totals;
        }
        self.provider.put(Record::Plu(plu))?;
        Ok(Vec::new())
    }

    /// The slot stays and reads back as id + zeros.
    fn delete_plu(&mut self, id: u32) -> Result<Vec<u8>> {
        self.stored_plu(id)?;
        self.provider.put(Record::Plu(Plu::unused(id)))?;
        Ok(Vec::new())
    }

    fn reset_plu_totals(&mut self, id: u32) -> Result<Vec<u8>> {
        let mut plu = self.stored_plu(id)?;
        plu.totals = PluTotals {
            last_reset: Some(self.now()),
            ..Default::default()
        };
        self.provider.put(Record::Plu(plu))?;
        Ok(Vec::new())
    }

    /// PLU 0 removes the binding.
    fn bind_price_key(&mut self, binding: KeyBinding) -> Result<Vec<u8>> {
        if binding.plu == 0 {
            self.provider.delete(RecordKind::PriceKey, binding.key as u32)?;
            return Ok(Vec::new());
        }
        self.stored_plu(binding.plu)?;
        self.provider.put(Record::PriceKey(binding))?;
        Ok(Vec::new())
    }

    // ========================================================================
    // Totals
    // ========================================================================

    fn plus(&self) -> Result<Vec<Plu>> {
        Ok(self
            .provider
            .list(RecordKind::Plu)?
            .into_iter()
            .filter_map(|r| match r {
                Record::Plu(p) => Some(p),
                _ => None,
            })
            .collect())
    }

    fn totals(&self) -> Result<SalesTotals> {
        Ok(
            match self.provider.get(RecordKind::SalesTotals, SINGLETON_ID)? {
                Some(Record::SalesTotals(t)) => t,
                _ => SalesTotals::default(),
            },
        )
    }

    /// Overall counters start out equal to the PLU counters.
    fn recompute_totals(&mut self) -> Result<()> {
        let mut totals = self.totals()?;
        let plus = self.plus()?;
        let messages = self.provider.list(RecordKind::Message)?.len();
        totals.recompute(plus.iter(), messages);
        totals.sum = totals.plu_sum;
        totals.count = totals.plu_count;
        totals.weight = totals.plu_weight;
        debug!(
            plus = plus.len(),
            messages,
            free_plu = totals.free_plu,
            "sales totals recomputed"
        );
        self.provider.put(Record::SalesTotals(totals))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::live::FixedStatus;
    use crate::device::provider::MemoryProvider;
    use crate::protocol::status::LiveStatus;
    use crate::transport::{MemoryLink, MockLink};
    use pretty_assertions::assert_eq;

    fn config() -> DeviceConfig {
        DeviceConfig {
            ready_delay_ms: 0,
            frame_timeout_ms: 20,
            ..Default::default()
        }
    }

    fn engine_with(records: Vec<Record>) -> DeviceEngine {
        DeviceEngine::new(
            Box::new(MemoryProvider::from_records(records)),
            Box::new(FixedStatus(LiveStatus {
                stable: true,
                weight: 1250,
                ..Default::default()
            })),
            &config(),
        )
        .unwrap()
    }

    fn plu(id: u32) -> Plu {
        let mut p = Plu::new(id).unwrap();
        p.name1 = format!("Item {}", id);
        p.price = 1999;
        p
    }

    /// Feed one frame and return everything the engine wrote back.
    fn serve(engine: &mut DeviceEngine, frame: &[u8]) -> Vec<u8> {
        let (mut host, mut device) = MemoryLink::pair();
        host.send(frame).unwrap();
        engine.serve_one(&mut device, Duration::from_millis(20)).unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 1024];
        while let Ok(n) = host.receive(&mut buf, Duration::from_millis(5)) {
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    fn frame(cmd: u8, payload: &[u8]) -> Vec<u8> {
        let mut f = vec![cmd];
        f.extend_from_slice(payload);
        f
    }

    #[test]
    fn test_read_missing_plu_is_error_then_ready() {
        let mut e = engine_with(vec![]);
        assert_eq!(serve(&mut e, &[0x81, 9, 0, 0, 0]), vec![ERROR, READY]);
    }

    #[test]
    fn test_write_then_read_plu() {
        let mut e = engine_with(vec![]);
        let p = plu(7);
        assert_eq!(serve(&mut e, &frame(0x82, &p.encode().unwrap())), vec![READY]);
        let out = serve(&mut e, &[0x81, 7, 0, 0, 0]);
        assert_eq!(out.len(), 101);
        assert_eq!(out[100], READY);
        assert_eq!(Plu::decode(&out[..100]).unwrap(), p);
    }

    #[test]
    fn test_write_keeps_totals() {
        let mut stored = plu(3);
        stored.totals.sum = 500;
        let mut e = engine_with(vec![Record::Plu(stored)]);
        let mut update = plu(3);
        update.price = 1;
        serve(&mut e, &frame(0x82, &update.encode().unwrap()));
        match e.provider().get(RecordKind::Plu, 3).unwrap() {
            Some(Record::Plu(p)) => {
                assert_eq!(p.price, 1);
                assert_eq!(p.totals.sum, 500);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_delete_plu_leaves_unused_slot() {
        let mut e = engine_with(vec![Record::Plu(plu(4))]);
        assert_eq!(serve(&mut e, &[0x8D, 4, 0, 0, 0]), vec![READY]);
        let out = serve(&mut e, &[0x81, 4, 0, 0, 0]);
        assert_eq!(&out[..4], &[4, 0, 0, 0]);
        assert!(out[4..100].iter().all(|&b| b == 0));
        assert_eq!(serve(&mut e, &[0x8D, 5, 0, 0, 0]), vec![ERROR, READY]);
    }

    #[test]
    fn test_update_borders_gate_writes() {
        let mut e = engine_with(vec![]);
        let borders = UpdateBorders::new(1, 10).unwrap().encode().unwrap();
        assert_eq!(serve(&mut e, &frame(0x87, &borders)), vec![READY]);
        assert_eq!(
            serve(&mut e, &frame(0x82, &plu(11).encode().unwrap())),
            vec![ERROR, READY]
        );
        assert_eq!(serve(&mut e, &[0x88]), vec![READY]);
        assert_eq!(
            serve(&mut e, &frame(0x82, &plu(11).encode().unwrap())),
            vec![READY]
        );
    }

    #[test]
    fn test_price_keys() {
        let mut e = engine_with(vec![Record::Plu(plu(300))]);
        assert_eq!(serve(&mut e, &[0x96, 54]), vec![0, 0, 0, 0, READY]);
        let bind = KeyBinding::new(54, 300).unwrap().encode().unwrap();
        assert_eq!(serve(&mut e, &frame(0x8B, &bind)), vec![READY]);
        assert_eq!(serve(&mut e, &[0x96, 54]), vec![0x2C, 0x01, 0, 0, READY]);
        let missing = KeyBinding::new(1, 301).unwrap().encode().unwrap();
        assert_eq!(serve(&mut e, &frame(0x8B, &missing)), vec![ERROR, READY]);
        assert_eq!(serve(&mut e, &[0x96, 55]), vec![ERROR, READY]);
    }

    #[test]
    fn test_messages() {
        let mut e = engine_with(vec![]);
        assert_eq!(serve(&mut e, &[0x83, 2, 0]), vec![ERROR, READY]);
        let m = Message::new(2, "Свежее").unwrap();
        assert_eq!(serve(&mut e, &frame(0x84, &m.encode().unwrap())), vec![READY]);
        let out = serve(&mut e, &[0x83, 2, 0]);
        assert_eq!(Message::decode_body(2, &out[..400]).unwrap(), m);
        assert_eq!(serve(&mut e, &[0x8E, 2, 0]), vec![READY]);
        assert_eq!(serve(&mut e, &[0x8E, 2, 0]), vec![ERROR, READY]);
    }

    #[test]
    fn test_totals_recomputed_at_start() {
        let mut a = plu(1);
        a.totals = PluTotals {
            sum: 100,
            weight: 20,
            count: 2,
            ..Default::default()
        };
        let e = engine_with(vec![Record::Plu(a), Record::Plu(Plu::unused(2))]);
        let t = e.totals().unwrap();
        assert_eq!((t.sum, t.count, t.weight), (100, 2, 20));
        assert_eq!(t.plu_sum, 100);
        assert_eq!(t.free_plu, 3999);
    }

    #[test]
    fn test_totals_reset_stamps_device_clock() {
        let mut e = engine_with(vec![Record::Plu(plu(1))]);
        serve(&mut e, &frame(0x99, &[0, 1, 0, 6, 2, 0]));
        assert_eq!(serve(&mut e, &[0x86]), vec![READY]);
        let out = serve(&mut e, &[0x85]);
        let t = SalesTotals::decode(&out[..40]).unwrap();
        assert_eq!(t.sum, 0);
        assert_eq!(t.free_plu, 3999);
        let stamp = t.last_reset.unwrap();
        assert_eq!(stamp.date(), chrono::NaiveDate::from_ymd_opt(2020, 6, 1).unwrap());
    }

    #[test]
    fn test_status_reading() {
        let mut e = engine_with(vec![]);
        let out = serve(&mut e, &[0x89]);
        let status = LiveStatus::decode(&out[..15]).unwrap();
        assert_eq!(status.weight, 1250);
        assert_eq!(out[15], READY);
    }

    #[test]
    fn test_settings_default_then_written() {
        let mut e = engine_with(vec![]);
        let out = serve(&mut e, &[0x95]);
        assert_eq!(UserSettings::decode(&out[..9]).unwrap(), UserSettings::default());
        let s = UserSettings {
            department: 123,
            ..Default::default()
        };
        assert_eq!(serve(&mut e, &frame(0x8A, &s.encode().unwrap())), vec![READY]);
        let out = serve(&mut e, &[0x95]);
        assert_eq!(UserSettings::decode(&out[..9]).unwrap(), s);
        assert_eq!(serve(&mut e, &[0x9B]).len(), 14);
    }

    #[test]
    fn test_primary_logo() {
        let mut e = engine_with(vec![]);
        let out = serve(&mut e, &[0x97]);
        assert_eq!(out.len(), 513);
        assert!(out[..512].iter().all(|&b| b == 0));
        let logo = PrimaryLogo::new(vec![0x5A; 512], "RU01").unwrap();
        assert_eq!(serve(&mut e, &frame(0x8C, &logo.encode().unwrap())), vec![READY]);
        let out = serve(&mut e, &[0x97]);
        assert_eq!(&out[..512], &logo.bitmap[..]);
    }

    #[test]
    fn test_unknown_command() {
        let mut e = engine_with(vec![]);
        assert_eq!(serve(&mut e, &[0x42, 1, 2, 3]), vec![ERROR, READY]);
    }

    #[test]
    fn test_short_payload_is_rejected() {
        let mut e = engine_with(vec![]);
        assert_eq!(serve(&mut e, &[0x81, 1, 0]), vec![ERROR, READY]);
    }

    #[test]
    fn test_ready_announce_answers_ready() {
        let mut e = engine_with(vec![]);
        assert_eq!(serve(&mut e, &[READY]), vec![READY]);
    }

    struct PanickingStatus;

    impl StatusSource for PanickingStatus {
        fn reading(&mut self) -> LiveStatus {
            panic!("sensor gone")
        }
    }

    #[test]
    fn test_handler_panic_becomes_error_marker() {
        let mut e = DeviceEngine::new(
            Box::new(MemoryProvider::new()),
            Box::new(PanickingStatus),
            &config(),
        )
        .unwrap();
        assert_eq!(serve(&mut e, &[0x89]), vec![ERROR, READY]);
        // the engine keeps serving
        assert_eq!(serve(&mut e, &[0x95]).len(), 10);
    }

    #[test]
    fn test_idle_line() {
        let mut e = engine_with(vec![]);
        let mut link = MockLink::new();
        assert_eq!(e.serve_one(&mut link, Duration::from_millis(5)).unwrap(), None);
        assert!(link.sent_data().is_empty());
    }
}
