//! # Bulk PLU Transfer
//!
//! Uploading a catalogue is a long run of independent writes. A rejection of
//! one record (bad value, full memory, outside the update borders) is noted
//! and the batch moves on; a link failure stops the batch, because every
//! later command would fail the same way.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::ScaleClient;
use crate::error::{Result, ScaleError};
use crate::protocol::message::Message;
use crate::protocol::plu::Plu;
use crate::transport::Link;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub id: u32,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub total: usize,
    pub written: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.written == self.total
    }

    fn record(&mut self, id: u32, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                self.written += 1;
                Ok(())
            }
            Err(e @ (ScaleError::DeviceError { .. } | ScaleError::InvalidValue(_))) => {
                warn!(id, error = %e, "record skipped");
                self.failures.push(SyncFailure {
                    id,
                    error: e.to_string(),
                });
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Write every PLU in order.
pub fn upload_plus<L: Link>(client: &mut ScaleClient<L>, plus: &[Plu]) -> Result<SyncReport> {
    let mut report = SyncReport {
        total: plus.len(),
        ..Default::default()
    };
    for plu in plus {
        let result = client.write_plu(plu);
        report.record(plu.id, result)?;
    }
    info!(
        total = report.total,
        written = report.written,
        failed = report.failures.len(),
        "PLU upload finished"
    );
    Ok(report)
}

/// Write every message in order.
pub fn upload_messages<L: Link>(
    client: &mut ScaleClient<L>,
    messages: &[Message],
) -> Result<SyncReport> {
    let mut report = SyncReport {
        total: messages.len(),
        ..Default::default()
    };
    for message in messages {
        let result = client.write_message(message);
        report.record(message.id as u32, result)?;
    }
    info!(
        total = report.total,
        written = report.written,
        failed = report.failures.len(),
        "message upload finished"
    );
    Ok(report)
}

/// Read the PLUs in `ids`, skipping unused slots and ids the scale rejects.
pub fn download_plus<L: Link>(
    client: &mut ScaleClient<L>,
    ids: RangeInclusive<u32>,
) -> Result<Vec<Plu>> {
    let mut out = Vec::new();
    for id in ids {
        match client.read_plu(id) {
            Ok(plu) if plu.is_unused() => {}
            Ok(plu) => out.push(plu),
            Err(ScaleError::DeviceError { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::protocol::{ERROR, READY};
    use crate::transport::MockLink;
    use std::time::Duration;

    fn plu(id: u32) -> Plu {
        let mut p = Plu::new(id).unwrap();
        p.name1 = format!("Item {}", id);
        p.price = 100 * id;
        p
    }

    fn write_frame(p: &Plu) -> Vec<u8> {
        let mut f = vec![0x82];
        f.extend(p.encode().unwrap());
        f
    }

    fn client(link: MockLink) -> ScaleClient<MockLink> {
        ScaleClient::new(link, Duration::from_millis(20), ClientConfig::default())
    }

    #[test]
    fn test_rejections_do_not_stop_upload() {
        let plus = [plu(1), plu(2), plu(3)];
        let mut link = MockLink::new();
        link.expect(&write_frame(&plus[0]), &[READY]);
        link.expect(&write_frame(&plus[1]), &[ERROR, READY]);
        link.expect(&write_frame(&plus[2]), &[READY]);
        let mut c = client(link);

        let report = upload_plus(&mut c, &plus).unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.written, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, 2);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_invalid_record_is_skipped_without_sending() {
        let mut bad = plu(1);
        bad.price = 5_000_000;
        let good = plu(2);
        let mut link = MockLink::new();
        link.expect(&write_frame(&good), &[READY]);
        let mut c = client(link);

        let report = upload_plus(&mut c, &[bad, good]).unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(c.link().sent_data().len(), 1);
    }

    #[test]
    fn test_link_failure_aborts() {
        let plus = [plu(1), plu(2)];
        let mut link = MockLink::new();
        link.expect(&write_frame(&plus[0]), &[]);
        let mut c = client(link);
        assert!(matches!(
            upload_plus(&mut c, &plus),
            Err(ScaleError::Unresponsive)
        ));
    }

    #[test]
    fn test_download_skips_unused_and_missing() {
        let stored = plu(1);
        let mut first = stored.encode_response().unwrap();
        first.push(READY);
        let mut second = Plu::unused(2).encode_response().unwrap();
        second.push(READY);

        let mut link = MockLink::new();
        link.expect(&[0x81, 1, 0, 0, 0], &first);
        link.expect(&[0x81, 2, 0, 0, 0], &second);
        link.expect(&[0x81, 3, 0, 0, 0], &[ERROR, READY]);
        let mut c = client(link);

        let got = download_plus(&mut c, 1..=3).unwrap();
        assert_eq!(got, vec![stored]);
    }

    #[test]
    fn test_message_upload() {
        let msg = Message::new(4, "Хранить в сухом месте").unwrap();
        let mut frame = vec![0x84];
        frame.extend(msg.encode().unwrap());
        let mut link = MockLink::new();
        link.expect(&frame, &[READY]);
        let mut c = client(link);
        let report = upload_messages(&mut c, &[msg]).unwrap();
        assert!(report.is_complete());
    }
}
