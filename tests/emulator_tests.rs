//! Controller against the device engine over an in-memory link.
//!
//! Every test runs the emulator on its own thread, exactly as `scalelink
//! emulate` does, and talks to it through the public client API.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;

use scalelink::client::{LinkState, ScaleClient, StatusPoller, StatusUpdate};
use scalelink::config::{ClientConfig, DeviceConfig};
use scalelink::device::{DeviceEngine, FixedStatus, MemoryProvider, Record};
use scalelink::protocol::fields::{DigitCode, Expiry};
use scalelink::protocol::keys::KeyBinding;
use scalelink::protocol::logo::{PrimaryLogo, SecondaryLogo};
use scalelink::protocol::message::Message;
use scalelink::protocol::plu::{Plu, PluTotals, UpdateBorders};
use scalelink::protocol::settings::{FactorySettings, UserSettings};
use scalelink::protocol::status::LiveStatus;
use scalelink::sync;
use scalelink::transport::{Link, MemoryLink};
use scalelink::ScaleError;

struct Bench {
    scale: ScaleClient<MemoryLink>,
    stop: Arc<AtomicBool>,
    device: JoinHandle<scalelink::Result<()>>,
}

impl Bench {
    fn start(records: Vec<Record>) -> Bench {
        let config = DeviceConfig {
            ready_delay_ms: 2,
            frame_timeout_ms: 200,
            ..Default::default()
        };
        let status = LiveStatus {
            stable: true,
            weight: 1500,
            price: 8990,
            sum: 13485,
            plu: 2,
            ..Default::default()
        };
        let mut engine = DeviceEngine::new(
            Box::new(MemoryProvider::from_records(records)),
            Box::new(FixedStatus(status)),
            &config,
        )
        .unwrap();

        let (host, mut wire) = MemoryLink::pair();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let device = std::thread::spawn(move || engine.run(&mut wire, &flag));

        let client_config = ClientConfig {
            ready_timeout_ms: 1000,
            resync_quiet_ms: 20,
            ..Default::default()
        };
        let mut scale = ScaleClient::new(host, Duration::from_secs(1), client_config);
        scale.connect().unwrap();
        Bench {
            scale,
            stop,
            device,
        }
    }

    fn finish(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.scale.close().unwrap();
        self.device.join().unwrap().unwrap();
    }
}

fn apples() -> Plu {
    let mut plu = Plu::new(12).unwrap();
    plu.item_code = DigitCode::from_value(4820).unwrap();
    plu.name1 = "Яблоки Гренни Смит".to_string();
    plu.name2 = "весовые".to_string();
    plu.price = 12_990;
    plu.expiry = Expiry::date(15, 3, 24).unwrap();
    plu.tare = 15;
    plu.message = 3;
    plu
}

#[test]
fn test_plu_lifecycle() {
    let mut bench = Bench::start(vec![]);
    let scale = &mut bench.scale;
    assert_eq!(scale.state(), LinkState::Ready);

    assert!(matches!(
        scale.read_plu(12),
        Err(ScaleError::DeviceError { command: 0x81 })
    ));
    assert_eq!(scale.state(), LinkState::Ready);

    scale.write_plu(&apples()).unwrap();
    assert_eq!(scale.read_plu(12).unwrap(), apples());

    scale.delete_plu(12).unwrap();
    let cleared = scale.read_plu(12).unwrap();
    assert!(cleared.is_unused());
    assert_eq!(cleared.id, 12);

    bench.finish();
}

#[test]
fn test_plu_totals_survive_rewrite_and_reset() {
    let mut stored = apples();
    stored.totals = PluTotals {
        sum: 2_500,
        weight: 750,
        count: 3,
        ..Default::default()
    };
    let mut bench = Bench::start(vec![Record::Plu(stored)]);
    let scale = &mut bench.scale;

    let totals = scale.read_sales_totals().unwrap();
    assert_eq!(totals.plu_sum, 2_500);
    assert_eq!(totals.sum, 2_500);
    assert_eq!(totals.free_plu, 3999);

    let mut cheaper = apples();
    cheaper.price = 9_990;
    scale.write_plu(&cheaper).unwrap();
    assert_eq!(scale.read_plu(12).unwrap().totals.sum, 2_500);

    let at = NaiveDate::from_ymd_opt(2024, 5, 20)
        .unwrap()
        .and_hms_opt(8, 30, 0)
        .unwrap();
    scale.set_clock(at).unwrap();
    scale.reset_plu_totals(12).unwrap();
    let reset = scale.read_plu(12).unwrap().totals;
    assert_eq!(reset.sum, 0);
    assert_eq!(reset.last_reset.unwrap().date(), at.date());

    scale.reset_sales_totals().unwrap();
    let totals = scale.read_sales_totals().unwrap();
    assert_eq!(totals.sum, 0);
    assert_eq!(totals.last_reset.unwrap().date(), at.date());

    bench.finish();
}

#[test]
fn test_messages() {
    let mut bench = Bench::start(vec![]);
    let scale = &mut bench.scale;

    let long = "Хранить при температуре от 0 до +6 °C. ".repeat(8);
    let message = Message::new(3, long.trim_end()).unwrap();
    scale.write_message(&message).unwrap();
    assert_eq!(scale.read_message(3).unwrap(), message);

    scale.delete_message(3).unwrap();
    assert!(matches!(
        scale.delete_message(3),
        Err(ScaleError::DeviceError { .. })
    ));
    assert!(scale.read_message(3).is_err());

    bench.finish();
}

#[test]
fn test_price_keys() {
    let mut bench = Bench::start(vec![Record::Plu(apples())]);
    let scale = &mut bench.scale;

    assert_eq!(scale.read_price_key(7).unwrap(), None);
    scale.bind_price_key(7, 12).unwrap();
    assert_eq!(scale.read_price_key(7).unwrap(), Some(12));
    assert!(matches!(
        scale.bind_price_key(8, 13),
        Err(ScaleError::DeviceError { .. })
    ));
    assert_eq!(scale.price_keys().unwrap(), vec![KeyBinding { key: 7, plu: 12 }]);

    scale.bind_price_key(7, 0).unwrap();
    assert!(scale.price_keys().unwrap().is_empty());

    bench.finish();
}

#[test]
fn test_settings_and_logos() {
    let mut bench = Bench::start(vec![]);
    let scale = &mut bench.scale;

    assert_eq!(scale.read_factory_settings().unwrap(), FactorySettings::default());
    let settings = UserSettings {
        department: 42,
        label_format: 7,
        barcode_format: 2,
        print_offset: 10,
        print_features: 0b1010_0001,
        auto_print_delta: 500,
    };
    scale.write_user_settings(&settings).unwrap();
    assert_eq!(scale.read_user_settings().unwrap(), settings);

    assert_eq!(scale.read_primary_logo().unwrap(), vec![0u8; 512]);
    let bitmap: Vec<u8> = (0..512).map(|i| (i % 251) as u8).collect();
    let logo = PrimaryLogo::new(bitmap.clone(), "RU01").unwrap();
    scale.write_primary_logo(&logo).unwrap();
    assert_eq!(scale.read_primary_logo().unwrap(), bitmap);
    scale
        .write_secondary_logo(&SecondaryLogo::new(vec![0xFF; 384]).unwrap())
        .unwrap();

    bench.finish();
}

#[test]
fn test_upload_respects_update_borders() {
    let mut bench = Bench::start(vec![]);
    let scale = &mut bench.scale;

    scale
        .set_update_borders(UpdateBorders::new(1, 5).unwrap())
        .unwrap();
    let plus: Vec<Plu> = (1..=8)
        .map(|id| {
            let mut p = Plu::new(id).unwrap();
            p.name1 = format!("Товар {}", id);
            p.price = id * 100;
            p
        })
        .collect();
    let report = sync::upload_plus(scale, &plus).unwrap();
    assert_eq!(report.written, 5);
    let failed: Vec<u32> = report.failures.iter().map(|f| f.id).collect();
    assert_eq!(failed, vec![6, 7, 8]);

    scale.clear_update_borders().unwrap();
    assert!(sync::upload_plus(scale, &plus[5..]).unwrap().is_complete());
    assert_eq!(sync::download_plus(scale, 1..=10).unwrap(), plus);

    bench.finish();
}

#[test]
fn test_resync_after_garbage() {
    let mut bench = Bench::start(vec![]);
    let scale = &mut bench.scale;

    // An unknown command the emulator answers with the error marker.
    scale.link_mut().send(&[0x42, 0x42]).unwrap();
    scale.resync().unwrap();
    assert_eq!(scale.state(), LinkState::Ready);
    assert_eq!(scale.read_status().unwrap().weight, 1500);

    bench.finish();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_poller_against_emulator() {
    let bench = Bench::start(vec![]);
    let Bench {
        scale,
        stop,
        device,
    } = bench;
    let shared = scale.into_shared();

    let (poller, mut updates) = StatusPoller::spawn(shared.clone(), Duration::from_millis(10));
    for _ in 0..3 {
        match updates.recv().await.unwrap() {
            StatusUpdate::Reading { status, .. } => assert_eq!(status.plu, 2),
            other => panic!("unexpected update {:?}", other),
        }
    }
    poller.stop().await;

    stop.store(true, Ordering::Relaxed);
    shared.lock().await.close().unwrap();
    tokio::task::spawn_blocking(move || device.join().unwrap().unwrap())
        .await
        .unwrap();
}
