//! Demo content for an empty emulator store.

use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::info;

use super::provider::{DataProvider, Record};
use crate::error::Result;
use crate::protocol::fields::{DigitCode, Expiry};
use crate::protocol::message::Message;
use crate::protocol::plu::Plu;

pub const DEMO_COUNT: u32 = 10;

const GOODS: [&str; 10] = [
    "Яблоки", "Груши", "Бананы", "Сыр", "Колбаса", "Морковь", "Картофель", "Творог", "Хлеб",
    "Виноград",
];

const NOTES: [&str; 5] = [
    "Хранить при температуре от 0 до +6",
    "Годен до даты на этикетке",
    "Изготовлено по ТУ",
    "Хранить в сухом месте",
    "Продукт охлажденный",
];

/// Messages 1..=10 with random notes.
pub fn demo_messages(rng: &mut impl Rng) -> Result<Vec<Message>> {
    (1..=DEMO_COUNT as u16)
        .map(|id| {
            let note = NOTES.choose(rng).copied().unwrap_or_default();
            Message::new(id, format!("{}. {}", id, note))
        })
        .collect()
}

/// PLUs 1..=10 with random prices and item codes.
pub fn demo_plus(rng: &mut impl Rng) -> Result<Vec<Plu>> {
    (1..=DEMO_COUNT)
        .map(|id| {
            let mut plu = Plu::new(id)?;
            plu.item_code = DigitCode::from_value(rng.random_range(0..1_000_000))?;
            plu.name1 = GOODS[(id - 1) as usize % GOODS.len()].to_string();
            plu.name2 = format!("Артикул {}", id);
            plu.price = rng.random_range(1..100_000);
            plu.expiry = Expiry::days(rng.random_range(1..30))?;
            plu.tare = rng.random_range(0..50);
            plu.message = id as u16;
            plu.validate()?;
            Ok(plu)
        })
        .collect()
}

/// Store the demo records. Returns how many were written.
pub fn seed_demo(provider: &mut dyn DataProvider) -> Result<usize> {
    let mut rng = rand::rng();
    let mut count = 0;
    for message in demo_messages(&mut rng)? {
        provider.put(Record::Message(message))?;
        count += 1;
    }
    for plu in demo_plus(&mut rng)? {
        provider.put(Record::Plu(plu))?;
        count += 1;
    }
    info!(records = count, "demo data seeded");
    Ok(count)
}
