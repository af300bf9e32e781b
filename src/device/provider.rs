//! # Data Provider
//!
//! The device engine keeps no records itself. Everything it serves comes from
//! a [`DataProvider`], keyed by [`RecordKind`] and a numeric id:
//!
//! | Kind | Id |
//! |------|----|
//! | `Plu` | PLU number |
//! | `Message` | message number |
//! | `PriceKey` | key number (1–54) |
//! | `Logo` | [`PRIMARY_LOGO_ID`] or [`SECONDARY_LOGO_ID`] |
//! | settings, totals, borders | [`SINGLETON_ID`] |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::keys::KeyBinding;
use crate::protocol::logo::{PrimaryLogo, SecondaryLogo};
use crate::protocol::message::Message;
use crate::protocol::plu::{Plu, UpdateBorders};
use crate::protocol::settings::{FactorySettings, UserSettings};
use crate::protocol::totals::SalesTotals;

pub const SECONDARY_LOGO_ID: u32 = 1;
pub const PRIMARY_LOGO_ID: u32 = 2;
pub const SINGLETON_ID: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Plu,
    Message,
    PriceKey,
    Logo,
    UserSettings,
    FactorySettings,
    SalesTotals,
    UpdateBorders,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum Record {
    Plu(Plu),
    Message(Message),
    PriceKey(KeyBinding),
    PrimaryLogo(PrimaryLogo),
    SecondaryLogo(SecondaryLogo),
    UserSettings(UserSettings),
    FactorySettings(FactorySettings),
    SalesTotals(SalesTotals),
    UpdateBorders(UpdateBorders),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Plu(_) => RecordKind::Plu,
            Record::Message(_) => RecordKind::Message,
            Record::PriceKey(_) => RecordKind::PriceKey,
            Record::PrimaryLogo(_) | Record::SecondaryLogo(_) => RecordKind::Logo,
            Record::UserSettings(_) => RecordKind::UserSettings,
            Record::FactorySettings(_) => RecordKind::FactorySettings,
            Record::SalesTotals(_) => RecordKind::SalesTotals,
            Record::UpdateBorders(_) => RecordKind::UpdateBorders,
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            Record::Plu(p) => p.id,
            Record::Message(m) => m.id as u32,
            Record::PriceKey(k) => k.key as u32,
            Record::PrimaryLogo(_) => PRIMARY_LOGO_ID,
            Record::SecondaryLogo(_) => SECONDARY_LOGO_ID,
            _ => SINGLETON_ID,
        }
    }
}

/// Storage behind the device engine.
pub trait DataProvider: Send {
    fn get(&self, kind: RecordKind, id: u32) -> Result<Option<Record>>;

    /// Insert or replace, keyed by the record's own kind and id.
    fn put(&mut self, record: Record) -> Result<()>;

    /// Remove a record. Returns whether it existed.
    fn delete(&mut self, kind: RecordKind, id: u32) -> Result<bool>;

    /// Every record of `kind`, in id order.
    fn list(&self, kind: RecordKind) -> Result<Vec<Record>>;
}

/// Ordered in-memory store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryProvider {
    records: BTreeMap<(RecordKind, u32), Record>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|r| ((r.kind(), r.id()), r))
                .collect(),
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl DataProvider for MemoryProvider {
    fn get(&self, kind: RecordKind, id: u32) -> Result<Option<Record>> {
        Ok(self.records.get(&(kind, id)).cloned())
    }

    fn put(&mut self, record: Record) -> Result<()> {
        self.records.insert((record.kind(), record.id()), record);
        Ok(())
    }

    fn delete(&mut self, kind: RecordKind, id: u32) -> Result<bool> {
        Ok(self.records.remove(&(kind, id)).is_some())
    }

    fn list(&self, kind: RecordKind) -> Result<Vec<Record>> {
        Ok(self
            .records
            .range((kind, u32::MIN)..=(kind, u32::MAX))
            .map(|(_, r)| r.clone())
            .collect())
    }
}
