//! # Scale Emulator
//!
//! The device role of the protocol. [`DeviceEngine`] answers commands from
//! a [`DataProvider`], so the emulator and a real scale look identical to a
//! [`ScaleClient`](crate::client::ScaleClient).
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use scalelink::config::{DeviceConfig, LinkConfig};
//! use scalelink::device;
//! use scalelink::transport;
//!
//! let mut engine = device::from_config(&DeviceConfig::default())?;
//! let stop = AtomicBool::new(false);
//! let mut listener = transport::Listener::open(&LinkConfig::default())?;
//! while let Some(mut link) = listener.next_link(&stop)? {
//!     engine.run(&mut link, &stop)?;
//! }
//! # Ok::<(), scalelink::ScaleError>(())
//! ```

pub mod engine;
pub mod live;
pub mod provider;
pub mod seed;
pub mod store;

pub use engine::DeviceEngine;
pub use live::{FixedStatus, RandomStatus, StatusSource};
pub use provider::{DataProvider, MemoryProvider, Record, RecordKind};
pub use store::JsonFileProvider;

use crate::config::DeviceConfig;
use crate::error::Result;

/// Open the configured store, seeding it with demo data when asked and empty.
pub fn open_provider(config: &DeviceConfig) -> Result<Box<dyn DataProvider>> {
    let mut provider: Box<dyn DataProvider> = match &config.store {
        Some(path) => Box::new(JsonFileProvider::open(path)?),
        None => Box::new(MemoryProvider::new()),
    };
    if config.seed_demo
        && provider.list(RecordKind::Plu)?.is_empty()
        && provider.list(RecordKind::Message)?.is_empty()
    {
        seed::seed_demo(provider.as_mut())?;
    }
    Ok(provider)
}

/// An engine with the configured store and status source.
pub fn from_config(config: &DeviceConfig) -> Result<DeviceEngine> {
    let status: Box<dyn StatusSource> = if config.fixed_status {
        Box::new(FixedStatus::default())
    } else {
        Box::new(RandomStatus::default())
    };
    DeviceEngine::new(open_provider(config)?, status, config)
}
