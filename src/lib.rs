//! # Scalelink - Price-Computing Scale Protocol Library
//!
//! Scalelink talks to electronic price-computing scales over a half-duplex
//! serial link (or TCP), and can play the scale itself. It provides:
//!
//! - **Protocol implementation**: command table and fixed-width record codecs
//!   (PLU, messages, logos, settings, sales totals, price keys)
//! - **Controller**: one-command-at-a-time client with the ready handshake
//! - **Emulator**: a device engine answering from a pluggable data provider
//! - **Transport**: raw serial tty, TCP and in-memory links
//!
//! ## Quick Start
//!
//! ```no_run
//! use scalelink::{ScaleClient, config::AppConfig};
//!
//! let config = AppConfig::default();
//! let mut scale = ScaleClient::open(&config)?;
//! scale.connect()?;
//!
//! let mut plu = scale.read_plu(1)?;
//! plu.price = 12_990;
//! scale.write_plu(&plu)?;
//!
//! println!("{:?}", scale.read_status()?);
//! # Ok::<(), scalelink::ScaleError>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | Command table and record codecs |
//! | [`client`] | Controller engine and status poller |
//! | [`device`] | Emulator engine and data providers |
//! | [`transport`] | Serial, TCP and in-memory links |
//! | [`sync`] | Bulk PLU and message transfer |
//! | [`config`] | Link, client and device settings |
//! | [`error`] | Error types |

pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod protocol;
pub mod sync;
pub mod transport;

// Re-exports for convenience
pub use client::{LinkState, ScaleClient};
pub use device::DeviceEngine;
pub use error::{Result, ScaleError};
pub use transport::Link;
