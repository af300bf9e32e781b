//! Live weighing readings served for 0x89.

use rand::Rng;

use crate::protocol::status::LiveStatus;

/// Weight (g) above which the simulated scale reports overload.
pub const OVERLOAD_GRAMS: i32 = 15_000;

pub trait StatusSource: Send {
    fn reading(&mut self) -> LiveStatus;
}

/// Random platform load with a fixed price per kilogram.
#[derive(Debug, Clone)]
pub struct RandomStatus {
    /// Minor units per kilogram.
    pub unit_price: u32,
    pub plu: u32,
}

impl Default for RandomStatus {
    fn default() -> Self {
        Self {
            unit_price: 2500,
            plu: 1,
        }
    }
}

impl StatusSource for RandomStatus {
    fn reading(&mut self) -> LiveStatus {
        let weight = rand::rng().random_range(-200..20_000);
        let sum = if weight > 0 {
            (weight as u64 * self.unit_price as u64 / 1000) as u32
        } else {
            0
        };
        LiveStatus {
            overload: weight > OVERLOAD_GRAMS,
            tare: false,
            zero: weight == 0,
            dual_range: false,
            stable: true,
            weight,
            price: self.unit_price,
            sum,
            plu: self.plu,
        }
    }
}

/// Always the same reading.
#[derive(Debug, Clone, Default)]
pub struct FixedStatus(pub LiveStatus);

impl StatusSource for FixedStatus {
    fn reading(&mut self) -> LiveStatus {
        self.0
    }
}
