use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::types::{Direction, SignalRecord};

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl From<Direction> for Side {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Bull => Side::Buy,
            Direction::Bear => Side::Sell,
        }
    }
}

/// An order derived from one signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub ticker: String,
    pub side: Side,
    pub quantity: u32,
    /// Signal price, used as the limit
    pub price: Decimal,
    /// Signal level the order came from
    pub level: String,
}

impl OrderRequest {
    pub fn from_signal(record: &SignalRecord, quantity: u32) -> Self {
        Self {
            ticker: record.ticker.clone(),
            side: record.direction.into(),
            quantity,
            price: record.price,
            level: record.level.clone(),
        }
    }

    /// Notional value of the order
    pub fn notional(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}
