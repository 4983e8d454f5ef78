// libs/appointment-cell/src/services/slots.rs
use chrono::{Duration, NaiveTime};

use crate::models::{SlotGridConfig, TimeSlot};

/// The fixed, ordered set of bookable slots for a clinic day.
///
/// Every day shares the same grid. `SlotGrid::standard()` is the single
/// source of truth used by availability, booking validation and the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotGrid {
    slots: Vec<TimeSlot>,
}

impl SlotGrid {
    pub fn standard() -> Self {
        Self::from_config(&SlotGridConfig::default())
    }

    pub fn from_config(config: &SlotGridConfig) -> Self {
        let mut slots = Vec::new();
        if config.interval_minutes == 0 {
            return Self { slots };
        }

        let step = Duration::minutes(config.interval_minutes as i64);
        let mut current: NaiveTime = config.opens_at;

        loop {
            let within = if config.include_closing_slot {
                current <= config.closes_at
            } else {
                current < config.closes_at
            };
            if !within {
                break;
            }

            slots.push(TimeSlot::from_time(current));

            let (next, wrapped) = current.overflowing_add_signed(step);
            if wrapped != 0 || next <= current {
                break;
            }
            current = next;
        }

        Self { slots }
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn to_vec(&self) -> Vec<TimeSlot> {
        self.slots.clone()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, slot: &TimeSlot) -> bool {
        self.slots.binary_search(slot).is_ok()
    }

    pub fn labels(&self) -> Vec<String> {
        self.slots.iter().map(TimeSlot::label).collect()
    }
}

impl Default for SlotGrid {
    fn default() -> Self {
        Self::standard()
    }
}
