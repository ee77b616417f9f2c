//! Calendar-day source for ledger keys.
//!
//! Dose checks are keyed by the patient-local date; time of day is discarded.

use std::sync::Mutex;

use chrono::NaiveDate;

/// Provides the current patient-local calendar day.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Reads the local system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// Clock pinned to a settable date, for tests and replay.
#[derive(Debug)]
pub struct FixedClock {
    day: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(day: NaiveDate) -> Self {
        Self { day: Mutex::new(day) }
    }

    /// Move the clock to another day.
    pub fn set(&self, day: NaiveDate) {
        match self.day.lock() {
            Ok(mut current) => *current = day,
            Err(poisoned) => *poisoned.into_inner() = day,
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        match self.day.lock() {
            Ok(day) => *day,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn today(&self) -> NaiveDate {
        (**self).today()
    }
}
