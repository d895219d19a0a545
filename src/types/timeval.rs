//! Second/microsecond timestamps and durations.
//!
//! Capture formats store time as a (seconds, microseconds) pair. All values are
//! kept normalized so that `0 <= usec < 1_000_000`; subtraction borrows from the
//! seconds component and addition carries into it.

use std::ops::{Add, Sub};
use std::time::Duration;

pub const USEC_PER_SEC: i64 = 1_000_000;

/// A normalized (seconds, microseconds) pair.
///
/// Used both for absolute capture timestamps and for signed durations between
/// them. A negative duration has a negative `sec` and a non-negative `usec`,
/// e.g. -1.5s is `{ sec: -2, usec: 500_000 }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timeval {
    sec: i64,
    usec: i64,
}

impl Timeval {
    pub const ZERO: Timeval = Timeval { sec: 0, usec: 0 };

    /// Build a timestamp, folding any out-of-range microseconds into seconds.
    pub const fn new(sec: i64, usec: i64) -> Self {
        Self {
            sec: sec + usec.div_euclid(USEC_PER_SEC),
            usec: usec.rem_euclid(USEC_PER_SEC),
        }
    }

    pub const fn from_micros(micros: i64) -> Self {
        Self::new(0, micros)
    }

    pub const fn sec(&self) -> i64 {
        self.sec
    }

    pub const fn usec(&self) -> i64 {
        self.usec
    }

    /// Total length in microseconds.
    pub const fn as_micros(&self) -> i64 {
        self.sec * USEC_PER_SEC + self.usec
    }

    pub const fn is_negative(&self) -> bool {
        self.sec < 0
    }

    /// `self - earlier`, borrowing a second when the microsecond part underflows.
    pub const fn diff(&self, earlier: &Timeval) -> Timeval {
        let mut sec = self.sec - earlier.sec;
        let mut usec = self.usec - earlier.usec;
        if usec < 0 {
            usec += USEC_PER_SEC;
            sec -= 1;
        }
        Timeval { sec, usec }
    }

    /// Scale by a non-negative factor, rounding to the nearest microsecond.
    pub fn scale(&self, factor: f64) -> Timeval {
        Timeval::from_micros((self.as_micros() as f64 * factor).round() as i64)
    }

    /// Convert to a [`Duration`]; negative values have no representation.
    pub fn to_duration(&self) -> Option<Duration> {
        if self.is_negative() {
            return None;
        }
        Some(Duration::from_secs(self.sec as u64) + Duration::from_micros(self.usec as u64))
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self::new(duration.as_secs() as i64, i64::from(duration.subsec_micros()))
    }
}

impl Add for Timeval {
    type Output = Timeval;

    fn add(self, rhs: Timeval) -> Timeval {
        let mut sec = self.sec + rhs.sec;
        let mut usec = self.usec + rhs.usec;
        if usec >= USEC_PER_SEC {
            usec -= USEC_PER_SEC;
            sec += 1;
        }
        Timeval { sec, usec }
    }
}

impl Sub for Timeval {
    type Output = Timeval;

    fn sub(self, rhs: Timeval) -> Timeval {
        self.diff(&rhs)
    }
}

impl std::fmt::Display for Timeval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_negative() {
            let positive = Timeval::ZERO.diff(self);
            write!(f, "-{}.{:06}", positive.sec, positive.usec)
        } else {
            write!(f, "{}.{:06}", self.sec, self.usec)
        }
    }
}
