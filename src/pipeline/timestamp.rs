//! Packet timestamps.
//!
//! A [`Timestamp`] is a signed microsecond count. A handful of values at both
//! ends of the `i64` range are reserved:
//!
//! | Value | Meaning |
//! |---|---|
//! | [`Timestamp::UNSET`] | No timestamp assigned yet (fresh packets) |
//! | [`Timestamp::UNSTARTED`] | Initial bound of a stream before any packet |
//! | [`Timestamp::MIN`]..=[`Timestamp::MAX`] | Range values a packet may carry |
//! | [`Timestamp::DONE`] | Stream closed, no packet will ever follow |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

/// Signed distance between two timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TimestampDiff(pub i64);

impl Timestamp {
    pub const UNSET: Timestamp = Timestamp(i64::MIN);
    pub const UNSTARTED: Timestamp = Timestamp(i64::MIN + 1);
    pub const MIN: Timestamp = Timestamp(i64::MIN + 2);
    pub const MAX: Timestamp = Timestamp(i64::MAX - 1);
    pub const DONE: Timestamp = Timestamp(i64::MAX);

    /// Creates a timestamp from a microsecond count, clamped into the range values.
    pub fn new(micros: i64) -> Self {
        Self(micros.clamp(Self::MIN.0, Self::MAX.0))
    }

    #[inline]
    pub fn value(self) -> i64 {
        self.0
    }

    /// `true` for timestamps a packet may carry.
    #[inline]
    pub fn is_range_value(self) -> bool {
        self >= Self::MIN && self <= Self::MAX
    }

    #[inline]
    pub fn is_unset(self) -> bool {
        self == Self::UNSET
    }

    #[inline]
    pub fn is_done(self) -> bool {
        self == Self::DONE
    }

    /// Smallest timestamp strictly after this one.
    pub fn next(self) -> Self {
        match self {
            Self::UNSET | Self::UNSTARTED => Self::MIN,
            Self::MAX | Self::DONE => Self::DONE,
            Self(v) => Self(v + 1),
        }
    }

    /// Shifts a bound by `diff`, keeping special values fixed and saturating
    /// into `[MIN, DONE]`.
    pub fn offset_bound(self, diff: TimestampDiff) -> Self {
        if !self.is_range_value() {
            return self;
        }
        let shifted = self.0.saturating_add(diff.0);
        if shifted > Self::MAX.0 {
            Self::DONE
        } else {
            Self(shifted.max(Self::MIN.0))
        }
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::UNSET
    }
}

impl From<i64> for Timestamp {
    fn from(micros: i64) -> Self {
        Self::new(micros)
    }
}

impl From<i32> for Timestamp {
    fn from(micros: i32) -> Self {
        Self::new(i64::from(micros))
    }
}

impl Add<TimestampDiff> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: TimestampDiff) -> Timestamp {
        if self.is_range_value() {
            Timestamp::new(self.0.saturating_add(rhs.0))
        } else {
            self
        }
    }
}

impl Sub for Timestamp {
    type Output = TimestampDiff;

    fn sub(self, rhs: Timestamp) -> TimestampDiff {
        TimestampDiff(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::UNSET => write!(f, "Timestamp::UNSET"),
            Self::UNSTARTED => write!(f, "Timestamp::UNSTARTED"),
            Self::DONE => write!(f, "Timestamp::DONE"),
            Self(v) => write!(f, "Timestamp({v})"),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::UNSET => write!(f, "Unset"),
            Self::UNSTARTED => write!(f, "Unstarted"),
            Self::DONE => write!(f, "Done"),
            Self(v) => write!(f, "{v}"),
        }
    }
}
