//! Rational media time values.
//!
//! [`MediaTime`] is a point or duration on a media timeline expressed as
//! `value / timescale` seconds. Times with different timescales compare
//! exactly (by cross-multiplication), so a sample at `1001/30000` and a query
//! at `0.0333667` seconds can be related without floating-point drift.
//!
//! # Example
//!
//! ```
//! use stillframe::{MediaTime, RoundingMethod};
//!
//! let sample = MediaTime::new(3003, 90_000)?;
//! let query = MediaTime::from_seconds(0.0333667, 1_000_000);
//! let in_track_scale = query.convert_scale(90_000, RoundingMethod::HalfAwayFromZero);
//! assert_eq!(in_track_scale, sample);
//! # Ok::<(), stillframe::StillframeError>(())
//! ```

use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::error::StillframeError;

/// How to round when converting a [`MediaTime`] to a coarser timescale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundingMethod {
    /// Round to nearest, ties away from zero. This is the default.
    #[default]
    HalfAwayFromZero,
    /// Truncate toward zero.
    TowardZero,
    /// Round away from zero.
    AwayFromZero,
    /// Round toward negative infinity.
    Down,
    /// Round toward positive infinity.
    Up,
}

/// A rational time value: `value / timescale` seconds.
///
/// Invariant: `timescale > 0`. Equality, ordering and hashing are defined on
/// the represented rational, so `MediaTime(1, 2) == MediaTime(15, 30)`.
#[derive(Debug, Clone, Copy)]
pub struct MediaTime {
    value: i64,
    timescale: i32,
}

/// Microsecond timescale used when converting from [`Duration`].
const MICROSECOND_TIMESCALE: i32 = 1_000_000;

impl MediaTime {
    /// Time zero.
    pub const ZERO: MediaTime = MediaTime {
        value: 0,
        timescale: 1,
    };

    /// Create a time value, validating the timescale.
    ///
    /// # Errors
    ///
    /// Returns [`StillframeError::InvalidTimescale`] if `timescale <= 0`.
    pub fn new(value: i64, timescale: i32) -> Result<Self, StillframeError> {
        if timescale <= 0 {
            return Err(StillframeError::InvalidTimescale(timescale));
        }
        Ok(Self { value, timescale })
    }

    /// Convert floating-point seconds to the given timescale, rounding half
    /// away from zero. A non-positive timescale is clamped to 1.
    pub fn from_seconds(seconds: f64, timescale: i32) -> Self {
        let timescale = timescale.max(1);
        let scaled = (seconds * f64::from(timescale)).round();
        Self {
            value: scaled as i64,
            timescale,
        }
    }

    /// Convert a [`Duration`] to a microsecond-precision time.
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            value: i64::try_from(duration.as_micros()).unwrap_or(i64::MAX),
            timescale: MICROSECOND_TIMESCALE,
        }
    }

    /// The numerator.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// The denominator (ticks per second).
    pub fn timescale(&self) -> i32 {
        self.timescale
    }

    /// The time in seconds as a float. Lossy.
    pub fn as_seconds_f64(&self) -> f64 {
        self.value as f64 / f64::from(self.timescale)
    }

    /// Convert to a [`Duration`]. Returns `None` for negative times.
    pub fn to_duration(&self) -> Option<Duration> {
        if self.value < 0 {
            return None;
        }
        let micros = rescale(
            i128::from(self.value),
            i128::from(MICROSECOND_TIMESCALE),
            i128::from(self.timescale),
            RoundingMethod::HalfAwayFromZero,
        );
        Some(Duration::from_micros(micros.max(0) as u64))
    }

    /// The whole-second bucket this time falls in (floor of seconds).
    pub fn whole_seconds(&self) -> i64 {
        self.value.div_euclid(i64::from(self.timescale))
    }

    /// Express this time in another timescale.
    ///
    /// Values that do not fit in `i64` saturate. A non-positive target
    /// timescale is clamped to 1.
    #[must_use]
    pub fn convert_scale(&self, timescale: i32, rounding: RoundingMethod) -> MediaTime {
        let timescale = timescale.max(1);
        if timescale == self.timescale {
            return *self;
        }
        let value = rescale(
            i128::from(self.value),
            i128::from(timescale),
            i128::from(self.timescale),
            rounding,
        );
        MediaTime { value, timescale }
    }

    /// Sum of two times, or `None` on overflow.
    pub fn checked_add(self, other: MediaTime) -> Option<MediaTime> {
        let (a, b, timescale) = self.common_scale(other)?;
        Some(MediaTime {
            value: a.checked_add(b)?,
            timescale,
        })
    }

    /// Difference of two times, or `None` on overflow.
    pub fn checked_sub(self, other: MediaTime) -> Option<MediaTime> {
        let (a, b, timescale) = self.common_scale(other)?;
        Some(MediaTime {
            value: a.checked_sub(b)?,
            timescale,
        })
    }

    /// Returns `true` if this time is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// Express both values over the least common multiple of the timescales.
    fn common_scale(self, other: MediaTime) -> Option<(i64, i64, i32)> {
        if self.timescale == other.timescale {
            return Some((self.value, other.value, self.timescale));
        }
        let divisor = gcd(i64::from(self.timescale), i64::from(other.timescale));
        let lcm = i64::from(self.timescale) / divisor * i64::from(other.timescale);
        let timescale = i32::try_from(lcm).ok()?;
        let a = self
            .value
            .checked_mul(lcm / i64::from(self.timescale))?;
        let b = other
            .value
            .checked_mul(lcm / i64::from(other.timescale))?;
        Some((a, b, timescale))
    }

    /// The lowest-terms representation, used for hashing.
    fn reduced(&self) -> (i64, i64) {
        let timescale = i64::from(self.timescale);
        let divisor = gcd(self.value, timescale).max(1);
        (self.value / divisor, timescale / divisor)
    }
}

impl Default for MediaTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialEq for MediaTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MediaTime {}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTime {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.timescale == other.timescale {
            return self.value.cmp(&other.value);
        }
        let left = i128::from(self.value) * i128::from(other.timescale);
        let right = i128::from(other.value) * i128::from(self.timescale);
        left.cmp(&right)
    }
}

impl Hash for MediaTime {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reduced().hash(state);
    }
}

impl Display for MediaTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{:.3}s ({}/{})",
            self.as_seconds_f64(),
            self.value,
            self.timescale
        )
    }
}

impl From<Duration> for MediaTime {
    fn from(duration: Duration) -> Self {
        Self::from_duration(duration)
    }
}

/// Compute `value * numerator / denominator` with the given rounding,
/// saturating to the `i64` range. `denominator` must be positive.
fn rescale(value: i128, numerator: i128, denominator: i128, rounding: RoundingMethod) -> i64 {
    let product = value * numerator;
    let quotient = product / denominator;
    let remainder = product % denominator;
    let sign = product.signum();

    let rounded = if remainder == 0 {
        quotient
    } else {
        match rounding {
            RoundingMethod::TowardZero => quotient,
            RoundingMethod::AwayFromZero => quotient + sign,
            RoundingMethod::Down => {
                if product < 0 {
                    quotient - 1
                } else {
                    quotient
                }
            }
            RoundingMethod::Up => {
                if product > 0 {
                    quotient + 1
                } else {
                    quotient
                }
            }
            RoundingMethod::HalfAwayFromZero => {
                if remainder.abs() * 2 >= denominator {
                    quotient + sign
                } else {
                    quotient
                }
            }
        }
    };

    rounded.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(value: i64, timescale: i32) -> MediaTime {
        MediaTime::new(value, timescale).unwrap()
    }

    #[test]
    fn rejects_non_positive_timescale() {
        assert!(MediaTime::new(1, 0).is_err());
        assert!(MediaTime::new(1, -30).is_err());
    }

    #[test]
    fn equality_across_timescales() {
        assert_eq!(time(1, 2), time(15, 30));
        assert!(time(1, 3) < time(34, 100));
        assert!(time(-1, 3) < time(0, 7));
    }

    #[test]
    fn convert_scale_rounds_half_away_from_zero() {
        let half = time(5, 10);
        assert_eq!(half.convert_scale(1, RoundingMethod::HalfAwayFromZero).value(), 1);
        let negative_half = time(-5, 10);
        assert_eq!(
            negative_half
                .convert_scale(1, RoundingMethod::HalfAwayFromZero)
                .value(),
            -1
        );
        let below_half = time(4, 10);
        assert_eq!(below_half.convert_scale(1, RoundingMethod::HalfAwayFromZero).value(), 0);
    }

    #[test]
    fn convert_scale_directed_rounding() {
        let value = time(-7, 2);
        assert_eq!(value.convert_scale(1, RoundingMethod::Down).value(), -4);
        assert_eq!(value.convert_scale(1, RoundingMethod::Up).value(), -3);
        assert_eq!(value.convert_scale(1, RoundingMethod::TowardZero).value(), -3);
        assert_eq!(value.convert_scale(1, RoundingMethod::AwayFromZero).value(), -4);
    }

    #[test]
    fn whole_seconds_floors() {
        assert_eq!(time(18, 10).whole_seconds(), 1);
        assert_eq!(time(-1, 10).whole_seconds(), -1);
        assert_eq!(time(30, 30).whole_seconds(), 1);
    }

    #[test]
    fn checked_arithmetic_uses_common_scale() {
        let sum = time(1, 2).checked_add(time(1, 3)).unwrap();
        assert_eq!(sum, time(5, 6));
        assert_eq!(sum.timescale(), 6);
        let difference = time(1, 2).checked_sub(time(1, 3)).unwrap();
        assert_eq!(difference, time(1, 6));
    }

    #[test]
    fn duration_round_trip_at_microsecond_precision() {
        let duration = Duration::from_millis(1500);
        let media = MediaTime::from_duration(duration);
        assert_eq!(media, time(3, 2));
        assert_eq!(media.to_duration(), Some(duration));
        assert_eq!(time(-1, 1).to_duration(), None);
    }
}
