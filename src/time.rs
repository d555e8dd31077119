//! Timestamp arithmetic between host time units and codec time bases.
//!
//! The host speaks 100-ns ticks (HNS). The codec library speaks rationals: each
//! stream has its own time base, and container-level values (duration, start
//! time, seek targets) use the microsecond `TIME_BASE`.

/// Host time units per second (100-ns ticks).
pub const HNS_PER_SEC: i64 = 10_000_000;

/// A rational time base, `num / den` seconds per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// A time base is usable when neither side is zero.
    pub fn is_valid(&self) -> bool {
        self.num != 0 && self.den != 0
    }
}

/// The codec library's container-level time base (microseconds).
pub const TIME_BASE: Rational = Rational::new(1, 1_000_000);

/// Host time units expressed as a rational.
pub const HNS_TIME_BASE: Rational = Rational::new(1, HNS_PER_SEC as i32);

/// Rescale `value` from one time base to another.
///
/// We compute in 128 bits and round half away from zero, then saturate to `i64`.
/// Invalid time bases yield `0` rather than dividing by zero.
pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
    if !from.is_valid() || !to.is_valid() {
        return 0;
    }

    let mut num = i128::from(value) * i128::from(from.num) * i128::from(to.den);
    let mut den = i128::from(from.den) * i128::from(to.num);
    if den < 0 {
        num = -num;
        den = -den;
    }

    let half = den / 2;
    let rounded = if num >= 0 {
        (num + half) / den
    } else {
        -((-num + half) / den)
    };

    rounded.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Convert host time units into `base`.
pub fn to_codec_time(hns: i64, base: Rational) -> i64 {
    rescale(hns, HNS_TIME_BASE, base)
}

/// Convert a timestamp in `base` into host time units.
pub fn from_codec_time(ts: i64, base: Rational) -> i64 {
    rescale(ts, base, HNS_TIME_BASE)
}
