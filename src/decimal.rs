//! Tagged fixed-point arithmetic.
//!
//! [`Price`], [`Quantity`] and [`Volume`] all wrap a raw `i64` scaled by
//! [`SCALE`] (10^8). The tag prevents mixing incompatible units at compile
//! time (`Price + Quantity` does not type-check) while the handful of
//! allowed cross-type operations (`Price * Quantity -> Volume`, ...) are
//! implemented explicitly below.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// Number of decimal places carried by every raw fixed-point value.
pub const SCALE_EXP: u32 = 8;
/// `10^SCALE_EXP`.
pub const SCALE: i64 = 100_000_000;

/// Rounds `raw / divisor` to the nearest integer, ties away from zero.
fn div_round_half_away(raw: i128, divisor: i128) -> i128 {
    debug_assert!(divisor > 0);
    let half = divisor / 2;
    if raw >= 0 {
        (raw + half) / divisor
    } else {
        -((-raw + half) / divisor)
    }
}

macro_rules! tagged_decimal {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// The additive identity.
            pub const ZERO: Self = Self(0);

            /// Builds a value directly from raw scaled units (no conversion).
            #[must_use]
            pub const fn from_raw(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw scaled integer.
            #[must_use]
            pub const fn raw(self) -> i64 {
                self.0
            }

            /// Builds a value from an integer and fractional-decimal string-free
            /// representation, e.g. `from_major_minor(100, 50_000_000)` for 100.5.
            #[must_use]
            pub const fn from_parts(major: i64, minor_scaled: i64) -> Self {
                Self(major * SCALE + minor_scaled)
            }

            /// Approximate conversion from an `f64`. Intended for test fixtures
            /// and tooling, never for hot-path arithmetic.
            #[must_use]
            pub fn from_f64(value: f64) -> Self {
                Self((value * SCALE as f64).round() as i64)
            }

            /// Approximate conversion to `f64`, for display/tooling only.
            #[must_use]
            pub fn to_f64(self) -> f64 {
                self.0 as f64 / SCALE as f64
            }

            #[must_use]
            pub fn is_zero(self) -> bool {
                self.0 == 0
            }

            #[must_use]
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }

            /// Checked addition; `None` on overflow.
            #[must_use]
            pub fn checked_add(self, rhs: Self) -> Option<Self> {
                self.0.checked_add(rhs.0).map(Self)
            }

            /// Checked subtraction; `None` on overflow.
            #[must_use]
            pub fn checked_sub(self, rhs: Self) -> Option<Self> {
                self.0.checked_sub(rhs.0).map(Self)
            }
        }

        impl Add for $name {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $name {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $name {
            type Output = Self;
            fn neg(self) -> Self {
                Self(-self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_f64())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let whole = self.0 / SCALE;
                let frac = (self.0 % SCALE).abs();
                write!(f, "{whole}.{frac:08}")
            }
        }
    };
}

tagged_decimal!(Price, "A price, scaled by `SCALE`.");
tagged_decimal!(Quantity, "A quantity, scaled by `SCALE`.");
tagged_decimal!(Volume, "A notional volume (price * quantity), scaled by `SCALE`.");

impl std::ops::Mul<Quantity> for Price {
    type Output = Volume;

    /// `Price * Quantity -> Volume`, computed with a 128-bit intermediate to
    /// avoid overflow, then rescaled back down by `SCALE`.
    fn mul(self, rhs: Quantity) -> Volume {
        let product = self.0 as i128 * rhs.0 as i128;
        Volume(div_round_half_away(product, SCALE as i128) as i64)
    }
}

impl std::ops::Mul<Price> for Quantity {
    type Output = Volume;
    fn mul(self, rhs: Price) -> Volume {
        rhs * self
    }
}

impl std::ops::Div<Quantity> for Volume {
    type Output = Price;

    /// `Volume / Quantity -> Price`.
    ///
    /// # Panics
    /// Panics if `rhs` is zero, matching integer division semantics.
    fn div(self, rhs: Quantity) -> Price {
        assert!(rhs.0 != 0, "division by zero quantity");
        let numerator = self.0 as i128 * SCALE as i128;
        Price(div_round_half_away(numerator, rhs.0 as i128) as i64)
    }
}

impl std::ops::Div<Price> for Volume {
    type Output = Quantity;

    /// `Volume / Price -> Quantity`.
    ///
    /// # Panics
    /// Panics if `rhs` is zero.
    fn div(self, rhs: Price) -> Quantity {
        assert!(rhs.0 != 0, "division by zero price");
        let numerator = self.0 as i128 * SCALE as i128;
        Quantity(div_round_half_away(numerator, rhs.0 as i128) as i64)
    }
}

/// Rounds `price` to the nearest multiple of `tick_size`, ties away from
/// zero (signed half-away-from-zero, per the tick-rounding contract).
///
/// # Panics
/// Panics if `tick_size` is zero or negative.
#[must_use]
pub fn tick_round(price: Price, tick_size: Price) -> Price {
    assert!(tick_size.0 > 0, "tick_size must be positive");
    let ticks = div_round_half_away(price.0 as i128, tick_size.0 as i128);
    Price((ticks * tick_size.0 as i128) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_times_quantity_is_volume() {
        let p = Price::from_parts(100, 0);
        let q = Quantity::from_parts(2, 0);
        let v = p * q;
        assert_eq!(v, Volume::from_parts(200, 0));
    }

    #[test]
    fn volume_round_trip_through_quantity() {
        let p = Price::from_parts(37, 0);
        let q = Quantity::from_parts(3, 0);
        let v = p * q;
        assert_eq!(v / q, p);
    }

    #[test]
    fn tick_round_half_away_from_zero() {
        let tick = Price::from_parts(0, 1_000_000); // 0.01
        let price = Price::from_parts(1, 5_500_000); // 1.055
        // 1.055 / 0.01 = 105.5 -> rounds to 106 (away from zero)
        assert_eq!(tick_round(price, tick), Price::from_parts(1, 6_000_000));

        let neg = Price::from_parts(-1, -5_500_000);
        assert_eq!(tick_round(neg, tick), Price::from_parts(-1, -6_000_000));
    }

    #[test]
    fn display_formats_with_full_scale() {
        let p = Price::from_parts(5, 0);
        assert_eq!(format!("{p}"), "5.00000000");
    }

    proptest::proptest! {
        #[test]
        fn price_quantity_division_round_trips(a in 1i64..1_000_000, b in 1i64..1_000_000) {
            let p = Price::from_raw(a);
            let q = Quantity::from_raw(b);
            let v = p * q;
            let back = v / q;
            // Division can lose at most one unit of raw precision to rounding.
            proptest::prop_assert!((back.raw() - p.raw()).abs() <= 1);
        }
    }
}
