//! This module defines various unit types and their conversions.
//!
//! All time-varying quantities in the model are hourly, so a [`Power`] held for one timestep
//! corresponds to the same number of MWh of [`Energy`].
use float_cmp::{ApproxEq, F64Margin};
use serde::{Deserialize, Serialize};
use std::iter::Sum;

macro_rules! unit_struct {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug,
            Default,
            Clone,
            Copy,
            PartialEq,
            PartialOrd,
            Serialize,
            Deserialize,
            derive_more::Add,
            derive_more::Sub,
            derive_more::AddAssign,
            derive_more::SubAssign,
            derive_more::Neg,
            derive_more::Display,
        )]
        #[serde(transparent)]
        pub struct $name(pub f64);

        impl $name {
            /// Create from an `f64` value
            pub fn new(value: f64) -> Self {
                Self(value)
            }

            /// Returns the underlying `f64` value
            pub fn value(self) -> f64 {
                self.0
            }

            /// Whether the value is neither infinite nor NaN
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }

            /// The absolute value
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }

            /// The larger of two values
            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }

            /// The smaller of two values
            pub fn min(self, other: Self) -> Self {
                Self(self.0.min(other.0))
            }
        }

        impl From<f64> for $name {
            fn from(value: f64) -> Self {
                Self(value)
            }
        }

        impl std::ops::Mul<Dimensionless> for $name {
            type Output = $name;
            fn mul(self, rhs: Dimensionless) -> $name {
                $name(self.0 * rhs.0)
            }
        }

        impl std::ops::Div<Dimensionless> for $name {
            type Output = $name;
            fn div(self, rhs: Dimensionless) -> $name {
                $name(self.0 / rhs.0)
            }
        }

        impl std::ops::Div<$name> for $name {
            type Output = Dimensionless;
            fn div(self, rhs: $name) -> Dimensionless {
                Dimensionless(self.0 / rhs.0)
            }
        }

        impl Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                $name(iter.map(|x| x.0).sum())
            }
        }

        impl ApproxEq for $name {
            type Margin = F64Margin;

            fn approx_eq<M: Into<Self::Margin>>(self, other: Self, margin: M) -> bool {
                self.0.approx_eq(other.0, margin)
            }
        }
    };
}

macro_rules! impl_mul {
    ($Lhs:ty, $Rhs:ty, $Out:ty) => {
        impl std::ops::Mul<$Rhs> for $Lhs {
            type Output = $Out;
            fn mul(self, rhs: $Rhs) -> $Out {
                <$Out>::new(self.0 * rhs.0)
            }
        }
        impl std::ops::Mul<$Lhs> for $Rhs {
            type Output = $Out;
            fn mul(self, lhs: $Lhs) -> $Out {
                <$Out>::new(self.0 * lhs.0)
            }
        }
    };
}

macro_rules! impl_div {
    ($Lhs:ty, $Rhs:ty, $Out:ty) => {
        impl std::ops::Div<$Rhs> for $Lhs {
            type Output = $Out;
            fn div(self, rhs: $Rhs) -> $Out {
                <$Out>::new(self.0 / rhs.0)
            }
        }
    };
}

/// Represents a dimensionless quantity.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
    derive_more::Add,
    derive_more::Sub,
    derive_more::Neg,
    derive_more::Display,
)]
#[serde(transparent)]
pub struct Dimensionless(pub f64);

impl Dimensionless {
    /// Create from an `f64` value
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    /// Returns the underlying `f64` value
    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether the value is neither infinite nor NaN
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }

    /// Raise to an integer power
    pub fn powi(self, rhs: i32) -> Self {
        Self(self.0.powi(rhs))
    }
}

impl From<f64> for Dimensionless {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl std::ops::Mul for Dimensionless {
    type Output = Dimensionless;

    fn mul(self, rhs: Dimensionless) -> Self::Output {
        Dimensionless(self.0 * rhs.0)
    }
}

impl std::ops::Div for Dimensionless {
    type Output = Dimensionless;

    fn div(self, rhs: Dimensionless) -> Self::Output {
        Dimensionless(self.0 / rhs.0)
    }
}

impl ApproxEq for Dimensionless {
    type Margin = F64Margin;

    fn approx_eq<M: Into<Self::Margin>>(self, other: Self, margin: M) -> bool {
        self.0.approx_eq(other.0, margin)
    }
}

// Base quantities
unit_struct!(Power, "Electrical power in MW.");
unit_struct!(Energy, "Electrical energy in MWh.");
unit_struct!(Hours, "A duration in hours.");
unit_struct!(Money, "An amount of money in euros.");

// Derived quantities
unit_struct!(MoneyPerPower, "A unit investment cost in €/MW.");
unit_struct!(MoneyPerPowerPerYear, "An annualised cost per unit capacity in €/MW/year.");
unit_struct!(MoneyPerYear, "An annual cost in €/year.");
unit_struct!(MoneyPerEnergy, "A cost per unit energy in €/MWh.");

// Multiplication rules
impl_mul!(Power, Hours, Energy);
impl_mul!(MoneyPerPower, Power, Money);
impl_mul!(MoneyPerPowerPerYear, Power, MoneyPerYear);
impl_mul!(MoneyPerEnergy, Energy, Money);

// Division rules
impl_div!(Energy, Hours, Power);
impl_div!(Energy, Power, Hours);
impl_div!(Money, Power, MoneyPerPower);
impl_div!(MoneyPerYear, Energy, MoneyPerEnergy);

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn power_times_hours_is_energy() {
        assert_eq!(Power(2.0) * Hours(5.0), Energy(10.0));
        assert_eq!(Hours(5.0) * Power(2.0), Energy(10.0));
        assert_eq!(Energy(10.0) / Power(2.0), Hours(5.0));
    }

    #[test]
    fn annual_cost_per_energy() {
        let cost = MoneyPerPowerPerYear(50.0) * Power(2.0);
        assert_eq!(cost, MoneyPerYear(100.0));
        assert_approx_eq!(MoneyPerEnergy, cost / Energy(40.0), MoneyPerEnergy(2.5));
    }

    #[test]
    fn sum_and_scale() {
        let total: Energy = [Energy(1.0), Energy(2.5)].into_iter().sum();
        assert_eq!(total, Energy(3.5));
        assert_eq!(total * Dimensionless(2.0), Energy(7.0));
        assert_eq!(Energy(7.0) / Energy(3.5), Dimensionless(2.0));
    }

    #[test]
    fn deserialise_transparent() {
        #[derive(Deserialize)]
        struct Wrapper {
            power: Power,
        }

        let wrapper: Wrapper = toml::from_str("power = 0.03").unwrap();
        assert_eq!(wrapper.power, Power(0.03));
    }
}
