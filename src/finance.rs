//! General functions related to finance.
use crate::units::{
    Dimensionless, Energy, MoneyPerEnergy, MoneyPerPower, MoneyPerPowerPerYear, MoneyPerYear,
};

/// Annual energy below which a levelised cost is reported as zero.
///
/// An asset which is installed but (almost) never used would otherwise report a huge or infinite
/// cost per MWh.
pub const LEVELISED_COST_ENERGY_THRESHOLD: Energy = Energy(1e-3);

/// Calculates the capital recovery factor (CRF) for a given lifetime and discount rate.
///
/// The CRF is used to annualise capital costs over the lifetime of an asset. With a discount rate
/// of zero, this reduces to straight-line annualisation (i.e. `1 / lifetime`).
pub fn capital_recovery_factor(lifetime: u32, discount_rate: Dimensionless) -> Dimensionless {
    if lifetime == 0 {
        return Dimensionless(0.0);
    }
    if discount_rate == Dimensionless(0.0) {
        return Dimensionless(1.0) / Dimensionless(f64::from(lifetime));
    }
    let exponent = i32::try_from(lifetime).unwrap_or(i32::MAX);
    let factor = (Dimensionless(1.0) + discount_rate).powi(exponent);
    (discount_rate * factor) / (factor - Dimensionless(1.0))
}

/// Calculates the annualised cost of one MW of capacity.
///
/// This is the annualised investment plus any fixed operating cost which scales with capacity.
pub fn annual_capital_cost(
    capex: MoneyPerPower,
    lifetime: u32,
    discount_rate: Dimensionless,
    fixed_operating_cost: MoneyPerPowerPerYear,
) -> MoneyPerPowerPerYear {
    let crf = capital_recovery_factor(lifetime, discount_rate);
    MoneyPerPowerPerYear(capex.value() * crf.value()) + fixed_operating_cost
}

/// Calculates a levelised cost of energy (or of storage).
///
/// Returns zero if the annual energy does not exceed [`LEVELISED_COST_ENERGY_THRESHOLD`].
pub fn levelised_cost(annualised_cost: MoneyPerYear, annual_energy: Energy) -> MoneyPerEnergy {
    if annual_energy <= LEVELISED_COST_ENERGY_THRESHOLD {
        return MoneyPerEnergy(0.0);
    }

    annualised_cost / annual_energy
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0.05, 0.0)] // Edge case: lifetime==0
    #[case(10, 0.0, 0.1)] // Other edge case: discount_rate==0
    #[case(10, 0.05, 0.1295045749654567)]
    #[case(5, 0.03, 0.2183545714005762)]
    fn test_capital_recovery_factor(
        #[case] lifetime: u32,
        #[case] discount_rate: f64,
        #[case] expected: f64,
    ) {
        let result = capital_recovery_factor(lifetime, Dimensionless(discount_rate));
        assert_approx_eq!(f64, result.0, expected, epsilon = 1e-10);
    }

    #[rstest]
    #[case(1000.0, 10, 0.05, 0.0, 129.5045749654567)]
    #[case(500_000.0, 25, 0.0, 0.0, 20_000.0)] // Solar, straight-line
    #[case(8_000_000.0, 20, 0.0, 22_000.0, 422_000.0)] // Biomass ORC with fixed opex
    #[case(1000.0, 0, 0.05, 0.0, 0.0)] // Zero lifetime
    fn test_annual_capital_cost(
        #[case] capex: f64,
        #[case] lifetime: u32,
        #[case] discount_rate: f64,
        #[case] fixed_operating_cost: f64,
        #[case] expected: f64,
    ) {
        let result = annual_capital_cost(
            MoneyPerPower(capex),
            lifetime,
            Dimensionless(discount_rate),
            MoneyPerPowerPerYear(fixed_operating_cost),
        );
        assert_approx_eq!(
            MoneyPerPowerPerYear,
            result,
            MoneyPerPowerPerYear(expected),
            epsilon = 1e-8
        );
    }

    #[rstest]
    #[case(1000.0, 50.0, 20.0)]
    #[case(1000.0, 0.0, 0.0)] // Unused asset
    #[case(1000.0, 1e-4, 0.0)] // Below threshold
    #[case(0.0, 50.0, 0.0)] // Free asset
    fn test_levelised_cost(#[case] cost: f64, #[case] energy: f64, #[case] expected: f64) {
        let result = levelised_cost(MoneyPerYear(cost), Energy(energy));
        assert_approx_eq!(MoneyPerEnergy, result, MoneyPerEnergy(expected));
    }
}
