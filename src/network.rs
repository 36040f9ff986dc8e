//! The physical topology of the micro-grid.
//!
//! A [`Network`] is made up of buses, which must be kept in balance in every timestep, and the
//! loads, generators, storage units and links attached to them. Each kind of asset is a separate
//! record type with its own named fields.
use crate::id::{define_id_type, find_duplicate_id};
use crate::input::time_series::{MalformedInputError, check_length};
use crate::model::ConfigurationError;
use crate::model::parameters::check_non_negative;
use crate::units::{
    Dimensionless, Energy, Hours, Money, MoneyPerEnergy, MoneyPerPower, MoneyPerPowerPerYear,
    MoneyPerYear, Power,
};
use anyhow::Result;
use chrono::NaiveDateTime;
use indexmap::IndexSet;
use std::fmt;

pub mod builder;
pub use builder::build_network;

define_id_type!(BusID);
define_id_type!(AssetID);

/// A quantity which is either the same in every timestep or given separately for each one
#[derive(Debug, Clone, PartialEq)]
pub enum Profile<T> {
    /// The same value in every timestep
    Constant(T),
    /// One value per timestep
    Varying(Vec<T>),
}

impl<T: Copy> Profile<T> {
    /// The value at the given timestep
    pub fn at(&self, timestep: usize) -> T {
        match self {
            Self::Constant(value) => *value,
            Self::Varying(values) => values[timestep],
        }
    }

    /// Iterate over the values for the first `n_timesteps` timesteps
    pub fn iter(&self, n_timesteps: usize) -> impl Iterator<Item = T> + '_ {
        (0..n_timesteps).map(move |timestep| self.at(timestep))
    }

    fn check_length(&self, series: &str, n_timesteps: usize) -> Result<(), MalformedInputError> {
        match self {
            Self::Constant(_) => Ok(()),
            Self::Varying(values) => check_length(series, n_timesteps, values.len()),
        }
    }
}

/// The nominal power capacity of an asset
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Capacity {
    /// The capacity is a fixed value
    Fixed(Power),
    /// The capacity is a decision variable in the optimisation
    Extendable {
        /// Lower bound
        min: Power,
        /// Upper bound (if any)
        max: Option<Power>,
    },
}

impl Capacity {
    /// An extendable capacity with no bounds other than non-negativity
    pub fn unbounded() -> Self {
        Self::Extendable {
            min: Power(0.0),
            max: None,
        }
    }

    /// Whether the capacity is chosen by the optimisation
    pub fn is_extendable(&self) -> bool {
        matches!(self, Self::Extendable { .. })
    }

    /// The capacity, if fixed
    pub fn fixed_value(&self) -> Option<Power> {
        match self {
            Self::Fixed(capacity) => Some(*capacity),
            Self::Extendable { .. } => None,
        }
    }

    fn validate(&self, asset: &AssetID) -> Result<(), ConfigurationError> {
        match *self {
            Self::Fixed(capacity) => {
                check_non_negative(capacity.value(), &format!("{asset}.p_nom"))
            }
            Self::Extendable { min, max } => {
                check_non_negative(min.value(), &format!("{asset}.p_nom_min"))?;
                if let Some(max) = max {
                    check_non_negative(max.value(), &format!("{asset}.p_nom_max"))?;
                    if min > max {
                        return Err(ConfigurationError::ContradictoryCapacity {
                            asset: asset.to_string(),
                            reason: "minimum capacity is greater than maximum capacity",
                        });
                    }
                }

                Ok(())
            }
        }
    }
}

/// Produces power onto a single bus
#[derive(Debug, Clone, PartialEq)]
pub struct Generator {
    /// Unique name among generators
    pub name: AssetID,
    /// The bus the generator is attached to
    pub bus: BusID,
    /// Nominal power
    pub capacity: Capacity,
    /// Annualised cost of capacity, charged in the objective for extendable capacity
    pub capital_cost: MoneyPerPowerPerYear,
    /// Investment cost of capacity, counted against the capex budget
    pub unit_capex: MoneyPerPower,
    /// Cost of generation; negative values represent revenue
    pub marginal_cost: Profile<MoneyPerEnergy>,
    /// Minimum output per unit of capacity (may be negative)
    pub p_min_pu: Profile<Dimensionless>,
    /// Maximum output per unit of capacity
    pub p_max_pu: Profile<Dimensionless>,
}

impl Generator {
    /// The key referring to this generator
    pub fn key(&self) -> AssetKey {
        AssetKey::Generator(self.name.clone())
    }
}

/// Stores energy in a reservoir, which may also receive exogenous inflow
#[derive(Debug, Clone, PartialEq)]
pub struct StorageUnit {
    /// Unique name among storage units
    pub name: AssetID,
    /// The bus the storage unit is attached to
    pub bus: BusID,
    /// Nominal power
    pub capacity: Capacity,
    /// Annualised cost of capacity, charged in the objective for extendable capacity
    pub capital_cost: MoneyPerPowerPerYear,
    /// Investment cost of capacity, counted against the capex budget
    pub unit_capex: MoneyPerPower,
    /// Cost per MWh dispatched
    pub marginal_cost: Profile<MoneyPerEnergy>,
    /// Charging limit per unit of capacity, as a non-positive number
    pub p_min_pu: Dimensionless,
    /// Discharging limit per unit of capacity
    pub p_max_pu: Dimensionless,
    /// Hours at full power which the reservoir can sustain
    pub max_hours: Hours,
    /// Energy added to the reservoir in each timestep
    pub inflow: Profile<Power>,
    /// Whether the state of charge at the start and end of the year must be equal
    pub cyclic_soc: bool,
}

impl StorageUnit {
    /// The key referring to this storage unit
    pub fn key(&self) -> AssetKey {
        AssetKey::StorageUnit(self.name.clone())
    }

    /// Whether the storage unit receives any inflow
    pub fn has_inflow(&self) -> bool {
        match &self.inflow {
            Profile::Constant(inflow) => *inflow > Power(0.0),
            Profile::Varying(inflow) => inflow.iter().any(|value| *value > Power(0.0)),
        }
    }

    /// Size of the reservoir for the given nominal power
    pub fn energy_capacity(&self, capacity: Power) -> Energy {
        capacity * self.max_hours
    }
}

/// Lossless directional power transfer from `bus0` to `bus1`
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// Unique name among links
    pub name: AssetID,
    /// Origin bus
    pub bus0: BusID,
    /// Destination bus
    pub bus1: BusID,
    /// Nominal power
    pub p_nom: Power,
    /// Minimum flow per unit of capacity
    pub p_min_pu: Dimensionless,
    /// Maximum flow per unit of capacity
    pub p_max_pu: Dimensionless,
    /// Cost per MWh transferred; negative values represent revenue
    pub marginal_cost: Profile<MoneyPerEnergy>,
}

/// Exogenous demand on a bus
#[derive(Debug, Clone, PartialEq)]
pub struct Load {
    /// Unique name among loads
    pub name: AssetID,
    /// The bus the load is attached to
    pub bus: BusID,
    /// Demand in each timestep
    pub demand: Profile<Power>,
}

/// Refers to an asset of a particular kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssetKey {
    /// A generator
    Generator(AssetID),
    /// A storage unit
    StorageUnit(AssetID),
    /// A link
    Link(AssetID),
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generator(name) => write!(f, "Generator {name}"),
            Self::StorageUnit(name) => write!(f, "StorageUnit {name}"),
            Self::Link(name) => write!(f, "Link {name}"),
        }
    }
}

/// A ceiling on the total investment across several assets
#[derive(Debug, Clone, PartialEq)]
pub struct CapexBudget {
    /// The maximum investment
    pub ceiling: Money,
    /// Assets whose capacity counts against the budget
    pub members: Vec<AssetKey>,
}

/// The complete topology for one run
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    /// Timestamps for each timestep
    pub timestamps: Vec<NaiveDateTime>,
    /// All buses
    pub buses: IndexSet<BusID>,
    /// The bus representing the micro-grid itself
    pub local_bus: BusID,
    /// Loads
    pub loads: Vec<Load>,
    /// Generators
    pub generators: Vec<Generator>,
    /// Storage units
    pub storage_units: Vec<StorageUnit>,
    /// Links
    pub links: Vec<Link>,
    /// Optional capex budget
    pub budget: Option<CapexBudget>,
}

fn check_bus(
    buses: &IndexSet<BusID>,
    asset: &AssetID,
    bus: &BusID,
) -> Result<(), ConfigurationError> {
    if buses.contains(bus) {
        Ok(())
    } else {
        Err(ConfigurationError::UnknownBus {
            asset: asset.to_string(),
            bus: bus.to_string(),
        })
    }
}

fn check_unique<'a, I>(names: I) -> Result<(), ConfigurationError>
where
    I: IntoIterator<Item = &'a AssetID>,
{
    match find_duplicate_id(names) {
        Some(name) => Err(ConfigurationError::DuplicateAsset(name.to_string())),
        None => Ok(()),
    }
}

fn check_finite_profile(
    profile: &Profile<MoneyPerEnergy>,
    n_timesteps: usize,
    parameter: &str,
) -> Result<(), ConfigurationError> {
    if profile.iter(n_timesteps).all(MoneyPerEnergy::is_finite) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidValue {
            parameter: parameter.to_string(),
            reason: "must be a finite number",
        })
    }
}

fn check_per_unit_bounds(
    p_min_pu: &Profile<Dimensionless>,
    p_max_pu: &Profile<Dimensionless>,
    n_timesteps: usize,
    asset: &AssetID,
) -> Result<(), ConfigurationError> {
    let valid = p_min_pu
        .iter(n_timesteps)
        .zip(p_max_pu.iter(n_timesteps))
        .all(|(min, max)| min.is_finite() && max.is_finite() && min <= max);
    if valid {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidValue {
            parameter: format!("{asset}.p_min_pu"),
            reason: "must be finite and no greater than p_max_pu",
        })
    }
}

impl Network {
    /// The number of timesteps
    pub fn n_timesteps(&self) -> usize {
        self.timestamps.len()
    }

    /// Look up a generator by name
    pub fn generator(&self, name: &str) -> Option<&Generator> {
        self.generators.iter().find(|generator| &*generator.name.0 == name)
    }

    /// Look up a storage unit by name
    pub fn storage_unit(&self, name: &str) -> Option<&StorageUnit> {
        self.storage_units
            .iter()
            .find(|storage| &*storage.name.0 == name)
    }

    /// Look up a link by name
    pub fn link(&self, name: &str) -> Option<&Link> {
        self.links.iter().find(|link| &*link.name.0 == name)
    }

    /// The capacity setting and unit capex of an asset which can count against the budget
    pub fn investment_terms(&self, key: &AssetKey) -> Option<(Capacity, MoneyPerPower)> {
        match key {
            AssetKey::Generator(name) => self
                .generator(&name.0)
                .map(|generator| (generator.capacity, generator.unit_capex)),
            AssetKey::StorageUnit(name) => self
                .storage_unit(&name.0)
                .map(|storage| (storage.capacity, storage.unit_capex)),
            AssetKey::Link(_) => None,
        }
    }

    /// Total demand on the given bus in the given timestep
    pub fn demand_at(&self, bus: &BusID, timestep: usize) -> Power {
        self.loads
            .iter()
            .filter(|load| &load.bus == bus)
            .map(|load| load.demand.at(timestep))
            .sum()
    }

    /// Annualised capital cost of assets with fixed capacity.
    ///
    /// This is a constant which is not part of the optimisation objective.
    pub fn fixed_capital_cost(&self) -> MoneyPerYear {
        let generators = self
            .generators
            .iter()
            .map(|generator| (generator.capacity, generator.capital_cost));
        let storage_units = self
            .storage_units
            .iter()
            .map(|storage| (storage.capacity, storage.capital_cost));
        generators
            .chain(storage_units)
            .filter_map(|(capacity, cost)| capacity.fixed_value().map(|value| value * cost))
            .sum()
    }

    /// Check that the network is coherent before building an optimisation problem from it
    pub fn validate(&self) -> Result<()> {
        let n = self.n_timesteps();
        if !self.buses.contains(&self.local_bus) {
            Err(ConfigurationError::UnknownBus {
                asset: "local bus".to_string(),
                bus: self.local_bus.to_string(),
            })?;
        }

        check_unique(self.loads.iter().map(|load| &load.name))?;
        check_unique(self.generators.iter().map(|generator| &generator.name))?;
        check_unique(self.storage_units.iter().map(|storage| &storage.name))?;
        check_unique(self.links.iter().map(|link| &link.name))?;

        for load in &self.loads {
            check_bus(&self.buses, &load.name, &load.bus)?;
            load.demand.check_length(&format!("{}.demand", load.name), n)?;
        }

        for generator in &self.generators {
            let name = &generator.name;
            check_bus(&self.buses, name, &generator.bus)?;
            generator.capacity.validate(name)?;
            check_non_negative(
                generator.capital_cost.value(),
                &format!("{name}.capital_cost"),
            )?;
            check_non_negative(generator.unit_capex.value(), &format!("{name}.unit_capex"))?;
            generator
                .marginal_cost
                .check_length(&format!("{name}.marginal_cost"), n)?;
            generator
                .p_min_pu
                .check_length(&format!("{name}.p_min_pu"), n)?;
            generator
                .p_max_pu
                .check_length(&format!("{name}.p_max_pu"), n)?;
            check_finite_profile(&generator.marginal_cost, n, &format!("{name}.marginal_cost"))?;
            check_per_unit_bounds(&generator.p_min_pu, &generator.p_max_pu, n, name)?;
        }

        for storage in &self.storage_units {
            let name = &storage.name;
            check_bus(&self.buses, name, &storage.bus)?;
            storage.capacity.validate(name)?;
            check_non_negative(
                storage.capital_cost.value(),
                &format!("{name}.capital_cost"),
            )?;
            check_non_negative(storage.unit_capex.value(), &format!("{name}.unit_capex"))?;
            check_non_negative(storage.max_hours.value(), &format!("{name}.max_hours"))?;
            check_non_negative(-storage.p_min_pu.value(), &format!("{name}.p_min_pu"))?;
            check_non_negative(storage.p_max_pu.value(), &format!("{name}.p_max_pu"))?;
            storage
                .marginal_cost
                .check_length(&format!("{name}.marginal_cost"), n)?;
            storage.inflow.check_length(&format!("{name}.inflow"), n)?;
            check_finite_profile(&storage.marginal_cost, n, &format!("{name}.marginal_cost"))?;
            for inflow in storage.inflow.iter(n) {
                check_non_negative(inflow.value(), &format!("{name}.inflow"))?;
            }
        }

        for link in &self.links {
            check_bus(&self.buses, &link.name, &link.bus0)?;
            check_bus(&self.buses, &link.name, &link.bus1)?;
            check_non_negative(link.p_nom.value(), &format!("{}.p_nom", link.name))?;
            link
                .marginal_cost
                .check_length(&format!("{}.marginal_cost", link.name), n)?;
            check_finite_profile(
                &link.marginal_cost,
                n,
                &format!("{}.marginal_cost", link.name),
            )?;
            check_per_unit_bounds(
                &Profile::Constant(link.p_min_pu),
                &Profile::Constant(link.p_max_pu),
                n,
                &link.name,
            )?;
        }

        if let Some(budget) = &self.budget {
            check_non_negative(budget.ceiling.value(), "capex_budget")?;
            if let Some(member) = find_duplicate_id(&budget.members) {
                Err(ConfigurationError::DuplicateAsset(member.to_string()))?;
            }
            for member in &budget.members {
                if self.investment_terms(member).is_none() {
                    Err(ConfigurationError::UnknownBudgetMember(member.to_string()))?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::network;
    use rstest::rstest;

    #[rstest]
    fn test_validate_ok(network: Network) {
        assert!(network.validate().is_ok());
    }

    #[rstest]
    fn test_validate_duplicate_generator(mut network: Network) {
        let generator = network.generators[0].clone();
        network.generators.push(generator);
        let err = network.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::DuplicateAsset(_))
        ));
    }

    #[rstest]
    fn test_validate_unknown_bus(mut network: Network) {
        network.links[0].bus1 = "Nowhere".into();
        let err = network.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::UnknownBus { .. })
        ));
    }

    #[rstest]
    fn test_validate_profile_length(mut network: Network) {
        network.generators[0].p_max_pu = Profile::Varying(vec![Dimensionless(1.0); 3]);
        let err = network.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MalformedInputError>(),
            Some(MalformedInputError::LengthMismatch { .. })
        ));
    }

    #[rstest]
    fn test_validate_per_unit_bounds(mut network: Network) {
        network.generators[0].p_min_pu = Profile::Constant(Dimensionless(2.0));
        assert!(network.validate().is_err());
    }

    #[rstest]
    fn test_validate_contradictory_capacity(mut network: Network) {
        network.generators[0].capacity = Capacity::Extendable {
            min: Power(2.0),
            max: Some(Power(1.0)),
        };
        let err = network.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::ContradictoryCapacity { .. })
        ));
    }

    #[rstest]
    fn test_validate_budget_member(mut network: Network) {
        network.budget = Some(CapexBudget {
            ceiling: Money(1.0),
            members: vec![AssetKey::Link("Grid Import".into())],
        });
        let err = network.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::UnknownBudgetMember(_))
        ));
    }

    #[rstest]
    fn test_fixed_capital_cost(mut network: Network) {
        network.storage_units[0].capacity = Capacity::Fixed(Power(2.0));
        network.storage_units[0].capital_cost = MoneyPerPowerPerYear(50.0);
        assert_eq!(network.fixed_capital_cost(), MoneyPerYear(100.0));
    }

    #[test]
    fn test_profile_at() {
        let constant = Profile::Constant(Power(1.0));
        assert_eq!(constant.at(100), Power(1.0));
        let varying = Profile::Varying(vec![Power(1.0), Power(2.0)]);
        assert_eq!(varying.iter(2).collect::<Vec<_>>(), [Power(1.0), Power(2.0)]);
    }
}
