//! Builds the micro-grid [`Network`] from the economic parameters and the hourly time series.
use super::{
    AssetID, AssetKey, BusID, Capacity, CapexBudget, Generator, Link, Load, Network, Profile,
    StorageUnit,
};
use crate::model::parameters::{
    BatteryParameters, GridParameters, HydroParameters, TechnologyParameters,
};
use crate::model::{ConfigurationError, Model};
use crate::units::{Dimensionless, MoneyPerEnergy, MoneyPerPower, MoneyPerPowerPerYear, Power};
use anyhow::Result;
use indexmap::IndexSet;
use log::debug;

/// Name of the bus representing the external grid
pub const GRID_BUS: &str = "Grid";
/// Name of the micro-grid's demand
pub const LOAD: &str = "Demand";
/// Name of the wind generator
pub const WIND: &str = "Wind";
/// Name of the solar generator
pub const SOLAR: &str = "Solar";
/// Name of the biomass generator
pub const BIOMASS: &str = "Biomass ORC";
/// Name of the hydro storage unit
pub const HYDRO: &str = "Hydro Reservoir";
/// Name of the vehicle-to-grid storage unit
pub const BATTERY: &str = "Electric Car Battery";
/// Name of the link for buying electricity
pub const GRID_IMPORT: &str = "Grid Import";
/// Name of the link for selling electricity
pub const GRID_EXPORT: &str = "Grid Export";
/// Name of the generator balancing the external grid bus
pub const GRID_SLACK: &str = "Grid Slack Source";

/// Capacity of the slack generator on the external grid bus
const SLACK_CAPACITY: Power = Power(1e9);

/// Cost of generation for a technology in each timestep
fn marginal_cost_profile(
    technology: &TechnologyParameters,
    grid_price: &[MoneyPerEnergy],
) -> Profile<MoneyPerEnergy> {
    if technology.has_constant_marginal_cost() {
        Profile::Constant(technology.marginal_cost)
    } else {
        Profile::Varying(
            grid_price
                .iter()
                .map(|&price| technology.marginal_cost_at(price))
                .collect(),
        )
    }
}

/// A generator whose capacity is chosen by the optimisation
fn extendable_generator(
    name: &str,
    bus: &BusID,
    technology: &TechnologyParameters,
    grid_price: &[MoneyPerEnergy],
    p_max_pu: Profile<Dimensionless>,
) -> Generator {
    Generator {
        name: name.into(),
        bus: bus.clone(),
        capacity: Capacity::Extendable {
            min: Power(0.0),
            max: technology.capacity_max,
        },
        capital_cost: technology.annual_capital_cost(),
        unit_capex: technology.capex,
        marginal_cost: marginal_cost_profile(technology, grid_price),
        p_min_pu: Profile::Constant(Dimensionless(0.0)),
        p_max_pu,
    }
}

fn hydro_reservoir(
    hydro: &HydroParameters,
    bus: &BusID,
    model: &Model,
) -> Result<StorageUnit, ConfigurationError> {
    // Both configurations are valid: an extendable reservoir is a decision variable, while a
    // fixed one still counts against the budget as a constant
    let capacity = match (hydro.extendable, hydro.capacity) {
        (true, _) => Capacity::Extendable {
            min: hydro.capacity_min.unwrap_or_default(),
            max: hydro.technology.capacity_max,
        },
        (false, Some(capacity)) => Capacity::Fixed(capacity),
        (false, None) => {
            return Err(ConfigurationError::ContradictoryCapacity {
                asset: HYDRO.to_string(),
                reason: "capacity must be given when extendable is false",
            });
        }
    };

    Ok(StorageUnit {
        name: HYDRO.into(),
        bus: bus.clone(),
        capacity,
        capital_cost: hydro.technology.annual_capital_cost(),
        unit_capex: hydro.technology.capex,
        marginal_cost: marginal_cost_profile(&hydro.technology, model.time_series.grid_price()),
        p_min_pu: -hydro.pumping_ratio,
        p_max_pu: Dimensionless(1.0),
        max_hours: hydro.max_hours,
        inflow: Profile::Varying(model.time_series.hydro_inflow().to_vec()),
        cyclic_soc: hydro.cyclic_soc,
    })
}

/// Vehicle-to-grid battery, treated as existing infrastructure
fn battery(battery: &BatteryParameters, bus: &BusID) -> StorageUnit {
    StorageUnit {
        name: BATTERY.into(),
        bus: bus.clone(),
        capacity: Capacity::Fixed(battery.capacity()),
        capital_cost: MoneyPerPowerPerYear(0.0),
        unit_capex: MoneyPerPower(0.0),
        marginal_cost: Profile::Constant(battery.marginal_cost),
        p_min_pu: -battery.charge_ratio,
        p_max_pu: battery.discharge_ratio,
        max_hours: battery.max_hours(),
        inflow: Profile::Constant(Power(0.0)),
        cyclic_soc: battery.cyclic_soc,
    }
}

/// Links for buying from and selling to the grid
fn grid_links(
    grid: &GridParameters,
    local_bus: &BusID,
    grid_bus: &BusID,
    model: &Model,
) -> [Link; 2] {
    let price = model.time_series.grid_price();
    let import = Link {
        name: GRID_IMPORT.into(),
        bus0: grid_bus.clone(),
        bus1: local_bus.clone(),
        p_nom: grid.import_capacity,
        p_min_pu: Dimensionless(0.0),
        p_max_pu: Dimensionless(1.0),
        marginal_cost: Profile::Varying(price.to_vec()),
    };

    // Revenue from sales is a negative cost
    let export = Link {
        name: GRID_EXPORT.into(),
        bus0: local_bus.clone(),
        bus1: grid_bus.clone(),
        p_nom: model.time_series.peak_consumption() * grid.injection_limit,
        p_min_pu: Dimensionless(0.0),
        p_max_pu: Dimensionless(1.0),
        marginal_cost: Profile::Varying(
            price
                .iter()
                .map(|&price| -(price * grid.sale_price_factor))
                .collect(),
        ),
    };

    [import, export]
}

/// Generator which can both produce and absorb power, so that the grid bus is always balanced
fn grid_slack(grid_bus: &BusID) -> Generator {
    Generator {
        name: GRID_SLACK.into(),
        bus: grid_bus.clone(),
        capacity: Capacity::Fixed(SLACK_CAPACITY),
        capital_cost: MoneyPerPowerPerYear(0.0),
        unit_capex: MoneyPerPower(0.0),
        marginal_cost: Profile::Constant(MoneyPerEnergy(0.0)),
        p_min_pu: Profile::Constant(Dimensionless(-1.0)),
        p_max_pu: Profile::Constant(Dimensionless(1.0)),
    }
}

/// Build the micro-grid network for the given model.
///
/// The network has a bus for the micro-grid (named after the site) and one for the external grid.
/// Wind, solar and biomass capacities are always chosen by the optimisation; the hydro reservoir
/// may be fixed or extendable. All four count against the capex budget.
///
/// # Arguments
///
/// * `model` - The validated model
///
/// # Returns
///
/// A validated [`Network`] or an error.
pub fn build_network(model: &Model) -> Result<Network> {
    let parameters = &model.parameters;
    let time_series = &model.time_series;
    if parameters.site_name == GRID_BUS {
        Err(ConfigurationError::InvalidValue {
            parameter: "site_name".to_string(),
            reason: "must differ from the name of the external grid bus",
        })?;
    }
    let local_bus = BusID::new(&parameters.site_name);
    let grid_bus = BusID::new(GRID_BUS);
    let grid_price = time_series.grid_price();

    let wind_p_max_pu = time_series
        .wind_capacity_factor()
        .iter()
        .map(|&cf| cf * parameters.wind_efficiency)
        .collect();
    let generators = vec![
        extendable_generator(
            WIND,
            &local_bus,
            &parameters.wind,
            grid_price,
            Profile::Varying(wind_p_max_pu),
        ),
        extendable_generator(
            SOLAR,
            &local_bus,
            &parameters.solar,
            grid_price,
            Profile::Varying(time_series.solar_capacity_factor().to_vec()),
        ),
        extendable_generator(
            BIOMASS,
            &local_bus,
            &parameters.biomass,
            grid_price,
            Profile::Constant(Dimensionless(1.0)),
        ),
        grid_slack(&grid_bus),
    ];

    let storage_units = vec![
        hydro_reservoir(&parameters.hydro, &local_bus, model)?,
        battery(&parameters.battery, &local_bus),
    ];

    let links = Vec::from(grid_links(&parameters.grid, &local_bus, &grid_bus, model));

    let loads = vec![Load {
        name: AssetID::new(LOAD),
        bus: local_bus.clone(),
        demand: Profile::Varying(time_series.consumption().to_vec()),
    }];

    let budget = CapexBudget {
        ceiling: parameters.capex_budget,
        members: vec![
            AssetKey::Generator(WIND.into()),
            AssetKey::Generator(SOLAR.into()),
            AssetKey::Generator(BIOMASS.into()),
            AssetKey::StorageUnit(HYDRO.into()),
        ],
    };

    let network = Network {
        timestamps: time_series.timestamps().to_vec(),
        buses: IndexSet::from([local_bus.clone(), grid_bus]),
        local_bus,
        loads,
        generators,
        storage_units,
        links,
        budget: Some(budget),
    };
    network.validate()?;

    debug!(
        "Built network with {} generators, {} storage units and {} links over {} timesteps",
        network.generators.len(),
        network.storage_units.len(),
        network.links.len(),
        network.n_timesteps()
    );

    Ok(network)
}
