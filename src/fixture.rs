//! Fixtures for tests
use crate::input::time_series::{
    KWH_PER_MWH, MalformedInputError, REQUIRED_COLUMNS, TIME_SERIES_FILE_NAME, TIMESTAMP_FORMAT,
    TimeSeries, hourly_timestamps,
};
use crate::model::Model;
use crate::model::parameters::{
    BatteryParameters, GridParameters, HydroParameters, ModelParameters, TechnologyParameters,
};
use crate::network::{
    AssetKey, BusID, Capacity, CapexBudget, Generator, Link, Load, Network, Profile, StorageUnit,
};
use crate::units::{
    Dimensionless, Energy, Hours, Money, MoneyPerEnergy, MoneyPerPower, MoneyPerPowerPerYear,
    Power,
};
use chrono::Timelike;
use indexmap::IndexSet;
use rstest::fixture;
use std::fmt::Debug;
use std::path::Path;

/// Assert that the result is an error of the given kind
pub fn assert_malformed<T: Debug>(result: anyhow::Result<T>, expected: &MalformedInputError) {
    let err = result.unwrap_err();
    assert_eq!(
        err.downcast_ref::<MalformedInputError>(),
        Some(expected),
        "{err:?}"
    );
}

/// Write a time series to the model directory in the input file format
pub fn write_time_series_csv(dir: &Path, time_series: &TimeSeries) {
    let mut writer = csv::Writer::from_path(dir.join(TIME_SERIES_FILE_NAME)).unwrap();
    writer.write_record(REQUIRED_COLUMNS).unwrap();
    for (idx, timestamp) in time_series.timestamps().iter().enumerate() {
        writer
            .write_record([
                timestamp.format(TIMESTAMP_FORMAT).to_string(),
                (time_series.consumption()[idx].value() * KWH_PER_MWH).to_string(),
                time_series.wind_capacity_factor()[idx].value().to_string(),
                time_series.solar_capacity_factor()[idx].value().to_string(),
                (time_series.hydro_inflow()[idx].value() * KWH_PER_MWH).to_string(),
                time_series.grid_price()[idx].value().to_string(),
            ])
            .unwrap();
    }
    writer.flush().unwrap();
}

/// A year of flat demand with a simple daily pattern for solar and price
#[fixture]
pub fn flat_time_series() -> TimeSeries {
    let timestamps = hourly_timestamps(2019);
    let n = timestamps.len();
    let solar = timestamps
        .iter()
        .map(|timestamp| {
            if (8..18).contains(&timestamp.hour()) {
                Dimensionless(0.5)
            } else {
                Dimensionless(0.0)
            }
        })
        .collect();
    let price = timestamps
        .iter()
        .map(|timestamp| {
            if (17..21).contains(&timestamp.hour()) {
                MoneyPerEnergy(100.0)
            } else {
                MoneyPerEnergy(60.0)
            }
        })
        .collect();

    TimeSeries::new(
        timestamps,
        vec![Power(1.0); n],
        vec![Dimensionless(0.5); n],
        solar,
        vec![Power(0.002); n],
        price,
    )
    .unwrap()
}

#[fixture]
pub fn model_parameters() -> ModelParameters {
    let technology = TechnologyParameters {
        capex: MoneyPerPower(1_000_000.0),
        lifetime: 20,
        discount_rate: Dimensionless(0.0),
        fixed_operating_cost: MoneyPerPowerPerYear(0.0),
        marginal_cost: MoneyPerEnergy(0.0),
        capacity_max: None,
        by_product_revenue_factor: Dimensionless(0.0),
    };

    ModelParameters {
        site_name: "Microgrid".into(),
        capex_budget: Money(250_000.0),
        annual_energy_demand: None,
        wind_efficiency: Dimensionless(1.0),
        wind: TechnologyParameters {
            capex: MoneyPerPower(1_200_000.0),
            marginal_cost: MoneyPerEnergy(5.0),
            ..technology.clone()
        },
        solar: TechnologyParameters {
            capex: MoneyPerPower(500_000.0),
            lifetime: 25,
            ..technology.clone()
        },
        biomass: TechnologyParameters {
            capex: MoneyPerPower(8e6),
            fixed_operating_cost: MoneyPerPowerPerYear(22_000.0),
            marginal_cost: MoneyPerEnergy(120.0),
            ..technology.clone()
        },
        hydro: HydroParameters {
            technology: TechnologyParameters {
                capex: MoneyPerPower(4e6),
                lifetime: 40,
                ..technology
            },
            capacity: Some(Power(0.03)),
            extendable: false,
            capacity_min: None,
            max_hours: Hours(5.0),
            pumping_ratio: Dimensionless(0.0),
            cyclic_soc: true,
        },
        battery: BatteryParameters {
            chargers: 2,
            power_per_charger: Power(0.022),
            capacity_per_vehicle: Energy(0.08),
            discharge_ratio: Dimensionless(1.0),
            charge_ratio: Dimensionless(1.0),
            marginal_cost: MoneyPerEnergy(0.0),
            cyclic_soc: false,
        },
        grid: GridParameters {
            injection_limit: Dimensionless(0.7),
            sale_price_factor: Dimensionless(0.9),
            import_capacity: Power(1e9),
        },
    }
}

#[fixture]
pub fn model(model_parameters: ModelParameters, flat_time_series: TimeSeries) -> Model {
    Model::new(model_parameters, flat_time_series).unwrap()
}

/// A single day on a two-bus network.
///
/// Extendable solar and a small fixed reservoir sit on the local bus, which trades with a slack
/// bus through an import and an export link.
#[fixture]
pub fn network() -> Network {
    let timestamps = hourly_timestamps(2019)[..24].to_vec();
    let n = timestamps.len();
    let local_bus = BusID::new("Microgrid");
    let grid_bus = BusID::new("Grid");
    let price: Vec<_> = (0..n)
        .map(|t| {
            if (17..=20).contains(&t) {
                MoneyPerEnergy(100.0)
            } else {
                MoneyPerEnergy(50.0)
            }
        })
        .collect();

    Network {
        timestamps,
        buses: IndexSet::from([local_bus.clone(), grid_bus.clone()]),
        local_bus: local_bus.clone(),
        loads: vec![Load {
            name: "Demand".into(),
            bus: local_bus.clone(),
            demand: Profile::Varying(
                (0..n)
                    .map(|t| if t < 12 { Power(1.0) } else { Power(2.0) })
                    .collect(),
            ),
        }],
        generators: vec![
            Generator {
                name: "Solar".into(),
                bus: local_bus.clone(),
                capacity: Capacity::unbounded(),
                capital_cost: MoneyPerPowerPerYear(10.0),
                unit_capex: MoneyPerPower(1000.0),
                marginal_cost: Profile::Constant(MoneyPerEnergy(0.0)),
                p_min_pu: Profile::Constant(Dimensionless(0.0)),
                p_max_pu: Profile::Varying(
                    (0..n)
                        .map(|t| {
                            if (6..18).contains(&t) {
                                Dimensionless(0.8)
                            } else {
                                Dimensionless(0.0)
                            }
                        })
                        .collect(),
                ),
            },
            Generator {
                name: "Grid Slack Source".into(),
                bus: grid_bus.clone(),
                capacity: Capacity::Fixed(Power(1000.0)),
                capital_cost: MoneyPerPowerPerYear(0.0),
                unit_capex: MoneyPerPower(0.0),
                marginal_cost: Profile::Constant(MoneyPerEnergy(0.0)),
                p_min_pu: Profile::Constant(Dimensionless(-1.0)),
                p_max_pu: Profile::Constant(Dimensionless(1.0)),
            },
        ],
        storage_units: vec![StorageUnit {
            name: "Reservoir".into(),
            bus: local_bus.clone(),
            capacity: Capacity::Fixed(Power(0.5)),
            capital_cost: MoneyPerPowerPerYear(0.0),
            unit_capex: MoneyPerPower(0.0),
            marginal_cost: Profile::Constant(MoneyPerEnergy(0.0)),
            p_min_pu: Dimensionless(-0.5),
            p_max_pu: Dimensionless(1.0),
            max_hours: Hours(4.0),
            inflow: Profile::Constant(Power(0.1)),
            cyclic_soc: true,
        }],
        links: vec![
            Link {
                name: "Grid Import".into(),
                bus0: grid_bus.clone(),
                bus1: local_bus.clone(),
                p_nom: Power(10.0),
                p_min_pu: Dimensionless(0.0),
                p_max_pu: Dimensionless(1.0),
                marginal_cost: Profile::Varying(price.clone()),
            },
            Link {
                name: "Grid Export".into(),
                bus0: local_bus,
                bus1: grid_bus,
                p_nom: Power(1.0),
                p_min_pu: Dimensionless(0.0),
                p_max_pu: Dimensionless(1.0),
                marginal_cost: Profile::Varying(
                    price
                        .into_iter()
                        .map(|price| price * Dimensionless(-0.5))
                        .collect(),
                ),
            },
        ],
        budget: Some(CapexBudget {
            ceiling: Money(1e9),
            members: vec![
                AssetKey::Generator("Solar".into()),
                AssetKey::StorageUnit("Reservoir".into()),
            ],
        }),
    }
}
