//! Defines the `ModelParameters` struct, which represents the contents of `model.toml`.
use crate::finance::annual_capital_cost;
use crate::input::{deserialise_proportion, input_err_msg, read_toml};
use crate::units::{
    Dimensionless, Energy, Hours, Money, MoneyPerEnergy, MoneyPerPower, MoneyPerPowerPerYear,
    Power,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::path::Path;

const MODEL_PARAMETERS_FILE_NAME: &str = "model.toml";

macro_rules! define_unit_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            <$type>::new($value)
        }
    };
}

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_site_name, String, "Microgrid".to_string());
define_param_default!(default_true, bool, true);
define_unit_param_default!(default_wind_efficiency, Dimensionless, 1.0);
define_unit_param_default!(default_power_ratio, Dimensionless, 1.0);
define_unit_param_default!(default_sale_price_factor, Dimensionless, 1.0);
define_unit_param_default!(default_import_capacity, Power, 1e9);

/// Indicates that the economic parameters or the network built from them are invalid.
///
/// These errors are raised before the solver is invoked.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// A parameter has a value outside of its permitted range
    InvalidValue {
        /// Name of the parameter
        parameter: String,
        /// Description of the permitted range
        reason: &'static str,
    },
    /// The fixed/extendable capacity settings of an asset contradict one another
    ContradictoryCapacity {
        /// Name of the asset
        asset: String,
        /// What is wrong
        reason: &'static str,
    },
    /// Two assets of the same kind share a name
    DuplicateAsset(String),
    /// An asset is connected to a bus which does not exist
    UnknownBus {
        /// Name of the asset
        asset: String,
        /// Name of the bus
        bus: String,
    },
    /// The capex budget refers to an asset which does not exist or cannot be invested in
    UnknownBudgetMember(String),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { parameter, reason } => {
                write!(f, "Invalid value for {parameter}: {reason}")
            }
            Self::ContradictoryCapacity { asset, reason } => {
                write!(f, "Invalid capacity settings for {asset}: {reason}")
            }
            Self::DuplicateAsset(name) => write!(f, "Asset name {name} is used more than once"),
            Self::UnknownBus { asset, bus } => {
                write!(f, "Asset {asset} is connected to unknown bus {bus}")
            }
            Self::UnknownBudgetMember(name) => write!(
                f,
                "Capex budget refers to {name}, which is not a generator or storage unit"
            ),
        }
    }
}

impl Error for ConfigurationError {}

/// Check that a value is finite and not negative
pub fn check_non_negative(value: f64, parameter: &str) -> Result<(), ConfigurationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidValue {
            parameter: parameter.to_string(),
            reason: "must be a finite number greater than or equal to zero",
        })
    }
}

/// Check that a value is finite and greater than zero
fn check_positive(value: f64, parameter: &str) -> Result<(), ConfigurationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidValue {
            parameter: parameter.to_string(),
            reason: "must be a finite number greater than zero",
        })
    }
}

/// Check that a value is finite
fn check_finite(value: f64, parameter: &str) -> Result<(), ConfigurationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidValue {
            parameter: parameter.to_string(),
            reason: "must be a finite number",
        })
    }
}

/// Check an optional pair of capacity bounds
fn check_capacity_bounds(
    asset: &str,
    min: Option<Power>,
    max: Option<Power>,
) -> Result<(), ConfigurationError> {
    if let Some(min) = min {
        check_non_negative(min.value(), &format!("{asset}.capacity_min"))?;
    }
    if let Some(max) = max {
        check_non_negative(max.value(), &format!("{asset}.capacity_max"))?;
    }
    if let (Some(min), Some(max)) = (min, max)
        && min > max
    {
        return Err(ConfigurationError::ContradictoryCapacity {
            asset: asset.to_string(),
            reason: "capacity_min is greater than capacity_max",
        });
    }

    Ok(())
}

/// Cost parameters for a technology whose capacity can be invested in
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct TechnologyParameters {
    /// Investment cost per MW of capacity
    pub capex: MoneyPerPower,
    /// Economic lifetime in years
    pub lifetime: u32,
    /// Discount rate used to annualise the investment
    #[serde(default)]
    pub discount_rate: Dimensionless,
    /// Fixed operating cost per MW per year
    #[serde(default)]
    pub fixed_operating_cost: MoneyPerPowerPerYear,
    /// Cost per MWh generated
    #[serde(default)]
    pub marginal_cost: MoneyPerEnergy,
    /// Optional upper limit on installed capacity
    pub capacity_max: Option<Power>,
    /// Revenue from by-products (e.g. heat) per MWh generated, as a proportion of the grid price
    #[serde(default)]
    pub by_product_revenue_factor: Dimensionless,
}

impl TechnologyParameters {
    /// Annualised cost of one MW of capacity, including fixed operating costs
    pub fn annual_capital_cost(&self) -> MoneyPerPowerPerYear {
        annual_capital_cost(
            self.capex,
            self.lifetime,
            self.discount_rate,
            self.fixed_operating_cost,
        )
    }

    /// Cost per MWh generated in each timestep, given the grid price.
    ///
    /// By-product revenue is tied to the grid price and may make this negative.
    pub fn marginal_cost_at(&self, grid_price: MoneyPerEnergy) -> MoneyPerEnergy {
        self.marginal_cost - grid_price * self.by_product_revenue_factor
    }

    /// Whether the marginal cost is the same in every timestep
    pub fn has_constant_marginal_cost(&self) -> bool {
        self.by_product_revenue_factor == Dimensionless(0.0)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigurationError> {
        check_non_negative(self.capex.value(), &format!("{name}.capex"))?;
        if self.lifetime == 0 {
            return Err(ConfigurationError::InvalidValue {
                parameter: format!("{name}.lifetime"),
                reason: "must be greater than zero",
            });
        }
        check_non_negative(self.discount_rate.value(), &format!("{name}.discount_rate"))?;
        check_non_negative(
            self.fixed_operating_cost.value(),
            &format!("{name}.fixed_operating_cost"),
        )?;
        check_finite(self.marginal_cost.value(), &format!("{name}.marginal_cost"))?;
        check_non_negative(
            self.by_product_revenue_factor.value(),
            &format!("{name}.by_product_revenue_factor"),
        )?;
        check_capacity_bounds(name, None, self.capacity_max)
    }
}

/// Parameters for the hydro reservoir
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct HydroParameters {
    /// Cost parameters
    #[serde(flatten)]
    pub technology: TechnologyParameters,
    /// Installed capacity, if fixed
    pub capacity: Option<Power>,
    /// Whether the capacity is chosen by the optimisation
    #[serde(default)]
    pub extendable: bool,
    /// Optional lower limit on capacity, if extendable
    pub capacity_min: Option<Power>,
    /// Reservoir size in hours at full power
    pub max_hours: Hours,
    /// Pumping power as a proportion of generating power
    #[serde(default, deserialize_with = "deserialise_proportion")]
    pub pumping_ratio: Dimensionless,
    /// Whether the reservoir level must be the same at the start and end of the year
    #[serde(default = "default_true")]
    pub cyclic_soc: bool,
}

impl HydroParameters {
    fn validate(&self) -> Result<(), ConfigurationError> {
        const NAME: &str = "hydro";

        self.technology.validate(NAME)?;
        check_non_negative(self.max_hours.value(), "hydro.max_hours")?;

        let contradiction = |reason| {
            Err(ConfigurationError::ContradictoryCapacity {
                asset: NAME.to_string(),
                reason,
            })
        };
        if self.extendable {
            if self.capacity.is_some() {
                return contradiction("capacity cannot be given when extendable is true");
            }
            check_capacity_bounds(NAME, self.capacity_min, self.technology.capacity_max)
        } else {
            let Some(capacity) = self.capacity else {
                return contradiction("capacity must be given when extendable is false");
            };
            if self.capacity_min.is_some() || self.technology.capacity_max.is_some() {
                return contradiction("capacity bounds can only be given when extendable is true");
            }
            check_non_negative(capacity.value(), "hydro.capacity")
        }
    }
}

/// Parameters for the vehicle-to-grid battery
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct BatteryParameters {
    /// Number of bidirectional chargers
    pub chargers: u32,
    /// Power of each charger
    pub power_per_charger: Power,
    /// Usable battery capacity of each vehicle
    pub capacity_per_vehicle: Energy,
    /// Discharging power as a proportion of charger power
    #[serde(default = "default_power_ratio", deserialize_with = "deserialise_proportion")]
    pub discharge_ratio: Dimensionless,
    /// Charging power as a proportion of charger power
    #[serde(default = "default_power_ratio", deserialize_with = "deserialise_proportion")]
    pub charge_ratio: Dimensionless,
    /// Cost per MWh discharged
    #[serde(default)]
    pub marginal_cost: MoneyPerEnergy,
    /// Whether the state of charge must be the same at the start and end of the year
    #[serde(default)]
    pub cyclic_soc: bool,
}

impl BatteryParameters {
    /// Combined power of all chargers
    pub fn capacity(&self) -> Power {
        self.power_per_charger * Dimensionless(f64::from(self.chargers))
    }

    /// Hours at full power which the battery can sustain.
    ///
    /// This does not depend on the number of chargers, as each vehicle has its own charger.
    pub fn max_hours(&self) -> Hours {
        self.capacity_per_vehicle / self.power_per_charger
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        check_positive(self.power_per_charger.value(), "battery.power_per_charger")?;
        check_non_negative(
            self.capacity_per_vehicle.value(),
            "battery.capacity_per_vehicle",
        )?;
        check_finite(self.marginal_cost.value(), "battery.marginal_cost")
    }
}

/// Parameters for the connection to the external grid
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct GridParameters {
    /// Maximum export, as a proportion of peak demand
    #[serde(deserialize_with = "deserialise_proportion")]
    pub injection_limit: Dimensionless,
    /// Sale price as a proportion of the market price
    #[serde(default = "default_sale_price_factor")]
    pub sale_price_factor: Dimensionless,
    /// Maximum import
    #[serde(default = "default_import_capacity")]
    pub import_capacity: Power,
}

impl GridParameters {
    fn validate(&self) -> Result<(), ConfigurationError> {
        check_non_negative(self.sale_price_factor.value(), "grid.sale_price_factor")?;
        check_non_negative(self.import_capacity.value(), "grid.import_capacity")
    }
}

/// Represents the contents of the entire model file.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ModelParameters {
    /// Name of the site, used for the local bus
    #[serde(default = "default_site_name")]
    pub site_name: String,
    /// Ceiling on total investment in wind, solar, biomass and hydro
    pub capex_budget: Money,
    /// If given, consumption is rescaled so that annual demand equals this value
    pub annual_energy_demand: Option<Energy>,
    /// Proportion applied to the wind capacity factor
    #[serde(default = "default_wind_efficiency")]
    #[serde(deserialize_with = "deserialise_proportion")]
    pub wind_efficiency: Dimensionless,
    /// Wind turbines
    pub wind: TechnologyParameters,
    /// Solar PV
    pub solar: TechnologyParameters,
    /// Biomass ORC plant
    pub biomass: TechnologyParameters,
    /// Hydro reservoir
    pub hydro: HydroParameters,
    /// Vehicle-to-grid battery
    pub battery: BatteryParameters,
    /// Grid connection
    pub grid: GridParameters,
}

/// Check that the `capex_budget` parameter is valid.
///
/// A zero budget is allowed: it means that no new capacity can be installed.
fn check_capex_budget(value: Money) -> Result<(), ConfigurationError> {
    check_non_negative(value.value(), "capex_budget")
}

impl ModelParameters {
    /// Read a model file from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    ///
    /// # Returns
    ///
    /// The model file contents as a [`ModelParameters`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<ModelParameters> {
        let file_path = model_dir.as_ref().join(MODEL_PARAMETERS_FILE_NAME);
        let model_params: ModelParameters = read_toml(&file_path)?;

        model_params
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(model_params)
    }

    /// Validate parameters after reading in file
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_capex_budget(self.capex_budget)?;

        if let Some(demand) = self.annual_energy_demand {
            check_positive(demand.value(), "annual_energy_demand")?;
        }

        // wind_efficiency already validated with deserialise_proportion

        self.wind.validate("wind")?;
        self.solar.validate("solar")?;
        self.biomass.validate("biomass")?;
        self.hydro.validate()?;
        self.battery.validate()?;
        self.grid.validate()?;

        Ok(())
    }
}
