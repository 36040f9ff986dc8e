//! The model represents the static input data provided by the user.
use crate::input::time_series::TimeSeries;
use anyhow::Result;
use log::info;

pub mod parameters;
pub use parameters::{ConfigurationError, ModelParameters};

/// Model definition
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Parameters from the model TOML file
    pub parameters: ModelParameters,
    /// Hourly time series for the representative year
    pub time_series: TimeSeries,
}

impl Model {
    /// Create a new [`Model`] from validated parameters and time series.
    ///
    /// If `annual_energy_demand` is set, consumption is rescaled to match it.
    pub fn new(parameters: ModelParameters, mut time_series: TimeSeries) -> Result<Self> {
        if let Some(annual_demand) = parameters.annual_energy_demand {
            let factor = time_series.scale_consumption_to(annual_demand)?;
            info!("Scaled consumption by a factor of {factor} to {annual_demand} MWh per year");
        }

        Ok(Self {
            parameters,
            time_series,
        })
    }
}
