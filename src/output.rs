//! The module responsible for writing output data to disk.
use crate::network::{AssetID, BusID, Network};
use crate::optimisation::Solution;
use crate::results::{Results, SystemSummary, TechnologyResult};
use crate::units::{Energy, Power};
use anyhow::{Context, Result, ensure};
use chrono::NaiveDateTime;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

pub mod metadata;

/// The output file name for technology results
const TECHNOLOGIES_FILE_NAME: &str = "technologies.csv";

/// The output file name for the system summary
const SUMMARY_FILE_NAME: &str = "summary.csv";

/// The output file name for hourly dispatch
const DISPATCH_FILE_NAME: &str = "dispatch.csv";

/// The output file name for power balance duals
const POWER_BALANCE_DUALS_FILE_NAME: &str = "debug_power_balance_duals.csv";

/// Format for timestamps in output files
const OUTPUT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Get the output directory for the model in the specified directory, under `results_root`
pub fn get_output_dir(model_dir: &Path, results_root: &Path) -> Result<PathBuf> {
    // Get the model name from the dir path. This ends up being convoluted because we need to check
    // for all possible errors.
    let model_dir = model_dir
        .canonicalize() // canonicalise in case the user has specified "."
        .context("Could not resolve path to model")?;

    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    Ok(results_root.join(model_name))
}

/// Create a new output directory.
///
/// If the directory already exists and contains files, it is only reused if `allow_overwrite` is
/// true, in which case its contents are deleted first.
///
/// # Returns
///
/// Whether any existing contents were deleted.
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    let mut overwritten = false;
    if output_dir.is_dir() {
        let is_empty = fs::read_dir(output_dir)?.next().is_none();
        if is_empty {
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder {} already exists and is not empty. Use --overwrite to replace it.",
            output_dir.display()
        );
        fs::remove_dir_all(output_dir)?;
        overwritten = true;
    }

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(overwritten)
}

/// Represents a row in the hourly dispatch CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct DispatchRow {
    timestamp: String,
    asset: AssetID,
    variable: String,
    value: f64,
}

/// Represents a row in the power balance duals CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct PowerBalanceDualsRow {
    bus: BusID,
    timestamp: String,
    value: f64,
}

/// The quantities reported in the dispatch file
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
enum DispatchVariable {
    /// Generator output (MW)
    Output,
    /// Storage discharge (MW)
    Dispatch,
    /// Storage charge (MW)
    Store,
    /// Storage state of charge (MWh)
    Soc,
    /// Spilled storage inflow (MW)
    Spill,
    /// Link flow from `bus0` to `bus1` (MW)
    Flow,
}

fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(OUTPUT_TIMESTAMP_FORMAT).to_string()
}

/// Collect every hourly value in the solution, asset by asset
fn dispatch_values<'a>(
    network: &'a Network,
    solution: &'a Solution,
) -> Vec<(&'a AssetID, DispatchVariable, Vec<f64>)> {
    let mut values = Vec::new();
    for generator in &network.generators {
        if let Some(output) = solution.generator_output(&generator.name.0) {
            let output = output.map(Power::value).collect();
            values.push((&generator.name, DispatchVariable::Output, output));
        }
    }

    for storage in &network.storage_units {
        let name = &storage.name.0;
        let series = [
            (
                DispatchVariable::Dispatch,
                solution
                    .storage_dispatch(name)
                    .map(|iter| iter.map(Power::value).collect_vec()),
            ),
            (
                DispatchVariable::Store,
                solution
                    .storage_store(name)
                    .map(|iter| iter.map(Power::value).collect_vec()),
            ),
            (
                DispatchVariable::Soc,
                solution
                    .storage_soc(name)
                    .map(|iter| iter.map(Energy::value).collect_vec()),
            ),
            (
                DispatchVariable::Spill,
                solution
                    .storage_spill(name)
                    .map(|iter| iter.map(Power::value).collect_vec()),
            ),
        ];
        let present = series
            .into_iter()
            .filter_map(|(variable, series)| Some((variable, series?)));
        for (variable, series) in present {
            values.push((&storage.name, variable, series));
        }
    }

    for link in &network.links {
        if let Some(flow) = solution.link_flow(&link.name.0) {
            let flow = flow.map(Power::value).collect();
            values.push((&link.name, DispatchVariable::Flow, flow));
        }
    }

    values
}

/// For writing extra debug information about the model
struct DebugDataWriter {
    power_balance_duals_writer: csv::Writer<File>,
}

impl DebugDataWriter {
    /// Open CSV files to write debug info to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    fn create(output_path: &Path) -> Result<Self> {
        let file_path = output_path.join(POWER_BALANCE_DUALS_FILE_NAME);
        Ok(Self {
            power_balance_duals_writer: csv::Writer::from_path(file_path)?,
        })
    }

    /// Write power balance duals to file
    fn write_power_balance_duals<'a, I>(
        &mut self,
        timestamps: &[NaiveDateTime],
        iter: I,
    ) -> Result<()>
    where
        I: Iterator<Item = (&'a BusID, usize, f64)>,
    {
        for (bus, t, value) in iter {
            let row = PowerBalanceDualsRow {
                bus: bus.clone(),
                timestamp: format_timestamp(&timestamps[t]),
                value,
            };
            self.power_balance_duals_writer.serialize(row)?;
        }

        Ok(())
    }

    /// Flush the underlying streams
    fn flush(&mut self) -> Result<()> {
        self.power_balance_duals_writer.flush()?;

        Ok(())
    }
}

/// An object for writing results to file
pub struct DataWriter {
    technologies_writer: csv::Writer<File>,
    summary_writer: csv::Writer<File>,
    dispatch_writer: csv::Writer<File>,
    debug_writer: Option<DebugDataWriter>,
}

impl DataWriter {
    /// Open CSV files to write output data to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    /// * `save_debug_info` - Whether to include extra CSV files for debugging model
    pub fn create(output_path: &Path, save_debug_info: bool) -> Result<Self> {
        let new_writer = |file_name| {
            let file_path = output_path.join(file_name);
            csv::Writer::from_path(file_path)
        };

        let debug_writer = if save_debug_info {
            // Create debug CSV files
            Some(DebugDataWriter::create(output_path)?)
        } else {
            None
        };

        Ok(Self {
            technologies_writer: new_writer(TECHNOLOGIES_FILE_NAME)?,
            summary_writer: new_writer(SUMMARY_FILE_NAME)?,
            dispatch_writer: new_writer(DISPATCH_FILE_NAME)?,
            debug_writer,
        })
    }

    /// Write technology results and the system summary to CSV files
    pub fn write_results(&mut self, results: &Results) -> Result<()> {
        self.write_technologies(&results.technologies)?;
        self.write_summary(&results.summary)
    }

    fn write_technologies(&mut self, technologies: &[TechnologyResult]) -> Result<()> {
        for tech in technologies {
            self.technologies_writer.serialize(tech)?;
        }

        Ok(())
    }

    fn write_summary(&mut self, summary: &SystemSummary) -> Result<()> {
        self.summary_writer.serialize(summary)?;

        Ok(())
    }

    /// Write hourly dispatch to a CSV file in long format
    pub fn write_dispatch(&mut self, solution: &Solution) -> Result<()> {
        let network = solution.network();
        for (asset, variable, series) in dispatch_values(network, solution) {
            for (timestamp, value) in network.timestamps.iter().zip(series) {
                let row = DispatchRow {
                    timestamp: format_timestamp(timestamp),
                    asset: asset.clone(),
                    variable: variable.to_string(),
                    value,
                };
                self.dispatch_writer.serialize(row)?;
            }
        }

        Ok(())
    }

    /// Write debug information to CSV files
    pub fn write_debug_info(&mut self, solution: &Solution) -> Result<()> {
        if let Some(ref mut wtr) = self.debug_writer {
            let duals = solution
                .iter_power_balance_duals()
                .map(|(bus, t, price)| (bus, t, price.value()));
            wtr.write_power_balance_duals(&solution.network().timestamps, duals)?;
        }

        Ok(())
    }

    /// Flush the underlying streams
    pub fn flush(&mut self) -> Result<()> {
        self.technologies_writer.flush()?;
        self.summary_writer.flush()?;
        self.dispatch_writer.flush()?;
        if let Some(ref mut wtr) = self.debug_writer {
            wtr.flush()?;
        }

        Ok(())
    }
}
