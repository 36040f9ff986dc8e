//! Functionality for running the capacity expansion and dispatch optimisation.
use crate::input::load_model;
use crate::model::Model;
use crate::network::{Network, build_network};
use crate::optimisation::OptimisationProblem;
use crate::output::DataWriter;
use crate::output::metadata::{RunInfo, write_metadata};
use crate::results::{Results, extract_results};
use anyhow::{Context, Result};
use log::info;
use std::path::Path;
use std::time::Instant;

/// Load a model and build its network, labelling errors by stage
fn load_and_build(model_path: &Path) -> Result<(Model, Network)> {
    let model = load_model(model_path).context("Failed to load model.")?;
    info!("Loaded model from {}", model_path.display());

    let network = build_network(&model).context("Failed to build optimisation model.")?;

    Ok((model, network))
}

/// Check that a model can be loaded and its optimisation problem built, without solving it.
pub fn validate(model_path: &Path) -> Result<()> {
    let (_, network) = load_and_build(model_path)?;
    OptimisationProblem::new(&network).context("Failed to build optimisation model.")?;

    Ok(())
}

/// Run the optimisation for the model at `model_path`.
///
/// # Arguments:
///
/// * `model_path` - Path to the model directory
/// * `output_path` - Folder where output files will be saved
/// * `debug_model` - Whether to write additional debug information to file
///
/// # Returns:
///
/// The results of the run, which have also been written to `output_path`.
pub fn run(model_path: &Path, output_path: &Path, debug_model: bool) -> Result<Results> {
    let (model, network) = load_and_build(model_path)?;
    info!(
        "Optimising site \"{}\" with a capex budget of {} EUR",
        model.parameters.site_name, model.parameters.capex_budget
    );

    let start = Instant::now();
    let problem =
        OptimisationProblem::new(&network).context("Failed to build optimisation model.")?;
    let solution = problem
        .solve()
        .context("Failed to solve optimisation model.")?;
    let solve_time = start.elapsed();
    info!("Optimisation finished in {:.2} s", solve_time.as_secs_f64());

    let results = extract_results(&solution);
    results.log();

    let mut writer = DataWriter::create(output_path, debug_model)?;
    writer.write_results(&results)?;
    writer.write_dispatch(&solution)?;
    writer.write_debug_info(&solution)?;
    writer.flush()?;
    let run = RunInfo {
        model_path,
        site_name: &model.parameters.site_name,
        solve_time,
    };
    write_metadata(output_path, &run).context("Failed to save metadata.")?;

    Ok(results)
}
