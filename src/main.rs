use std::{fs, path::Path, process::ExitCode};

use dicom_window_planner::{
    CostGrid, Error, Objective, Optimizer, PlanReport, RunDiagnostics, SliceGeometryResolver,
    SliceLoader, WindowPlanner, load_config,
};
use log::{error, info};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(config_path) = std::env::args().nth(1) else {
        eprintln!("usage: dicom-window-planner <config.json>");
        return ExitCode::from(2);
    };

    match run(Path::new(&config_path)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: &Path) -> Result<(), Error> {
    let config = load_config(config_path)?;

    let records = SliceLoader::load_from_directory(&config.series_dir)?;
    let table = SliceGeometryResolver::resolve(&records)?.into_positions()?;
    info!(
        "{} slices from {}",
        table.len(),
        config.series_dir.display()
    );

    let objective = Objective::new(
        &table,
        config.target_vector(&table),
        config.weight_vector(),
        WindowPlanner::new(config.planner),
    );
    let outcome =
        Optimizer::new(objective.clone(), config.optimizer.clone()).optimize(config.nominal_params());

    let report = PlanReport::from_outcome(&objective, &outcome)?;
    info!(
        "best x: [{:.4}, {:.4}] cost: {:.6} windows: {}",
        report.params.window_coverage,
        report.params.step_size,
        report.cost,
        report.windows.len()
    );

    let json = report.to_json()?;
    match &config.output.json_out {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    if let Some(path) = &config.output.diagnostics_out {
        let mut diagnostics = RunDiagnostics::new(&outcome);
        if config.output.grid_size > 0 {
            if let Some(grid) = CostGrid::around_runs(&objective, &outcome.runs, config.output.grid_size) {
                diagnostics = diagnostics.with_grid(grid);
            }
        }
        fs::write(path, diagnostics.to_json()?)?;
        info!("diagnostics written to {}", path.display());
    }

    Ok(())
}
