mod error;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use morota_common::{ModuleType, TaskId};
use morota_io::{
    build_config_planner, build_failure_model, build_task_allocator, load_modules_csv, load_robot_setup,
    load_scenario, load_tasks_csv, TaskProgressCollector,
};
use morota_sim::{Depot, Scheduler};

use error::AppError;

/// Run a MoRoTA fleet-simulation scenario to completion.
#[derive(Debug, Parser)]
struct Cli {
    /// Path to the scenario YAML document.
    #[clap(long = "scenario", short = 's')]
    scenario: PathBuf,
    /// Seed for the model's single RNG.
    #[clap(long = "seed", default_value_t = 0)]
    seed: u64,
    /// Write the per-step task CSV (and Pareto/chosen CSVs, if the
    /// configuration planner emits them) to `output_dir` (§6).
    #[clap(long = "log-file")]
    log_file: bool,
    /// Raise the log level; repeatable (-v, -vv, -vvv).
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(cli: &Cli) {
    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("morota={default_level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(cli: &Cli) -> Result<(), AppError> {
    let scenario = load_scenario(&cli.scenario)?;
    tracing::info!(scenario = %scenario.scenario_name, "loaded scenario document");

    let robot_setup = load_robot_setup(&scenario.robot_setup)?;
    let declared_types: std::collections::HashSet<&ModuleType> = robot_setup.modules.iter().collect();
    for spec in &robot_setup.robot_types {
        for ty in spec.required_modules.keys() {
            if !declared_types.contains(ty) {
                tracing::warn!(robot_type = %spec.name, module_type = %ty, "required module type not declared in robot_setup.modules");
            }
        }
    }

    let modules = load_modules_csv(&scenario.modules)?;
    let depot = Depot::new(modules)?;

    let tasks = load_tasks_csv(&scenario.tasks)?;
    let total_work: HashMap<TaskId, f64> = tasks.iter().map(|t| (t.id, t.total_work)).collect();

    let failure_model = build_failure_model(&cli.scenario, &scenario.failure_model)?;
    let config_planner = build_config_planner(&cli.scenario, &scenario.configuration_planner)?;
    let task_allocator = build_task_allocator(&cli.scenario, &scenario.task_allocator)?;

    let mut collector = if cli.log_file {
        std::fs::create_dir_all(&scenario.output_dir).map_err(|source| AppError::OutputDir {
            path: scenario.output_dir.clone(),
            source,
        })?;
        let prefix = format!("seed{:04}", cli.seed);
        let mut collector = TaskProgressCollector::new(&scenario.output_dir, &scenario.scenario_name, &prefix);
        collector.open()?;
        Some(collector)
    } else {
        None
    };

    let rng = StdRng::seed_from_u64(cli.seed);
    let mut scheduler = Scheduler::new(
        Vec::new(),
        tasks,
        depot,
        robot_setup.robot_types,
        failure_model,
        rng,
        scenario.sim.time_step,
        scenario.sim.planner_interval,
        scenario.sim.allocator_interval,
        scenario.sim.max_steps,
        scenario.sim.num_workers_max,
        scenario.sim.reconstruct_duration,
        scenario.depot_position(),
        config_planner,
        task_allocator,
    );

    while !scheduler.is_terminated() {
        let rows = scheduler.step();
        if let Some(collector) = collector.as_mut() {
            collector.collect(&rows, |id| total_work.get(&id).copied().unwrap_or(0.0))?;
        }
    }
    if let Some(mut collector) = collector {
        collector.close()?;
    }

    let makespan = scheduler.makespan();
    if scheduler.all_tasks_done() {
        tracing::info!(makespan = makespan.0, step = scheduler.current_step(), "run completed");
    } else {
        tracing::warn!(step = scheduler.current_step(), "run terminated at max_steps with tasks remaining");
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
