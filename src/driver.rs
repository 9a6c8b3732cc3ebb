mod config;
mod error;

use crate::codegen::{generate, ExternRegistry, HeapUsageReport, Program, DEFAULT_HEAP_BUDGET};
use crate::ir::cfg_vizualizer::cfg_to_dot;
use crate::ir::optimizer::{optimize_unit, OptimizerConfig};
use crate::ir::TacUnit;
use crate::session::Session;

pub use config::Config;
pub use error::DriverError;

/// Optimizes and lowers one unit.
pub fn compile(
    unit: &TacUnit,
    config: &OptimizerConfig,
    registry: &ExternRegistry,
    session: &mut Session,
) -> Result<(TacUnit, Program), DriverError> {
    let optimized = optimize_unit(unit, config);
    let program = generate(&optimized, registry, session)?;

    Ok((optimized, program))
}

pub fn execute(config: &Config) -> Result<(), DriverError> {
    let input = config.get_input()?;
    let unit: TacUnit = serde_json::from_str(&input)?;
    let registry = ExternRegistry::with_defaults();
    let mut session = Session::new();

    log::debug!("read unit with {} instructions", unit.instructions.len());

    let (optimized, program) = compile(&unit, &config.optimizer_config(), &registry, &mut session)?;

    if let Some(path) = &config.ir_output {
        std::fs::write(path, optimized.to_string())?;
    }

    if let Some(path) = &config.cfg_dot {
        let name = optimized.entry_class_name.as_deref().unwrap_or("unit");
        std::fs::write(path, cfg_to_dot(name, &optimized.instructions))?;
    }

    let report = HeapUsageReport::new(&program.data, &optimized, DEFAULT_HEAP_BUDGET);

    if report.exceeds_budget() {
        log::warn!("heap needs {} slots, the budget is {}", report.total, report.budget);
    }

    if config.heap_report {
        eprintln!("{report}");
    }

    match &config.output {
        Some(path) => std::fs::write(path, program.to_string())?,
        None => println!("{program}"),
    }

    Ok(())
}
