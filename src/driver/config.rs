use crate::ir::optimizer::{GvnMode, OptimizerConfig, DEFAULT_MAX_ROUNDS, DEFAULT_UNSWITCH_CEILING};
use clap::Parser;
use std::io::Read;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// TAC unit as JSON (reads stdin when left out)
    pub file: Option<String>,

    /// Where to write the assembly (stdout when left out)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Skip every optimization pass
    #[arg(long)]
    pub no_optimize: bool,

    #[arg(long, value_enum, default_value_t = GvnMode::Dataflow)]
    pub gvn_mode: GvnMode,

    /// Largest loop body, in instructions, that unswitching may duplicate
    #[arg(long, default_value_t = DEFAULT_UNSWITCH_CEILING)]
    pub unswitch_ceiling: usize,

    /// Keep every temporary and local in its own heap slot
    #[arg(long)]
    pub no_slot_reuse: bool,

    /// Write the optimized TAC here
    #[arg(long)]
    pub ir_output: Option<String>,

    /// Write the optimized control flow graph here as DOT
    #[arg(long)]
    pub cfg_dot: Option<String>,

    /// Print heap usage to stderr
    #[arg(long)]
    pub heap_report: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    pub fn get_input(&self) -> std::io::Result<String> {
        match &self.file {
            Some(path) => std::fs::read_to_string(path),
            None => {
                let mut input = String::new();
                std::io::stdin().read_to_string(&mut input)?;
                Ok(input)
            }
        }
    }

    pub fn optimizer_config(&self) -> OptimizerConfig {
        OptimizerConfig {
            enabled: !self.no_optimize,
            gvn_mode: self.gvn_mode,
            unswitch_ceiling: self.unswitch_ceiling,
            max_rounds: DEFAULT_MAX_ROUNDS,
            reuse_slots: !self.no_slot_reuse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_optimizer_config() {
        let config = Config::parse_from(["tacvm", "unit.json", "--gvn-mode", "ssa", "--no-slot-reuse"]);
        let optimizer = config.optimizer_config();

        assert!(config.file.as_deref() == Some("unit.json"));
        assert!(optimizer.enabled);
        assert!(optimizer.gvn_mode == GvnMode::Ssa);
        assert!(!optimizer.reuse_slots);
        assert!(optimizer.unswitch_ceiling == DEFAULT_UNSWITCH_CEILING);
    }

    #[test]
    fn optimizer_can_be_switched_off() {
        let config = Config::parse_from(["tacvm", "--no-optimize"]);

        assert!(!config.optimizer_config().enabled);
        assert!(config.file.is_none());
    }
}
