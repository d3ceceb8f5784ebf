mod engine;
mod schedule;
mod types;

pub use engine::{compound_projection, run_simulation};
pub use types::{
    BalanceStats, CompoundProjection, DEFAULT_SEED, FieldError, MAX_PATHS, MAX_YEARS, MIN_PATHS,
    PercentileBands, SamplePoint, SimulationConfig, SimulationError, SimulationResult, TargetGoal,
};
