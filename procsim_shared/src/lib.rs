// procsim_shared: data model and contracts shared by the engine, the CLI and tests

pub mod command;
pub mod config;
pub mod error;
pub mod process;
pub mod trace;

pub use command::{Command, Operation};
pub use config::{
    load_config, BurstConfig, ConfigError, MemoryConfig, OverflowPolicy, Policy, SchedulerConfig,
    SimConfig, TraceConfig, TraceFormat,
};
pub use error::SimError;
pub use process::{ProcessDescriptor, ProcessState};
pub use trace::{Actor, ProcessSummary, RunSummary, TraceEvent, TraceKind, TraceSink};

/// Simulated time, in the scaled units the scheduler runs on.
pub type SimTime = f64;

/// Value reported by a lookup that finds the variable in neither tier.
pub const NOT_FOUND: &str = "-1";
