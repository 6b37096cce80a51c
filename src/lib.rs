// src/lib.rs - Process scheduling and virtual memory simulation engine
pub mod clock;
pub mod input;
pub mod memory;
pub mod process;
pub mod scheduler;
pub mod simulation;
pub mod trace_sink;
pub mod vmm;

pub use clock::SimClock;
pub use memory::{DiskStore, MainMemory, MemoryRecord, MemoryStore, Tier};
pub use process::{BurstModel, CpuModel, ProcessControlBlock, TurnOutcome};
pub use scheduler::{CommandQueue, RunReport, Scheduler, SchedulerSettings};
pub use simulation::{Simulation, SimulationInput};
pub use trace_sink::{JsonLinesSink, MemoryTraceSink, TextTraceSink, TraceLog};
pub use vmm::{MemoryOutcome, VirtualMemoryManager, VmmHandle, VmmState};

pub use procsim_shared as shared;
