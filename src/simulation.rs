// src/simulation.rs - Wires clock, memory manager, processes and scheduler for one run
use std::sync::Arc;

use procsim_shared::{Command, ProcessDescriptor, SimConfig, SimError, TraceSink};

use crate::clock::SimClock;
use crate::input;
use crate::memory::{DiskStore, MemoryStore};
use crate::process::{BurstModel, CpuModel, ProcessContext, ProcessControlBlock};
use crate::scheduler::{CommandQueue, RunReport, Scheduler, SchedulerSettings};
use crate::trace_sink::{TraceLog, open_sink};
use crate::vmm::VirtualMemoryManager;

/// Everything the input provider hands the core.
#[derive(Debug, Clone, Default)]
pub struct SimulationInput {
    pub processes: Vec<ProcessDescriptor>,
    pub commands: Vec<Command>,
    pub capacity: usize,
}

impl SimulationInput {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.capacity < 1 {
            return Err(SimError::ResourceUnavailable(format!(
                "main memory needs at least one page, got {}",
                self.capacity
            )));
        }
        for process in &self.processes {
            process.validate()?;
        }
        if self
            .processes
            .windows(2)
            .any(|pair| pair[1].arrival < pair[0].arrival)
        {
            return Err(SimError::malformed("processes are not ordered by arrival time"));
        }
        Ok(())
    }

    /// Loads the three input files. A configured capacity overrides the
    /// memconfig file, which is then not read at all.
    pub async fn load(
        config: &SimConfig,
        processes: impl AsRef<std::path::Path>,
        commands: impl AsRef<std::path::Path>,
        memconfig: impl AsRef<std::path::Path>,
    ) -> Result<Self, SimError> {
        let processes = input::load_processes(processes, config.scheduler.time_scale).await?;
        let commands = input::load_commands(commands).await?;
        let capacity = match config.memory.capacity {
            Some(capacity) => capacity,
            None => input::load_capacity(memconfig).await?,
        };
        Ok(Self {
            processes,
            commands,
            capacity,
        })
    }
}

pub struct Simulation {
    config: SimConfig,
    input: SimulationInput,
    sink: Option<Box<dyn TraceSink>>,
}

impl Simulation {
    /// Validates configuration and input up front; nothing runs on failure.
    pub fn new(config: SimConfig, input: SimulationInput) -> Result<Self, SimError> {
        config.validate()?;
        input.validate()?;
        Ok(Self {
            config,
            input,
            sink: None,
        })
    }

    /// Replaces the sink the trace configuration would open.
    pub fn with_sink(mut self, sink: Box<dyn TraceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub async fn run(self) -> Result<RunReport, SimError> {
        let Simulation { config, input, sink } = self;
        let sink = match sink {
            Some(sink) => sink,
            None => open_sink(&config.trace).await?,
        };
        let disk = match &config.memory.disk_path {
            Some(path) => DiskStore::create(path).await?,
            None => DiskStore::in_memory(),
        };

        let policy = config.scheduler.policy;
        let clock = SimClock::new();
        let trace = TraceLog::new(sink);
        let cpu = CpuModel::new(BurstModel::for_policy(policy, &config.burst), config.scheduler.seed);

        let vmm = VirtualMemoryManager::new(
            MemoryStore::new(input.capacity, disk),
            clock.clone(),
            cpu.clone(),
            trace.clone(),
            &config.memory,
        );
        let (vmm, vmm_task) = vmm.spawn();

        let ctx = ProcessContext {
            clock,
            cpu,
            vmm,
            commands: CommandQueue::new(input.commands),
            trace,
            finish_tolerance: config.finish_tolerance(),
        };
        let settings = SchedulerSettings {
            policy,
            processors: config.scheduler.processors(),
            idle_step: config.scheduler.idle_step(),
        };
        let processes = input
            .processes
            .iter()
            .map(|descriptor| Arc::new(ProcessControlBlock::new(descriptor)))
            .collect();
        Scheduler::new(settings, processes, ctx, vmm_task).run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_validation() {
        let mut input = SimulationInput {
            processes: vec![ProcessDescriptor::new("0", 2.0, 1.0), ProcessDescriptor::new("1", 1.0, 1.0)],
            commands: Vec::new(),
            capacity: 1,
        };
        assert!(matches!(input.validate(), Err(SimError::MalformedInput(_))));
        input.processes.reverse();
        assert!(input.validate().is_ok());
        input.capacity = 0;
        assert!(matches!(
            Simulation::new(SimConfig::default(), input),
            Err(SimError::ResourceUnavailable(_))
        ));
    }
}
