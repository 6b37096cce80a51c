// src/scheduler/mod.rs - Admission, dispatch and retirement over the processor pool
pub mod policy;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use procsim_shared::{Actor, Command, Policy, ProcessState, RunSummary, SimError, SimTime, TraceKind};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub use policy::{RoundRobinCursor, shortest_remaining};

use crate::clock::SimClock;
use crate::memory::MemoryRecord;
use crate::process::{ProcessContext, ProcessControlBlock, ProcessHandle, TurnOutcome};
use crate::trace_sink::TraceLog;
use crate::vmm::{VmmHandle, VmmReport};

/// FIFO of memory commands waiting to be claimed by whichever process runs next.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    inner: Arc<Mutex<VecDeque<Command>>>,
}

impl CommandQueue {
    pub fn new(commands: Vec<Command>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(commands.into())),
        }
    }

    /// Takes the next unclaimed command, if any.
    pub fn claim(&self) -> Option<Command> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSettings {
    pub policy: Policy,
    pub processors: usize,
    pub idle_step: SimTime,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub final_time: SimTime,
    pub summary: RunSummary,
    pub memory: Vec<MemoryRecord>,
    pub disk: Vec<MemoryRecord>,
    pub commands_executed: u64,
    pub commands_unclaimed: usize,
    pub peak_slots: usize,
    pub ticks: u64,
}

pub struct Scheduler {
    settings: SchedulerSettings,
    clock: SimClock,
    trace: TraceLog,
    commands: CommandQueue,
    slots: Arc<Semaphore>,
    wait: VecDeque<ProcessHandle>,
    ready: VecDeque<ProcessHandle>,
    cursor: RoundRobinCursor,
    processes: Vec<Arc<ProcessControlBlock>>,
    vmm: VmmHandle,
    vmm_task: JoinHandle<Result<VmmReport, SimError>>,
    peak_slots: usize,
    ticks: u64,
}

impl Scheduler {
    /// Spawns one task per process. `processes` must already be ordered by
    /// arrival; summaries are reported in the same order.
    pub fn new(
        settings: SchedulerSettings,
        processes: Vec<Arc<ProcessControlBlock>>,
        ctx: ProcessContext,
        vmm_task: JoinHandle<Result<VmmReport, SimError>>,
    ) -> Self {
        let wait = processes
            .iter()
            .map(|pcb| ProcessHandle::spawn(pcb.clone(), ctx.clone()))
            .collect();
        Self {
            settings,
            clock: ctx.clock.clone(),
            trace: ctx.trace.clone(),
            commands: ctx.commands.clone(),
            slots: Arc::new(Semaphore::new(settings.processors)),
            wait,
            ready: VecDeque::new(),
            cursor: RoundRobinCursor::new(),
            processes,
            vmm: ctx.vmm,
            vmm_task,
            peak_slots: 0,
            ticks: 0,
        }
    }

    /// Drives the simulation until both queues are empty, then stops the memory
    /// manager and closes the trace.
    pub async fn run(mut self) -> Result<RunReport, SimError> {
        tracing::info!(
            "Scheduler started: {} policy, {} processor(s), {} process(es)",
            self.settings.policy,
            self.settings.processors,
            self.wait.len()
        );
        while !self.wait.is_empty() || !self.ready.is_empty() {
            self.ticks += 1;
            if let Err(e) = self.tick().await {
                tracing::error!("Simulation fault at {:.0}: {}", self.clock.now(), e);
                return Err(e);
            }
        }
        self.finalize().await
    }

    async fn tick(&mut self) -> Result<(), SimError> {
        let batch = match self.settings.policy {
            Policy::RoundRobin => self.round_robin_batch().await?,
            Policy::ShortestRemaining => self.shortest_remaining_batch().await?,
        };
        if batch.is_empty() {
            if !self.wait.is_empty() {
                self.clock.advance(self.settings.idle_step);
                return Ok(());
            }
            if self.retire().await? == 0 {
                return Err(SimError::fault("ready queue stalled with nothing to dispatch"));
            }
            return Ok(());
        }
        self.dispatch(batch).await?;
        self.retire().await?;
        Ok(())
    }

    /// Moves the wait-queue head to the ready queue if it has arrived. Returns
    /// its ready-queue index, already claimed for a turn.
    async fn admit_next(&mut self) -> Result<Option<usize>, SimError> {
        let now = self.clock.now();
        if !self.wait.front().is_some_and(|h| h.pcb().arrival() <= now) {
            return Ok(None);
        }
        let Some(handle) = self.wait.pop_front() else {
            return Ok(None);
        };
        handle.pcb().set_state(ProcessState::Ready)?;
        if !handle.pcb().try_activate() {
            return Err(SimError::fault(format!("process {} active before admission", handle.pcb().id())));
        }
        tracing::info!("Process {} admitted at {:.0}", handle.pcb().id(), now);
        self.trace
            .emit(now, Actor::process(handle.pcb().id()), TraceKind::Started)
            .await?;
        self.ready.push_back(handle);
        Ok(Some(self.ready.len() - 1))
    }

    /// New arrivals fill free slots first; existing ready processes are
    /// resumed only when nothing new started this tick.
    async fn round_robin_batch(&mut self) -> Result<Vec<usize>, SimError> {
        let mut batch = Vec::new();
        while batch.len() < self.settings.processors {
            let Some(index) = self.admit_next().await? else {
                break;
            };
            self.cursor.on_admit(index);
            batch.push(index);
        }
        if batch.is_empty() {
            batch = self.cursor.select(&self.ready, self.settings.processors);
        }
        Ok(batch)
    }

    async fn shortest_remaining_batch(&mut self) -> Result<Vec<usize>, SimError> {
        if let Some(index) = self.admit_next().await? {
            return Ok(vec![index]);
        }
        match shortest_remaining(&self.ready, true) {
            Some(index) if self.ready[index].pcb().try_activate() => Ok(vec![index]),
            Some(index) => Err(SimError::fault(format!(
                "process {} already active",
                self.ready[index].pcb().id()
            ))),
            None => Ok(Vec::new()),
        }
    }

    /// Takes a slot for every process in the batch, then runs their turns one
    /// after another, each holding the baton until it yields.
    async fn dispatch(&mut self, batch: Vec<usize>) -> Result<(), SimError> {
        let mut permits = Vec::with_capacity(batch.len());
        for &index in &batch {
            let permit = self
                .slots
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| SimError::fault("processor pool closed"))?;
            self.ready[index].pcb().set_state(ProcessState::Running)?;
            permits.push((index, permit));
        }
        let held = self.settings.processors - self.slots.available_permits();
        self.peak_slots = self.peak_slots.max(held);

        for (index, permit) in permits {
            let handle = &self.ready[index];
            tracing::debug!("Dispatching process {} at {:.0}", handle.pcb().id(), self.clock.now());
            if handle.run_turn(permit).await? == TurnOutcome::Finished {
                tracing::debug!("Process {} left its last turn", handle.pcb().id());
            }
        }
        Ok(())
    }

    /// Removes finished processes, always taking the one the shortest-remaining
    /// finder points at. Returns how many were retired.
    async fn retire(&mut self) -> Result<usize, SimError> {
        let mut retired = 0;
        while let Some(index) = shortest_remaining(&self.ready, false) {
            if !self.ready[index].pcb().is_finished() {
                break;
            }
            let Some(handle) = self.ready.remove(index) else {
                break;
            };
            self.cursor.on_remove(index);
            tracing::debug!("Retiring process {}", handle.pcb().id());
            handle.join().await?;
            retired += 1;
        }
        self.cursor.clamp(self.ready.len());
        Ok(retired)
    }

    async fn finalize(self) -> Result<RunReport, SimError> {
        self.vmm.shutdown().await?;
        let vmm = self
            .vmm_task
            .await
            .map_err(|e| SimError::fault(format!("memory manager task failed: {}", e)))??;
        let summary = RunSummary {
            processes: self.processes.iter().map(|pcb| pcb.summary()).collect(),
        };
        self.trace.finish(&summary).await?;
        let final_time = self.clock.now();
        tracing::info!(
            "Simulation finished at {:.0} after {} ticks, {} memory commands",
            final_time,
            self.ticks,
            vmm.executed
        );
        Ok(RunReport {
            final_time,
            summary,
            memory: vmm.store.main.records().to_vec(),
            disk: vmm.store.disk.records().to_vec(),
            commands_executed: vmm.executed,
            commands_unclaimed: self.commands.len(),
            peak_slots: self.peak_slots,
            ticks: self.ticks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_queue_is_fifo_and_shared() {
        let queue = CommandQueue::new(vec![Command::store("a", "1"), Command::lookup("a")]);
        let other = queue.clone();
        assert_eq!(queue.claim(), Some(Command::store("a", "1")));
        assert_eq!(other.len(), 1);
        assert_eq!(other.claim(), Some(Command::lookup("a")));
        assert!(queue.claim().is_none());
        assert!(queue.is_empty());
    }
}
