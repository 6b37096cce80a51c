// src/process.rs - Simulated process: control block, CPU model and task loop
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use procsim_shared::{
    Actor, BurstConfig, Policy, ProcessDescriptor, ProcessState, ProcessSummary, SimError, SimTime,
    TraceKind,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{OwnedSemaphorePermit, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::clock::SimClock;
use crate::scheduler::CommandQueue;
use crate::trace_sink::TraceLog;
use crate::vmm::VmmHandle;

/// How much burst one unit of work consumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BurstModel {
    /// Uniform whole number in `[min, max]`, clamped to what remains.
    Random { min: u32, max: u32 },
    /// A fixed fraction of what remains.
    Decay { fraction: f64 },
}

impl BurstModel {
    pub fn for_policy(policy: Policy, burst: &BurstConfig) -> Self {
        match policy {
            Policy::RoundRobin => BurstModel::Random {
                min: burst.min,
                max: burst.max,
            },
            Policy::ShortestRemaining => BurstModel::Decay { fraction: burst.decay },
        }
    }
}

/// Burst model plus the random source it draws from. Clones share the RNG so
/// a seeded run is reproducible no matter which actor draws.
#[derive(Debug, Clone)]
pub struct CpuModel {
    model: BurstModel,
    rng: Arc<Mutex<StdRng>>,
}

impl CpuModel {
    pub fn new(model: BurstModel, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            model,
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    pub fn model(&self) -> BurstModel {
        self.model
    }

    /// Time consumed by one unit of work for a process with `remaining` burst.
    pub fn draw(&self, remaining: SimTime) -> SimTime {
        if remaining <= 0.0 {
            return 0.0;
        }
        match self.model {
            BurstModel::Random { min, max } => {
                let n = self
                    .rng
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .random_range(min..=max);
                f64::from(n).min(remaining)
            }
            BurstModel::Decay { fraction } => remaining * fraction,
        }
    }
}

#[derive(Debug)]
struct PcbInner {
    state: ProcessState,
    remaining: SimTime,
    waiting: SimTime,
    last_ready: SimTime,
    finished_at: Option<SimTime>,
    turns: u32,
}

/// Process control block, shared between the scheduler, the process task and
/// the memory manager while it charges a command.
#[derive(Debug)]
pub struct ProcessControlBlock {
    id: String,
    arrival: SimTime,
    active: AtomicBool,
    inner: Mutex<PcbInner>,
}

impl ProcessControlBlock {
    pub fn new(descriptor: &ProcessDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            arrival: descriptor.arrival,
            active: AtomicBool::new(false),
            inner: Mutex::new(PcbInner {
                state: ProcessState::Waiting,
                remaining: descriptor.burst,
                waiting: 0.0,
                last_ready: descriptor.arrival,
                finished_at: None,
                turns: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PcbInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn arrival(&self) -> SimTime {
        self.arrival
    }

    pub fn state(&self) -> ProcessState {
        self.lock().state
    }

    pub fn set_state(&self, next: ProcessState) -> Result<(), SimError> {
        let mut inner = self.lock();
        inner.state = inner
            .state
            .transition(next)
            .map_err(|e| SimError::InvalidTransition(format!("process {}: {}", self.id, e)))?;
        Ok(())
    }

    pub fn remaining(&self) -> SimTime {
        self.lock().remaining
    }

    /// Deducts consumed CPU time from the remaining burst.
    pub fn consume(&self, dt: SimTime) {
        let mut inner = self.lock();
        inner.remaining -= dt;
    }

    pub fn is_finished(&self) -> bool {
        self.lock().state.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Atomically claims the process for a turn. False if it is already active.
    pub fn try_activate(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    fn begin_turn(&self, now: SimTime) {
        let mut inner = self.lock();
        inner.waiting += (now - inner.last_ready).max(0.0);
        inner.turns += 1;
    }

    fn end_turn(&self, now: SimTime) {
        self.lock().last_ready = now;
    }

    fn finish(&self, now: SimTime) -> Result<(), SimError> {
        self.set_state(ProcessState::Finished)?;
        self.lock().finished_at = Some(now);
        Ok(())
    }

    pub fn summary(&self) -> ProcessSummary {
        let inner = self.lock();
        ProcessSummary {
            id: self.id.clone(),
            arrival: self.arrival,
            waiting: inner.waiting,
            finished_at: inner.finished_at,
            turns: inner.turns,
        }
    }
}

/// Result of one scheduling turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Yielded,
    Finished,
}

/// Resume signal: the processor slot travels with it and is dropped when the
/// turn, including any memory command, is over.
pub struct Dispatch {
    pub permit: OwnedSemaphorePermit,
    pub respond_to: oneshot::Sender<Result<TurnOutcome, SimError>>,
}

/// Everything a process task needs besides its own control block.
#[derive(Clone)]
pub struct ProcessContext {
    pub clock: SimClock,
    pub cpu: CpuModel,
    pub vmm: VmmHandle,
    pub commands: CommandQueue,
    pub trace: TraceLog,
    pub finish_tolerance: SimTime,
}

/// Scheduler-side handle to a running process task.
pub struct ProcessHandle {
    pcb: Arc<ProcessControlBlock>,
    tx: mpsc::Sender<Dispatch>,
    task: JoinHandle<()>,
}

impl AsRef<ProcessControlBlock> for ProcessHandle {
    fn as_ref(&self) -> &ProcessControlBlock {
        &self.pcb
    }
}

impl ProcessHandle {
    pub fn spawn(pcb: Arc<ProcessControlBlock>, ctx: ProcessContext) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(run(pcb.clone(), ctx, rx));
        Self { pcb, tx, task }
    }

    pub fn pcb(&self) -> &Arc<ProcessControlBlock> {
        &self.pcb
    }

    /// Hands the baton to the process and waits until it yields it back.
    pub async fn run_turn(&self, permit: OwnedSemaphorePermit) -> Result<TurnOutcome, SimError> {
        let (respond_to, response) = oneshot::channel();
        self.tx
            .send(Dispatch { permit, respond_to })
            .await
            .map_err(|_| SimError::fault(format!("process {} is no longer accepting turns", self.pcb.id())))?;
        response
            .await
            .map_err(|_| SimError::fault(format!("process {} dropped its turn", self.pcb.id())))?
    }

    /// Waits for the task of a finished process to exit.
    pub async fn join(self) -> Result<(), SimError> {
        drop(self.tx);
        self.task
            .await
            .map_err(|e| SimError::fault(format!("process {} task failed: {}", self.pcb.id(), e)))
    }
}

async fn run(pcb: Arc<ProcessControlBlock>, ctx: ProcessContext, mut rx: mpsc::Receiver<Dispatch>) {
    while let Some(Dispatch { permit, respond_to }) = rx.recv().await {
        let outcome = take_turn(&pcb, &ctx).await;
        drop(permit);
        let done = !matches!(outcome, Ok(TurnOutcome::Yielded));
        if respond_to.send(outcome).is_err() {
            tracing::error!("Scheduler stopped listening to process {}", pcb.id());
            break;
        }
        if done {
            break;
        }
    }
    tracing::debug!("Process {} task exiting", pcb.id());
}

async fn take_turn(pcb: &Arc<ProcessControlBlock>, ctx: &ProcessContext) -> Result<TurnOutcome, SimError> {
    if !pcb.is_active() || pcb.state() != ProcessState::Running {
        return Err(SimError::fault(format!(
            "process {} resumed without being dispatched",
            pcb.id()
        )));
    }
    let actor = Actor::process(pcb.id());
    let now = ctx.clock.now();
    pcb.begin_turn(now);
    ctx.trace.emit(now, actor.clone(), TraceKind::Resumed).await?;

    if let Some(command) = ctx.commands.claim() {
        pcb.set_state(ProcessState::BlockedOnMemory)?;
        let outcome = ctx.vmm.submit(pcb.clone(), command).await?;
        tracing::debug!(
            "Process {} memory command {} took {:.0}",
            pcb.id(),
            outcome.command,
            outcome.latency
        );
        pcb.set_state(ProcessState::Running)?;
    } else {
        let dt = ctx.cpu.draw(pcb.remaining());
        pcb.consume(dt);
        ctx.clock.advance(dt);
    }

    let now = ctx.clock.now();
    ctx.trace.emit(now, actor.clone(), TraceKind::Paused).await?;

    if pcb.remaining() <= ctx.finish_tolerance {
        pcb.finish(now)?;
        ctx.trace.emit(now, actor, TraceKind::Finished).await?;
        tracing::info!("Process {} finished at {:.0}", pcb.id(), now);
        return Ok(TurnOutcome::Finished);
    }

    pcb.end_turn(now);
    pcb.set_state(ProcessState::Ready)?;
    pcb.deactivate();
    Ok(TurnOutcome::Yielded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_draw_is_clamped_and_reproducible() {
        let model = BurstModel::Random { min: 101, max: 1000 };
        let a = CpuModel::new(model, Some(9));
        let b = CpuModel::new(model, Some(9));
        for _ in 0..50 {
            let x = a.draw(5000.0);
            assert_eq!(x, b.draw(5000.0));
            assert!((101.0..=1000.0).contains(&x));
            assert_eq!(x.fract(), 0.0);
        }
        assert_eq!(a.draw(42.0), 42.0);
        assert_eq!(a.draw(0.0), 0.0);
    }

    #[test]
    fn test_decay_draw() {
        let cpu = CpuModel::new(BurstModel::Decay { fraction: 0.1 }, None);
        assert!((cpu.draw(500.0) - 50.0).abs() < 1e-9);
        assert_eq!(cpu.draw(-1.0), 0.0);
    }

    #[test]
    fn test_activation_flag_is_exclusive() {
        let pcb = ProcessControlBlock::new(&ProcessDescriptor::new("0", 1.0, 10.0));
        assert!(pcb.try_activate());
        assert!(!pcb.try_activate());
        pcb.deactivate();
        assert!(pcb.try_activate());
    }

    #[test]
    fn test_waiting_time_accumulates_between_turns() {
        let pcb = ProcessControlBlock::new(&ProcessDescriptor::new("0", 100.0, 10.0));
        pcb.begin_turn(150.0);
        pcb.end_turn(300.0);
        pcb.begin_turn(320.0);
        let summary = pcb.summary();
        assert_eq!(summary.waiting, 70.0);
        assert_eq!(summary.turns, 2);
        assert_eq!(summary.finished_at, None);
    }
}
