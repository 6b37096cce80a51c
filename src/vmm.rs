// src/vmm.rs - Virtual memory manager: one command at a time against the two-tier store
use std::sync::Arc;

use procsim_shared::{
    Actor, Command, MemoryConfig, NOT_FOUND, OverflowPolicy, ProcessState, SimError, SimTime,
    TraceKind,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::clock::SimClock;
use crate::memory::{MemoryRecord, MemoryStore};
use crate::process::{CpuModel, ProcessControlBlock};
use crate::trace_sink::TraceLog;

/// What executing one command produced.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryOutcome {
    pub command: Command,
    /// Value read by a `Lookup`; `None` when the variable exists nowhere.
    pub value: Option<String>,
    /// False for a `Release` of an unknown variable and a `Lookup` miss.
    pub found: bool,
    /// Variable pushed out to disk to make room, if any.
    pub evicted: Option<String>,
    pub latency: SimTime,
}

impl MemoryOutcome {
    /// Lookup result with the not-found sentinel filled in.
    pub fn value_or_sentinel(&self) -> &str {
        self.value.as_deref().unwrap_or(NOT_FOUND)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmmState {
    Idle,
    Executing,
}

pub enum VmmRequest {
    Execute {
        pcb: Arc<ProcessControlBlock>,
        command: Command,
        respond_to: oneshot::Sender<Result<MemoryOutcome, SimError>>,
    },
    Shutdown,
}

/// Cloneable submission side of the memory manager task.
#[derive(Clone)]
pub struct VmmHandle {
    tx: mpsc::Sender<VmmRequest>,
}

impl VmmHandle {
    /// Submits a command and waits for it to complete. Waits first if another
    /// command already occupies the pipeline.
    pub async fn submit(&self, pcb: Arc<ProcessControlBlock>, command: Command) -> Result<MemoryOutcome, SimError> {
        let (respond_to, response) = oneshot::channel();
        self.tx
            .send(VmmRequest::Execute { pcb, command, respond_to })
            .await
            .map_err(|_| SimError::fault("memory manager is not running"))?;
        response
            .await
            .map_err(|_| SimError::fault("memory manager dropped a command"))?
    }

    /// Asks the task to stop after any command already queued.
    pub async fn shutdown(&self) -> Result<(), SimError> {
        self.tx
            .send(VmmRequest::Shutdown)
            .await
            .map_err(|_| SimError::fault("memory manager already stopped"))
    }
}

/// Final state handed back when the memory manager stops.
#[derive(Debug)]
pub struct VmmReport {
    pub store: MemoryStore,
    pub executed: u64,
}

pub struct VirtualMemoryManager {
    store: MemoryStore,
    clock: SimClock,
    cpu: CpuModel,
    trace: TraceLog,
    overflow: OverflowPolicy,
    swap_overhead: SimTime,
    state: VmmState,
    executed: u64,
}

impl VirtualMemoryManager {
    pub fn new(store: MemoryStore, clock: SimClock, cpu: CpuModel, trace: TraceLog, config: &MemoryConfig) -> Self {
        Self {
            store,
            clock,
            cpu,
            trace,
            overflow: config.overflow,
            swap_overhead: config.swap_overhead,
            state: VmmState::Idle,
            executed: 0,
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn state(&self) -> VmmState {
        self.state
    }

    /// Starts the command loop on its own task.
    pub fn spawn(self) -> (VmmHandle, JoinHandle<Result<VmmReport, SimError>>) {
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(self.run(rx));
        (VmmHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<VmmRequest>) -> Result<VmmReport, SimError> {
        tracing::info!("Memory manager started, capacity {}", self.store.main.capacity());
        while let Some(request) = rx.recv().await {
            match request {
                VmmRequest::Execute { pcb, command, respond_to } => {
                    let result = self.execute(&pcb, &command).await;
                    let failed = result.is_err();
                    if respond_to.send(result).is_err() {
                        return Err(SimError::fault(format!(
                            "process {} stopped waiting for {}",
                            pcb.id(),
                            command
                        )));
                    }
                    if failed {
                        tracing::error!("Memory manager stopping after failed command {}", command);
                        break;
                    }
                }
                VmmRequest::Shutdown => {
                    tracing::info!("Memory manager shutting down after {} commands", self.executed);
                    break;
                }
            }
        }
        Ok(VmmReport {
            store: self.store,
            executed: self.executed,
        })
    }

    /// Executes one command on behalf of `pcb`, charging its latency to the
    /// process's burst and to the clock.
    pub async fn execute(&mut self, pcb: &ProcessControlBlock, command: &Command) -> Result<MemoryOutcome, SimError> {
        if self.state != VmmState::Idle {
            return Err(SimError::fault("memory manager asked to run two commands at once"));
        }
        if pcb.state() != ProcessState::BlockedOnMemory {
            tracing::warn!("Process {} submitted {} while {}", pcb.id(), command, pcb.state());
        }
        self.state = VmmState::Executing;
        let start = self.clock.now();
        let result = match command {
            Command::Store { var, value } => self.store_var(pcb, var, value).await,
            Command::Lookup { var } => self.lookup_var(pcb, var).await,
            Command::Release { var } => self.release_var(pcb, var).await,
        };
        self.state = VmmState::Idle;
        let (value, found, evicted) = result?;
        self.executed += 1;
        if let Err(violation) = self.store.check_invariants() {
            return Err(SimError::fault(violation));
        }
        Ok(MemoryOutcome {
            command: command.clone(),
            value,
            found,
            evicted,
            latency: self.clock.now() - start,
        })
    }

    /// Draws the access latency, deducts it from the requester and advances time.
    fn charge(&self, pcb: &ProcessControlBlock) -> SimTime {
        let latency = self.cpu.draw(pcb.remaining());
        pcb.consume(latency);
        self.clock.advance(latency)
    }

    /// Evicts the least recently used record to disk, stamped with the current
    /// time minus the swap overhead. Returns the evicted id.
    async fn evict_for(&mut self, incoming: &str, now: SimTime) -> Result<Option<String>, SimError> {
        let Some(mut victim) = self.store.main.evict_lru() else {
            return Ok(None);
        };
        victim.last_access = (now - self.swap_overhead).max(0.0);
        let outgoing = victim.id.clone();
        self.store.disk.append(victim).await?;
        tracing::debug!("Swapped {} out for {}", outgoing, incoming);
        self.trace
            .emit(
                now,
                Actor::MemoryManager,
                TraceKind::Swap {
                    incoming: incoming.to_string(),
                    outgoing: outgoing.clone(),
                },
            )
            .await?;
        Ok(Some(outgoing))
    }

    fn insert_main(&mut self, record: MemoryRecord) -> Result<(), SimError> {
        self.store
            .main
            .insert(record)
            .map_err(|r| SimError::fault(format!("no free memory slot for {}", r.id)))
    }

    async fn store_var(
        &mut self,
        pcb: &ProcessControlBlock,
        var: &str,
        value: &str,
    ) -> Result<(Option<String>, bool, Option<String>), SimError> {
        let mut evicted = None;
        if self.store.main.get(var).is_some() {
            let now = self.charge(pcb);
            if let Some(record) = self.store.main.get_mut(var) {
                record.value = value.to_string();
                record.last_access = now;
            }
        } else if self.store.disk.get(var).is_some() {
            let now = self.charge(pcb);
            self.store.disk.update(var, value, now).await?;
        } else if !self.store.main.is_full() {
            let now = self.charge(pcb);
            self.insert_main(MemoryRecord::new(var, value, now))?;
        } else {
            let now = self.charge(pcb);
            match self.overflow {
                OverflowPolicy::SpillToDisk => {
                    self.store.disk.append(MemoryRecord::new(var, value, now)).await?;
                }
                OverflowPolicy::EvictLru => {
                    evicted = self.evict_for(var, now).await?;
                    self.insert_main(MemoryRecord::new(var, value, now))?;
                }
            }
        }
        self.trace
            .emit(
                self.clock.now(),
                Actor::process(pcb.id()),
                TraceKind::Store {
                    var: var.to_string(),
                    value: value.to_string(),
                },
            )
            .await?;
        Ok((None, true, evicted))
    }

    async fn lookup_var(
        &mut self,
        pcb: &ProcessControlBlock,
        var: &str,
    ) -> Result<(Option<String>, bool, Option<String>), SimError> {
        let mut evicted = None;
        let value = if self.store.main.get(var).is_some() {
            let now = self.charge(pcb);
            self.store.main.get_mut(var).map(|record| {
                record.last_access = now;
                record.value.clone()
            })
        } else if self.store.disk.get(var).is_none() {
            self.charge(pcb);
            None
        } else {
            let now = self.charge(pcb);
            match self.store.disk.remove(var).await? {
                Some(record) => {
                    if self.store.main.is_full() {
                        evicted = self.evict_for(var, now).await?;
                    }
                    self.insert_main(MemoryRecord::new(var, record.value.clone(), now))?;
                    Some(record.value)
                }
                None => None,
            }
        };
        self.trace
            .emit(
                self.clock.now(),
                Actor::process(pcb.id()),
                TraceKind::Lookup {
                    var: var.to_string(),
                    value: value.clone(),
                },
            )
            .await?;
        let found = value.is_some();
        Ok((value, found, evicted))
    }

    async fn release_var(
        &mut self,
        pcb: &ProcessControlBlock,
        var: &str,
    ) -> Result<(Option<String>, bool, Option<String>), SimError> {
        let found = if self.store.main.remove(var).is_some() {
            true
        } else {
            self.store.disk.remove(var).await?.is_some()
        };
        if !found {
            tracing::warn!("Process {} released unknown variable {}", pcb.id(), var);
            return Ok((None, false, None));
        }
        let now = self.charge(pcb);
        self.trace
            .emit(
                now,
                Actor::process(pcb.id()),
                TraceKind::Release { var: var.to_string() },
            )
            .await?;
        Ok((None, true, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{DiskStore, Tier};
    use crate::process::BurstModel;
    use crate::trace_sink::MemoryTraceSink;
    use procsim_shared::{ProcessDescriptor, TraceEvent};

    fn manager(capacity: usize, overflow: OverflowPolicy) -> (VirtualMemoryManager, MemoryTraceSink) {
        let sink = MemoryTraceSink::new();
        let config = MemoryConfig {
            overflow,
            ..MemoryConfig::default()
        };
        let vmm = VirtualMemoryManager::new(
            MemoryStore::new(capacity, DiskStore::in_memory()),
            SimClock::new(),
            CpuModel::new(BurstModel::Random { min: 101, max: 1000 }, Some(1)),
            TraceLog::new(Box::new(sink.clone())),
            &config,
        );
        (vmm, sink)
    }

    fn requester() -> ProcessControlBlock {
        ProcessControlBlock::new(&ProcessDescriptor::new("0", 0.0, 1_000_000.0))
    }

    #[tokio::test]
    async fn test_store_evicts_lru_then_lookup_swaps_back() {
        let (mut vmm, sink) = manager(1, OverflowPolicy::EvictLru);
        let pcb = requester();
        vmm.execute(&pcb, &Command::store("a", "1")).await.unwrap();
        let out = vmm.execute(&pcb, &Command::store("b", "2")).await.unwrap();
        assert_eq!(out.evicted.as_deref(), Some("a"));
        assert_eq!(vmm.store().locate("a"), Some(Tier::Disk));
        assert_eq!(vmm.store().locate("b"), Some(Tier::Main));

        let out = vmm.execute(&pcb, &Command::lookup("a")).await.unwrap();
        assert_eq!(out.value_or_sentinel(), "1");
        assert_eq!(out.evicted.as_deref(), Some("b"));
        assert_eq!(vmm.store().locate("a"), Some(Tier::Main));
        assert_eq!(vmm.store().locate("b"), Some(Tier::Disk));
        assert_eq!(vmm.store().main.len(), 1);

        let swaps = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e.kind, TraceKind::Swap { .. }))
            .count();
        assert_eq!(swaps, 2);
    }

    #[tokio::test]
    async fn test_spill_to_disk_keeps_memory_untouched() {
        let (mut vmm, _sink) = manager(1, OverflowPolicy::SpillToDisk);
        let pcb = requester();
        vmm.execute(&pcb, &Command::store("a", "1")).await.unwrap();
        let out = vmm.execute(&pcb, &Command::store("b", "2")).await.unwrap();
        assert!(out.evicted.is_none());
        assert_eq!(vmm.store().locate("a"), Some(Tier::Main));
        assert_eq!(vmm.store().locate("b"), Some(Tier::Disk));

        // Updating a disk-resident variable happens in place
        vmm.execute(&pcb, &Command::store("b", "3")).await.unwrap();
        assert_eq!(vmm.store().disk.get("b").unwrap().value, "3");
        assert_eq!(vmm.store().disk.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_of_unknown_variable_returns_sentinel() {
        let (mut vmm, sink) = manager(2, OverflowPolicy::EvictLru);
        let pcb = requester();
        vmm.execute(&pcb, &Command::store("a", "1")).await.unwrap();
        let out = vmm.execute(&pcb, &Command::lookup("zzz")).await.unwrap();
        assert_eq!(out.value, None);
        assert!(!out.found);
        assert_eq!(out.value_or_sentinel(), "-1");
        assert_eq!(vmm.store().main.len(), 1);
        assert!(vmm.store().disk.is_empty());
        let last: TraceEvent = sink.events().pop().unwrap();
        assert_eq!(last.to_string(), format!("Time: {:.0}, Process 0, Lookup: -1", last.time));
    }

    #[tokio::test]
    async fn test_lookup_miss_leaves_both_tiers_untouched() {
        let (mut vmm, _sink) = manager(1, OverflowPolicy::EvictLru);
        let pcb = requester();
        vmm.execute(&pcb, &Command::store("a", "1")).await.unwrap();
        vmm.execute(&pcb, &Command::store("b", "2")).await.unwrap();
        vmm.store.disk.append(MemoryRecord::new("c", "3", 0.0)).await.unwrap();
        let main = vmm.store().main.records().to_vec();
        let disk = vmm.store().disk.records().to_vec();
        assert_eq!(disk.len(), 2);

        let out = vmm.execute(&pcb, &Command::lookup("zzz")).await.unwrap();
        assert_eq!(out.value, None);
        assert!(out.evicted.is_none());
        assert_eq!(vmm.store().main.records(), main.as_slice());
        assert_eq!(vmm.store().disk.records(), disk.as_slice());
    }

    #[tokio::test]
    async fn test_lookup_from_disk_with_free_slot_moves_record() {
        let (mut vmm, _sink) = manager(2, OverflowPolicy::EvictLru);
        let pcb = requester();
        vmm.store.disk.append(MemoryRecord::new("d", "9", 0.0)).await.unwrap();
        let out = vmm.execute(&pcb, &Command::lookup("d")).await.unwrap();
        assert_eq!(out.value.as_deref(), Some("9"));
        assert!(out.evicted.is_none());
        assert_eq!(vmm.store().locate("d"), Some(Tier::Main));
        assert!(vmm.store().disk.is_empty());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (mut vmm, sink) = manager(1, OverflowPolicy::EvictLru);
        let pcb = requester();
        vmm.execute(&pcb, &Command::store("a", "1")).await.unwrap();
        vmm.execute(&pcb, &Command::store("b", "2")).await.unwrap();

        assert!(vmm.execute(&pcb, &Command::release("a")).await.unwrap().found);
        assert!(vmm.execute(&pcb, &Command::release("b")).await.unwrap().found);
        let before = vmm.clock.now();
        let events = sink.events().len();
        let out = vmm.execute(&pcb, &Command::release("a")).await.unwrap();
        assert!(!out.found);
        assert_eq!(out.latency, 0.0);
        assert_eq!(vmm.clock.now(), before);
        assert_eq!(sink.events().len(), events);
        assert!(vmm.store().main.is_empty());
        assert!(vmm.store().disk.is_empty());
    }

    #[tokio::test]
    async fn test_latency_is_charged_to_requester() {
        let (mut vmm, _sink) = manager(1, OverflowPolicy::EvictLru);
        let pcb = ProcessControlBlock::new(&ProcessDescriptor::new("0", 0.0, 50.0));
        let out = vmm.execute(&pcb, &Command::store("a", "1")).await.unwrap();
        assert_eq!(out.latency, 50.0);
        assert_eq!(pcb.remaining(), 0.0);
        assert_eq!(vmm.clock.now(), 50.0);
        assert_eq!(vmm.state(), VmmState::Idle);
    }

    #[tokio::test]
    async fn test_swap_stamps_victim_with_overhead() {
        let (mut vmm, _sink) = manager(1, OverflowPolicy::EvictLru);
        let pcb = requester();
        vmm.execute(&pcb, &Command::store("a", "1")).await.unwrap();
        vmm.execute(&pcb, &Command::store("b", "2")).await.unwrap();
        let now = vmm.clock.now();
        assert_eq!(vmm.store().disk.get("a").unwrap().last_access, now - 10.0);
        assert_eq!(vmm.store().main.get("b").unwrap().last_access, now);
    }
}
