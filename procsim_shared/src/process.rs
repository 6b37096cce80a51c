use std::fmt;

use serde::{Deserialize, Serialize};

use crate::SimTime;
use crate::error::SimError;

/// One process as read from input: an id, when it arrives and how much
/// simulated CPU time it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDescriptor {
    pub id: String,
    pub arrival: SimTime,
    pub burst: SimTime,
}

impl ProcessDescriptor {
    pub fn new(id: impl Into<String>, arrival: SimTime, burst: SimTime) -> Self {
        Self {
            id: id.into(),
            arrival,
            burst,
        }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if !self.arrival.is_finite() || self.arrival < 0.0 {
            return Err(SimError::malformed(format!(
                "process {} has invalid arrival time {}",
                self.id, self.arrival
            )));
        }
        if !self.burst.is_finite() || self.burst < 0.0 {
            return Err(SimError::malformed(format!(
                "process {} has negative burst time {}",
                self.id, self.burst
            )));
        }
        Ok(())
    }
}

/// Lifecycle of a simulated process.
///
/// `Waiting -> Ready -> Running -> (BlockedOnMemory <-> Running) -> Ready | Finished`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    Waiting,
    Ready,
    Running,
    BlockedOnMemory,
    Finished,
}

impl ProcessState {
    pub fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (Waiting, Ready)
                | (Ready, Running)
                | (Running, BlockedOnMemory)
                | (BlockedOnMemory, Running)
                | (Running, Ready)
                | (Running, Finished)
        )
    }

    pub fn transition(self, next: ProcessState) -> Result<ProcessState, SimError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(SimError::InvalidTransition(format!("{} -> {}", self, next)))
        }
    }

    pub fn is_terminal(self) -> bool {
        self == ProcessState::Finished
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Waiting => "Waiting",
            ProcessState::Ready => "Ready",
            ProcessState::Running => "Running",
            ProcessState::BlockedOnMemory => "Blocked-on-Memory",
            ProcessState::Finished => "Finished",
        };
        f.write_str(name)
    }
}
