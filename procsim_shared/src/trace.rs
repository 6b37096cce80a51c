use std::fmt;

use async_trait::async_trait;
use serde::{Serialize, Serializer};

use crate::error::SimError;
use crate::{NOT_FOUND, SimTime};

/// Who produced a trace event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Actor {
    Process(String),
    MemoryManager,
}

impl Actor {
    pub fn process(id: impl Into<String>) -> Self {
        Actor::Process(id.into())
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Process(id) => write!(f, "Process {}", id),
            Actor::MemoryManager => write!(f, "Memory Manager"),
        }
    }
}

impl Serialize for Actor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceKind {
    Started,
    Resumed,
    Paused,
    Finished,
    Store { var: String, value: String },
    /// `value` is `None` when the variable was in neither tier.
    Lookup { var: String, value: Option<String> },
    Release { var: String },
    Swap { incoming: String, outgoing: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    pub time: SimTime,
    pub actor: Actor,
    #[serde(flatten)]
    pub kind: TraceKind,
}

impl TraceEvent {
    pub fn new(time: SimTime, actor: Actor, kind: TraceKind) -> Self {
        Self { time, actor, kind }
    }
}

/// Human-readable trace line, time rounded to whole units.
impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time: {:.0}, {}, ", self.time, self.actor)?;
        match &self.kind {
            TraceKind::Started => write!(f, "Started"),
            TraceKind::Resumed => write!(f, "Resumed"),
            TraceKind::Paused => write!(f, "Paused"),
            TraceKind::Finished => write!(f, "Finished"),
            TraceKind::Store { var, value } => write!(f, "Store: Variable {}, Value: {}", var, value),
            TraceKind::Lookup { var, value: Some(value) } => {
                write!(f, "Lookup: Variable {}, Value: {}", var, value)
            }
            TraceKind::Lookup { value: None, .. } => write!(f, "Lookup: {}", NOT_FOUND),
            TraceKind::Release { var } => write!(f, "Release: Variable {}", var),
            TraceKind::Swap { incoming, outgoing } => {
                write!(f, "Swap: Variable {} with Variable {}", incoming, outgoing)
            }
        }
    }
}

/// Per-process statistics reported once the run ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSummary {
    pub id: String,
    pub arrival: SimTime,
    pub waiting: SimTime,
    pub finished_at: Option<SimTime>,
    pub turns: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub processes: Vec<ProcessSummary>,
}

impl RunSummary {
    pub fn waiting_time(&self, id: &str) -> Option<SimTime> {
        self.processes.iter().find(|p| p.id == id).map(|p| p.waiting)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "-------------------------------------")?;
        writeln!(f, "Waiting Times:")?;
        for process in &self.processes {
            writeln!(f, "Process {}: {:.2}", process.id, process.waiting)?;
        }
        Ok(())
    }
}

/// Destination for the ordered trace of a run.
#[async_trait]
pub trait TraceSink: Send {
    async fn record(&mut self, event: &TraceEvent) -> Result<(), SimError>;
    /// Writes the summary and flushes. Called exactly once, after the last event.
    async fn finish(&mut self, summary: &RunSummary) -> Result<(), SimError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_rendering() {
        let started = TraceEvent::new(1000.0, Actor::process("0"), TraceKind::Started);
        assert_eq!(started.to_string(), "Time: 1000, Process 0, Started");

        let store = TraceEvent::new(
            1523.0,
            Actor::process("1"),
            TraceKind::Store { var: "a".into(), value: "7".into() },
        );
        assert_eq!(store.to_string(), "Time: 1523, Process 1, Store: Variable a, Value: 7");

        let miss = TraceEvent::new(
            2000.0,
            Actor::process("1"),
            TraceKind::Lookup { var: "z".into(), value: None },
        );
        assert_eq!(miss.to_string(), "Time: 2000, Process 1, Lookup: -1");

        let swap = TraceEvent::new(
            2100.0,
            Actor::MemoryManager,
            TraceKind::Swap { incoming: "a".into(), outgoing: "b".into() },
        );
        assert_eq!(swap.to_string(), "Time: 2100, Memory Manager, Swap: Variable a with Variable b");
    }

    #[test]
    fn test_summary_rendering() {
        let summary = RunSummary {
            processes: vec![ProcessSummary {
                id: "0".into(),
                arrival: 1.0,
                waiting: 2.5,
                finished_at: Some(10.0),
                turns: 3,
            }],
        };
        let text = summary.to_string();
        assert!(text.starts_with("-------------------------------------\nWaiting Times:\n"));
        assert!(text.ends_with("Process 0: 2.50\n"));
        assert_eq!(summary.waiting_time("0"), Some(2.5));
        assert_eq!(summary.waiting_time("9"), None);
    }
}
