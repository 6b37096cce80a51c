// src/trace_sink.rs - Trace sinks and the shared, ordered trace log
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use procsim_shared::{
    Actor, RunSummary, SimError, SimTime, TraceConfig, TraceEvent, TraceFormat, TraceKind, TraceSink,
};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

struct TraceLogInner {
    sink: Box<dyn TraceSink>,
    last_time: SimTime,
    events: u64,
}

/// Cloneable handle every actor writes trace events through.
///
/// Rejects an event stamped earlier than its predecessor: a clock running
/// backwards means the handoff between actors broke.
#[derive(Clone)]
pub struct TraceLog {
    inner: Arc<Mutex<TraceLogInner>>,
}

impl TraceLog {
    pub fn new(sink: Box<dyn TraceSink>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TraceLogInner {
                sink,
                last_time: SimTime::NEG_INFINITY,
                events: 0,
            })),
        }
    }

    pub async fn emit(&self, time: SimTime, actor: Actor, kind: TraceKind) -> Result<(), SimError> {
        let event = TraceEvent::new(time, actor, kind);
        let mut inner = self.inner.lock().await;
        if time < inner.last_time {
            return Err(SimError::fault(format!(
                "trace time went backwards ({} after {}): {}",
                time, inner.last_time, event
            )));
        }
        tracing::debug!("{}", event);
        inner.sink.record(&event).await?;
        inner.last_time = time;
        inner.events += 1;
        Ok(())
    }

    pub async fn finish(&self, summary: &RunSummary) -> Result<(), SimError> {
        let mut inner = self.inner.lock().await;
        tracing::info!("Trace closed after {} events", inner.events);
        inner.sink.finish(summary).await
    }

    pub async fn event_count(&self) -> u64 {
        self.inner.lock().await.events
    }
}

/// Opens the sink described by the trace configuration.
pub async fn open_sink(config: &TraceConfig) -> Result<Box<dyn TraceSink>, SimError> {
    Ok(match config.format {
        TraceFormat::Text => Box::new(TextTraceSink::create(&config.output).await?),
        TraceFormat::JsonLines => Box::new(JsonLinesSink::create(&config.output).await?),
    })
}

/// Writes one human-readable line per event, then the waiting-time summary.
pub struct TextTraceSink<W> {
    writer: BufWriter<W>,
}

impl TextTraceSink<tokio::fs::File> {
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let file = tokio::fs::File::create(path.as_ref()).await?;
        tracing::info!("Writing trace to {}", path.as_ref().display());
        Ok(Self::new(file))
    }
}

impl<W: AsyncWrite + Unpin + Send> TextTraceSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> TraceSink for TextTraceSink<W> {
    async fn record(&mut self, event: &TraceEvent) -> Result<(), SimError> {
        self.writer.write_all(format!("{}\n", event).as_bytes()).await?;
        Ok(())
    }

    async fn finish(&mut self, summary: &RunSummary) -> Result<(), SimError> {
        self.writer.write_all(summary.to_string().as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// One JSON object per event, followed by a `{"summary": ...}` object.
pub struct JsonLinesSink<W> {
    writer: BufWriter<W>,
}

impl JsonLinesSink<tokio::fs::File> {
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let file = tokio::fs::File::create(path.as_ref()).await?;
        tracing::info!("Writing JSON-lines trace to {}", path.as_ref().display());
        Ok(Self::new(file))
    }
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    async fn write_json<T: serde::Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SimError> {
        let mut line = serde_json::to_vec(value).map_err(std::io::Error::from)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        Ok(())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> TraceSink for JsonLinesSink<W> {
    async fn record(&mut self, event: &TraceEvent) -> Result<(), SimError> {
        self.write_json(event).await
    }

    async fn finish(&mut self, summary: &RunSummary) -> Result<(), SimError> {
        self.write_json(&serde_json::json!({ "summary": summary })).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Keeps events in memory. Clones share the same buffer, so a caller can hand
/// one clone to the simulation and inspect the other afterwards.
#[derive(Debug, Clone, Default)]
pub struct MemoryTraceSink {
    events: Arc<StdMutex<Vec<TraceEvent>>>,
    summary: Arc<StdMutex<Option<RunSummary>>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn summary(&self) -> Option<RunSummary> {
        self.summary.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl TraceSink for MemoryTraceSink {
    async fn record(&mut self, event: &TraceEvent) -> Result<(), SimError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }

    async fn finish(&mut self, summary: &RunSummary) -> Result<(), SimError> {
        *self.summary.lock().unwrap_or_else(PoisonError::into_inner) = Some(summary.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procsim_shared::ProcessSummary;

    #[tokio::test]
    async fn test_trace_log_rejects_time_going_backwards() {
        let sink = MemoryTraceSink::new();
        let log = TraceLog::new(Box::new(sink.clone()));
        log.emit(5.0, Actor::process("0"), TraceKind::Started).await.unwrap();
        log.emit(5.0, Actor::process("0"), TraceKind::Resumed).await.unwrap();
        let err = log.emit(4.0, Actor::process("0"), TraceKind::Paused).await.unwrap_err();
        assert!(matches!(err, SimError::Fault(_)));
        assert_eq!(sink.events().len(), 2);
        assert_eq!(log.event_count().await, 2);
    }

    #[tokio::test]
    async fn test_text_sink_output() {
        let mut sink = TextTraceSink::new(Vec::new());
        sink.record(&TraceEvent::new(1000.0, Actor::process("0"), TraceKind::Started))
            .await
            .unwrap();
        sink.record(&TraceEvent::new(
            1200.0,
            Actor::process("0"),
            TraceKind::Release { var: "a".into() },
        ))
        .await
        .unwrap();
        let summary = RunSummary {
            processes: vec![ProcessSummary {
                id: "0".into(),
                arrival: 1000.0,
                waiting: 0.0,
                finished_at: Some(1200.0),
                turns: 1,
            }],
        };
        sink.finish(&summary).await.unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.starts_with(
            "Time: 1000, Process 0, Started\nTime: 1200, Process 0, Release: Variable a\n"
        ));
        assert!(text.ends_with("Process 0: 0.00\n"));
    }

    #[tokio::test]
    async fn test_json_lines_sink_output() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.record(&TraceEvent::new(
            3.0,
            Actor::MemoryManager,
            TraceKind::Swap { incoming: "a".into(), outgoing: "b".into() },
        ))
        .await
        .unwrap();
        sink.finish(&RunSummary::default()).await.unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "swap");
        assert_eq!(lines[0]["actor"], "Memory Manager");
        assert_eq!(lines[0]["incoming"], "a");
        assert_eq!(lines[0]["time"], 3.0);
        assert!(lines[1]["summary"]["processes"].is_array());
    }
}
