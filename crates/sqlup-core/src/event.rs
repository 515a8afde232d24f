//! Per-script status events.
//!
//! The engine never writes to the console. It emits [`ScriptEvent`]s into an
//! injected [`EventSink`] and leaves presentation to the caller.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// Why a script was left out of the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Journaled with the same checksum, or a once-only script already run.
    AlreadyApplied,
    /// A once-only script whose content changed after it was applied.
    ChecksumDrift,
}

/// Status event emitted during an upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    Applied { script: String, duration_ms: u64 },
    Skipped { script: String, reason: SkipReason },
    Failed { script: String, error: String },
    Warning { message: String },
}

impl ScriptEvent {
    pub fn script(&self) -> Option<&str> {
        match self {
            ScriptEvent::Applied { script, .. }
            | ScriptEvent::Skipped { script, .. }
            | ScriptEvent::Failed { script, .. } => Some(script),
            ScriptEvent::Warning { .. } => None,
        }
    }
}

/// Receiver of upgrade events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ScriptEvent);
}

/// Discards every event.
impl EventSink for () {
    fn emit(&self, _event: ScriptEvent) {}
}

impl EventSink for UnboundedSender<ScriptEvent> {
    fn emit(&self, event: ScriptEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.send(event);
    }
}

impl<F> EventSink for F
where
    F: Fn(ScriptEvent) + Send + Sync,
{
    fn emit(&self, event: ScriptEvent) {
        self(event)
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: ScriptEvent) {
        match event {
            ScriptEvent::Applied {
                script,
                duration_ms,
            } => tracing::info!(%script, duration_ms, "Script applied"),
            ScriptEvent::Skipped {
                script,
                reason: SkipReason::ChecksumDrift,
            } => tracing::warn!(%script, "Script changed after it was applied; skipping"),
            ScriptEvent::Skipped { script, .. } => tracing::debug!(%script, "Script skipped"),
            ScriptEvent::Failed { script, error } => {
                tracing::error!(%script, %error, "Script failed")
            }
            ScriptEvent::Warning { message } => tracing::warn!("{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_closure_sink_receives_events() {
        let seen = Mutex::new(Vec::new());
        let sink = |event: ScriptEvent| seen.lock().unwrap().push(event);
        sink.emit(ScriptEvent::Warning {
            message: "hello".into(),
        });
        drop(sink);
        assert_eq!(seen.into_inner().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_channel_sink_ignores_closed_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        tx.emit(ScriptEvent::Applied {
            script: "001.sql".into(),
            duration_ms: 3,
        });
    }

    #[test]
    fn test_event_script_accessor() {
        let event = ScriptEvent::Skipped {
            script: "001.sql".into(),
            reason: SkipReason::AlreadyApplied,
        };
        assert_eq!(event.script(), Some("001.sql"));
        assert!(ScriptEvent::Warning {
            message: String::new()
        }
        .script()
        .is_none());
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = ScriptEvent::Skipped {
            script: "001.sql".into(),
            reason: SkipReason::ChecksumDrift,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "skipped");
        assert_eq!(json["script"], "001.sql");
        assert_eq!(json["reason"], "checksum_drift");
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_tracing_sink_logs_events() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            TracingSink.emit(ScriptEvent::Applied {
                script: "001.sql".into(),
                duration_ms: 12,
            });
            TracingSink.emit(ScriptEvent::Skipped {
                script: "002.sql".into(),
                reason: SkipReason::ChecksumDrift,
            });
            TracingSink.emit(ScriptEvent::Failed {
                script: "003.sql".into(),
                error: "syntax error".into(),
            });
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Script applied"));
        assert!(output.contains("001.sql"));
        assert!(output.contains("WARN"));
        assert!(output.contains("002.sql"));
        assert!(output.contains("syntax error"));
    }
}
