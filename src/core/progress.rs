// ─── Progress ───
// Events flowing from the core to whatever presents them. The core only
// ever sees an injected `EventSink`; there is no global bus.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::core::error::InstallPhase;

/// Human-readable step update, percent is local to `phase`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallProgress {
    pub phase: InstallPhase,
    pub message: String,
    pub percent: u8,
}

/// Payloads emitted by the download engine, keyed by task id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DownloadEvent {
    Started {
        id: Uuid,
        url: String,
        filename: String,
    },
    Progress {
        id: Uuid,
        filename: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
        /// 0 while the total size is unknown.
        percent: u8,
    },
    Complete {
        id: Uuid,
        filename: String,
        path: PathBuf,
    },
    Error {
        id: Uuid,
        filename: String,
        reason: String,
    },
    Cancelled {
        id: Uuid,
        filename: String,
    },
}

impl DownloadEvent {
    pub fn task_id(&self) -> Uuid {
        match self {
            DownloadEvent::Started { id, .. }
            | DownloadEvent::Progress { id, .. }
            | DownloadEvent::Complete { id, .. }
            | DownloadEvent::Error { id, .. }
            | DownloadEvent::Cancelled { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum InstallerEvent {
    Install(InstallProgress),
    Download(DownloadEvent),
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: InstallerEvent);
}

impl<F> EventSink for F
where
    F: Fn(InstallerEvent) + Send + Sync,
{
    fn emit(&self, event: InstallerEvent) {
        self(event)
    }
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: InstallerEvent) {}
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<InstallerEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, UnboundedReceiver<InstallerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: InstallerEvent) {
        // receiver gone means nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

/// Phase-scoped progress emitter. Percent never goes backwards.
pub struct ProgressReporter {
    sink: Arc<dyn EventSink>,
    phase: InstallPhase,
    last: AtomicU8,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn EventSink>, phase: InstallPhase) -> Self {
        Self {
            sink,
            phase,
            last: AtomicU8::new(0),
        }
    }

    pub fn phase(&self) -> InstallPhase {
        self.phase
    }

    /// Underlying sink, for forwarding download events.
    pub fn sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    pub fn report(&self, message: impl Into<String>, percent: u8) {
        let percent = percent.min(100);
        let previous = self.last.fetch_max(percent, Ordering::SeqCst);
        self.sink.emit(InstallerEvent::Install(InstallProgress {
            phase: self.phase,
            message: message.into(),
            percent: percent.max(previous),
        }));
    }

    pub fn last_percent(&self) -> u8 {
        self.last.load(Ordering::SeqCst)
    }
}

/// Percent of `done` over `total`, scaled into `0..=ceiling`.
pub fn scaled_percent(done: u64, total: Option<u64>, ceiling: u8) -> u8 {
    match total {
        Some(total) if total > 0 => {
            let ratio = (done.min(total) as f64) / (total as f64);
            (ratio * f64::from(ceiling)).round() as u8
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn reporter_never_goes_backwards() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: Arc<dyn EventSink> = Arc::new(move |event: InstallerEvent| {
            if let InstallerEvent::Install(progress) = event {
                sink_seen.lock().unwrap().push(progress.percent);
            }
        });

        let reporter = ProgressReporter::new(sink, InstallPhase::Finalize);
        reporter.report("a", 30);
        reporter.report("b", 10);
        reporter.report("c", 60);
        reporter.report("d", 250);

        assert_eq!(*seen.lock().unwrap(), vec![30, 30, 60, 100]);
        assert_eq!(reporter.last_percent(), 100);
    }

    #[test]
    fn scaled_percent_handles_unknown_total() {
        assert_eq!(scaled_percent(50, Some(100), 90), 45);
        assert_eq!(scaled_percent(500, Some(100), 100), 100);
        assert_eq!(scaled_percent(50, None, 90), 0);
        assert_eq!(scaled_percent(50, Some(0), 90), 0);
    }

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        let reporter = ProgressReporter::new(Arc::new(sink), InstallPhase::ProvisionJava);
        reporter.report("first", 1);
        reporter.report("second", 2);
        drop(reporter);

        let mut messages = Vec::new();
        while let Some(InstallerEvent::Install(p)) = rx.recv().await {
            messages.push(p.message);
        }
        assert_eq!(messages, vec!["first", "second"]);
    }
}
