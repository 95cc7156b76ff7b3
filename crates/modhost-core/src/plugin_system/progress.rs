//! Load progress reporting.
//!
//! Sinks are called from the session worker. [`ChannelProgressSink`] hands
//! events to another task through an unbounded channel so a UI can consume
//! them as a stream on its own thread.
use std::fmt;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Coarse step of a load or unload session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressPhase {
    Finding,
    Resolving,
    Instantiating,
    Loading,
    SettingUpContent,
    AddingRecipes,
    Unloading,
}

impl fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProgressPhase::Finding => "Finding plugins",
            ProgressPhase::Resolving => "Resolving dependencies",
            ProgressPhase::Instantiating => "Instantiating plugins",
            ProgressPhase::Loading => "Loading",
            ProgressPhase::SettingUpContent => "Setting up content",
            ProgressPhase::AddingRecipes => "Adding recipes",
            ProgressPhase::Unloading => "Unloading",
        };
        f.write_str(name)
    }
}

/// One progress report. `current` counts completed steps out of `total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    pub current: usize,
    pub total: usize,
    pub label: String,
}

impl ProgressEvent {
    pub fn new(phase: ProgressPhase, current: usize, total: usize, label: impl Into<String>) -> Self {
        Self {
            phase,
            current,
            total,
            label: label.into(),
        }
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.label.is_empty() {
            write!(f, "{} ({}/{})", self.phase, self.current, self.total)
        } else {
            write!(f, "{}: {} ({}/{})", self.phase, self.label, self.current, self.total)
        }
    }
}

/// Receives progress events from the loader
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Writes every event to the log at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn report(&self, event: ProgressEvent) {
        log::info!("{}", event);
    }
}

/// Discards events
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn report(&self, _event: ProgressEvent) {}
}

/// Stream of events produced by a [`ChannelProgressSink`]
pub type ProgressStream = UnboundedReceiverStream<ProgressEvent>;

/// Forwards events over a channel
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn channel() -> (Self, ProgressStream) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, UnboundedReceiverStream::new(receiver))
    }
}

impl ProgressSink for ChannelProgressSink {
    fn report(&self, event: ProgressEvent) {
        // Receiver gone means nobody is watching
        let _ = self.sender.send(event);
    }
}
