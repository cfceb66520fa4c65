// Workflow notifications and the sinks that deliver them

use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::trace;

use super::context::{Context, ContextProperty};

/// Default channel capacity for broadcast sinks.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notification published by the workflow executor and by contexts.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// An ordinary step reported success
    StepSucceeded { context: Context, step: String },
    /// An ordinary step reported failure; `message` is fit for direct display
    StepFailed {
        context: Context,
        step: String,
        message: String,
    },
    /// The context was dropped from the executor
    ContextInvalidated { context: Context },
    /// `init` found an existing context that is still current
    CurrentContextUnchanged { context: Context },
    /// A tracked context field took a new value
    ContextPropertyChanged {
        context: Context,
        property: ContextProperty,
        old: Option<String>,
        new: Option<String>,
    },
}

impl WorkflowEvent {
    pub fn context(&self) -> &Context {
        match self {
            WorkflowEvent::StepSucceeded { context, .. }
            | WorkflowEvent::StepFailed { context, .. }
            | WorkflowEvent::ContextInvalidated { context }
            | WorkflowEvent::CurrentContextUnchanged { context }
            | WorkflowEvent::ContextPropertyChanged { context, .. } => context,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowEvent::StepSucceeded { .. } => "step_succeeded",
            WorkflowEvent::StepFailed { .. } => "step_failed",
            WorkflowEvent::ContextInvalidated { .. } => "context_invalidated",
            WorkflowEvent::CurrentContextUnchanged { .. } => "current_context_unchanged",
            WorkflowEvent::ContextPropertyChanged { .. } => "context_property_changed",
        }
    }
}

/// Single entry point through which all workflow notifications leave the engine.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: WorkflowEvent);
}

/// Fans events out over a tokio broadcast channel.
///
/// Publishing never blocks; with no subscribers the event is dropped.
#[derive(Debug)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(&self, event: WorkflowEvent) {
        trace!(kind = event.kind(), project = %event.context().project_name(), "Publishing workflow event");
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }
}

/// Keeps every published event in memory, in publication order.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Event kinds in publication order, skipping property changes.
    pub fn step_kinds(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| !matches!(event, WorkflowEvent::ContextPropertyChanged { .. }))
            .map(WorkflowEvent::kind)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl EventSink for RecordingEventSink {
    fn publish(&self, event: WorkflowEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
