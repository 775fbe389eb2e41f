//! Event broadcasting for management registration.
//!
//! Provides [`ManagementEvent`] variants emitted by the management
//! coordinator and an [`EventBus`] backed by `tokio::sync::broadcast`.
//! Registration failures never reach the caller as errors; subscribing to
//! the bus is how a host notices degraded management visibility.

use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// ManagementEvent
// ---------------------------------------------------------------------------

/// Events emitted while publishing or retracting management endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagementEvent {
    /// An endpoint was registered.
    Published {
        /// The management name.
        name: String,
    },
    /// An endpoint was unregistered.
    Retracted {
        /// The management name.
        name: String,
    },
    /// The name was already taken; the old registration is being replaced.
    Replaced {
        /// The management name.
        name: String,
        /// Likely cause of the collision.
        reason: String,
    },
    /// Retract found nothing registered under the name.
    NotRegistered {
        /// The management name.
        name: String,
    },
    /// A registry call failed. The pool keeps running without this endpoint.
    Failed {
        /// The management name that was being (un)registered.
        name: String,
        /// Token of the pooled resource involved; `None` for the directory.
        identity_token: Option<String>,
        /// The failing operation, `"publish"` or `"retract"`.
        operation: &'static str,
        /// Human-readable error description.
        error: String,
    },
}

impl ManagementEvent {
    /// The management name the event concerns.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Published { name }
            | Self::Retracted { name }
            | Self::Replaced { name, .. }
            | Self::NotRegistered { name }
            | Self::Failed { name, .. } => name,
        }
    }

    /// Whether the event is logged as a warning.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Replaced { .. } | Self::Failed { .. })
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast-based event bus for management events.
///
/// Emission is fire-and-forget: if no subscribers are listening or the
/// channel is full, events are dropped (no backpressure on the emitter).
pub struct EventBus {
    sender: broadcast::Sender<ManagementEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: ManagementEvent) {
        // No active receivers is not an error.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ManagementEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}
