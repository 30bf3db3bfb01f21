//! Command enum for the shadow actor
//!
//! Commands are divided into two categories:
//! - **Hot path** (no response): registry events and reconfiguration
//! - **Request-response**: operations that return data via oneshot channel

use super::error::ShadowError;
use super::types::{ShadowEventKind, ShadowSnapshot, ShadowState, ThingEvent, ThingRef};
use crate::config::ShadowConfig;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Shadow notification subscriber
///
/// Receives the notification kind and the shadow state by reference; the
/// state must not be retained past the call.
pub type ShadowSubscriberFn = Arc<dyn Fn(ShadowEventKind, &ShadowState) + Send + Sync>;

/// Commands for the shadow actor
pub enum ShadowCommand {
    // -------------------------------------------------------------------------
    // Hot path commands (no response - fire and forget)
    // -------------------------------------------------------------------------
    /// Lifecycle event forwarded from the registry
    Thing(ThingEvent),

    /// New optimization settings from a config reload
    Reconfigure(ShadowConfig),

    // -------------------------------------------------------------------------
    // Request-response commands (require oneshot channel)
    // -------------------------------------------------------------------------
    /// Push a state document into the shadowed things
    Apply {
        document: Value,
        response: oneshot::Sender<Result<usize, ShadowError>>,
    },

    /// Decode and push a JSON state document
    ApplyJson {
        text: String,
        response: oneshot::Sender<Result<usize, ShadowError>>,
    },

    /// Stop shadowing a thing
    Disable {
        thing: ThingRef,
        response: oneshot::Sender<Result<(), ShadowError>>,
    },

    /// Flush the pending delta right away
    Flush { response: oneshot::Sender<bool> },

    /// Copy of the current engine state
    Snapshot {
        response: oneshot::Sender<ShadowSnapshot>,
    },

    /// Register a notification subscriber
    Subscribe {
        listener: ShadowSubscriberFn,
        response: oneshot::Sender<usize>,
    },

    // -------------------------------------------------------------------------
    // Lifecycle commands
    // -------------------------------------------------------------------------
    /// Flush pending changes and stop the actor
    Shutdown,
}

impl std::fmt::Debug for ShadowCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShadowCommand::Thing(event) => f.debug_tuple("Thing").field(event).finish(),
            ShadowCommand::Reconfigure(config) => {
                f.debug_tuple("Reconfigure").field(config).finish()
            }
            ShadowCommand::Apply { document, .. } => f
                .debug_struct("Apply")
                .field("document", document)
                .finish_non_exhaustive(),
            ShadowCommand::ApplyJson { text, .. } => f
                .debug_struct("ApplyJson")
                .field("text", text)
                .finish_non_exhaustive(),
            ShadowCommand::Disable { thing, .. } => f
                .debug_struct("Disable")
                .field("thing", thing)
                .finish_non_exhaustive(),
            ShadowCommand::Flush { .. } => f.debug_struct("Flush").finish_non_exhaustive(),
            ShadowCommand::Snapshot { .. } => f.debug_struct("Snapshot").finish_non_exhaustive(),
            ShadowCommand::Subscribe { .. } => f.debug_struct("Subscribe").finish_non_exhaustive(),
            ShadowCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}
