//! ShadowHandle - Public API for the ShadowActor
//!
//! Provides an async interface over the actor's command channel. Hot path
//! methods are fire-and-forget; queries await a oneshot response.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use super::commands::{ShadowCommand, ShadowSubscriberFn};
use super::error::ShadowError;
use super::types::{ShadowSnapshot, ThingRef};
use crate::config::ShadowConfig;

/// Handle for interacting with the ShadowActor
///
/// Cheap to clone and shareable across tasks.
#[derive(Clone)]
pub struct ShadowHandle {
    /// Command channel to the ShadowActor
    cmd_tx: mpsc::UnboundedSender<ShadowCommand>,
}

impl ShadowHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<ShadowCommand>) -> Self {
        Self { cmd_tx }
    }

    // =========================================================================
    // Hot path methods (fire-and-forget, no await)
    // =========================================================================

    /// Apply new optimization settings
    pub fn reconfigure(&self, config: ShadowConfig) {
        let _ = self.cmd_tx.send(ShadowCommand::Reconfigure(config));
    }

    // =========================================================================
    // Query methods (async with response)
    // =========================================================================

    /// Push a state document into the shadowed things
    ///
    /// Returns the number of things whose state was set.
    pub async fn apply(&self, document: Value) -> Result<usize, ShadowError> {
        let (response, rx) = oneshot::channel();
        self.request(ShadowCommand::Apply { document, response }, rx)
            .await?
    }

    /// Decode a JSON state document and push it into the shadowed things
    pub async fn apply_json(&self, text: impl Into<String>) -> Result<usize, ShadowError> {
        let (response, rx) = oneshot::channel();
        let text = text.into();
        self.request(ShadowCommand::ApplyJson { text, response }, rx)
            .await?
    }

    /// Stop shadowing a thing
    pub async fn disable(&self, thing: ThingRef) -> Result<(), ShadowError> {
        let (response, rx) = oneshot::channel();
        self.request(ShadowCommand::Disable { thing, response }, rx)
            .await?
    }

    /// Flush the pending delta; `false` if nothing was pending
    pub async fn flush(&self) -> Result<bool, ShadowError> {
        let (response, rx) = oneshot::channel();
        self.request(ShadowCommand::Flush { response }, rx).await
    }

    /// Copy of the current engine state
    pub async fn snapshot(&self) -> Result<ShadowSnapshot, ShadowError> {
        let (response, rx) = oneshot::channel();
        self.request(ShadowCommand::Snapshot { response }, rx).await
    }

    /// Register a notification subscriber
    pub async fn subscribe(&self, listener: ShadowSubscriberFn) -> Result<usize, ShadowError> {
        let (response, rx) = oneshot::channel();
        self.request(ShadowCommand::Subscribe { listener, response }, rx)
            .await
    }

    // =========================================================================
    // Lifecycle methods
    // =========================================================================

    /// Signal the actor to flush and stop
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(ShadowCommand::Shutdown);
    }

    async fn request<T>(&self, cmd: ShadowCommand, rx: oneshot::Receiver<T>) -> Result<T, ShadowError> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| ShadowError::ActorUnavailable)?;
        rx.await.map_err(|_| ShadowError::ActorUnavailable)
    }
}
