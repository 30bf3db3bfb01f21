//! ShadowActor - owner of the shadow engine
//!
//! Serializes every engine operation behind a channel so lifecycle events,
//! window ticks and applied documents run one at a time, in arrival order,
//! without locks around the shadow state. The debounce window is realised as
//! a tokio interval armed while the engine reports an active window.
//!
//! ```text
//!   registry listener ──┐
//!   ShadowHandle ───────┼──▶ command_rx ──▶ ShadowEngine ──▶ subscribers
//!   window interval ────┘
//! ```

use super::actor_handle::ShadowHandle;
use super::clock::{Clock, MonotonicClock};
use super::commands::ShadowCommand;
use super::engine::ShadowEngine;
use super::error::ShadowError;
use super::policy::WindowHandle;
use super::types::ThingEvent;
use crate::config::ShadowConfig;
use crate::registry::ThingRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Interval armed for one debounce window
struct WindowTicker {
    handle: WindowHandle,
    interval: Interval,
}

/// Actor owning the shadow engine
pub struct ShadowActor {
    engine: ShadowEngine,
    /// Receiver for incoming commands
    command_rx: mpsc::UnboundedReceiver<ShadowCommand>,
    ticker: Option<WindowTicker>,
    /// Counter for tracking registry events processed
    event_count: u64,
}

impl ShadowActor {
    /// Spawn the shadow actor and return a handle for interacting with it
    ///
    /// Subscribes to the registry lifecycle events, then populates the full
    /// shadow with every thing already known to the registry. A disabled
    /// configuration spawns an inert actor that never subscribes.
    ///
    /// # Errors
    ///
    /// Returns the registry error if the listener cannot be registered; the
    /// shadow feature must then be treated as unavailable.
    pub fn spawn(config: &ShadowConfig, registry: Arc<dyn ThingRegistry>) -> Result<ShadowHandle, ShadowError> {
        Self::spawn_with_clock(config, registry, Arc::new(MonotonicClock::new()))
    }

    /// Same as [`spawn`](Self::spawn) with an explicit time source
    pub fn spawn_with_clock(
        config: &ShadowConfig,
        registry: Arc<dyn ThingRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Result<ShadowHandle, ShadowError> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let mut engine = ShadowEngine::new(config, registry.clone(), clock);

        if engine.is_enabled() {
            let events_tx = cmd_tx.clone();
            registry.subscribe(Arc::new(move |event: &ThingEvent| {
                let _ = events_tx.send(ShadowCommand::Thing(event.clone()));
            }))?;
            engine.register_all();
        } else {
            info!("Shadow disabled by configuration");
        }

        let actor = ShadowActor {
            engine,
            command_rx: cmd_rx,
            ticker: None,
            event_count: 0,
        };

        tokio::spawn(actor.run());

        info!(
            optimize = config.optimize,
            timeout_ms = config.optimize_timeout_ms,
            "ShadowActor spawned"
        );

        Ok(ShadowHandle::new(cmd_tx))
    }

    /// Main run loop for the actor
    ///
    /// Processes commands until the channel closes or a shutdown arrives,
    /// interleaved with window ticks while a debounce window is active.
    async fn run(mut self) {
        debug!("ShadowActor run loop started");

        loop {
            self.sync_ticker();

            tokio::select! {
                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    trace!(?cmd, "Processing command");
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
                _ = Self::next_tick(&mut self.ticker) => {
                    self.engine.on_window_tick();
                }
            }
        }

        self.engine.flush();
        info!(
            event_count = self.event_count,
            flush_count = self.engine.flush_count(),
            "ShadowActor run loop terminated"
        );
    }

    /// Handle one command, returning `false` to stop the actor
    fn handle_command(&mut self, cmd: ShadowCommand) -> bool {
        match cmd {
            ShadowCommand::Thing(event) => {
                self.event_count += 1;
                self.engine.handle_event(event);
            }
            ShadowCommand::Reconfigure(config) => {
                self.engine.reconfigure(&config);
                // Re-arm with the new period
                self.ticker = None;
            }
            ShadowCommand::Apply { document, response } => {
                let _ = response.send(self.engine.apply(&document));
            }
            ShadowCommand::ApplyJson { text, response } => {
                let _ = response.send(self.engine.apply_json(&text));
            }
            ShadowCommand::Disable { thing, response } => {
                let result = self.engine.disable(&thing);
                if let Err(e) = &result {
                    warn!(uid = %thing, "Failed to disable shadow: {}", e);
                }
                let _ = response.send(result);
            }
            ShadowCommand::Flush { response } => {
                let _ = response.send(self.engine.flush());
            }
            ShadowCommand::Snapshot { response } => {
                let _ = response.send(self.engine.snapshot());
            }
            ShadowCommand::Subscribe { listener, response } => {
                let id = self.engine.subscribe(listener);
                let _ = response.send(id);
                debug!(subscriber_id = id, "Added shadow subscriber");
            }
            ShadowCommand::Shutdown => {
                info!("ShadowActor received shutdown command");
                return false;
            }
        }
        true
    }

    /// Arm or drop the interval so it follows the engine's debounce window
    fn sync_ticker(&mut self) {
        let current = self.engine.window_handle();
        let armed = self.ticker.as_ref().map(|t| t.handle);
        if current == armed {
            return;
        }

        self.ticker = current.map(|handle| {
            let period = self.engine.policy().timeout();
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            trace!(?handle, period_ms = period.as_millis() as u64, "Window timer armed");
            WindowTicker { handle, interval }
        });
    }

    async fn next_tick(ticker: &mut Option<WindowTicker>) {
        match ticker {
            Some(ticker) => {
                ticker.interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
