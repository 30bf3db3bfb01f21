//! ShadowEngine - full/delta shadow aggregation and change coalescing
//!
//! The engine keeps a complete snapshot of every shadowed thing (the full
//! shadow) and the subset of things changed since the last notification (the
//! delta shadow). Lifecycle events maintain the full shadow; state events feed
//! the delta and the aggregate flags, and the [`CoalescingPolicy`] decides
//! when the delta is flushed into `ShadowChanged` / `ShadowPublishing`
//! notifications.
//!
//! The engine is single-threaded and synchronous: it is owned by one
//! [`ShadowActor`](super::actor::ShadowActor) and a flush triggered by a hook
//! completes, subscriber callbacks included, before the hook returns.

use super::apply::ApplyGateway;
use super::clock::Clock;
use super::commands::ShadowSubscriberFn;
use super::error::ShadowError;
use super::policy::{CoalescingPolicy, DebounceWindow, Dispatch, TickAction, WindowHandle};
use super::types::{
    ShadowEventKind, ShadowSnapshot, ShadowState, StateEventKind, StateFlags, ThingEvent, ThingRef,
};
use crate::config::ShadowConfig;
use crate::registry::ThingRegistry;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Shadow aggregation engine
///
/// # State machine
///
/// ```text
///   Idle ──(qualifying state event)──▶ Accumulating ──(flush)──▶ Idle
/// ```
pub struct ShadowEngine {
    /// Whether the shadow feature is enabled; a disabled engine is inert
    enabled: bool,
    /// Full shadow, delta shadow and aggregate flags
    state: ShadowState,
    policy: CoalescingPolicy,
    window: DebounceWindow,
    /// Timestamp of the last contributing event, `None` once flushed
    last_event_us: Option<u64>,
    /// Timestamp at which the running window was opened
    window_started_us: u64,
    clock: Arc<dyn Clock>,
    registry: Arc<dyn ThingRegistry>,
    subscribers: Vec<ShadowSubscriberFn>,
    /// Counter for tracking flushes performed
    flush_count: u64,
}

impl ShadowEngine {
    pub fn new(config: &ShadowConfig, registry: Arc<dyn ThingRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            enabled: config.enable,
            state: ShadowState::default(),
            policy: CoalescingPolicy::new(config.optimize, config.optimize_timeout_ms),
            window: DebounceWindow::new(),
            last_event_us: None,
            window_started_us: 0,
            clock,
            registry,
            subscribers: Vec::new(),
            flush_count: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> &ShadowState {
        &self.state
    }

    pub fn policy(&self) -> &CoalescingPolicy {
        &self.policy
    }

    pub fn window_handle(&self) -> Option<WindowHandle> {
        self.window.handle()
    }

    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }

    /// Whether a delta is waiting to be flushed
    pub fn is_pending(&self) -> bool {
        self.last_event_us.is_some()
    }

    /// Register a notification subscriber, returning its id
    pub fn subscribe(&mut self, listener: ShadowSubscriberFn) -> usize {
        self.subscribers.push(listener);
        self.subscribers.len() - 1
    }

    /// Add every thing already known to the registry to the full shadow
    ///
    /// Returns the number of things registered.
    pub fn register_all(&mut self) -> usize {
        if !self.enabled {
            return 0;
        }
        let mut registered = 0;
        for thing in self.registry.things() {
            let Some(state) = self.registry.raw_state(&thing) else {
                continue;
            };
            if self.register_state(&thing, state) {
                registered += 1;
            }
        }
        info!(registered, "Full shadow populated from registry");
        registered
    }

    /// Apply new optimization settings
    ///
    /// The `enable` switch is only read at construction.
    pub fn reconfigure(&mut self, config: &ShadowConfig) {
        if config.enable != self.enabled {
            warn!(
                enable = config.enable,
                "Changing shadow.enable requires a restart, ignoring"
            );
        }
        self.policy = CoalescingPolicy::new(config.optimize, config.optimize_timeout_ms);
        info!(
            optimize = self.policy.optimize(),
            timeout_ms = self.policy.timeout().as_millis() as u64,
            "Shadow policy reconfigured"
        );
    }

    /// Dispatch a registry lifecycle event to the matching hook
    pub fn handle_event(&mut self, event: ThingEvent) {
        match event {
            ThingEvent::Created { thing, state } => self.on_thing_created(&thing, state),
            ThingEvent::Removed { thing } => self.on_thing_removed(&thing),
            ThingEvent::MadePrivate { thing } => self.on_thing_made_private(&thing),
            ThingEvent::StateChanging { thing } => self.on_state_changing(&thing),
            ThingEvent::StateChanged { thing, state, flags } => {
                self.on_state_event(&thing, StateEventKind::Changed, state, flags)
            }
            ThingEvent::StatePublishing { thing, state, flags } => {
                self.on_state_event(&thing, StateEventKind::Publishing, state, flags)
            }
        }
    }

    pub fn on_thing_created(&mut self, thing: &ThingRef, state: Value) {
        if !self.enabled {
            return;
        }
        self.register_state(thing, state);
    }

    pub fn on_thing_removed(&mut self, thing: &ThingRef) {
        if !self.enabled {
            return;
        }
        self.unregister_state(thing);
    }

    pub fn on_thing_made_private(&mut self, thing: &ThingRef) {
        if !self.enabled {
            return;
        }
        self.unregister_state(thing);
    }

    /// Pre-update hook
    ///
    /// A thing already queued in the delta must not be overwritten by its next
    /// value, so the pending delta is flushed first.
    pub fn on_state_changing(&mut self, thing: &ThingRef) {
        if !self.enabled {
            return;
        }
        if self.state.delta_shadow.has(thing.domain(), &thing.id) {
            debug!(uid = %thing, "Thing already queued in the delta shadow, flushing first");
            self.flush();
        }
    }

    /// Intake of a state event
    pub fn on_state_event(&mut self, thing: &ThingRef, kind: StateEventKind, state: Value, flags: StateFlags) {
        if !self.enabled || thing.private {
            return;
        }
        if !self.state.full_shadow.has(thing.domain(), &thing.id) {
            trace!(uid = %thing, "Ignoring state event of a thing without shadow");
            return;
        }

        if kind == StateEventKind::Changed && self.state.delta_shadow.has(thing.domain(), &thing.id) {
            debug!(uid = %thing, "Change collides with a pending one, flushing first");
            self.flush();
        }

        let now = self.clock.now_micros();
        self.last_event_us = Some(now);

        if kind == StateEventKind::Changed {
            self.state.flags |= StateFlags::CHANGED;
        }
        self.state.flags |= StateFlags::PUBLISHING;

        let forced = flags.contains(StateFlags::FORCED);
        if forced {
            self.state.flags |= StateFlags::FORCED;
        }

        if kind == StateEventKind::Changed {
            if let Err(e) = self
                .state
                .full_shadow
                .put(thing.domain(), &thing.id, state.clone())
            {
                error!(uid = %thing, "Failed to refresh the full shadow: {}", e);
            }
            if let Err(e) = self.state.delta_shadow.put(thing.domain(), &thing.id, state) {
                error!(uid = %thing, "Failed to add state to the delta shadow: {}", e);
            }
        }

        trace!(uid = %thing, ?kind, forced, "State event queued");

        match self.policy.on_event(forced, self.window.is_active()) {
            Dispatch::FlushNow => {
                self.flush();
            }
            Dispatch::StartWindow => {
                let handle = self.window.activate();
                self.window_started_us = now;
                trace!(?handle, "Debounce window started");
            }
            Dispatch::Defer => {}
        }
    }

    /// Periodic debounce window callback
    pub fn on_window_tick(&mut self) {
        if !self.window.is_active() {
            return;
        }
        let now = self.clock.now_micros();
        match self
            .policy
            .on_tick(self.state.flags, self.window_started_us, self.last_event_us, now)
        {
            TickAction::Wait => {}
            TickAction::Flush => {
                self.flush();
                self.window.cancel();
            }
            TickAction::Stop => {
                trace!("Nothing pending, stopping debounce window");
                self.window.cancel();
            }
        }
    }

    /// Emit notifications for the pending delta and reset it
    ///
    /// # Returns
    ///
    /// `false` if nothing was pending
    pub fn flush(&mut self) -> bool {
        if self.last_event_us.is_none() {
            return false;
        }

        if self.state.flags.contains(StateFlags::CHANGED) {
            self.notify(ShadowEventKind::ShadowChanged);
        }
        if self.state.flags.contains(StateFlags::PUBLISHING) {
            self.notify(ShadowEventKind::ShadowPublishing);
        }

        self.state.delta_shadow.clear();
        self.state.flags = StateFlags::empty();
        self.last_event_us = None;
        self.window.cancel();
        self.flush_count += 1;

        trace!(flush_count = self.flush_count, "Shadow flushed");
        true
    }

    /// Stop shadowing a thing
    ///
    /// Disabling a thing that is not shadowed succeeds. A store inconsistency
    /// is reported and leaves the full shadow untouched.
    pub fn disable(&mut self, thing: &ThingRef) -> Result<(), ShadowError> {
        if !self.enabled {
            return Err(ShadowError::Disabled);
        }
        self.state.full_shadow.remove(thing.domain(), &thing.id)?;
        self.state.delta_shadow.remove(thing.domain(), &thing.id)?;
        debug!(uid = %thing, "Shadow disabled for thing");
        Ok(())
    }

    /// Push a state document into the shadowed things
    pub fn apply(&self, document: &Value) -> Result<usize, ShadowError> {
        if !self.enabled {
            return Err(ShadowError::Disabled);
        }
        ApplyGateway::new(&self.state.full_shadow, self.registry.as_ref()).apply(document)
    }

    /// Decode a JSON state document and push it into the shadowed things
    pub fn apply_json(&self, text: &str) -> Result<usize, ShadowError> {
        if !self.enabled {
            return Err(ShadowError::Disabled);
        }
        ApplyGateway::new(&self.state.full_shadow, self.registry.as_ref()).apply_json(text)
    }

    pub fn snapshot(&self) -> ShadowSnapshot {
        ShadowSnapshot {
            full_shadow: self.state.full_shadow.to_json(),
            delta_shadow: self.state.delta_shadow.to_json(),
            flags: self.state.flags,
            window_active: self.window.is_active(),
            flush_count: self.flush_count,
        }
    }

    fn register_state(&mut self, thing: &ThingRef, state: Value) -> bool {
        if thing.private {
            return false;
        }
        match self.state.full_shadow.put(thing.domain(), &thing.id, state) {
            Ok(()) => {
                debug!(uid = %thing, "State added to the full shadow");
                true
            }
            Err(e) => {
                error!(uid = %thing, "Failed to add state to the full shadow: {}", e);
                false
            }
        }
    }

    fn unregister_state(&mut self, thing: &ThingRef) {
        match self.state.full_shadow.remove(thing.domain(), &thing.id) {
            Ok(Some(_)) => debug!(uid = %thing, "State removed from the full shadow"),
            Ok(None) => {}
            Err(e) => error!(uid = %thing, "Failed to remove state from the full shadow: {}", e),
        }
        // A pending value must not be published once the thing is gone
        match self.state.delta_shadow.remove(thing.domain(), &thing.id) {
            Ok(Some(_)) => debug!(uid = %thing, "Pending state dropped from the delta shadow"),
            Ok(None) => {}
            Err(e) => error!(uid = %thing, "Failed to remove state from the delta shadow: {}", e),
        }
    }

    fn notify(&self, kind: ShadowEventKind) {
        debug!(
            %kind,
            delta = self.state.delta_shadow.len(),
            subscribers = self.subscribers.len(),
            "Raising shadow notification"
        );
        for subscriber in &self.subscribers {
            subscriber(kind, &self.state);
        }
    }
}
