//! Shadow module - synchronized snapshot of thing states
//!
//! This module provides the shadow engine that keeps the last known state of
//! every public thing (the full shadow), collects the things changed since the
//! last notification (the delta shadow), and coalesces bursts of changes into
//! debounced `ShadowChanged` / `ShadowPublishing` notifications. It also
//! routes externally supplied state documents back into the things.

mod actor;
mod actor_handle;
mod apply;
mod clock;
mod commands;
mod engine;
mod error;
mod policy;
mod store;
mod types;


pub use actor::ShadowActor;
pub use actor_handle::ShadowHandle;
pub use apply::ApplyGateway;
pub use clock::{Clock, MonotonicClock};
pub use commands::{ShadowCommand, ShadowSubscriberFn};
pub use engine::ShadowEngine;
pub use error::ShadowError;
pub use policy::{
    CoalescingPolicy, DebounceWindow, Dispatch, TickAction, WindowHandle, DEFAULT_OPTIMIZE_TIMEOUT_MS,
    MAX_WINDOW_FACTOR,
};
pub use store::{StateStore, StoreEntry};
pub use types::{
    split_uid, ShadowEventKind, ShadowSnapshot, ShadowState, StateEventKind, StateFlags, ThingEvent,
    ThingRef,
};
