//! Coalescing policy for shadow notifications
//!
//! Decides, for every classified state event, whether the pending delta is
//! flushed right away or collected into a debounce window, and what a window
//! tick should do. The policy is pure: time is passed in by the caller, so it
//! is testable without a running timer.
//!
//! # Debouncing Strategy
//!
//! 1. With optimization disabled, every event is flushed synchronously.
//! 2. With optimization enabled, or when an event carries the forced marker,
//!    a window is started and the event is deferred.
//! 3. The window ticks every `optimize_timeout`. A tick flushes once no new
//!    event arrived for `optimize_timeout`, or immediately when a forced event
//!    is pending, then the window stops.
//! 4. A window never stays open longer than `MAX_WINDOW_FACTOR` timeouts, so
//!    a steady stream of events still gets delivered.

use super::types::StateFlags;
use std::time::Duration;

/// Default debounce window in milliseconds
pub const DEFAULT_OPTIMIZE_TIMEOUT_MS: u64 = 50;

/// Longest window, in multiples of the timeout, before a flush is forced
pub const MAX_WINDOW_FACTOR: u32 = 4;

/// What to do with an incoming event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Flush synchronously before returning to the caller
    FlushNow,
    /// Start a debounce window and defer
    StartWindow,
    /// A window is already running, just accumulate
    Defer,
}

/// What to do on a window tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Keep accumulating until the next tick
    Wait,
    /// Flush the delta and stop the window
    Flush,
    /// Nothing pending, stop the window
    Stop,
}

/// Flush-timing decisions for the shadow engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescingPolicy {
    optimize: bool,
    timeout: Duration,
}

impl CoalescingPolicy {
    /// Create a policy; a non-positive timeout falls back to the default
    pub fn new(optimize: bool, optimize_timeout_ms: i64) -> Self {
        let timeout_ms = if optimize_timeout_ms > 0 {
            optimize_timeout_ms as u64
        } else {
            DEFAULT_OPTIMIZE_TIMEOUT_MS
        };
        Self {
            optimize,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub fn optimize(&self) -> bool {
        self.optimize
    }

    /// Debounce window length, also used as the tick period
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Upper bound on how long a window may stay open
    pub fn max_window(&self) -> Duration {
        self.timeout * MAX_WINDOW_FACTOR
    }

    /// Decide how to dispatch an event
    pub fn on_event(&self, forced: bool, window_active: bool) -> Dispatch {
        if window_active {
            Dispatch::Defer
        } else if self.optimize || forced {
            Dispatch::StartWindow
        } else {
            Dispatch::FlushNow
        }
    }

    /// Decide what a window tick does
    ///
    /// # Arguments
    ///
    /// * `flags` - Aggregate flags accumulated since the last flush
    /// * `started_us` - Timestamp at which the window was opened
    /// * `last_event_us` - Timestamp of the last contributing event, `None` once flushed
    /// * `now_us` - Current monotonic time
    pub fn on_tick(
        &self,
        flags: StateFlags,
        started_us: u64,
        last_event_us: Option<u64>,
        now_us: u64,
    ) -> TickAction {
        let Some(last_event_us) = last_event_us else {
            return TickAction::Stop;
        };
        if flags.is_empty() {
            return TickAction::Stop;
        }
        if flags.contains(StateFlags::FORCED) {
            return TickAction::Flush;
        }

        let quiet = Duration::from_micros(now_us.saturating_sub(last_event_us));
        let open = Duration::from_micros(now_us.saturating_sub(started_us));
        if quiet >= self.timeout || open >= self.max_window() {
            TickAction::Flush
        } else {
            TickAction::Wait
        }
    }
}

impl Default for CoalescingPolicy {
    fn default() -> Self {
        Self::new(false, DEFAULT_OPTIMIZE_TIMEOUT_MS as i64)
    }
}

/// Opaque identifier of a running debounce window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(u64);

/// Debounce window bookkeeping
///
/// The window is active iff it holds a handle. Every activation after a
/// cancel yields a fresh handle, so a timer armed for an older window can be
/// told apart from the current one.
#[derive(Debug, Default)]
pub struct DebounceWindow {
    handle: Option<WindowHandle>,
    generation: u64,
}

impl DebounceWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<WindowHandle> {
        self.handle
    }

    /// Start the window if it is not running, returning its handle
    pub fn activate(&mut self) -> WindowHandle {
        if let Some(handle) = self.handle {
            return handle;
        }
        self.generation += 1;
        let handle = WindowHandle(self.generation);
        self.handle = Some(handle);
        handle
    }

    /// Stop the window; cancelling an inactive window is a no-op
    pub fn cancel(&mut self) -> Option<WindowHandle> {
        self.handle.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_positive_timeout_uses_default() {
        assert_eq!(CoalescingPolicy::new(true, 0).timeout(), Duration::from_millis(50));
        assert_eq!(CoalescingPolicy::new(true, -10).timeout(), Duration::from_millis(50));
        assert_eq!(CoalescingPolicy::new(true, 120).timeout(), Duration::from_millis(120));
    }

    #[test]
    fn test_on_event() {
        let plain = CoalescingPolicy::new(false, 50);
        assert_eq!(plain.on_event(false, false), Dispatch::FlushNow);
        assert_eq!(plain.on_event(true, false), Dispatch::StartWindow);
        assert_eq!(plain.on_event(false, true), Dispatch::Defer);

        let optimized = CoalescingPolicy::new(true, 50);
        assert_eq!(optimized.on_event(false, false), Dispatch::StartWindow);
        assert_eq!(optimized.on_event(false, true), Dispatch::Defer);
    }

    #[test]
    fn test_on_tick_nothing_pending() {
        let policy = CoalescingPolicy::new(true, 50);
        assert_eq!(policy.on_tick(StateFlags::empty(), 0, None, 1_000_000), TickAction::Stop);
        assert_eq!(policy.on_tick(StateFlags::empty(), 10, Some(10), 1_000_000), TickAction::Stop);
    }

    #[test]
    fn test_on_tick_waits_for_quiet_period() {
        let policy = CoalescingPolicy::new(true, 50);
        let flags = StateFlags::CHANGED | StateFlags::PUBLISHING;

        assert_eq!(policy.on_tick(flags, 1_000, Some(1_000), 30_000), TickAction::Wait);
        assert_eq!(policy.on_tick(flags, 1_000, Some(1_000), 51_000), TickAction::Flush);
        assert_eq!(policy.on_tick(flags, 1_000, Some(1_000), 90_000), TickAction::Flush);
    }

    #[test]
    fn test_on_tick_caps_window_length() {
        let policy = CoalescingPolicy::new(true, 50);
        let flags = StateFlags::PUBLISHING;
        assert_eq!(policy.max_window(), Duration::from_millis(200));

        // Events keep arriving 10ms apart, the quiet period is never reached
        assert_eq!(policy.on_tick(flags, 0, Some(190_000), 199_000), TickAction::Wait);
        assert_eq!(policy.on_tick(flags, 0, Some(195_000), 200_000), TickAction::Flush);
    }

    #[test]
    fn test_on_tick_forced_skips_quiet_period() {
        let policy = CoalescingPolicy::new(true, 50);
        let flags = StateFlags::PUBLISHING | StateFlags::FORCED;
        assert_eq!(policy.on_tick(flags, 1_000, Some(1_000), 1_001), TickAction::Flush);
    }

    #[test]
    fn test_window_handles() {
        let mut window = DebounceWindow::new();
        assert!(!window.is_active());
        assert_eq!(window.cancel(), None);

        let first = window.activate();
        assert_eq!(window.activate(), first);
        assert_eq!(window.cancel(), Some(first));
        assert_eq!(window.cancel(), None);

        let second = window.activate();
        assert_ne!(first, second);
        assert_eq!(window.handle(), Some(second));
    }
}
