//! Server-synchronized clock: a signed offset applied to the host's local time.

/// Offset-corrected clock with an explicit readiness flag.
///
/// The host feeds the measured server offset in via [`SyncedClock::set_offset`]
/// once its realtime channel reports one. Until then the clock is not ready
/// and time-dependent commands must refuse to run rather than guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncedClock {
    offset_ms: i64,
    ready: bool,
}

impl SyncedClock {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            offset_ms: 0,
            ready: false,
        }
    }

    /// Records the server offset and marks the clock ready. A host that fails
    /// to reach the offset channel calls this with `0` to degrade gracefully.
    pub const fn set_offset(&mut self, offset_ms: i64) {
        self.offset_ms = offset_ms;
        self.ready = true;
    }

    pub const fn reset(&mut self) {
        self.offset_ms = 0;
        self.ready = false;
    }

    #[must_use]
    pub const fn is_ready(self) -> bool {
        self.ready
    }

    #[must_use]
    pub const fn offset_ms(self) -> i64 {
        self.offset_ms
    }

    /// Corrected wall-clock time for a host-supplied local timestamp.
    #[must_use]
    pub const fn now_ms(self, local_now_ms: i64) -> i64 {
        local_now_ms + self.offset_ms
    }
}
