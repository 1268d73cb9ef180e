//! Autosave scheduling aligned to KST wall-clock boundaries.

/// KST is a fixed UTC+9 zone with no daylight saving.
pub const KST_UTC_OFFSET_MS: i64 = 9 * 60 * 60 * 1000;

/// Minimum delay before the next fire, even right on a boundary.
const MIN_DELAY_MS: i64 = 1_000;

/// Milliseconds until the next KST wall-clock multiple of `interval_min`.
///
/// Saves land at :00/:05/:10... rather than N minutes after an arbitrary
/// start. A non-positive interval falls back to one minute.
#[must_use]
pub fn delay_to_next_boundary_ms(interval_min: u32, now_ms: i64) -> i64 {
    if interval_min == 0 {
        return 60_000;
    }
    let interval_ms = i64::from(interval_min) * 60 * 1000;
    let kst_now = now_ms + KST_UTC_OFFSET_MS;
    let next = (kst_now.div_euclid(interval_ms) + 1) * interval_ms;
    (next - kst_now).max(MIN_DELAY_MS)
}

/// Player-facing autosave settings with the clamping rules the settings UI
/// relies on: base snaps to 5 or 10 minutes, the interval rounds to the
/// nearest multiple of the base and never drops below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveSettings {
    pub enabled: bool,
    base_min: u32,
    interval_min: u32,
}

impl Default for AutosaveSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_min: 5,
            interval_min: 10,
        }
    }
}

impl AutosaveSettings {
    #[must_use]
    pub const fn base_min(self) -> u32 {
        self.base_min
    }

    #[must_use]
    pub const fn interval_min(self) -> u32 {
        self.interval_min
    }

    /// Sets the base unit (anything but 10 snaps to 5) and re-rounds the
    /// current interval against it.
    pub fn set_base_min(&mut self, value: u32) {
        self.base_min = if value == 10 { 10 } else { 5 };
        let current = if self.interval_min == 0 {
            self.base_min
        } else {
            self.interval_min
        };
        self.interval_min = round_to_base(current, self.base_min);
    }

    /// Sets the interval, rounded to the nearest base multiple. Zero is
    /// ignored.
    pub fn set_interval_min(&mut self, value: u32) {
        if value == 0 {
            return;
        }
        self.interval_min = round_to_base(value, self.base_min);
    }
}

fn round_to_base(value: u32, base: u32) -> u32 {
    let rounded = (value + base / 2) / base * base;
    rounded.max(base)
}

/// One armed deadline, polled from the engine tick. Re-arming after a fire is
/// the engine's responsibility so the boundary math sees the post-save clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutosaveScheduler {
    running: bool,
    next_due_ms: Option<i64>,
    last_fire_ms: Option<i64>,
}

impl AutosaveScheduler {
    /// Arms (or re-arms) the deadline at the next KST boundary.
    pub fn arm(&mut self, interval_min: u32, local_now_ms: i64) {
        self.running = true;
        self.next_due_ms = Some(local_now_ms + delay_to_next_boundary_ms(interval_min, local_now_ms));
    }

    /// True exactly once when an armed deadline has elapsed.
    pub fn poll(&mut self, local_now_ms: i64) -> bool {
        match self.next_due_ms {
            Some(due) if self.running && local_now_ms >= due => {
                self.next_due_ms = None;
                self.last_fire_ms = Some(local_now_ms);
                true
            }
            _ => false,
        }
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.next_due_ms = None;
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub const fn next_due_ms(&self) -> Option<i64> {
        self.next_due_ms
    }

    #[must_use]
    pub const fn last_fire_ms(&self) -> Option<i64> {
        self.last_fire_ms
    }
}
