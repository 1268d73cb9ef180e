//! Remaining-time formatting shared by research and preview countdowns.

/// Formats a second count as `3h 05m 09s`, dropping leading zero units and
/// zero-padding every unit after the first.
#[must_use]
pub fn format_remaining_secs(total_sec: u64) -> String {
    let hours = total_sec / 3600;
    let minutes = (total_sec % 3600) / 60;
    let seconds = total_sec % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

/// Millisecond variant: negatives clamp to zero, partial seconds floor.
#[must_use]
pub fn format_remaining_ms(remaining_ms: i64) -> String {
    let clamped = remaining_ms.max(0) as u64;
    format_remaining_secs(clamped / 1000)
}
