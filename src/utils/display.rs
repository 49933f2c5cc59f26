//! Presentation helpers for remaining time and progress

/// Render milliseconds as `HH:MM:SS`, each field zero-padded to two digits.
///
/// Anything at or below zero renders as `00:00:00`. Hours are not wrapped.
pub fn format_hms(ms: i64) -> String {
    if ms <= 0 {
        return "00:00:00".to_string();
    }

    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = total_seconds % 3600 / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Fraction of the period already used, in `0.0..=1.0`
pub fn progress(period_ms: u64, remaining_ms: u64) -> f64 {
    if period_ms == 0 {
        return 1.0;
    }
    let used = period_ms.saturating_sub(remaining_ms);
    used as f64 / period_ms as f64
}
