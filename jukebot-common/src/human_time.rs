//! Human-readable duration formatting
//!
//! Consistent track-duration display across queue listings and events.

/// Format an optional duration in seconds as `M:SS` or `H:MM:SS`.
///
/// Unresolved durations render as "unknown" rather than a zero length,
/// so queue displays don't claim a duration the resolver never reported.
///
/// # Examples
///
/// ```
/// use jukebot_common::human_time::format_track_duration;
///
/// assert_eq!(format_track_duration(Some(45)), "0:45");
/// assert_eq!(format_track_duration(Some(245)), "4:05");
/// assert_eq!(format_track_duration(Some(3661)), "1:01:01");
/// assert_eq!(format_track_duration(None), "unknown");
/// ```
pub fn format_track_duration(duration_secs: Option<u64>) -> String {
    let Some(secs) = duration_secs else {
        return "unknown".to_string();
    };

    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
