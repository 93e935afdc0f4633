use crate::VideoId;

/// Convert `HH:MM:SS` or `MM:SS` into seconds.
pub fn parse_timestamp(token: &str) -> Option<u64> {
    let parts = token
        .trim()
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    match parts.as_slice() {
        [h, m, s] => h.checked_mul(3600)?.checked_add(m.checked_mul(60)?)?.checked_add(*s),
        [m, s] => m.checked_mul(60)?.checked_add(*s),
        _ => None,
    }
}

/// Compact `m:ss` clock used in transcript listings.
pub fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// SRT cue time, `HH:MM:SS,mmm`.
pub fn format_srt(seconds: f64) -> String {
    let millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let (hours, rest) = (millis / 3_600_000, millis % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    let (secs, ms) = (rest / 1000, rest % 1000);
    format!("{hours:02}:{minutes:02}:{secs:02},{ms:03}")
}

/// Watch URL that starts playback at `seconds`.
pub fn deep_link(video_id: &VideoId, seconds: u64) -> String {
    format!("{}&t={seconds}s", video_id.watch_url())
}
