use std::time::Duration;

use crate::{
    audio::queue::{LoopMode, QueueSnapshot},
    sources::Track,
};

/// Máximo de tracks pendientes listados en `!queue`
pub const QUEUE_PAGE_SIZE: usize = 10;

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// `title [m:ss]`, o `title [--:--]` si la duración es desconocida
pub fn format_track_line(track: &Track) -> String {
    match track.duration() {
        Some(duration) => format!("{} [{}]", track.title(), format_duration(duration)),
        None => format!("{} [--:--]", track.title()),
    }
}

pub fn format_queue(snapshot: &QueueSnapshot) -> String {
    if snapshot.is_empty() {
        return "Queue is empty.".to_string();
    }

    let mut lines = Vec::new();
    if let Some(current) = &snapshot.current {
        lines.push(format!("Now: {}", format_track_line(current)));
    }

    for (index, track) in snapshot.pending.iter().take(QUEUE_PAGE_SIZE).enumerate() {
        lines.push(format!("{}. {}", index + 1, format_track_line(track)));
    }

    let hidden = snapshot.pending.len().saturating_sub(QUEUE_PAGE_SIZE);
    if hidden > 0 {
        lines.push(format!("...and {} more", hidden));
    }

    lines.push(format!(
        "Loop: {} | Total: {}",
        if snapshot.loop_mode == LoopMode::CurrentTrack { "on" } else { "off" },
        format_duration(snapshot.total_duration)
    ));
    lines.join("\n")
}
