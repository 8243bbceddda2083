//! Best-effort estimate of when a pod will shut itself down.
//!
//! Neither input is structured provider data: the start time is scraped from
//! the free-text status note and the runtime from the `sleep N` in the
//! entrypoint. Anything that does not match yields `None`.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use regex::Regex;

use crate::providers::traits::Pod;

static SLEEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bsleep\s+(\d+)\b").expect("sleep pattern is valid"));

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w{3}\s+\w{3}\s+\d{2}\s+\d{4}\s+\d{2}:\d{2}:\d{2})\s+GMT")
        .expect("date pattern is valid")
});

/// Start time from a note like `Rented by User: Mon Jan 02 2023 03:04:05 GMT+0000 (...)`.
#[must_use]
pub fn parse_start_time(status_change: &str) -> Option<DateTime<Utc>> {
    let captures = DATE_RE.captures(status_change)?;
    let raw = captures.get(1)?.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&raw, "%a %b %d %Y %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Sleep duration from an entrypoint like `...; sleep 3600; ...`.
#[must_use]
pub fn parse_sleep(docker_args: &str) -> Option<Duration> {
    let captures = SLEEP_RE.captures(docker_args)?;
    let secs: i64 = captures.get(1)?.as_str().parse().ok()?;
    Duration::try_seconds(secs)
}

/// Time left before the pod's entrypoint reaches its terminate script.
#[must_use]
pub fn estimate_remaining(pod: &Pod, now: DateTime<Utc>) -> Option<Duration> {
    let start = parse_start_time(pod.last_status_change.as_deref()?)?;
    let sleep = parse_sleep(pod.docker_args.as_deref()?)?;
    let remaining = start.checked_add_signed(sleep)? - now;
    (remaining > Duration::zero()).then_some(remaining)
}

/// Render as `{h}h {m}m`, or `Unknown`.
#[must_use]
pub fn format_remaining(remaining: Option<Duration>) -> String {
    match remaining {
        Some(d) => format!("{}h {}m", d.num_hours(), d.num_minutes() % 60),
        None => "Unknown".to_string(),
    }
}
