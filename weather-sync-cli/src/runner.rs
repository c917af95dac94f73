//! Minimal local requeue loop: one reconcile at a time, honouring the
//! requested delay per location and backing off on failures.

use anyhow::Result;
use std::{collections::BTreeMap, time::Duration};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use weather_sync_core::{Backoff, Location, ObjectKey, ReconcileError, Reconciler};

pub async fn run(
    reconciler: &Reconciler,
    keys: Vec<ObjectKey>,
    cancel: CancellationToken,
) -> Result<()> {
    let now = Instant::now();
    let mut queue: BTreeMap<ObjectKey, Instant> = keys.into_iter().map(|k| (k, now)).collect();
    let mut backoff = Backoff::default();

    info!(locations = queue.len(), "starting sync loop");

    while let Some((key, due)) = next_due(&queue) {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep_until(due) => {}
        }

        match reconciler.reconcile(&key, &cancel).await {
            Ok(action) => {
                backoff.reset(&key);
                match action.requeue_after() {
                    Some(delay) => {
                        info!(resource = %key, "next refresh at {}", wall_clock_after(delay));
                        queue.insert(key, due_after(delay));
                    }
                    None => {
                        queue.remove(&key);
                    }
                }
            }
            Err(ReconcileError::Cancelled) => break,
            Err(err) => {
                let delay = backoff.on_error(&key, &err);
                warn!(
                    resource = %key,
                    attempt = backoff.failures(&key),
                    retry_in = %format_period(delay),
                    "reconcile failed, requeueing"
                );
                queue.insert(key, due_after(delay));
            }
        }
    }

    info!("sync loop stopped");
    Ok(())
}

fn due_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .unwrap_or_else(|| now + Duration::from_secs(365 * 24 * 3600))
}

fn next_due(queue: &BTreeMap<ObjectKey, Instant>) -> Option<(ObjectKey, Instant)> {
    queue
        .iter()
        .min_by_key(|(_, due)| **due)
        .map(|(key, due)| (key.clone(), *due))
}

fn wall_clock_after(delay: Duration) -> String {
    let at = chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| chrono::Local::now().checked_add_signed(d));

    match at {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("+{}", format_period(delay)),
    }
}

/// Short human form of a period, e.g. `5m`, `1h30m`, `45s`.
pub fn format_period(period: Duration) -> String {
    let secs = period.as_secs();
    if secs == 0 {
        return format!("{}ms", period.as_millis());
    }

    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{h}h"));
    }
    if m > 0 {
        out.push_str(&format!("{m}m"));
    }
    if s > 0 || out.is_empty() {
        out.push_str(&format!("{s}s"));
    }
    out
}

/// Print locations using the resource's display columns.
pub fn print_table(locations: &[Location]) {
    println!(
        "{:<12} {:<20} {:<10} {:<10} {:<20} {:<8} REFRESHED",
        "NAMESPACE", "NAME", "LAT", "LON", "LOCATION", "TEMP"
    );
    for loc in locations {
        println!(
            "{:<12} {:<20} {:<10} {:<10} {:<20} {:<8} {}",
            loc.metadata.namespace,
            loc.metadata.name,
            loc.spec.lat,
            loc.spec.lon,
            loc.status.location_name,
            loc.status.temp,
            loc.status.refresh_time,
        );
    }
}
