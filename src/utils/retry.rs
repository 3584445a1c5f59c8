//! Retry utilities: backoff builders for contended writes.
//!
//! Uses `backon` for exponential backoff with jitter.

use backon::ExponentialBuilder;

use crate::config::PlacementConfig;

/// Backoff for placements that lose a slot race.
///
/// `max_attempts` counts the first try, so the builder allows one fewer retry.
pub fn placement_backoff(config: &PlacementConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(config.min_delay())
        .with_max_delay(config.max_delay())
        .with_max_times(config.max_attempts.saturating_sub(1))
        .with_jitter()
}
