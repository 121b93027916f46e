// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inter-send delay arithmetic.
//!
//! The base delay spreads the hourly budget evenly across the hour; the
//! uniform jitter keeps the cadence from looking mechanical.

use std::time::Duration;

use rand::Rng;

/// Delay before the next send for a profile.
///
/// Base is `3600 / max_messages_per_hour` seconds, scaled by a uniform
/// factor in `[1 - randomness, 1 + randomness]`.
pub fn send_delay(max_messages_per_hour: u32, delay_randomness: f64) -> Duration {
    let base = 3600.0 / f64::from(max_messages_per_hour.max(1));
    let low = (1.0 - delay_randomness).max(0.0);
    let high = 1.0 + delay_randomness;
    let factor = rand::thread_rng().gen_range(low..=high);
    Duration::from_secs_f64(base * factor)
}

/// Defer applied to a chat after the destination reported slow mode:
/// the reported wait plus a little jitter so we never knock exactly on
/// the boundary.
pub fn slow_mode_defer(wait_seconds: u64) -> u64 {
    wait_seconds + rand::thread_rng().gen_range(1..=15)
}

/// Short pause a worker takes after a failed attempt before claiming
/// again.
pub const FAILURE_PAUSE: Duration = Duration::from_secs(2);
