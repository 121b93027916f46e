// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits at the scheduler's seams.
//!
//! The scheduler drives an opaque [`Driver`] and reads time from an
//! injectable [`Clock`]; everything about the target application lives on
//! the other side of these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CourierError;
use crate::outcome::Outcome;
use crate::types::ProfileRecord;

/// Launches driver sessions for a (profile, proxy) pair.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Open a session bound to the profile's identity and the given egress.
    async fn open(
        &self,
        profile: &ProfileRecord,
        proxy_url: &str,
    ) -> Result<Box<dyn DriverSession>, CourierError>;
}

/// A live session against the target application.
///
/// `send` classifies its own observations into an [`Outcome`]; `Err` is
/// reserved for infrastructure faults of the driver itself (a dead child
/// process, a broken pipe), which the worker treats as unexpected.
#[async_trait]
pub trait DriverSession: Send {
    async fn send(&mut self, chat_ref: &str, text: &str) -> Result<Outcome, CourierError>;

    async fn close(&mut self) -> Result<(), CourierError>;
}

/// Injectable time source for pacing and stale-claim arithmetic.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used outside tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
