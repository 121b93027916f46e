// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker loop and supervision for the courier fleet.
//!
//! A [`Worker`] binds one profile to one driver session and consumes tasks
//! until nothing remains; the [`Supervisor`] runs one isolated worker task
//! per eligible profile under a shared run identity, restarting crashed
//! workers with exponential backoff and honouring do-not-restart exits.

pub mod shutdown;
pub mod supervisor;
pub mod worker;

pub use supervisor::{ProfileOutcome, RunReport, Supervisor};
pub use worker::{Worker, WorkerExit};
