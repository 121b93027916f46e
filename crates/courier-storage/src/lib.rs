// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the courier fleet.
//!
//! All access goes through a single [`Database`] handle whose operations
//! run serialized on one background thread. A multi-statement closure
//! wrapped in a transaction is therefore atomic with respect to every
//! other caller, which is what makes the task-claim path race-free without
//! any row-level locking protocol.

pub mod database;
pub mod migrations;
pub mod queries;

pub use database::Database;
