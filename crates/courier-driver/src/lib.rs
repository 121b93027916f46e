// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Driver adapter for external automation commands.
//!
//! The scheduler is oblivious to how messages reach the target
//! application; this crate bridges it to any executable that speaks the
//! line-delimited JSON wire: one request object in, one response object
//! out, per send. The executable owns the browser, the selectors, and the
//! classification of what it sees.

pub mod command;
pub mod wire;

pub use command::CommandDriver;
