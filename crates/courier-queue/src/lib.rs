// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduling policy for the courier fleet.
//!
//! [`TaskQueue`] decides which chat a worker sends to next and how each
//! outcome lands in the store; [`ProxyRegistry`] keeps every profile on a
//! healthy egress. The raw SQL lives in `courier-storage`; this crate owns
//! the policy: fairness, pacing arithmetic, failure budgets, and rotation
//! thresholds.

pub mod pacing;
pub mod proxy;
pub mod task_queue;

pub use courier_storage::queries::tasks::ClaimResult;
pub use proxy::ProxyRegistry;
pub use task_queue::TaskQueue;
