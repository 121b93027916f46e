// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire records exchanged with the automation command.

use courier_core::Outcome;
use serde::{Deserialize, Serialize};

/// One send request, written as a single JSON line on the child's stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest<'a> {
    pub chat_ref: &'a str,
    pub text: &'a str,
}

/// One send response, read as a single JSON line from the child's stdout.
///
/// `outcome` carries the snake_case tag of the observation; unknown tags
/// decode to `unexpected_error` so an older courier keeps working against
/// a newer automation command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    pub outcome: String,
    #[serde(default)]
    pub wait_seconds: Option<u64>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl SendResponse {
    pub fn into_outcome(self) -> Outcome {
        Outcome::from_wire(&self.outcome, self.wait_seconds)
    }
}
