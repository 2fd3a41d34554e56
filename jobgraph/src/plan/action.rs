// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use serde::{Deserialize, Serialize};

/// What a plan job does when it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Action {
    /// Run a command through the configured shell.
    #[serde(rename = "shell")]
    Shell { command: String },

    #[serde(rename = "sleep")]
    Sleep { millis: u64 },

    /// Fail on purpose, e.g. to see which part of a plan depends on a step.
    #[serde(rename = "fail")]
    Fail { message: String },
}
