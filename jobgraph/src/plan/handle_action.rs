// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use log::info;
use serde_json::Value;

use super::action::Action;
use crate::global_config;

/// Job body for plan jobs: the action travels as the first positional argument.
pub fn run_action_args(args: &[Value]) -> anyhow::Result<Value> {
    let action = args.first().cloned().context("missing action argument")?;
    let action: Action = serde_json::from_value(action).context("invalid action")?;
    run_action(&action)
}

pub fn run_action(action: &Action) -> anyhow::Result<Value> {
    match action {
        Action::Shell { command } => execute(command),
        Action::Sleep { millis } => {
            thread::sleep(Duration::from_millis(*millis));
            Ok(Value::Null)
        }
        Action::Fail { message } => bail!("{}", message),
    }
}

/// Runs `command` through the shell and returns its stdout. A non-zero exit fails
/// with the combined output of the command.
pub fn execute(command: &str) -> anyhow::Result<Value> {
    if global_config::get_echo() {
        info!(" > {}", command);
    }
    let shell = global_config::get_shell();
    let output = Command::new(shell)
        .arg("-c")
        .arg(command)
        .output()
        .with_context(|| format!("failed to start {shell}"))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "`{}` exited with {}: {}{}",
            command,
            output.status,
            stdout,
            stderr
        );
    }
    Ok(Value::String(stdout.trim_end().to_string()))
}
