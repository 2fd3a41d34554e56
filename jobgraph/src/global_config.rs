// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use clap::ValueEnum;
use log::warn;
use std::sync::OnceLock;

pub const DEFAULT_SHELL: &str = "/bin/sh";

#[derive(Debug)]
pub struct GlobalConfig {
    pub shell: String,
    pub echo: bool,
}

// The actual static variable. It starts empty and is set once in main().
pub static CONFIG: OnceLock<GlobalConfig> = OnceLock::new();

/// How the CLI prints the outcome of a plan.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Default)]
#[clap(rename_all = "kebab-case")]
pub enum ReportFormat {
    #[default]
    /// One line per job with its final state
    Summary,
    /// The full report, including pending jobs, as JSON
    Json,
}

pub fn initialize_global_config(shell: &str, echo: bool) {
    if CONFIG
        .set(GlobalConfig {
            shell: shell.to_string(),
            echo,
        })
        .is_err()
    {
        warn!("Global config already initialized, keeping the first one");
    }
}

/// Shell used by `shell` actions. Falls back to `/bin/sh` when no config was set.
pub fn get_shell<'a>() -> &'a str {
    CONFIG
        .get()
        .map(|config| config.shell.as_str())
        .unwrap_or(DEFAULT_SHELL)
}

pub fn get_echo() -> bool {
    CONFIG.get().map(|config| config.echo).unwrap_or(false)
}
