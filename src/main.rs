//! Scenario Clicker
//!
//! Replays recorded detect-and-click scenarios: each action locates a
//! reference image fragment on screen via template correlation and clicks
//! its recorded point. On Windows this runs as a system tray application
//! driven by global hotkeys; recording, execution, and a standalone
//! single-target loop are all available from the tray.

#![cfg_attr(target_os = "windows", windows_subsystem = "windows")]

#[cfg(target_os = "windows")]
mod tray;

use anyhow::Result;
use scenario_clicker::{config, paths};

fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        eprintln!("[PANIC]{} {}", location, msg);
    }));

    paths::ensure_directories()?;
    config::init_config();
    run()
}

#[cfg(target_os = "windows")]
fn run() -> Result<()> {
    tray::run()
}

#[cfg(not(target_os = "windows"))]
fn run() -> Result<()> {
    anyhow::bail!(
        "scenario-clicker drives the Windows capture and input APIs; \
         this platform is unsupported"
    )
}
