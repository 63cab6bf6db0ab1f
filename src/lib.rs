//! Scenario Clicker core.
//!
//! Automates repetitive mouse interactions: an action pairs a recorded
//! reference image with a search region and a click point; a scenario is a
//! named, ordered list of actions replayed by the execution engine. This
//! crate holds the data model, persistence, the correlation matcher, the
//! execution state machines, and the recording workflow; the tray binary
//! wires them to Windows hotkeys.

pub mod capture;
pub mod config;
pub mod engine;
pub mod input;
pub mod paths;
pub mod recorder;
pub mod scenario;

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;

/// Logs a message to both console and log file with timestamp.
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    print!("{}", line);
    let log_path = paths::get_logs_dir().join("scenario_clicker.log");
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        let _ = file.write_all(line.as_bytes());
    }
}
