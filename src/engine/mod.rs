//! Scenario execution engine.
//!
//! This module provides:
//! - Normalized cross-correlation target detection
//! - The scenario state machine (capture → match → click → wait, with
//!   retry-on-miss)
//! - The standalone continuous detect-and-click loop
//! - Run coordination so only one run or recording is active at a time

pub mod clock;
pub mod matcher;
pub mod runner;
pub mod standalone;
pub mod state;

pub use matcher::{MatchHit, NccMatcher, TargetMatcher, MATCH_THRESHOLD};
pub use runner::{current_mode, is_run_active, stop_active, Mode};
pub use state::{EngineState, RunOutcome, ScenarioRun, StepError, RETRY_BACKOFF};
