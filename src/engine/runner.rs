//! Run coordination.
//!
//! A single mutex-guarded mode token serializes scenario runs, the
//! standalone loop, and recording: at most one of them drives the pointer
//! at any instant. Starting a run cancels and joins whatever run is
//! already active; recording refuses to start while a run is active and
//! runs refuse to start while recording.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};

/// What currently owns the pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Scenario,
    Standalone,
    Recording,
}

static MODE: Mutex<Mode> = Mutex::new(Mode::Idle);

struct ActiveRun {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

static ACTIVE: Mutex<Option<ActiveRun>> = Mutex::new(None);

pub fn current_mode() -> Mode {
    *MODE.lock().unwrap()
}

pub fn is_run_active() -> bool {
    matches!(current_mode(), Mode::Scenario | Mode::Standalone)
}

/// Claims the mode token for recording. Fails while a run is active.
pub fn begin_recording() -> Result<()> {
    let mut mode = MODE.lock().unwrap();
    match *mode {
        Mode::Idle => {
            *mode = Mode::Recording;
            Ok(())
        }
        other => Err(anyhow!("cannot record while {:?} is active", other)),
    }
}

/// Releases the recording claim on the mode token.
pub fn end_recording() {
    let mut mode = MODE.lock().unwrap();
    if *mode == Mode::Recording {
        *mode = Mode::Idle;
    }
}

/// Requests cancellation of the active run, if any, and waits for its
/// thread to reach a terminal state.
pub fn stop_active() {
    let active = ACTIVE.lock().unwrap().take();
    if let Some(run) = active {
        run.stop.store(true, Ordering::SeqCst);
        let _ = run.handle.join();
    }
}

#[cfg(target_os = "windows")]
mod spawn {
    use super::*;
    use std::path::PathBuf;
    use std::thread;

    use crate::capture::{GdiCapture, ScreenCapture};
    use crate::engine::clock::SystemClock;
    use crate::engine::matcher::NccMatcher;
    use crate::engine::standalone::{StandaloneRun, StandaloneTarget};
    use crate::engine::state::{RunOutcome, ScenarioRun};
    use crate::input::SendInputPointer;
    use crate::scenario::model::{Point, Region, Scenario};
    use crate::scenario::ScenarioStore;

    /// Claims the mode token for a run after cancelling any active one.
    fn claim_run_mode(mode: Mode) -> Result<()> {
        stop_active();
        let mut current = MODE.lock().unwrap();
        match *current {
            Mode::Idle => {
                *current = mode;
                Ok(())
            }
            Mode::Recording => Err(anyhow!(
                "recording in progress; finish or cancel it before running"
            )),
            other => Err(anyhow!("{:?} still active", other)),
        }
    }

    fn release_run_mode() {
        let mut mode = MODE.lock().unwrap();
        if matches!(*mode, Mode::Scenario | Mode::Standalone) {
            *mode = Mode::Idle;
        }
    }

    fn full_screen_region(capture: &dyn ScreenCapture) -> Region {
        let (w, h) = capture.screen_size();
        Region::from_corners(Point::new(0, 0), Point::new(w, h))
    }

    fn install(stop: Arc<AtomicBool>, handle: JoinHandle<()>) {
        *ACTIVE.lock().unwrap() = Some(ActiveRun { stop, handle });
    }

    /// Starts a scenario run on a background thread.
    pub fn start_scenario(name: &str) -> Result<()> {
        claim_run_mode(Mode::Scenario)?;

        let store = match ScenarioStore::open(crate::paths::get_scenarios_dir()) {
            Ok(store) => store,
            Err(e) => {
                release_run_mode();
                return Err(e.into());
            }
        };
        let scenario = match store.load(name) {
            Ok(scenario) => scenario,
            Err(e) => {
                release_run_mode();
                return Err(e.into());
            }
        };

        crate::log(&format!(
            "Starting scenario `{}` ({} actions)",
            scenario.name,
            scenario.len()
        ));

        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let images_root = store.root().to_path_buf();
        let handle = thread::spawn(move || {
            run_scenario_thread(scenario, images_root, stop_clone);
            release_run_mode();
        });
        install(stop, handle);
        Ok(())
    }

    fn run_scenario_thread(scenario: Scenario, images_root: PathBuf, stop: Arc<AtomicBool>) {
        let capture = GdiCapture;
        let pointer = SendInputPointer;
        let matcher = NccMatcher;
        let clock = SystemClock;
        let fallback = full_screen_region(&capture);

        let mut run = ScenarioRun::new(
            &scenario,
            images_root,
            fallback,
            &capture,
            &pointer,
            &matcher,
            &clock,
            stop,
        );
        match run.run() {
            Ok(RunOutcome::Completed) => {
                crate::log(&format!("Scenario `{}` finished", scenario.name));
            }
            Ok(RunOutcome::Stopped) => {
                crate::log(&format!("Scenario `{}` stopped", scenario.name));
            }
            Ok(RunOutcome::NothingToRun) => {}
            Err(e) => {
                crate::log(&format!("Scenario `{}` aborted: {}", scenario.name, e));
            }
        }
    }

    /// Toggles the standalone loop for the first action of the named
    /// scenario: stops it when it is running, starts it otherwise.
    pub fn toggle_standalone(name: &str) -> Result<()> {
        if current_mode() == Mode::Standalone {
            stop_active();
            return Ok(());
        }

        claim_run_mode(Mode::Standalone)?;

        let target = match load_standalone_target(name) {
            Ok(target) => target,
            Err(e) => {
                release_run_mode();
                return Err(e);
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let handle = thread::spawn(move || {
            let capture = GdiCapture;
            let pointer = SendInputPointer;
            let matcher = NccMatcher;
            let clock = SystemClock;
            let mut run =
                StandaloneRun::new(target, &capture, &pointer, &matcher, &clock, stop_clone);
            if let Err(e) = run.run() {
                crate::log(&format!("Standalone loop aborted: {}", e));
            }
            release_run_mode();
        });
        install(stop, handle);
        Ok(())
    }

    fn load_standalone_target(name: &str) -> Result<StandaloneTarget> {
        let store = ScenarioStore::open(crate::paths::get_scenarios_dir())?;
        let scenario = store.load(name)?;
        let ordered = scenario.actions_in_order();
        let action = ordered
            .first()
            .ok_or_else(|| anyhow!("scenario `{}` has no actions", name))?;

        let path = store.resolve_image(&action.reference_image);
        let reference = image::open(&path)
            .map_err(|e| anyhow!("reference image `{}` unreadable: {}", path.display(), e))?
            .to_rgba8();
        let region = action
            .search_region
            .unwrap_or_else(|| full_screen_region(&GdiCapture));
        Ok(StandaloneTarget {
            reference,
            region,
            click_point: action.click_point,
        })
    }
}

#[cfg(target_os = "windows")]
pub use spawn::{start_scenario, toggle_standalone};
