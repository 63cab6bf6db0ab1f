//! Scenario execution state machine.
//!
//! A [`ScenarioRun`] walks one scenario's actions in execution order:
//! capture the action's region, correlate the reference image, click the
//! recorded point on a hit, wait, advance. A miss re-attempts the same
//! action after a fixed backoff, indefinitely; the run stalls rather than
//! fails until a match occurs or a stop is requested. Capture failures and
//! unreadable reference images are fatal and end the run.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use thiserror::Error;

use crate::capture::{CaptureError, ScreenCapture};
use crate::engine::clock::Clock;
use crate::engine::matcher::{MatchHit, TargetMatcher};
use crate::input::Pointer;
use crate::scenario::model::{Action, Region, Scenario};

/// Delay before re-attempting an action whose target was not found.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Engine states. Transitions happen only inside [`ScenarioRun::step`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running(usize),
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => write!(f, "Idle"),
            EngineState::Running(i) => write!(f, "Running action {}", i + 1),
            EngineState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Outcome of one detection attempt, consumed by the transition logic.
#[derive(Debug)]
pub enum Detection {
    Hit(MatchHit),
    Miss,
}

/// Fatal per-step conditions. These abort the run; a plain miss does not
/// appear here because it is not an error.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("reference image `{path}` unreadable: {source}")]
    Reference {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// How a run ended.
#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every action matched and was clicked.
    Completed,
    /// A stop request was observed at a step boundary.
    Stopped,
    /// The scenario had no actions; the engine never left `Idle`.
    NothingToRun,
}

/// One scenario execution. Holds a read-only view of the scenario for the
/// duration of the run.
pub struct ScenarioRun<'a> {
    pub state: EngineState,
    scenario_name: &'a str,
    actions: Vec<&'a Action>,
    images_root: PathBuf,
    fallback_region: Region,
    capture: &'a dyn ScreenCapture,
    pointer: &'a dyn Pointer,
    matcher: &'a dyn TargetMatcher,
    clock: &'a dyn Clock,
    stop: Arc<AtomicBool>,
    current_reference: Option<(usize, RgbaImage)>,
}

impl<'a> ScenarioRun<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scenario: &'a Scenario,
        images_root: PathBuf,
        fallback_region: Region,
        capture: &'a dyn ScreenCapture,
        pointer: &'a dyn Pointer,
        matcher: &'a dyn TargetMatcher,
        clock: &'a dyn Clock,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            state: EngineState::Idle,
            scenario_name: &scenario.name,
            actions: scenario.actions_in_order(),
            images_root,
            fallback_region,
            capture,
            pointer,
            matcher,
            clock,
            stop,
            current_reference: None,
        }
    }

    /// `Idle -> Running(0)`, only for a non-empty scenario.
    pub fn start(&mut self) -> bool {
        if self.state != EngineState::Idle {
            return false;
        }
        if self.actions.is_empty() {
            crate::log(&format!(
                "Scenario `{}` has no actions; nothing to run",
                self.scenario_name
            ));
            return false;
        }
        self.state = EngineState::Running(0);
        true
    }

    /// Advances the state machine by one step.
    ///
    /// Returns `Ok(true)` while the run should continue, `Ok(false)` on
    /// completion or stop. Fatal conditions transition to `Stopped` and
    /// propagate as `Err`.
    pub fn step(&mut self) -> Result<bool, StepError> {
        if self.stop.load(Ordering::SeqCst) {
            self.state = EngineState::Stopped;
            return Ok(false);
        }

        let index = match self.state {
            EngineState::Running(i) => i,
            _ => return Ok(false),
        };

        if index == self.actions.len() {
            crate::log(&format!("Scenario `{}` complete", self.scenario_name));
            self.state = EngineState::Idle;
            return Ok(false);
        }

        let action = self.actions[index];

        if let Err(e) = self.ensure_reference(index) {
            self.state = EngineState::Stopped;
            return Err(e);
        }

        let region = action.search_region.unwrap_or(self.fallback_region);
        let frame = match self.capture.capture(region) {
            Ok(frame) => frame,
            Err(e) => {
                self.state = EngineState::Stopped;
                return Err(e.into());
            }
        };

        let detection = {
            let (_, reference) = self
                .current_reference
                .as_ref()
                .expect("reference loaded above");
            match self.matcher.find(&frame, reference, region.top_left()) {
                Some(hit) => Detection::Hit(hit),
                None => Detection::Miss,
            }
        };

        match detection {
            Detection::Hit(hit) => {
                crate::log(&format!(
                    "Action `{}` matched at ({}, {}) with confidence {:.3}",
                    action.name, hit.location.x, hit.location.y, hit.confidence
                ));
                // The click lands on the recorded click point, not on the
                // match location; the two are independent.
                self.pointer.move_to(action.click_point.x, action.click_point.y);
                self.pointer.click();
                self.clock
                    .sleep(Duration::from_secs_f32(action.wait_seconds.max(0.0)));
                self.state = EngineState::Running(index + 1);
            }
            Detection::Miss => {
                self.clock.sleep(RETRY_BACKOFF);
            }
        }
        Ok(true)
    }

    /// Runs the scenario to a terminal state.
    pub fn run(&mut self) -> Result<RunOutcome, StepError> {
        if !self.start() {
            return Ok(RunOutcome::NothingToRun);
        }
        while self.step()? {}
        Ok(match self.state {
            EngineState::Stopped => RunOutcome::Stopped,
            _ => RunOutcome::Completed,
        })
    }

    fn ensure_reference(&mut self, index: usize) -> Result<(), StepError> {
        if self.current_reference.as_ref().map(|(i, _)| *i) == Some(index) {
            return Ok(());
        }
        let path = self.images_root.join(&self.actions[index].reference_image);
        let img = image::open(&path)
            .map_err(|source| StepError::Reference {
                path: path.clone(),
                source,
            })?
            .to_rgba8();
        self.current_reference = Some((index, img));
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::scenario::model::Point;
    use image::Rgba;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tempfile::TempDir;

    pub(crate) struct CountingCapture {
        pub calls: Arc<AtomicUsize>,
    }

    impl ScreenCapture for CountingCapture {
        fn capture(&self, _region: Region) -> Result<RgbaImage, CaptureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])))
        }

        fn screen_size(&self) -> (i32, i32) {
            (1920, 1080)
        }
    }

    pub(crate) struct FailingCapture;

    impl ScreenCapture for FailingCapture {
        fn capture(&self, _region: Region) -> Result<RgbaImage, CaptureError> {
            Err(CaptureError::Platform("no capture device".to_string()))
        }

        fn screen_size(&self) -> (i32, i32) {
            (1920, 1080)
        }
    }

    /// Pops one scripted result per call; `true` is a hit at the region
    /// origin. Falls back to hitting when the script runs dry.
    pub(crate) struct ScriptedMatcher {
        pub script: Mutex<VecDeque<bool>>,
    }

    impl ScriptedMatcher {
        pub fn new(script: &[bool]) -> Self {
            Self {
                script: Mutex::new(script.iter().copied().collect()),
            }
        }

        pub fn always_hit() -> Self {
            Self::new(&[])
        }
    }

    impl TargetMatcher for ScriptedMatcher {
        fn find(
            &self,
            _screen: &RgbaImage,
            _reference: &RgbaImage,
            region_origin: Point,
        ) -> Option<MatchHit> {
            let hit = self.script.lock().unwrap().pop_front().unwrap_or(true);
            hit.then_some(MatchHit {
                location: region_origin,
                confidence: 0.95,
            })
        }
    }

    /// Records clicks; optionally raises the stop flag after N clicks.
    pub(crate) struct RecordingPointer {
        pub clicks: Arc<Mutex<Vec<(i32, i32)>>>,
        pub stop_after: Option<(usize, Arc<AtomicBool>)>,
        last_move: Mutex<(i32, i32)>,
    }

    impl RecordingPointer {
        pub fn new() -> Self {
            Self {
                clicks: Arc::new(Mutex::new(Vec::new())),
                stop_after: None,
                last_move: Mutex::new((0, 0)),
            }
        }
    }

    impl Pointer for RecordingPointer {
        fn move_to(&self, x: i32, y: i32) {
            *self.last_move.lock().unwrap() = (x, y);
        }

        fn click(&self) {
            let mut clicks = self.clicks.lock().unwrap();
            clicks.push(*self.last_move.lock().unwrap());
            if let Some((limit, flag)) = &self.stop_after {
                if clicks.len() >= *limit {
                    flag.store(true, Ordering::SeqCst);
                }
            }
        }

        fn position(&self) -> (i32, i32) {
            *self.last_move.lock().unwrap()
        }
    }

    /// Accumulates requested sleep time without sleeping.
    pub(crate) struct VirtualClock {
        pub slept: Arc<Mutex<Duration>>,
    }

    impl VirtualClock {
        pub fn new() -> Self {
            Self {
                slept: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }
    }

    impl Clock for VirtualClock {
        fn sleep(&self, duration: Duration) {
            *self.slept.lock().unwrap() += duration;
        }
    }

    pub(crate) fn write_reference(dir: &TempDir, name: &str) -> PathBuf {
        let images = dir.path().join("images");
        std::fs::create_dir_all(&images).unwrap();
        let rel = PathBuf::from("images").join(name);
        RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]))
            .save(dir.path().join(&rel))
            .unwrap();
        rel
    }

    pub(crate) fn test_action(dir: &TempDir, name: &str, order: u32, wait: f32) -> Action {
        Action {
            name: name.to_string(),
            reference_image: write_reference(dir, &format!("{}.png", name)),
            click_point: Point::new(order as i32 * 100, order as i32 * 100 + 1),
            order,
            wait_seconds: wait,
            search_region: Some(Region::from_corners(
                Point::new(0, 0),
                Point::new(50, 50),
            )),
        }
    }

    fn fallback() -> Region {
        Region::from_corners(Point::new(0, 0), Point::new(1920, 1080))
    }

    #[test]
    fn state_display() {
        assert_eq!(format!("{}", EngineState::Idle), "Idle");
        assert_eq!(format!("{}", EngineState::Running(1)), "Running action 2");
        assert_eq!(format!("{}", EngineState::Stopped), "Stopped");
    }

    #[test]
    fn empty_scenario_stays_idle() {
        let scenario = Scenario::new("empty");
        let capture = CountingCapture { calls: Arc::new(AtomicUsize::new(0)) };
        let pointer = RecordingPointer::new();
        let matcher = ScriptedMatcher::always_hit();
        let clock = VirtualClock::new();
        let mut run = ScenarioRun::new(
            &scenario,
            PathBuf::from("."),
            fallback(),
            &capture,
            &pointer,
            &matcher,
            &clock,
            Arc::new(AtomicBool::new(false)),
        );

        assert_eq!(run.run().unwrap(), RunOutcome::NothingToRun);
        assert_eq!(run.state, EngineState::Idle);
        assert_eq!(capture.calls.load(Ordering::SeqCst), 0);
        assert!(pointer.clicks.lock().unwrap().is_empty());
    }

    #[test]
    fn clicks_in_order_and_accumulates_waits() {
        let dir = TempDir::new().unwrap();
        let mut scenario = Scenario::new("timed");
        scenario.push(test_action(&dir, "a1", 1, 0.5));
        scenario.push(test_action(&dir, "a2", 2, 1.0));
        scenario.push(test_action(&dir, "a3", 3, 2.0));

        let capture = CountingCapture { calls: Arc::new(AtomicUsize::new(0)) };
        let pointer = RecordingPointer::new();
        let matcher = ScriptedMatcher::always_hit();
        let clock = VirtualClock::new();
        let mut run = ScenarioRun::new(
            &scenario,
            dir.path().to_path_buf(),
            fallback(),
            &capture,
            &pointer,
            &matcher,
            &clock,
            Arc::new(AtomicBool::new(false)),
        );

        assert_eq!(run.run().unwrap(), RunOutcome::Completed);
        assert_eq!(run.state, EngineState::Idle);

        let clicks = pointer.clicks.lock().unwrap();
        assert_eq!(*clicks, vec![(100, 101), (200, 201), (300, 301)]);
        assert!(*clock.slept.lock().unwrap() >= Duration::from_secs_f32(3.5));
    }

    #[test]
    fn miss_holds_index_until_hit_then_clicks_once() {
        let dir = TempDir::new().unwrap();
        let mut scenario = Scenario::new("retry");
        scenario.push(test_action(&dir, "a1", 1, 0.0));
        scenario.push(test_action(&dir, "a2", 2, 0.0));
        scenario.push(test_action(&dir, "a3", 3, 0.0));

        // Action 1 hits, action 2 misses three times before hitting,
        // action 3 hits.
        let matcher = ScriptedMatcher::new(&[true, false, false, false, true, true]);
        let capture = CountingCapture { calls: Arc::new(AtomicUsize::new(0)) };
        let pointer = RecordingPointer::new();
        let clock = VirtualClock::new();
        let mut run = ScenarioRun::new(
            &scenario,
            dir.path().to_path_buf(),
            fallback(),
            &capture,
            &pointer,
            &matcher,
            &clock,
            Arc::new(AtomicBool::new(false)),
        );

        assert_eq!(run.run().unwrap(), RunOutcome::Completed);

        // Exactly one click per action, in order; misses only added backoff.
        let clicks = pointer.clicks.lock().unwrap();
        assert_eq!(*clicks, vec![(100, 101), (200, 201), (300, 301)]);
        assert_eq!(capture.calls.load(Ordering::SeqCst), 6);
        assert_eq!(*clock.slept.lock().unwrap(), RETRY_BACKOFF * 3);
    }

    #[test]
    fn stop_prevents_further_capture_and_clicks() {
        let dir = TempDir::new().unwrap();
        let mut scenario = Scenario::new("stoppable");
        for i in 1..=5 {
            scenario.push(test_action(&dir, &format!("a{}", i), i, 0.0));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let capture = CountingCapture { calls: Arc::new(AtomicUsize::new(0)) };
        let mut pointer = RecordingPointer::new();
        pointer.stop_after = Some((2, stop.clone()));
        let matcher = ScriptedMatcher::always_hit();
        let clock = VirtualClock::new();
        let mut run = ScenarioRun::new(
            &scenario,
            dir.path().to_path_buf(),
            fallback(),
            &capture,
            &pointer,
            &matcher,
            &clock,
            stop,
        );

        assert_eq!(run.run().unwrap(), RunOutcome::Stopped);
        assert_eq!(run.state, EngineState::Stopped);
        assert_eq!(pointer.clicks.lock().unwrap().len(), 2);
        assert_eq!(capture.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn capture_failure_aborts_to_stopped() {
        let dir = TempDir::new().unwrap();
        let mut scenario = Scenario::new("broken");
        scenario.push(test_action(&dir, "a1", 1, 0.0));

        let capture = FailingCapture;
        let pointer = RecordingPointer::new();
        let matcher = ScriptedMatcher::always_hit();
        let clock = VirtualClock::new();
        let mut run = ScenarioRun::new(
            &scenario,
            dir.path().to_path_buf(),
            fallback(),
            &capture,
            &pointer,
            &matcher,
            &clock,
            Arc::new(AtomicBool::new(false)),
        );

        assert!(matches!(run.run(), Err(StepError::Capture(_))));
        assert_eq!(run.state, EngineState::Stopped);
        assert!(pointer.clicks.lock().unwrap().is_empty());
    }

    #[test]
    fn unreadable_reference_aborts_before_any_click() {
        let dir = TempDir::new().unwrap();
        let mut scenario = Scenario::new("badref");
        let mut action = test_action(&dir, "a1", 1, 0.0);
        action.reference_image = PathBuf::from("images/does_not_exist.png");
        scenario.push(action);

        let capture = CountingCapture { calls: Arc::new(AtomicUsize::new(0)) };
        let pointer = RecordingPointer::new();
        let matcher = ScriptedMatcher::always_hit();
        let clock = VirtualClock::new();
        let mut run = ScenarioRun::new(
            &scenario,
            dir.path().to_path_buf(),
            fallback(),
            &capture,
            &pointer,
            &matcher,
            &clock,
            Arc::new(AtomicBool::new(false)),
        );

        assert!(matches!(run.run(), Err(StepError::Reference { .. })));
        assert_eq!(run.state, EngineState::Stopped);
        assert_eq!(capture.calls.load(Ordering::SeqCst), 0);
        assert!(pointer.clicks.lock().unwrap().is_empty());
    }
}
