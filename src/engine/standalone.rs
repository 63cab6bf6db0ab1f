//! Continuous single-target detect-and-click loop.
//!
//! Bound to exactly one target configuration. Each cycle captures the
//! region, correlates, clicks on a hit, and sleeps; a miss just skips the
//! click. The loop runs until the stop flag is raised. Scenario runs and
//! this loop are mutually exclusive; the runner enforces that.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;

use crate::capture::ScreenCapture;
use crate::engine::clock::Clock;
use crate::engine::matcher::TargetMatcher;
use crate::engine::state::StepError;
use crate::input::Pointer;
use crate::scenario::model::{Point, Region};

/// Fixed delay between detection cycles.
pub const CYCLE_DELAY: Duration = Duration::from_millis(500);

/// The single action-equivalent configuration the loop watches.
pub struct StandaloneTarget {
    pub reference: RgbaImage,
    pub region: Region,
    pub click_point: Point,
}

pub struct StandaloneRun<'a> {
    target: StandaloneTarget,
    capture: &'a dyn ScreenCapture,
    pointer: &'a dyn Pointer,
    matcher: &'a dyn TargetMatcher,
    clock: &'a dyn Clock,
    stop: Arc<AtomicBool>,
}

impl<'a> StandaloneRun<'a> {
    pub fn new(
        target: StandaloneTarget,
        capture: &'a dyn ScreenCapture,
        pointer: &'a dyn Pointer,
        matcher: &'a dyn TargetMatcher,
        clock: &'a dyn Clock,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            target,
            capture,
            pointer,
            matcher,
            clock,
            stop,
        }
    }

    /// Cycles until stopped. Capture failure is fatal, as in scenario mode.
    pub fn run(&mut self) -> Result<(), StepError> {
        crate::log("Standalone detection loop started");
        loop {
            if self.stop.load(Ordering::SeqCst) {
                crate::log("Standalone detection loop stopped");
                return Ok(());
            }

            let frame = self.capture.capture(self.target.region)?;
            if let Some(hit) =
                self.matcher
                    .find(&frame, &self.target.reference, self.target.region.top_left())
            {
                crate::log(&format!(
                    "Target matched at ({}, {}) with confidence {:.3}",
                    hit.location.x, hit.location.y, hit.confidence
                ));
                self.pointer
                    .move_to(self.target.click_point.x, self.target.click_point.y);
                self.pointer.click();
            }

            self.clock.sleep(CYCLE_DELAY);
        }
    }
}
