//! Interactive action recording.
//!
//! A session collects one action through three coordinate designations
//! (delivered by the hotkey layer with the cursor position), captures the
//! reference image between the second and third, and persists the whole
//! scenario when the action completes. Cancelling at any point discards
//! the pending action, including an already-written reference image, and
//! leaves the stored scenario untouched.

use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::Local;

use crate::capture::ScreenCapture;
use crate::engine::runner;
use crate::input::Pointer;
use crate::recorder::state::{PendingAction, RecordStep};
use crate::scenario::model::{Action, Point, Region, Scenario};
use crate::scenario::store::{ScenarioStore, StoreError};

/// Active recording session, if any. Driven from the hotkey layer.
static RECORDER: Mutex<Option<RecorderSession>> = Mutex::new(None);

pub struct RecorderSession {
    scenario: Scenario,
    store: ScenarioStore,
    step: RecordStep,
    pending: PendingAction,
    wait_seconds: f32,
    capture: Box<dyn ScreenCapture + Send>,
    pointer: Box<dyn Pointer + Send>,
}

impl RecorderSession {
    /// Opens a session against `store`. An existing scenario of the given
    /// name is extended; a missing name starts a fresh one; `None` starts
    /// a fresh timestamped scenario.
    pub fn start(
        store: ScenarioStore,
        name: Option<&str>,
        wait_seconds: f32,
        capture: Box<dyn ScreenCapture + Send>,
        pointer: Box<dyn Pointer + Send>,
    ) -> Result<Self> {
        let scenario = match name {
            Some(name) => match store.load(name) {
                Ok(scenario) => scenario,
                Err(StoreError::NotFound(_)) => Scenario::new(name),
                Err(e) => return Err(e.into()),
            },
            None => Scenario::new(
                Local::now()
                    .format("Scenario_%Y%m%d_%H%M%S")
                    .to_string(),
            ),
        };

        crate::log(&format!(
            "Recording action {} for scenario `{}`",
            scenario.next_order(),
            scenario.name
        ));
        crate::log(RecordStep::RegionFirstCorner.description());

        Ok(Self {
            scenario,
            store,
            step: RecordStep::RegionFirstCorner,
            pending: PendingAction::default(),
            wait_seconds,
            capture,
            pointer,
        })
    }

    pub fn step(&self) -> &RecordStep {
        &self.step
    }

    /// Feeds one coordinate-designation event into the workflow and
    /// returns the step the session moved to.
    pub fn designate(&mut self, point: Point) -> Result<RecordStep> {
        match self.step {
            RecordStep::RegionFirstCorner => {
                self.pending.first_corner = Some(point);
                self.step = RecordStep::RegionSecondCorner;
            }
            RecordStep::RegionSecondCorner => {
                let first = self
                    .pending
                    .first_corner
                    .ok_or_else(|| anyhow!("first corner missing"))?;
                let region = Region::from_corners(first, point);
                self.capture_reference(region)?;
                self.step = RecordStep::ClickPoint;
            }
            RecordStep::ClickPoint => {
                self.pending.click_point = Some(point);
                self.finish()?;
                self.step = RecordStep::Complete;
            }
            RecordStep::Complete => {}
        }

        if self.step != RecordStep::Complete {
            crate::log(&format!(
                "Step {}/{}: {}",
                self.step.step_number(),
                RecordStep::total_steps(),
                self.step.description()
            ));
        }
        Ok(self.step.clone())
    }

    /// Captures the designated region and writes it as the reference image.
    ///
    /// The pointer is parked at the far screen corner first so cursor
    /// pixels never end up in the reference, then restored.
    fn capture_reference(&mut self, region: Region) -> Result<()> {
        self.pending.region = Some(region);

        let original = self.pointer.position();
        let (screen_w, screen_h) = self.capture.screen_size();
        self.pointer.move_to(screen_w - 1, screen_h - 1);
        let frame = self.capture.capture(region);
        self.pointer.move_to(original.0, original.1);
        let frame = frame?;

        let rel = ScenarioStore::image_rel_path(&self.scenario.name, self.scenario.next_order());
        frame.save(self.store.resolve_image(&rel))?;
        crate::log(&format!(
            "Reference image saved: {} ({}x{})",
            rel.display(),
            region.width(),
            region.height()
        ));
        self.pending.reference_image = Some(rel);
        Ok(())
    }

    /// Appends the completed action and persists the whole scenario.
    fn finish(&mut self) -> Result<()> {
        let region = self
            .pending
            .region
            .ok_or_else(|| anyhow!("search region missing"))?;
        let reference_image = self
            .pending
            .reference_image
            .clone()
            .ok_or_else(|| anyhow!("reference image missing"))?;
        let click_point = self
            .pending
            .click_point
            .ok_or_else(|| anyhow!("click point missing"))?;

        let order = self.scenario.next_order();
        self.scenario.push(Action {
            name: format!("Action_{}", order),
            reference_image,
            click_point,
            order,
            wait_seconds: self.wait_seconds,
            search_region: Some(region),
        });
        self.store.save(&self.scenario)?;
        crate::log(&format!(
            "Action {} recorded; scenario `{}` saved",
            order, self.scenario.name
        ));
        Ok(())
    }

    /// Discards the pending action, removing an already-written reference
    /// image. The stored scenario is untouched.
    fn discard(&mut self) {
        if let Some(rel) = self.pending.reference_image.take() {
            if let Err(e) = self.store.remove_image(&rel) {
                crate::log(&format!(
                    "Could not remove reference image {}: {}",
                    rel.display(),
                    e
                ));
            }
        }
        self.pending = PendingAction::default();
    }
}

/// Returns true while a recording session is active.
pub fn is_recording() -> bool {
    RECORDER.lock().unwrap().is_some()
}

/// Starts a recording session using the platform capture and input
/// sources. Fails while a run is active.
#[cfg(target_os = "windows")]
pub fn start_recording(scenario_name: Option<&str>) -> Result<()> {
    use crate::capture::GdiCapture;
    use crate::input::SendInputPointer;

    if is_recording() {
        crate::log("Recording already in progress");
        return Ok(());
    }

    runner::begin_recording()?;

    let result = ScenarioStore::open(crate::paths::get_scenarios_dir())
        .map_err(anyhow::Error::from)
        .and_then(|store| {
            RecorderSession::start(
                store,
                scenario_name,
                crate::config::get_config().default_wait_seconds,
                Box::new(GdiCapture),
                Box::new(SendInputPointer),
            )
        });

    match result {
        Ok(session) => {
            *RECORDER.lock().unwrap() = Some(session);
            Ok(())
        }
        Err(e) => {
            runner::end_recording();
            Err(e)
        }
    }
}

/// Delivers a coordinate-designation event to the active session.
/// No-op when nothing is recording.
pub fn designate(point: Point) -> Result<()> {
    let mut guard = RECORDER.lock().unwrap();
    let Some(session) = guard.as_mut() else {
        return Ok(());
    };

    match session.designate(point) {
        Ok(RecordStep::Complete) => {
            guard.take();
            drop(guard);
            runner::end_recording();
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(e) => {
            // A failed capture or save ends the session; a half-recorded
            // action must not linger.
            if let Some(mut session) = guard.take() {
                session.discard();
            }
            drop(guard);
            runner::end_recording();
            Err(e)
        }
    }
}

/// Cancels the active session, discarding the pending action.
pub fn cancel() {
    let session = RECORDER.lock().unwrap().take();
    if let Some(mut session) = session {
        session.discard();
        runner::end_recording();
        crate::log("Recording cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureError;
    use image::{Rgba, RgbaImage};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Shared event journal so tests can assert pointer/capture ordering.
    type Journal = Arc<Mutex<Vec<String>>>;

    struct JournalCapture {
        journal: Journal,
    }

    impl ScreenCapture for JournalCapture {
        fn capture(&self, region: Region) -> Result<RgbaImage, CaptureError> {
            self.journal.lock().unwrap().push(format!(
                "capture({},{},{},{})",
                region.x1, region.y1, region.x2, region.y2
            ));
            Ok(RgbaImage::from_pixel(
                region.width(),
                region.height(),
                Rgba([7, 7, 7, 255]),
            ))
        }

        fn screen_size(&self) -> (i32, i32) {
            (1920, 1080)
        }
    }

    struct JournalPointer {
        journal: Journal,
        position: Mutex<(i32, i32)>,
    }

    impl Pointer for JournalPointer {
        fn move_to(&self, x: i32, y: i32) {
            *self.position.lock().unwrap() = (x, y);
            self.journal.lock().unwrap().push(format!("move({},{})", x, y));
        }

        fn click(&self) {
            self.journal.lock().unwrap().push("click".to_string());
        }

        fn position(&self) -> (i32, i32) {
            *self.position.lock().unwrap()
        }
    }

    fn session_with_journal(
        dir: &TempDir,
        name: Option<&str>,
        journal: &Journal,
    ) -> RecorderSession {
        let store = ScenarioStore::open(dir.path()).unwrap();
        RecorderSession::start(
            store,
            name,
            1.0,
            Box::new(JournalCapture {
                journal: journal.clone(),
            }),
            Box::new(JournalPointer {
                journal: journal.clone(),
                position: Mutex::new((333, 444)),
            }),
        )
        .unwrap()
    }

    #[test]
    fn full_workflow_records_one_action() {
        let dir = TempDir::new().unwrap();
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut session = session_with_journal(&dir, Some("demo"), &journal);

        // Corners given in reverse order on purpose.
        assert_eq!(
            session.designate(Point::new(400, 300)).unwrap(),
            RecordStep::RegionSecondCorner
        );
        assert_eq!(
            session.designate(Point::new(100, 80)).unwrap(),
            RecordStep::ClickPoint
        );
        assert_eq!(
            session.designate(Point::new(250, 190)).unwrap(),
            RecordStep::Complete
        );

        let store = ScenarioStore::open(dir.path()).unwrap();
        let saved = store.load("demo").unwrap();
        assert_eq!(saved.actions.len(), 1);
        let action = &saved.actions[0];
        assert_eq!(action.order, 1);
        assert_eq!(action.click_point, Point::new(250, 190));
        assert_eq!(
            action.search_region,
            Some(Region::from_corners(Point::new(100, 80), Point::new(400, 300)))
        );
        assert!(store.resolve_image(&action.reference_image).exists());
    }

    #[test]
    fn pointer_is_parked_before_capture_and_restored() {
        let dir = TempDir::new().unwrap();
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut session = session_with_journal(&dir, Some("demo"), &journal);

        session.designate(Point::new(0, 0)).unwrap();
        session.designate(Point::new(50, 50)).unwrap();

        let events = journal.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "move(1919,1079)".to_string(),
                "capture(0,0,50,50)".to_string(),
                "move(333,444)".to_string(),
            ]
        );
    }

    #[test]
    fn cancel_removes_reference_image_and_leaves_store_empty() {
        let dir = TempDir::new().unwrap();
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut session = session_with_journal(&dir, Some("demo"), &journal);

        session.designate(Point::new(0, 0)).unwrap();
        session.designate(Point::new(50, 50)).unwrap();

        let store = ScenarioStore::open(dir.path()).unwrap();
        let image = store.resolve_image(&ScenarioStore::image_rel_path("demo", 1));
        assert!(image.exists());

        session.discard();
        assert!(!image.exists());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn appends_to_existing_scenario_with_next_order() {
        let dir = TempDir::new().unwrap();
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));

        // Record the first action.
        let mut session = session_with_journal(&dir, Some("demo"), &journal);
        session.designate(Point::new(0, 0)).unwrap();
        session.designate(Point::new(20, 20)).unwrap();
        session.designate(Point::new(10, 10)).unwrap();

        // Record a second one against the persisted scenario.
        let mut session = session_with_journal(&dir, Some("demo"), &journal);
        session.designate(Point::new(30, 30)).unwrap();
        session.designate(Point::new(60, 60)).unwrap();
        session.designate(Point::new(45, 45)).unwrap();

        let store = ScenarioStore::open(dir.path()).unwrap();
        let saved = store.load("demo").unwrap();
        let orders: Vec<u32> = saved.actions_in_order().iter().map(|a| a.order).collect();
        assert_eq!(orders, vec![1, 2]);
        assert!(store
            .resolve_image(&ScenarioStore::image_rel_path("demo", 2))
            .exists());
    }
}
