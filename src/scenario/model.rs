//! Scenario data model.
//!
//! A scenario is a named, ordered list of detect-and-click actions. Execution
//! order is carried by each action's `order` field, not by list position;
//! `order` values stay a contiguous 1..N permutation across every mutation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A point in absolute screen coordinates.
///
/// Serialized as a two-element array `[x, y]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl From<Point> for (i32, i32) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

/// A screen rectangle with `x1 < x2` and `y1 < y2`.
///
/// Serialized as a four-element array `[x1, y1, x2, y2]`. Construction
/// normalizes the corners, so the invariant holds for any input order,
/// including documents read back from disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(i32, i32, i32, i32)", into = "(i32, i32, i32, i32)")]
pub struct Region {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Region {
    /// Builds a region from two opposing corners given in any order.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x1: a.x.min(b.x),
            y1: a.y.min(b.y),
            x2: a.x.max(b.x),
            y2: a.y.max(b.y),
        }
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.x1, self.y1)
    }

    pub fn width(&self) -> u32 {
        (self.x2 - self.x1) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y2 - self.y1) as u32
    }
}

impl From<(i32, i32, i32, i32)> for Region {
    fn from((x1, y1, x2, y2): (i32, i32, i32, i32)) -> Self {
        Self::from_corners(Point::new(x1, y1), Point::new(x2, y2))
    }
}

impl From<Region> for (i32, i32, i32, i32) {
    fn from(r: Region) -> Self {
        (r.x1, r.y1, r.x2, r.y2)
    }
}

fn default_wait_seconds() -> f32 {
    1.0
}

/// One recorded detect-and-click step.
///
/// `reference_image` is stored relative to the scenario store root
/// (e.g. `images/daily_action_1.png`). A `None` search region means the
/// caller of the engine supplies the region to scan; the engine never
/// widens to the full screen on its own.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub reference_image: PathBuf,
    pub click_point: Point,
    pub order: u32,
    #[serde(default = "default_wait_seconds")]
    pub wait_seconds: f32,
    #[serde(default)]
    pub search_region: Option<Region>,
}

/// A named, ordered sequence of actions executed as a unit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub actions: Vec<Action>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Order value for the next appended action.
    pub fn next_order(&self) -> u32 {
        self.actions.len() as u32 + 1
    }

    /// Indices into `actions` sorted by `order`.
    fn sorted_positions(&self) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..self.actions.len()).collect();
        idx.sort_by_key(|&i| self.actions[i].order);
        idx
    }

    /// Actions in execution order, regardless of list position.
    pub fn actions_in_order(&self) -> Vec<&Action> {
        self.sorted_positions()
            .into_iter()
            .map(|i| &self.actions[i])
            .collect()
    }

    /// Appends an action. The caller is responsible for assigning `order`
    /// (the recorder uses `next_order`).
    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Swaps the action at sorted position `index` with its predecessor.
    /// No-op at the top of the sequence; returns whether anything changed.
    pub fn move_up(&mut self, index: usize) -> bool {
        if index == 0 {
            return false;
        }
        let pos = self.sorted_positions();
        if index >= pos.len() {
            return false;
        }
        self.swap_orders(pos[index - 1], pos[index]);
        true
    }

    /// Swaps the action at sorted position `index` with its successor.
    /// No-op at the bottom of the sequence; returns whether anything changed.
    pub fn move_down(&mut self, index: usize) -> bool {
        let pos = self.sorted_positions();
        if index + 1 >= pos.len() {
            return false;
        }
        self.swap_orders(pos[index], pos[index + 1]);
        true
    }

    fn swap_orders(&mut self, a: usize, b: usize) {
        let tmp = self.actions[a].order;
        self.actions[a].order = self.actions[b].order;
        self.actions[b].order = tmp;
    }

    /// Removes the action at sorted position `index` and renumbers the rest
    /// to a contiguous 1..N-1. Returns the removed action so the caller can
    /// release its reference image.
    pub fn remove(&mut self, index: usize) -> Option<Action> {
        let pos = self.sorted_positions();
        if index >= pos.len() {
            return None;
        }
        let removed = self.actions.remove(pos[index]);
        self.renumber();
        Some(removed)
    }

    fn renumber(&mut self) {
        for (seq, i) in self.sorted_positions().into_iter().enumerate() {
            self.actions[i].order = (seq + 1) as u32;
        }
    }
}
