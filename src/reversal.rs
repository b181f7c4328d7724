//! Horizontal direction reversals within a stroke.
//!
//! Steps no larger than the jitter threshold are neutral: they neither
//! confirm nor break the current direction, so a stroke may coast through
//! jitter without picking up reversals.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::stroke::StrokeEvent;
use crate::util::mean;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(into = "i8", try_from = "i8")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Left,
    Neutral,
    Right,
}

impl Direction {
    pub fn classify(dx: f64, jitter_threshold: f64) -> Self {
        if dx > jitter_threshold {
            Direction::Right
        } else if dx < -jitter_threshold {
            Direction::Left
        } else {
            Direction::Neutral
        }
    }

    pub fn sign(&self) -> i8 {
        match self {
            Direction::Left => -1,
            Direction::Neutral => 0,
            Direction::Right => 1,
        }
    }
}

impl From<Direction> for i8 {
    fn from(d: Direction) -> Self {
        d.sign()
    }
}

impl TryFrom<i8> for Direction {
    type Error = String;

    fn try_from(v: i8) -> Result<Self, Self::Error> {
        match v {
            -1 => Ok(Direction::Left),
            0 => Ok(Direction::Neutral),
            1 => Ok(Direction::Right),
            other => Err(format!("direction must be -1, 0 or 1, got {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReversalConfig {
    /// Horizontal steps with `|dx|` at or below this are jitter.
    pub jitter_threshold: f64,
}

impl Default for ReversalConfig {
    fn default() -> Self {
        Self {
            jitter_threshold: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalResult {
    pub has_reversal: bool,
    pub initial_dir: Direction,
    pub reversal_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ReversalAnalyzer {
    pub config: ReversalConfig,
}

impl ReversalAnalyzer {
    pub fn new(config: ReversalConfig) -> Self {
        Self { config }
    }

    pub fn classify_steps(&self, stroke: &[StrokeEvent]) -> Vec<Direction> {
        stroke
            .iter()
            .tuple_windows()
            .map(|(a, b)| Direction::classify(b.x - a.x, self.config.jitter_threshold))
            .collect()
    }

    /// `None` for strokes with fewer than two events.
    pub fn analyze(&self, stroke: &[StrokeEvent]) -> Option<ReversalResult> {
        if stroke.len() < 2 {
            return None;
        }

        let steps = self.classify_steps(stroke);
        Some(count_reversals(&steps))
    }
}

pub fn count_reversals(steps: &[Direction]) -> ReversalResult {
    let mut clear = steps.iter().copied().filter(|d| *d != Direction::Neutral);

    let Some(initial_dir) = clear.next() else {
        return ReversalResult {
            has_reversal: false,
            initial_dir: Direction::Neutral,
            reversal_count: 0,
        };
    };

    let mut current = initial_dir;
    let mut reversal_count = 0;
    for d in clear {
        if d != current {
            reversal_count += 1;
            current = d;
        }
    }

    ReversalResult {
        has_reversal: reversal_count > 0,
        initial_dir,
        reversal_count,
    }
}

/// Share of strokes with a reversal among those that started in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DirectionBreakdown {
    pub strokes: usize,
    pub with_reversal: usize,
    pub fraction: f64,
}

impl DirectionBreakdown {
    fn from_results<'a>(results: impl Iterator<Item = &'a ReversalResult>) -> Self {
        let (strokes, with_reversal) = results.fold((0, 0), |(n, r), res| {
            (n + 1, r + usize::from(res.has_reversal))
        });
        Self {
            strokes,
            with_reversal,
            fraction: if strokes == 0 {
                0.0
            } else {
                with_reversal as f64 / strokes as f64
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ReversalSummary {
    pub total: DirectionBreakdown,
    pub starting_right: DirectionBreakdown,
    pub starting_left: DirectionBreakdown,
    pub mean_reversals: f64,
}

impl ReversalSummary {
    pub fn from_results(results: &[ReversalResult]) -> Self {
        let counts: Vec<f64> = results.iter().map(|r| r.reversal_count as f64).collect();

        Self {
            total: DirectionBreakdown::from_results(results.iter()),
            starting_right: DirectionBreakdown::from_results(
                results.iter().filter(|r| r.initial_dir == Direction::Right),
            ),
            starting_left: DirectionBreakdown::from_results(
                results.iter().filter(|r| r.initial_dir == Direction::Left),
            ),
            mean_reversals: mean(&counts).unwrap_or(0.0),
        }
    }
}
