//! Blink, fixation and saccade classification over per-frame gaze data.
//!
//! The fixation and saccade thresholds leave a dead zone between them:
//! a frame whose gaze velocity lies in `[fixation_threshold, saccade_threshold]`
//! is neither. That band is intentional and must not be closed.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::util::{mean, percent};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const CENTER: Point = Point { x: 0.5, y: 0.5 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Thresholds for the state classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    /// Gaze velocity above which a frame is a saccade (normalized units per frame).
    pub saccade_threshold: f64,
    /// Gaze velocity below which a frame is part of a fixation.
    pub fixation_threshold: f64,
    /// Frames in the trailing blink-rate window (30 is about one second at 30 fps).
    pub blink_rate_window: usize,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            saccade_threshold: 0.01,
            fixation_threshold: 0.002,
            blink_rate_window: 30,
        }
    }
}

/// Eye-aspect-ratio calibration, tuned per capture device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpennessConfig {
    /// Aspect ratio that counts as a fully open eye.
    pub aspect_ratio_scale: f64,
    /// Openness below which an eye is considered closed.
    pub blink_threshold: f64,
}

impl Default for OpennessConfig {
    fn default() -> Self {
        Self {
            aspect_ratio_scale: 0.3,
            blink_threshold: 0.2,
        }
    }
}

impl OpennessConfig {
    /// Openness in `[0, 1]` from six eye-contour landmarks.
    ///
    /// Points 1 and 5 span the lid vertically, 0 and 3 are the corners.
    pub fn eye_openness(&self, contour: &[Point; 6]) -> f64 {
        let vertical = contour[1].distance(&contour[5]);
        let horizontal = contour[0].distance(&contour[3]);
        let ratio = vertical / (horizontal + 1e-6);

        (ratio / self.aspect_ratio_scale).clamp(0.0, 1.0)
    }

    pub fn is_blinking(&self, left_openness: f64, right_openness: f64) -> bool {
        left_openness < self.blink_threshold || right_openness < self.blink_threshold
    }
}

/// Mean of the iris landmarks, `None` without any finite point.
pub fn pupil_position(iris: &[Point]) -> Option<Point> {
    let points: Vec<&Point> = iris.iter().filter(|p| p.is_finite()).collect();
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    Some(Point {
        x: points.iter().map(|p| p.x).sum::<f64>() / n,
        y: points.iter().map(|p| p.y).sum::<f64>() / n,
    })
}

pub fn estimate_gaze(left_pupil: Point, right_pupil: Point) -> Point {
    Point {
        x: (left_pupil.x + right_pupil.x) / 2.0,
        y: (left_pupil.y + right_pupil.y) / 2.0,
    }
}

/// Per-frame landmarks handed over by the face-mesh detector, normalized to `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks {
    pub left_eye: [Point; 6],
    pub right_eye: [Point; 6],
    pub left_iris: Vec<Point>,
    pub right_iris: Vec<Point>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeFrame {
    pub timestamp: f64,
    pub frame_number: u64,
    pub left_openness: f64,
    pub right_openness: f64,
    pub left_pupil: Point,
    pub right_pupil: Point,
    pub gaze: Option<Point>,
    pub is_blinking: bool,
}

impl GazeFrame {
    pub fn from_landmarks(
        timestamp: f64,
        frame_number: u64,
        landmarks: &FaceLandmarks,
        openness: &OpennessConfig,
    ) -> Self {
        let left_openness = openness.eye_openness(&landmarks.left_eye);
        let right_openness = openness.eye_openness(&landmarks.right_eye);

        let left = pupil_position(&landmarks.left_iris);
        let right = pupil_position(&landmarks.right_iris);
        let gaze = match (left, right) {
            (Some(l), Some(r)) => Some(estimate_gaze(l, r)),
            _ => None,
        };

        Self {
            timestamp,
            frame_number,
            left_openness,
            right_openness,
            left_pupil: left.unwrap_or(Point::CENTER),
            right_pupil: right.unwrap_or(Point::CENTER),
            gaze,
            is_blinking: openness.is_blinking(left_openness, right_openness),
        }
    }

    /// Placeholder for a frame where no face was detected.
    pub fn no_face(timestamp: f64, frame_number: u64) -> Self {
        Self {
            timestamp,
            frame_number,
            left_openness: 0.0,
            right_openness: 0.0,
            left_pupil: Point::CENTER,
            right_pupil: Point::CENTER,
            gaze: None,
            is_blinking: false,
        }
    }
}

/// A frame plus its derived blink and fixation state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeState {
    pub frame: GazeFrame,
    /// Rising edge of `is_blinking`.
    pub blink_event: bool,
    pub blink_count: u32,
    /// Blink events within the trailing window ending at this frame.
    pub blink_rate: u32,
    /// `None` on the first frame and next to frames without gaze.
    pub gaze_velocity: Option<f64>,
    pub is_saccade: bool,
    pub is_fixation: bool,
    /// Run id of the `is_fixation` signal; non-fixation runs get ids too.
    pub fixation_group_id: u32,
    /// Frames in this fixation run, 0 outside fixations.
    pub fixation_duration: u32,
}

/// Fixed-capacity trailing sum over the last `capacity` values.
#[derive(Debug)]
struct WindowSum {
    values: VecDeque<u32>,
    capacity: usize,
    sum: u32,
}

impl WindowSum {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0,
        }
    }

    fn push(&mut self, value: u32) -> u32 {
        if self.values.len() == self.capacity {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
        self.sum
    }
}

#[derive(Debug, Clone, Default)]
pub struct GazeStateClassifier {
    pub config: GazeConfig,
    pub openness: OpennessConfig,
}

impl GazeStateClassifier {
    pub fn new(config: GazeConfig, openness: OpennessConfig) -> Self {
        Self { config, openness }
    }

    pub fn frame_from_landmarks(
        &self,
        timestamp: f64,
        frame_number: u64,
        landmarks: &FaceLandmarks,
    ) -> GazeFrame {
        GazeFrame::from_landmarks(timestamp, frame_number, landmarks, &self.openness)
    }

    /// Recompute `is_blinking` from the stored openness with this classifier's threshold.
    pub fn relabel_blinks(&self, frames: &[GazeFrame]) -> Vec<GazeFrame> {
        frames
            .iter()
            .map(|f| GazeFrame {
                is_blinking: self
                    .openness
                    .is_blinking(f.left_openness, f.right_openness),
                ..*f
            })
            .collect()
    }

    pub fn classify(&self, frames: &[GazeFrame]) -> Vec<GazeState> {
        if frames.is_empty() {
            debug!("no gaze frames to classify");
            return Vec::new();
        }

        let mut window = WindowSum::new(self.config.blink_rate_window);
        let mut states = Vec::with_capacity(frames.len());
        let mut blink_count = 0;
        let mut previous: Option<&GazeFrame> = None;

        for frame in frames {
            let blink_event = previous.is_some_and(|p| !p.is_blinking) && frame.is_blinking;
            if blink_event {
                blink_count += 1;
            }
            let blink_rate = window.push(u32::from(blink_event));

            let gaze_velocity = previous.and_then(|p| gaze_step(p, frame));
            let is_saccade = gaze_velocity.is_some_and(|v| v > self.config.saccade_threshold);
            let is_fixation = gaze_velocity.is_some_and(|v| v < self.config.fixation_threshold);

            states.push(GazeState {
                frame: *frame,
                blink_event,
                blink_count,
                blink_rate,
                gaze_velocity,
                is_saccade,
                is_fixation,
                fixation_group_id: 0,
                fixation_duration: 0,
            });
            previous = Some(frame);
        }

        assign_fixation_groups(&mut states);
        states
    }
}

fn gaze_step(previous: &GazeFrame, current: &GazeFrame) -> Option<f64> {
    match (previous.gaze, current.gaze) {
        (Some(a), Some(b)) if a.is_finite() && b.is_finite() => Some(a.distance(&b)),
        _ => None,
    }
}

/// Run-length scan over `is_fixation`: a new group starts whenever the flag flips.
fn assign_fixation_groups(states: &mut [GazeState]) {
    let mut start = 0;
    let mut group_id = 0;

    while start < states.len() {
        let flag = states[start].is_fixation;
        let end = states[start..]
            .iter()
            .position(|s| s.is_fixation != flag)
            .map_or(states.len(), |offset| start + offset);

        group_id += 1;
        let duration = if flag { (end - start) as u32 } else { 0 };
        for state in &mut states[start..end] {
            state.fixation_group_id = group_id;
            state.fixation_duration = duration;
        }
        start = end;
    }
}

/// Session-level view of a classified gaze recording.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GazeSummary {
    pub total_frames: usize,
    pub duration_sec: f64,
    pub total_blinks: u32,
    pub mean_blink_rate: f64,
    pub saccade_pct: f64,
    pub fixation_pct: f64,
    pub fixation_count: usize,
    pub mean_fixation_frames: f64,
}

impl GazeSummary {
    pub fn from_states(states: &[GazeState]) -> Self {
        if states.is_empty() {
            return Self::default();
        }

        let rates: Vec<f64> = states.iter().map(|s| s.blink_rate as f64).collect();
        let fixation_runs: Vec<f64> = states
            .iter()
            .filter(|s| s.is_fixation)
            .map(|s| (s.fixation_group_id, s.fixation_duration))
            .collect::<std::collections::BTreeMap<_, _>>()
            .into_values()
            .map(f64::from)
            .collect();

        Self {
            total_frames: states.len(),
            duration_sec: states
                .iter()
                .map(|s| s.frame.timestamp)
                .fold(0.0, f64::max),
            total_blinks: states.last().map_or(0, |s| s.blink_count),
            mean_blink_rate: mean(&rates).unwrap_or(0.0),
            saccade_pct: percent(states.iter().filter(|s| s.is_saccade).count(), states.len()),
            fixation_pct: percent(states.iter().filter(|s| s.is_fixation).count(), states.len()),
            fixation_count: fixation_runs.len(),
            mean_fixation_frames: mean(&fixation_runs).unwrap_or(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(i: u64, gaze: Option<(f64, f64)>, blinking: bool) -> GazeFrame {
        GazeFrame {
            timestamp: i as f64 / 30.0,
            frame_number: i,
            left_openness: if blinking { 0.1 } else { 0.8 },
            right_openness: if blinking { 0.1 } else { 0.8 },
            left_pupil: Point::CENTER,
            right_pupil: Point::CENTER,
            gaze: gaze.map(|(x, y)| Point::new(x, y)),
            is_blinking: blinking,
        }
    }

    /// Frames whose successive horizontal steps equal `steps`.
    fn frames_with_steps(steps: &[f64]) -> Vec<GazeFrame> {
        let mut x = 0.5;
        let mut frames = vec![frame(0, Some((x, 0.5)), false)];
        for (i, step) in steps.iter().enumerate() {
            x += step;
            frames.push(frame(i as u64 + 1, Some((x, 0.5)), false));
        }
        frames
    }

    #[test]
    fn dead_zone_is_neither_fixation_nor_saccade() {
        let frames = frames_with_steps(&[0.001, 0.015, 0.005, 0.0005]);
        let states = GazeStateClassifier::default().classify(&frames);

        let fixation: Vec<bool> = states.iter().map(|s| s.is_fixation).collect();
        let saccade: Vec<bool> = states.iter().map(|s| s.is_saccade).collect();
        assert_eq!(fixation, vec![false, true, false, false, true]);
        assert_eq!(saccade, vec![false, false, true, false, false]);
        assert!(states[0].gaze_velocity.is_none());

        // two single-frame fixation runs at 1 and 4
        assert_eq!(states[1].fixation_duration, 1);
        assert_eq!(states[4].fixation_duration, 1);
        assert_ne!(states[1].fixation_group_id, states[4].fixation_group_id);
        assert_eq!(states[2].fixation_duration, 0);
        assert_eq!(states[3].fixation_duration, 0);
        assert_eq!(states[2].fixation_group_id, states[3].fixation_group_id);
    }

    #[test]
    fn fixation_run_duration_is_run_length() {
        let frames = frames_with_steps(&[0.02, 0.0, 0.0, 0.0, 0.02]);
        let states = GazeStateClassifier::default().classify(&frames);

        let durations: Vec<u32> = states.iter().map(|s| s.fixation_duration).collect();
        assert_eq!(durations, vec![0, 0, 3, 3, 3, 0]);
        let groups: Vec<u32> = states.iter().map(|s| s.fixation_group_id).collect();
        assert_eq!(groups, vec![1, 1, 2, 2, 2, 3]);
    }

    #[test]
    fn blink_counts_rising_edges_only() {
        let pattern = [false, true, true, false, true, false, false];
        let frames: Vec<GazeFrame> = pattern
            .iter()
            .enumerate()
            .map(|(i, b)| frame(i as u64, Some((0.5, 0.5)), *b))
            .collect();

        let states = GazeStateClassifier::default().classify(&frames);
        let events: Vec<bool> = states.iter().map(|s| s.blink_event).collect();
        let counts: Vec<u32> = states.iter().map(|s| s.blink_count).collect();
        assert_eq!(events, vec![false, true, false, false, true, false, false]);
        assert_eq!(counts, vec![0, 1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn blinking_on_first_frame_is_not_an_onset() {
        let frames = vec![
            frame(0, Some((0.5, 0.5)), true),
            frame(1, Some((0.5, 0.5)), true),
        ];
        let states = GazeStateClassifier::default().classify(&frames);
        assert_eq!(states[1].blink_count, 0);
    }

    #[test]
    fn blink_rate_is_trailing_window_sum() {
        let pattern = [false, true, false, true, false, false];
        let frames: Vec<GazeFrame> = pattern
            .iter()
            .enumerate()
            .map(|(i, b)| frame(i as u64, Some((0.5, 0.5)), *b))
            .collect();

        let classifier = GazeStateClassifier::new(
            GazeConfig {
                blink_rate_window: 3,
                ..Default::default()
            },
            OpennessConfig::default(),
        );
        let rates: Vec<u32> = classifier
            .classify(&frames)
            .iter()
            .map(|s| s.blink_rate)
            .collect();
        assert_eq!(rates, vec![0, 1, 1, 2, 1, 1]);
    }

    #[test]
    fn missing_gaze_leaves_velocity_undefined() {
        let frames = vec![
            frame(0, Some((0.5, 0.5)), false),
            frame(1, None, false),
            frame(2, Some((0.5, 0.5)), false),
            frame(3, Some((0.5, 0.5)), false),
        ];
        let states = GazeStateClassifier::default().classify(&frames);
        assert!(states[1].gaze_velocity.is_none());
        assert!(states[2].gaze_velocity.is_none());
        assert_eq!(states[3].gaze_velocity, Some(0.0));
        assert!(states[3].is_fixation);
    }

    #[test]
    fn empty_input_classifies_to_nothing() {
        assert!(GazeStateClassifier::default().classify(&[]).is_empty());
        assert_eq!(GazeSummary::from_states(&[]), GazeSummary::default());
    }

    #[test]
    fn openness_from_contour() {
        let cfg = OpennessConfig::default();
        // width 1.0, height 0.15 -> ratio 0.15 -> openness 0.5
        let contour = [
            Point::new(0.0, 0.0),
            Point::new(0.3, 0.075),
            Point::new(0.6, 0.075),
            Point::new(1.0, 0.0),
            Point::new(0.6, -0.075),
            Point::new(0.3, -0.075),
        ];
        assert!((cfg.eye_openness(&contour) - 0.5).abs() < 1e-5);

        let wide = [
            Point::new(0.0, 0.0),
            Point::new(0.3, 1.0),
            Point::new(0.6, 1.0),
            Point::new(1.0, 0.0),
            Point::new(0.6, -1.0),
            Point::new(0.3, -1.0),
        ];
        assert_eq!(cfg.eye_openness(&wide), 1.0);
    }

    #[test]
    fn landmarks_build_a_frame() {
        let mut closed = [Point::new(0.5, 0.0); 6];
        closed[0] = Point::new(0.0, 0.0);
        closed[3] = Point::new(1.0, 0.0);
        let landmarks = FaceLandmarks {
            left_eye: closed,
            right_eye: closed,
            left_iris: vec![Point::new(0.4, 0.5), Point::new(0.6, 0.5)],
            right_iris: vec![Point::new(0.2, 0.3)],
        };

        let frame = GazeStateClassifier::default().frame_from_landmarks(1.0, 30, &landmarks);
        assert!(frame.is_blinking);
        assert_eq!(frame.left_pupil, Point::new(0.5, 0.5));
        let gaze = frame.gaze.unwrap();
        assert!((gaze.x - 0.35).abs() < 1e-12);
        assert!((gaze.y - 0.4).abs() < 1e-12);
    }

    #[test]
    fn relabel_uses_configured_threshold() {
        let mut f = frame(0, Some((0.5, 0.5)), false);
        f.left_openness = 0.25;
        let classifier = GazeStateClassifier::new(
            GazeConfig::default(),
            OpennessConfig {
                blink_threshold: 0.3,
                ..Default::default()
            },
        );
        assert!(classifier.relabel_blinks(&[f])[0].is_blinking);
        assert!(!GazeStateClassifier::default().relabel_blinks(&[f])[0].is_blinking);
    }

    #[test]
    fn summary_reports_percentages() {
        let frames = frames_with_steps(&[0.0, 0.0, 0.02]);
        let states = GazeStateClassifier::default().classify(&frames);
        let summary = GazeSummary::from_states(&states);

        assert_eq!(summary.total_frames, 4);
        assert_eq!(summary.fixation_pct, 50.0);
        assert_eq!(summary.saccade_pct, 25.0);
        assert_eq!(summary.fixation_count, 1);
        assert_eq!(summary.mean_fixation_frames, 2.0);
        assert_eq!(GazeFrame::no_face(0.0, 0).gaze, None);
    }
}
