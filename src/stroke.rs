use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventKind {
    Down,
    Move,
    Up,
    /// Anything else found in a recording; the segmenter never uses it.
    #[serde(other)]
    Other,
}

/// One raw pointer event, `t` in seconds from session start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokeEvent {
    pub t: f64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub button: i32,
    #[serde(default)]
    pub buttons: i32,
}

impl StrokeEvent {
    pub fn new(t: f64, kind: EventKind, x: f64, y: f64) -> Self {
        Self {
            t,
            kind,
            x,
            y,
            button: 0,
            buttons: 0,
        }
    }
}

/// Events from a `down` through its `up`, or up to the end of the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub events: Vec<StrokeEvent>,
    /// `false` when the stroke was cut short by another `down` or the end of input.
    pub terminated: bool,
}

impl Stroke {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn duration_sec(&self) -> f64 {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => last.t - first.t,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    Idle,
    Drawing,
}

/// Splits a pointer event stream into strokes.
///
/// Stray `move`/`up` events while idle are dropped. A `down` that arrives
/// mid-stroke closes the open stroke first so nothing recorded is lost.
#[derive(Debug)]
pub struct StrokeSegmenter {
    state: SegmenterState,
    buffer: Vec<StrokeEvent>,
    ignored: usize,
}

impl Default for StrokeSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl StrokeSegmenter {
    pub fn new() -> Self {
        Self {
            state: SegmenterState::Idle,
            buffer: Vec::new(),
            ignored: 0,
        }
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    /// Events dropped so far because they did not fit the current state.
    pub fn ignored(&self) -> usize {
        self.ignored
    }

    /// Feed one event; returns the strokes it completed, oldest first.
    pub fn push(&mut self, event: StrokeEvent) -> Vec<Stroke> {
        let mut completed = Vec::new();

        match (self.state, event.kind) {
            (_, EventKind::Down) => {
                if !self.buffer.is_empty() {
                    completed.push(self.flush(false));
                }
                self.buffer.push(event);
                self.state = SegmenterState::Drawing;
            }
            (SegmenterState::Drawing, EventKind::Move) => {
                self.buffer.push(event);
            }
            (SegmenterState::Drawing, EventKind::Up) => {
                self.buffer.push(event);
                completed.push(self.flush(true));
                self.state = SegmenterState::Idle;
            }
            (state, kind) => {
                trace!(?state, %kind, t = event.t, "ignoring stray stroke event");
                self.ignored += 1;
            }
        }

        completed
    }

    /// End of stream: the open stroke, if any.
    pub fn finish(&mut self) -> Option<Stroke> {
        self.state = SegmenterState::Idle;
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.flush(false))
        }
    }

    fn flush(&mut self, terminated: bool) -> Stroke {
        Stroke {
            events: std::mem::take(&mut self.buffer),
            terminated,
        }
    }
}

pub fn segment_strokes(events: &[StrokeEvent]) -> Vec<Stroke> {
    let mut segmenter = StrokeSegmenter::new();
    let mut strokes: Vec<Stroke> = events
        .iter()
        .flat_map(|e| segmenter.push(*e))
        .collect();
    strokes.extend(segmenter.finish());

    if segmenter.ignored() > 0 {
        tracing::debug!(ignored = segmenter.ignored(), "stray stroke events ignored");
    }
    strokes
}
