use chrono::NaiveDateTime;
use clap::ValueEnum;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One timestamped position observation. Any field may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sample {
    pub t: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl Sample {
    pub fn new(t: f64, x: f64, y: f64) -> Self {
        Self {
            t: Some(t),
            x: Some(x),
            y: Some(y),
        }
    }

    /// `(t, x, y)` when all three are present and finite.
    pub fn point(&self) -> Option<(f64, f64, f64)> {
        match (self.t, self.x, self.y) {
            (Some(t), Some(x), Some(y)) if t.is_finite() && x.is_finite() && y.is_finite() => {
                Some((t, x, y))
            }
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.point().is_some()
    }
}

impl From<(f64, f64, f64)> for Sample {
    fn from(v: (f64, f64, f64)) -> Self {
        Sample::new(v.0, v.1, v.2)
    }
}

/// Ordered samples of one session. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSeries {
    session_id: String,
    start_time: Option<NaiveDateTime>,
    samples: Vec<Sample>,
}

impl SampleSeries {
    pub fn new(
        session_id: impl Into<String>,
        start_time: Option<NaiveDateTime>,
        samples: Vec<Sample>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            start_time,
            samples,
        }
    }

    pub fn from_points(session_id: impl Into<String>, points: &[(f64, f64, f64)]) -> Self {
        Self::new(
            session_id,
            None,
            points.iter().copied().map(Sample::from).collect(),
        )
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn start_time(&self) -> Option<NaiveDateTime> {
        self.start_time
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Which recorded event types feed a series, and which columns hold the position.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum EventFamily {
    Pointer,
    Touch,
    Scroll,
    Gesture,
    All,
}

impl EventFamily {
    /// Event types belonging to the family; `None` means every row.
    pub fn event_types(&self) -> Option<&'static [&'static str]> {
        match self {
            EventFamily::Pointer => Some(&[
                "mouseMoved",
                "leftMouseDragged",
                "rightMouseDragged",
                "otherMouseDragged",
            ]),
            EventFamily::Touch => Some(&["touch"]),
            EventFamily::Scroll => Some(&["scrollWheel"]),
            EventFamily::Gesture => Some(&["magnify", "rotate", "swipe"]),
            EventFamily::All => None,
        }
    }

    pub fn contains(&self, event_type: &str) -> bool {
        match self.event_types() {
            Some(types) => types.contains(&event_type),
            None => true,
        }
    }

    fn position(&self, row: &EventRow) -> (Option<f64>, Option<f64>) {
        match self {
            EventFamily::Touch => (row.touch_x, row.touch_y),
            EventFamily::Scroll => (row.scroll_delta_x, row.scroll_delta_y),
            EventFamily::Pointer | EventFamily::Gesture | EventFamily::All => (row.x, row.y),
        }
    }
}

/// A single recorded input event as delivered by the session loader.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventRow {
    pub event_type: String,
    pub timestamp: Option<NaiveDateTime>,
    /// Seconds since the first parsable timestamp of the session.
    pub time_delta_sec: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub delta_x: Option<f64>,
    pub delta_y: Option<f64>,
    pub scroll_delta_x: Option<f64>,
    pub scroll_delta_y: Option<f64>,
    pub touch_x: Option<f64>,
    pub touch_y: Option<f64>,
}

/// Loader-level overview of a session, before any derivation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionOverview {
    pub session_id: String,
    pub start_time: Option<NaiveDateTime>,
    pub duration_sec: f64,
    pub total_events: usize,
    pub event_types: Vec<String>,
    pub event_counts: BTreeMap<String, usize>,
}

/// All rows of one recorded session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionData {
    pub session_id: String,
    pub start_time: Option<NaiveDateTime>,
    pub rows: Vec<EventRow>,
}

impl SessionData {
    pub fn new(session_id: impl Into<String>, rows: Vec<EventRow>) -> Self {
        let start_time = rows.iter().find_map(|r| r.timestamp);
        Self {
            session_id: session_id.into(),
            start_time,
            rows,
        }
    }

    /// Distinct event types in order of first appearance.
    pub fn event_types(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| r.event_type.clone())
            .filter(|t| !t.is_empty())
            .unique()
            .collect()
    }

    pub fn event_counts(&self) -> BTreeMap<String, usize> {
        self.rows
            .iter()
            .filter(|r| !r.event_type.is_empty())
            .map(|r| r.event_type.clone())
            .counts()
            .into_iter()
            .collect()
    }

    pub fn filter_by_event_type(&self, event_type: &str) -> Vec<&EventRow> {
        self.rows
            .iter()
            .filter(|r| r.event_type == event_type)
            .collect()
    }

    pub fn duration_sec(&self) -> f64 {
        self.rows
            .iter()
            .filter_map(|r| r.time_delta_sec)
            .reduce(f64::max)
            .unwrap_or(0.0)
    }

    /// Project the rows of one event family onto a sample series.
    pub fn series(&self, family: EventFamily) -> SampleSeries {
        let samples = self
            .rows
            .iter()
            .filter(|r| family.contains(&r.event_type))
            .map(|r| {
                let (x, y) = family.position(r);
                Sample {
                    t: r.time_delta_sec,
                    x,
                    y,
                }
            })
            .collect();

        SampleSeries::new(self.session_id.clone(), self.start_time, samples)
    }

    pub fn summary(&self) -> SessionOverview {
        SessionOverview {
            session_id: self.session_id.clone(),
            start_time: self.start_time,
            duration_sec: self.duration_sec(),
            total_events: self.rows.len(),
            event_types: self.event_types(),
            event_counts: self.event_counts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(event_type: &str, t: f64, x: f64, y: f64) -> EventRow {
        EventRow {
            event_type: event_type.to_string(),
            time_delta_sec: Some(t),
            x: Some(x),
            y: Some(y),
            ..Default::default()
        }
    }

    #[test]
    fn point_requires_all_fields_finite() {
        assert_eq!(Sample::new(1.0, 2.0, 3.0).point(), Some((1.0, 2.0, 3.0)));
        assert!(Sample::new(1.0, f64::NAN, 3.0).point().is_none());
        let missing = Sample {
            t: Some(1.0),
            x: None,
            y: Some(1.0),
        };
        assert!(!missing.is_complete());
    }

    #[test]
    fn pointer_series_keeps_only_pointer_rows() {
        let session = SessionData::new(
            "session-1",
            vec![
                row("mouseMoved", 0.0, 1.0, 1.0),
                row("scrollWheel", 0.5, 9.0, 9.0),
                row("leftMouseDragged", 1.0, 2.0, 2.0),
            ],
        );

        let series = session.series(EventFamily::Pointer);
        assert_eq!(series.len(), 2);
        assert_eq!(series.session_id(), "session-1");
        assert_eq!(series.samples()[1], Sample::new(1.0, 2.0, 2.0));
    }

    #[test]
    fn touch_series_uses_normalized_columns() {
        let mut touch = row("touch", 0.0, 100.0, 100.0);
        touch.touch_x = Some(0.25);
        touch.touch_y = Some(0.75);
        let session = SessionData::new("s", vec![touch]);

        let series = session.series(EventFamily::Touch);
        assert_eq!(series.samples()[0], Sample::new(0.0, 0.25, 0.75));
    }

    #[test]
    fn summary_counts_event_types() {
        let session = SessionData::new(
            "s",
            vec![
                row("mouseMoved", 0.0, 0.0, 0.0),
                row("mouseMoved", 2.5, 0.0, 0.0),
                row("touch", 1.0, 0.0, 0.0),
            ],
        );

        let summary = session.summary();
        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.duration_sec, 2.5);
        assert_eq!(summary.event_types, vec!["mouseMoved", "touch"]);
        assert_eq!(summary.event_counts["mouseMoved"], 2);
        assert_eq!(session.filter_by_event_type("touch").len(), 1);
    }

    #[test]
    fn family_display_is_lowercase() {
        assert_eq!(EventFamily::Pointer.to_string(), "pointer");
        assert!(EventFamily::All.contains("anything"));
    }
}
