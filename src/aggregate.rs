use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::kinematics::{DerivedSample, Kinematics};
use crate::util::{max, mean, median, min};

/// A summary value; ranges are `(min, max)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Count(usize),
    Number(f64),
    Range(f64, f64),
    Text(String),
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatValue::Count(n) => write!(f, "{n}"),
            StatValue::Number(v) => write!(f, "{v}"),
            StatValue::Range(lo, hi) => write!(f, "({lo}, {hi})"),
            StatValue::Text(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Spread {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

impl Spread {
    pub fn of(values: &[f64]) -> Option<Self> {
        Some(Self {
            min: min(values)?,
            max: max(values)?,
            mean: mean(values)?,
            median: median(values)?,
        })
    }
}

/// Scalar statistics of one derived-metrics table.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionStatistics {
    pub total_events: usize,
    pub duration_sec: f64,
    pub x: Option<Spread>,
    pub y: Option<Spread>,
    pub speed: Option<Spread>,
    pub acceleration: Option<Spread>,
    pub total_distance: Option<f64>,
}

impl SessionStatistics {
    /// Only rows with kinematics count; rows with a missing position or time
    /// are left out of every statistic. No such rows gives the default summary.
    pub fn from_derived(derived: &[DerivedSample]) -> Self {
        let complete: Vec<&DerivedSample> =
            derived.iter().filter(|d| d.kinematics.is_some()).collect();
        if complete.is_empty() {
            return Self::default();
        }

        let column = |f: fn(&DerivedSample) -> Option<f64>| -> Vec<f64> {
            complete
                .iter()
                .filter_map(|d| f(d))
                .filter(|v| v.is_finite())
                .collect()
        };
        let kinematic = |f: fn(&Kinematics) -> f64| -> Vec<f64> {
            complete
                .iter()
                .filter_map(|d| d.kinematics.as_ref().map(f))
                .collect()
        };

        let distances = kinematic(|k| k.cumulative_distance);

        Self {
            total_events: complete.len(),
            duration_sec: max(&column(|d| d.sample.t)).unwrap_or(0.0),
            x: Spread::of(&column(|d| d.sample.x)),
            y: Spread::of(&column(|d| d.sample.y)),
            speed: Spread::of(&kinematic(|k| k.speed)),
            acceleration: Spread::of(&kinematic(|k| k.accel_magnitude)),
            total_distance: max(&distances),
        }
    }

    /// Flat key/value view used for reports and comparison tables.
    pub fn to_record(&self) -> BTreeMap<String, StatValue> {
        let mut record = BTreeMap::new();
        record.insert("total_events".into(), StatValue::Count(self.total_events));
        record.insert("duration_sec".into(), StatValue::Number(self.duration_sec));

        for (axis, spread) in [("x", &self.x), ("y", &self.y)] {
            if let Some(s) = spread {
                record.insert(format!("{axis}_range"), StatValue::Range(s.min, s.max));
                record.insert(format!("{axis}_mean"), StatValue::Number(s.mean));
                record.insert(format!("{axis}_median"), StatValue::Number(s.median));
            }
        }
        for (name, spread) in [("speed", &self.speed), ("acceleration", &self.acceleration)] {
            if let Some(s) = spread {
                record.insert(format!("min_{name}"), StatValue::Number(s.min));
                record.insert(format!("max_{name}"), StatValue::Number(s.max));
                record.insert(format!("mean_{name}"), StatValue::Number(s.mean));
                record.insert(format!("median_{name}"), StatValue::Number(s.median));
            }
        }
        if let Some(d) = self.total_distance {
            record.insert("total_distance".into(), StatValue::Number(d));
        }
        record
    }
}

/// Statistics of one session, labelled for cross-session comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub start_time: Option<NaiveDateTime>,
    #[serde(flatten)]
    pub statistics: SessionStatistics,
}

impl SessionSummary {
    pub fn new(
        session_id: impl Into<String>,
        start_time: Option<NaiveDateTime>,
        derived: &[DerivedSample],
    ) -> Self {
        Self {
            session_id: session_id.into(),
            start_time,
            statistics: SessionStatistics::from_derived(derived),
        }
    }

    pub fn to_record(&self) -> BTreeMap<String, StatValue> {
        let mut record = self.statistics.to_record();
        record.insert("session_id".into(), StatValue::Text(self.session_id.clone()));
        if let Some(start) = self.start_time {
            record.insert("start_time".into(), StatValue::Text(start.to_string()));
        }
        record
    }
}

/// One row per session; columns are the union of every row's keys.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComparisonTable {
    pub columns: Vec<String>,
    pub rows: Vec<BTreeMap<String, StatValue>>,
}

impl ComparisonTable {
    /// Rows sorted by start time; sessions without one go last, in input order.
    pub fn from_summaries(summaries: &[SessionSummary]) -> Self {
        let mut ordered: Vec<&SessionSummary> = summaries.iter().collect();
        ordered.sort_by_key(|s| (s.start_time.is_none(), s.start_time));

        let rows: Vec<BTreeMap<String, StatValue>> =
            ordered.iter().map(|s| s.to_record()).collect();

        let keys: BTreeSet<&String> = rows.iter().flat_map(|r| r.keys()).collect();
        let mut columns = vec!["session_id".to_string(), "start_time".to_string()];
        columns.extend(
            keys.into_iter()
                .filter(|k| k.as_str() != "session_id" && k.as_str() != "start_time")
                .cloned(),
        );

        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell text for `row`/`column`, empty when the session lacks the key.
    pub fn cell(&self, row: usize, column: &str) -> String {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(|v| v.to_string())
            .unwrap_or_default()
    }
}
