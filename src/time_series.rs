use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::kinematics::{DerivedSample, Kinematics};
use crate::util::{max, mean, min, sample_std_dev};

/// A per-sample column that can be aggregated over time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Metric {
    X,
    Y,
    VelocityX,
    VelocityY,
    Speed,
    DirectionDeg,
    AccelX,
    AccelY,
    AccelerationMagnitude,
    SegmentDistance,
    CumulativeDistance,
}

impl Metric {
    pub fn value(&self, derived: &DerivedSample) -> Option<f64> {
        let k: &Kinematics = derived.kinematics.as_ref()?;
        let v = match self {
            Metric::X => derived.sample.x?,
            Metric::Y => derived.sample.y?,
            Metric::VelocityX => k.velocity_x,
            Metric::VelocityY => k.velocity_y,
            Metric::Speed => k.speed,
            Metric::DirectionDeg => k.direction_deg,
            Metric::AccelX => k.accel_x,
            Metric::AccelY => k.accel_y,
            Metric::AccelerationMagnitude => k.accel_magnitude,
            Metric::SegmentDistance => k.segment_distance,
            Metric::CumulativeDistance => k.cumulative_distance,
        };
        Some(v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    pub width_sec: f64,
    pub metrics: Vec<Metric>,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            width_sec: 1.0,
            metrics: vec![Metric::Speed, Metric::AccelerationMagnitude],
        }
    }
}

/// Aggregates of one metric in one bucket. Everything but `count` is
/// `None` for an empty bucket; `std` also needs two values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BucketStats {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub count: usize,
}

impl BucketStats {
    fn of(values: &[f64]) -> Self {
        Self {
            mean: mean(values),
            std: sample_std_dev(values),
            min: min(values),
            max: max(values),
            count: values.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeBucket {
    /// Left edge of the bucket, in seconds.
    pub start: f64,
    /// One entry per requested metric, same order as the table's metrics.
    pub stats: Vec<BucketStats>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeBucketTable {
    pub width_sec: f64,
    pub metrics: Vec<Metric>,
    pub buckets: Vec<TimeBucket>,
}

impl TimeBucketTable {
    /// `{metric}_{mean,std,min,max,count}` for every metric.
    pub fn columns(&self) -> Vec<String> {
        self.metrics
            .iter()
            .flat_map(|m| {
                ["mean", "std", "min", "max", "count"]
                    .into_iter()
                    .map(move |agg| format!("{m}_{agg}"))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Upper bound on buckets per table; a longer span yields an empty table.
pub const MAX_BUCKETS: usize = 100_000;

/// Index of the bucket holding `t`. Buckets are closed on the right
/// (`[0, w]`, `(w, 2w]`, ...), so a sample on an edge belongs to the earlier one.
fn bucket_index(t: f64, width: f64) -> usize {
    if t <= 0.0 {
        0
    } else {
        ((t / width).ceil() as usize).saturating_sub(1)
    }
}

/// Aggregate derived samples into evenly spaced time buckets starting at 0.
///
/// Every bucket up to the last sample is kept, including empty ones.
/// Samples without kinematics or with negative time are skipped.
pub fn bucket_statistics(derived: &[DerivedSample], config: &BucketConfig) -> TimeBucketTable {
    let width = config.width_sec;
    let timed: Vec<(f64, &DerivedSample)> = derived
        .iter()
        .filter(|d| d.kinematics.is_some())
        .filter_map(|d| d.t().filter(|t| t.is_finite() && *t >= 0.0).map(|t| (t, d)))
        .collect();

    let empty = || TimeBucketTable {
        width_sec: width,
        metrics: config.metrics.clone(),
        buckets: Vec::new(),
    };
    if timed.is_empty() || !(width > 0.0 && width.is_finite()) {
        return empty();
    }

    let max_t = timed.iter().map(|(t, _)| *t).fold(0.0, f64::max);
    if (max_t / width).ceil() > MAX_BUCKETS as f64 {
        warn!(
            max_t,
            width_sec = width,
            limit = MAX_BUCKETS,
            "time span too long for bucket width, skipping time buckets"
        );
        return empty();
    }
    let bucket_count = bucket_index(max_t, width) + 1;

    let mut values: Vec<Vec<Vec<f64>>> = vec![vec![Vec::new(); config.metrics.len()]; bucket_count];
    for (t, d) in &timed {
        let bucket = &mut values[bucket_index(*t, width).min(bucket_count - 1)];
        for (slot, metric) in bucket.iter_mut().zip(&config.metrics) {
            if let Some(v) = metric.value(d).filter(|v| v.is_finite()) {
                slot.push(v);
            }
        }
    }

    let buckets = values
        .iter()
        .enumerate()
        .map(|(i, per_metric)| TimeBucket {
            start: i as f64 * width,
            stats: per_metric.iter().map(|v| BucketStats::of(v)).collect(),
        })
        .collect();

    TimeBucketTable {
        width_sec: width,
        metrics: config.metrics.clone(),
        buckets,
    }
}
