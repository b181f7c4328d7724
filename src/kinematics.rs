//! Finite-difference kinematics over a sample series.
//!
//! Every derived value comes from a sample and its immediate valid
//! predecessor. A sample with a missing or non-finite field carries no
//! kinematics and breaks the chain: the next valid sample starts over as if
//! it were the first one, so nothing is ever derived across a gap.

use serde::Serialize;
use std::f64::consts::PI;
use tracing::debug;

use crate::sample::{Sample, SampleSeries};

/// Derived quantities for one sample. Zero at the start of each chain.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Kinematics {
    pub velocity_x: f64,
    pub velocity_y: f64,
    pub speed: f64,
    /// Degrees in `(-180, 180]`, `0` along +x and `90` along +y.
    pub direction_deg: f64,
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_magnitude: f64,
    pub segment_distance: f64,
    pub cumulative_distance: f64,
}

/// A source sample plus its kinematics, `None` when the sample was incomplete.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedSample {
    pub sample: Sample,
    pub kinematics: Option<Kinematics>,
}

impl DerivedSample {
    pub fn t(&self) -> Option<f64> {
        self.sample.t
    }
}

/// Divide by `dt` only when time actually advanced.
fn rate(delta: f64, dt: f64) -> f64 {
    if dt > 0.0 {
        delta / dt
    } else {
        0.0
    }
}

fn direction_deg(velocity_x: f64, velocity_y: f64) -> f64 {
    let mut radians = velocity_y.atan2(velocity_x);
    // atan2 yields -pi for (-x, -0.0); fold it onto the closed end of the range
    if radians <= -PI {
        radians = PI;
    }
    let deg = radians.to_degrees();
    if deg <= -180.0 {
        180.0
    } else {
        deg.min(180.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Previous {
    t: f64,
    x: f64,
    y: f64,
    velocity_x: f64,
    velocity_y: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KinematicDeriver;

impl KinematicDeriver {
    pub fn new() -> Self {
        Self
    }

    /// Derive one output row per input sample.
    ///
    /// Returns an empty vector when fewer than two samples are complete.
    pub fn derive(&self, series: &SampleSeries) -> Vec<DerivedSample> {
        self.derive_samples(series.samples())
    }

    pub fn derive_samples(&self, samples: &[Sample]) -> Vec<DerivedSample> {
        let complete = samples.iter().filter(|s| s.is_complete()).count();
        if complete < 2 {
            debug!(
                total = samples.len(),
                complete, "too few complete samples for derivatives"
            );
            return Vec::new();
        }
        if complete < samples.len() {
            debug!(
                dropped = samples.len() - complete,
                "samples with missing position or time excluded"
            );
        }

        let mut derived = Vec::with_capacity(samples.len());
        let mut previous: Option<Previous> = None;
        let mut cumulative_distance = 0.0;

        for sample in samples {
            let Some((t, x, y)) = sample.point() else {
                previous = None;
                derived.push(DerivedSample {
                    sample: *sample,
                    kinematics: None,
                });
                continue;
            };

            let kinematics = match previous {
                None => Kinematics {
                    cumulative_distance,
                    ..Default::default()
                },
                Some(prev) => {
                    let dt = t - prev.t;
                    let dx = x - prev.x;
                    let dy = y - prev.y;

                    let velocity_x = rate(dx, dt);
                    let velocity_y = rate(dy, dt);
                    let accel_x = rate(velocity_x - prev.velocity_x, dt);
                    let accel_y = rate(velocity_y - prev.velocity_y, dt);
                    let segment_distance = dx.hypot(dy);
                    cumulative_distance += segment_distance;

                    Kinematics {
                        velocity_x,
                        velocity_y,
                        speed: velocity_x.hypot(velocity_y),
                        direction_deg: direction_deg(velocity_x, velocity_y),
                        accel_x,
                        accel_y,
                        accel_magnitude: accel_x.hypot(accel_y),
                        segment_distance,
                        cumulative_distance,
                    }
                }
            };

            previous = Some(Previous {
                t,
                x,
                y,
                velocity_x: kinematics.velocity_x,
                velocity_y: kinematics.velocity_y,
            });
            derived.push(DerivedSample {
                sample: *sample,
                kinematics: Some(kinematics),
            });
        }

        derived
    }
}
