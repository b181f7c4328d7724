//! CSV and JSON writers for every output table.

use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::aggregate::ComparisonTable;
use crate::error::Result;
use crate::gaze::GazeState;
use crate::kinematics::DerivedSample;
use crate::reversal::ReversalResult;
use crate::stroke::Stroke;
use crate::time_series::TimeBucketTable;

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(BufWriter::new(File::create(path)?))
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[derive(Debug, Serialize)]
struct MetricsRow {
    t: Option<f64>,
    x: Option<f64>,
    y: Option<f64>,
    velocity_x: Option<f64>,
    velocity_y: Option<f64>,
    speed: Option<f64>,
    direction_deg: Option<f64>,
    accel_x: Option<f64>,
    accel_y: Option<f64>,
    accel_magnitude: Option<f64>,
    segment_distance: Option<f64>,
    cumulative_distance: Option<f64>,
}

impl From<&DerivedSample> for MetricsRow {
    fn from(d: &DerivedSample) -> Self {
        let k = d.kinematics;
        MetricsRow {
            t: d.sample.t,
            x: d.sample.x,
            y: d.sample.y,
            velocity_x: k.map(|k| k.velocity_x),
            velocity_y: k.map(|k| k.velocity_y),
            speed: k.map(|k| k.speed),
            direction_deg: k.map(|k| k.direction_deg),
            accel_x: k.map(|k| k.accel_x),
            accel_y: k.map(|k| k.accel_y),
            accel_magnitude: k.map(|k| k.accel_magnitude),
            segment_distance: k.map(|k| k.segment_distance),
            cumulative_distance: k.map(|k| k.cumulative_distance),
        }
    }
}

pub fn write_metrics<W: Write>(writer: W, derived: &[DerivedSample]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for d in derived {
        wtr.serialize(MetricsRow::from(d))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_metrics_csv(path: &Path, derived: &[DerivedSample]) -> Result<()> {
    write_metrics(create(path)?, derived)
}

#[derive(Debug, Serialize)]
struct GazeRow {
    timestamp: f64,
    frame_number: u64,
    left_eye_openness: f64,
    right_eye_openness: f64,
    left_pupil_x: f64,
    left_pupil_y: f64,
    right_pupil_x: f64,
    right_pupil_y: f64,
    gaze_x: Option<f64>,
    gaze_y: Option<f64>,
    is_blinking: bool,
    blink_event: bool,
    blink_count: u32,
    blink_rate: u32,
    gaze_velocity: Option<f64>,
    is_saccade: bool,
    is_fixation: bool,
    fixation_group: u32,
    fixation_duration: u32,
}

impl From<&GazeState> for GazeRow {
    fn from(s: &GazeState) -> Self {
        let f = &s.frame;
        GazeRow {
            timestamp: f.timestamp,
            frame_number: f.frame_number,
            left_eye_openness: f.left_openness,
            right_eye_openness: f.right_openness,
            left_pupil_x: f.left_pupil.x,
            left_pupil_y: f.left_pupil.y,
            right_pupil_x: f.right_pupil.x,
            right_pupil_y: f.right_pupil.y,
            gaze_x: f.gaze.map(|g| g.x),
            gaze_y: f.gaze.map(|g| g.y),
            is_blinking: f.is_blinking,
            blink_event: s.blink_event,
            blink_count: s.blink_count,
            blink_rate: s.blink_rate,
            gaze_velocity: s.gaze_velocity,
            is_saccade: s.is_saccade,
            is_fixation: s.is_fixation,
            fixation_group: s.fixation_group_id,
            fixation_duration: s.fixation_duration,
        }
    }
}

pub fn write_gaze<W: Write>(writer: W, states: &[GazeState]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for s in states {
        wtr.serialize(GazeRow::from(s))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_gaze_csv(path: &Path, states: &[GazeState]) -> Result<()> {
    write_gaze(create(path)?, states)
}

pub fn write_buckets<W: Write>(writer: W, table: &TimeBucketTable) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec!["time_bin".to_string()];
    header.extend(table.columns());
    wtr.write_record(&header)?;

    for bucket in &table.buckets {
        let mut record = vec![bucket.start.to_string()];
        for stats in &bucket.stats {
            record.push(cell(stats.mean));
            record.push(cell(stats.std));
            record.push(cell(stats.min));
            record.push(cell(stats.max));
            record.push(stats.count.to_string());
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_buckets_csv(path: &Path, table: &TimeBucketTable) -> Result<()> {
    write_buckets(create(path)?, table)
}

pub fn write_comparison<W: Write>(writer: W, table: &ComparisonTable) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(&table.columns)?;
    for row in 0..table.len() {
        wtr.write_record(table.columns.iter().map(|c| table.cell(row, c)))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_comparison_csv(path: &Path, table: &ComparisonTable) -> Result<()> {
    write_comparison(create(path)?, table)
}

#[derive(Debug, Serialize)]
struct ReversalRow {
    stroke: usize,
    events: usize,
    start_t: f64,
    duration_sec: f64,
    terminated: bool,
    has_reversal: bool,
    initial_dir: i8,
    reversal_count: u32,
}

/// One row per analyzed stroke; strokes too short to analyze are skipped.
pub fn write_reversals<W: Write>(
    writer: W,
    analyzed: &[(usize, &Stroke, ReversalResult)],
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for (index, stroke, result) in analyzed {
        wtr.serialize(ReversalRow {
            stroke: *index,
            events: stroke.len(),
            start_t: stroke.events.first().map_or(0.0, |e| e.t),
            duration_sec: stroke.duration_sec(),
            terminated: stroke.terminated,
            has_reversal: result.has_reversal,
            initial_dir: result.initial_dir.sign(),
            reversal_count: result.reversal_count,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_reversals_csv(
    path: &Path,
    analyzed: &[(usize, &Stroke, ReversalResult)],
) -> Result<()> {
    write_reversals(create(path)?, analyzed)
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut out = create(path)?;
    serde_json::to_writer_pretty(&mut out, value)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::SessionSummary;
    use crate::gaze::GazeStateClassifier;
    use crate::kinematics::KinematicDeriver;
    use crate::reversal::ReversalAnalyzer;
    use crate::sample::{Sample, SampleSeries};
    use crate::stroke::{segment_strokes, EventKind, StrokeEvent};
    use crate::time_series::{bucket_statistics, BucketConfig};

    fn derived() -> Vec<DerivedSample> {
        let samples = vec![
            Sample::new(0.0, 0.0, 0.0),
            Sample {
                t: Some(0.5),
                x: None,
                y: Some(1.0),
            },
            Sample::new(1.0, 3.0, 4.0),
        ];
        KinematicDeriver::new().derive(&SampleSeries::new("s", None, samples))
    }

    fn as_text(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn metrics_rows_leave_undefined_cells_empty() {
        let mut buf = Vec::new();
        write_metrics(&mut buf, &derived()).unwrap();
        let text = as_text(buf);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("t,x,y,velocity_x"));
        assert_eq!(lines[2], "0.5,,1.0,,,,,,,,,");
    }

    #[test]
    fn bucket_csv_has_one_column_per_aggregate() {
        let table = bucket_statistics(&derived(), &BucketConfig::default());
        let mut buf = Vec::new();
        write_buckets(&mut buf, &table).unwrap();
        let text = as_text(buf);
        let header = text.lines().next().unwrap();
        assert_eq!(header.split(',').count(), 11);
        assert!(header.starts_with("time_bin,speed_mean,speed_std"));
    }

    #[test]
    fn comparison_csv_writes_header_and_rows() {
        let table = ComparisonTable::from_summaries(&[SessionSummary::new("s1", None, &derived())]);
        let mut buf = Vec::new();
        write_comparison(&mut buf, &table).unwrap();
        let text = as_text(buf);
        assert!(text.starts_with("session_id,start_time,"));
        assert!(text.lines().nth(1).unwrap().starts_with("s1,,"));
    }

    #[test]
    fn gaze_and_reversal_tables() {
        let frames = vec![crate::gaze::GazeFrame::no_face(0.0, 0); 3];
        let states = GazeStateClassifier::default().classify(&frames);
        let mut buf = Vec::new();
        write_gaze(&mut buf, &states).unwrap();
        assert_eq!(as_text(buf).lines().count(), 4);

        let strokes = segment_strokes(&[
            StrokeEvent::new(0.0, EventKind::Down, 0.0, 0.0),
            StrokeEvent::new(0.1, EventKind::Move, 5.0, 0.0),
            StrokeEvent::new(0.2, EventKind::Up, 0.0, 0.0),
        ]);
        let analyzer = ReversalAnalyzer::default();
        let analyzed: Vec<_> = strokes
            .iter()
            .enumerate()
            .filter_map(|(i, s)| analyzer.analyze(&s.events).map(|r| (i, s, r)))
            .collect();
        let mut buf = Vec::new();
        write_reversals(&mut buf, &analyzed).unwrap();
        let text = as_text(buf);
        assert_eq!(text.lines().nth(1).unwrap(), "0,3,0.0,0.2,true,true,1,1");
    }

    #[test]
    fn json_files_are_created_with_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("stats.json");
        write_json(&path, &SessionSummary::new("s", None, &derived())).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"session_id\": \"s\""));
    }
}
