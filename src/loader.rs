//! Readers for recorded sessions: trackpad/pointer CSV, per-frame gaze CSV
//! and stroke-event JSON.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::gaze::{GazeFrame, Point};
use crate::sample::{EventRow, SessionData};
use crate::stroke::StrokeEvent;

const TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// Parse a local timestamp; RFC 3339 or a plain date-time. Blank or garbage gives `None`.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

#[derive(Debug, Deserialize)]
struct RawEventRecord {
    #[serde(default)]
    event_type: Option<String>,
    #[serde(default)]
    timestamp_local: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    x: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    y: Option<f64>,
    #[serde(default, rename = "deltaX", deserialize_with = "csv::invalid_option")]
    delta_x: Option<f64>,
    #[serde(default, rename = "deltaY", deserialize_with = "csv::invalid_option")]
    delta_y: Option<f64>,
    #[serde(default, rename = "scrollDeltaX", deserialize_with = "csv::invalid_option")]
    scroll_delta_x: Option<f64>,
    #[serde(default, rename = "scrollDeltaY", deserialize_with = "csv::invalid_option")]
    scroll_delta_y: Option<f64>,
    #[serde(default, rename = "touch_normalizedX", deserialize_with = "csv::invalid_option")]
    touch_x: Option<f64>,
    #[serde(default, rename = "touch_normalizedY", deserialize_with = "csv::invalid_option")]
    touch_y: Option<f64>,
}

/// Session id from a file name: the stem, e.g. `session-20240501-120000`.
pub fn session_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn load_session<P: AsRef<Path>>(path: P) -> Result<SessionData> {
    let path = path.as_ref();
    let file = File::open(path)?;
    read_session(session_id(path), path, file)
}

/// Read a session CSV from any reader; `path` only labels errors.
pub fn read_session<R: Read>(id: String, path: &Path, reader: R) -> Result<SessionData> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut raw = Vec::new();
    for record in rdr.deserialize::<RawEventRecord>() {
        raw.push(record?);
    }
    if raw.is_empty() {
        return Err(Error::EmptySession(path.to_path_buf()));
    }

    let timestamps: Vec<Option<NaiveDateTime>> = raw
        .iter()
        .map(|r| r.timestamp_local.as_deref().and_then(parse_timestamp))
        .collect();

    let Some(first) = timestamps.iter().flatten().next().copied() else {
        let value = raw
            .iter()
            .find_map(|r| r.timestamp_local.clone())
            .unwrap_or_default();
        return Err(Error::Timestamp {
            path: path.to_path_buf(),
            value,
        });
    };

    let unparsed = timestamps.iter().filter(|t| t.is_none()).count();
    if unparsed > 0 {
        debug!(session = %id, unparsed, "rows without a usable timestamp");
    }

    let rows = raw
        .into_iter()
        .zip(timestamps)
        .map(|(r, timestamp)| EventRow {
            event_type: r.event_type.unwrap_or_default(),
            timestamp,
            time_delta_sec: timestamp
                .and_then(|ts| (ts - first).num_microseconds())
                .map(|us| us as f64 / 1e6),
            x: r.x,
            y: r.y,
            delta_x: r.delta_x,
            delta_y: r.delta_y,
            scroll_delta_x: r.scroll_delta_x,
            scroll_delta_y: r.scroll_delta_y,
            touch_x: r.touch_x,
            touch_y: r.touch_y,
        })
        .collect::<Vec<_>>();

    info!(session = %id, events = rows.len(), "loaded session");
    Ok(SessionData::new(id, rows))
}

/// `<prefix>*.csv` files in `dir`, sorted by name.
pub fn list_session_files<P: AsRef<Path>>(dir: P, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            name.starts_with(prefix) && name.ends_with(".csv")
        })
        .collect();
    files.sort();
    Ok(files)
}

fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim() {
        "true" | "True" | "TRUE" | "1" => Ok(true),
        "false" | "False" | "FALSE" | "0" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected a boolean, got {other:?}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct RawGazeRecord {
    timestamp: f64,
    frame_number: u64,
    #[serde(alias = "left_openness")]
    left_eye_openness: f64,
    #[serde(alias = "right_openness")]
    right_eye_openness: f64,
    left_pupil_x: f64,
    left_pupil_y: f64,
    right_pupil_x: f64,
    right_pupil_y: f64,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    gaze_x: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    gaze_y: Option<f64>,
    #[serde(deserialize_with = "deserialize_flag")]
    is_blinking: bool,
}

impl From<RawGazeRecord> for GazeFrame {
    fn from(r: RawGazeRecord) -> Self {
        GazeFrame {
            timestamp: r.timestamp,
            frame_number: r.frame_number,
            left_openness: r.left_eye_openness,
            right_openness: r.right_eye_openness,
            left_pupil: Point::new(r.left_pupil_x, r.left_pupil_y),
            right_pupil: Point::new(r.right_pupil_x, r.right_pupil_y),
            gaze: match (r.gaze_x, r.gaze_y) {
                (Some(x), Some(y)) => Some(Point::new(x, y)),
                _ => None,
            },
            is_blinking: r.is_blinking,
        }
    }
}

pub fn load_gaze_frames<P: AsRef<Path>>(path: P) -> Result<Vec<GazeFrame>> {
    read_gaze_frames(File::open(path)?)
}

pub fn read_gaze_frames<R: Read>(reader: R) -> Result<Vec<GazeFrame>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut frames = Vec::new();
    for record in rdr.deserialize::<RawGazeRecord>() {
        frames.push(GazeFrame::from(record?));
    }
    debug!(frames = frames.len(), "loaded gaze frames");
    Ok(frames)
}

#[derive(Debug, Deserialize)]
struct StrokeRecording {
    events: Vec<StrokeEvent>,
}

pub fn load_stroke_events<P: AsRef<Path>>(path: P) -> Result<Vec<StrokeEvent>> {
    read_stroke_events(BufReader::new(File::open(path)?))
}

pub fn read_stroke_events<R: Read>(reader: R) -> Result<Vec<StrokeEvent>> {
    let recording: StrokeRecording = serde_json::from_reader(reader)?;
    debug!(events = recording.events.len(), "loaded stroke events");
    Ok(recording.events)
}
