use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::aggregate::{ComparisonTable, SessionSummary};
use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::kinematics::KinematicDeriver;
use crate::loader::{list_session_files, load_session};
use crate::report::{write_buckets_csv, write_comparison_csv, write_json, write_metrics_csv};
use crate::sample::{EventFamily, SessionData};
use crate::time_series::bucket_statistics;

pub const SUMMARY_FILE: &str = "summary_all_sessions.csv";

/// Outcome of analysing one session.
#[derive(Debug)]
pub enum SessionOutcome {
    Analyzed(SessionSummary),
    /// Loaded fine but nothing of the requested family to derive from.
    Skipped { session_id: String },
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub summaries: Vec<SessionSummary>,
    pub skipped: Vec<String>,
    pub failures: Vec<(PathBuf, Error)>,
    pub summary_path: Option<PathBuf>,
}

impl BatchReport {
    pub fn comparison(&self) -> ComparisonTable {
        ComparisonTable::from_summaries(&self.summaries)
    }
}

/// Derive metrics for one loaded session and write its outputs under
/// `out_dir/<session_id>/`.
pub fn process_session(
    session: &SessionData,
    out_dir: &Path,
    family: EventFamily,
    config: &AnalysisConfig,
) -> Result<SessionOutcome> {
    let series = session.series(family);
    let derived = KinematicDeriver::new().derive(&series);
    if derived.is_empty() {
        info!(session = %session.session_id, %family, "no analyzable samples");
        return Ok(SessionOutcome::Skipped {
            session_id: session.session_id.clone(),
        });
    }

    let summary = SessionSummary::new(&session.session_id, session.start_time, &derived);
    let session_dir = out_dir.join(&session.session_id);
    let id = &session.session_id;

    write_metrics_csv(&session_dir.join(format!("{id}_metrics.csv")), &derived)?;
    write_json(&session_dir.join(format!("{id}_stats.json")), &summary)?;
    let buckets = bucket_statistics(&derived, &config.buckets);
    write_buckets_csv(&session_dir.join(format!("{id}_time_bins.csv")), &buckets)?;

    info!(
        session = %id,
        duration_sec = summary.statistics.duration_sec,
        total_distance = summary.statistics.total_distance.unwrap_or(0.0),
        "session analyzed"
    );
    Ok(SessionOutcome::Analyzed(summary))
}

/// Process every `<prefix>*.csv` in `dir`. A failing session is recorded and
/// the rest still run; only an unreadable `dir` or summary write fails the batch.
pub fn process_directory(
    dir: &Path,
    out_dir: &Path,
    prefix: &str,
    family: EventFamily,
    config: &AnalysisConfig,
) -> Result<BatchReport> {
    let files = list_session_files(dir, prefix)?;
    info!(dir = %dir.display(), sessions = files.len(), "starting batch");

    let mut report = BatchReport::default();
    for path in files {
        let outcome =
            load_session(&path).and_then(|s| process_session(&s, out_dir, family, config));

        match outcome {
            Ok(SessionOutcome::Analyzed(summary)) => report.summaries.push(summary),
            Ok(SessionOutcome::Skipped { session_id }) => report.skipped.push(session_id),
            Err(Error::EmptySession(_)) => {
                report.skipped.push(crate::loader::session_id(&path));
            }
            Err(e) => {
                warn!(path = %path.display(), "session failed: {e}");
                report.failures.push((path, e));
            }
        }
    }

    if !report.summaries.is_empty() {
        let summary_path = out_dir.join(SUMMARY_FILE);
        write_comparison_csv(&summary_path, &report.comparison())?;
        report.summary_path = Some(summary_path);
    }

    info!(
        analyzed = report.summaries.len(),
        skipped = report.skipped.len(),
        failed = report.failures.len(),
        "batch finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::fs;

    const GOOD: &str = "\
event_type,timestamp_local,x,y
mouseMoved,2024-05-01 12:00:00,0,0
mouseMoved,2024-05-01 12:00:01,3,4
";

    #[test]
    fn bad_session_does_not_abort_batch() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(input.path().join("session-1.csv"), GOOD).unwrap();
        fs::write(
            input.path().join("session-2.csv"),
            "event_type,timestamp_local,x,y\nmouseMoved,never,1,1\n",
        )
        .unwrap();
        fs::write(input.path().join("session-3.csv"), "event_type,timestamp_local\n").unwrap();

        let report = process_directory(
            input.path(),
            output.path(),
            "session-",
            EventFamily::Pointer,
            &AnalysisConfig::default(),
        )
        .unwrap();

        assert_eq!(report.summaries.len(), 1);
        assert_eq!(report.skipped, vec!["session-3"]);
        assert_eq!(report.failures.len(), 1);
        assert_matches!(report.failures[0].1, Error::Timestamp { .. });

        let session_dir = output.path().join("session-1");
        assert!(session_dir.join("session-1_metrics.csv").exists());
        assert!(session_dir.join("session-1_stats.json").exists());
        assert!(session_dir.join("session-1_time_bins.csv").exists());
        assert!(output.path().join(SUMMARY_FILE).exists());
    }

    #[test]
    fn family_without_samples_is_skipped() {
        let output = tempfile::tempdir().unwrap();
        let session = crate::loader::read_session(
            "s".into(),
            Path::new("s.csv"),
            GOOD.as_bytes(),
        )
        .unwrap();

        let outcome = process_session(
            &session,
            output.path(),
            EventFamily::Touch,
            &AnalysisConfig::default(),
        )
        .unwrap();
        assert_matches!(outcome, SessionOutcome::Skipped { .. });
    }
}
