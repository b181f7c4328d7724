use clap::{Parser, Subcommand};
use kinetrace::{
    aggregate::SessionSummary,
    app_dirs::AppDirs,
    batch::process_directory,
    config::{AnalysisConfig, ConfigStore, FileConfigStore},
    gaze::GazeSummary,
    kinematics::KinematicDeriver,
    loader, logging, report,
    reversal::ReversalSummary,
    sample::EventFamily,
    stroke::segment_strokes,
    time_series::bucket_statistics,
};
use std::{error::Error, path::PathBuf};
use tracing::info;

/// derive kinematic, gaze and stroke signals from recorded input sessions
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "Derives velocity, acceleration and distance from pointer/touch sessions, blink, fixation and saccade states from per-frame gaze data, and left/right reversals from drawing strokes."
)]
pub struct Cli {
    /// analysis config file (JSON); defaults to the platform config directory
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// log level used when RUST_LOG is not set
    #[clap(long, global = true, default_value = "warn")]
    log_level: String,

    /// emit logs as JSON lines
    #[clap(long, global = true)]
    json_logs: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// derive kinematics for one session CSV and print its statistics
    Metrics {
        csv: PathBuf,

        /// which event family to analyze
        #[clap(short, long, value_enum, default_value_t = EventFamily::Pointer)]
        family: EventFamily,

        /// directory for the metrics, statistics and time-bin tables
        #[clap(short, long)]
        out: Option<PathBuf>,

        /// time-bin width in seconds, overriding the config
        #[clap(long)]
        bucket_width: Option<f64>,
    },

    /// classify blinks, fixations and saccades in a per-frame gaze CSV
    Gaze {
        csv: PathBuf,

        /// recompute is_blinking from eye openness with the configured threshold
        #[clap(long)]
        relabel_blinks: bool,

        /// file for the per-frame gaze table
        #[clap(short, long)]
        out: Option<PathBuf>,
    },

    /// segment a stroke-event JSON recording and count left/right reversals
    Strokes {
        json: PathBuf,

        /// jitter threshold in position units, overriding the config
        #[clap(long)]
        jitter: Option<f64>,

        /// file for the per-stroke reversal table
        #[clap(short, long)]
        out: Option<PathBuf>,
    },

    /// analyze every session CSV in a directory
    Batch {
        dir: PathBuf,

        /// file name prefix of session CSVs
        #[clap(long, default_value = "session-")]
        prefix: String,

        #[clap(short, long, value_enum, default_value_t = EventFamily::Pointer)]
        family: EventFamily,

        /// output directory (defaults to the platform data directory)
        #[clap(short, long)]
        out: Option<PathBuf>,
    },

    /// print the effective configuration
    Config {
        /// also write it to the config file
        #[clap(long)]
        write: bool,
    },
}

fn load_config(cli: &Cli) -> Result<(FileConfigStore, AnalysisConfig), Box<dyn Error>> {
    let store = match &cli.config {
        Some(path) => FileConfigStore::with_path(path),
        None => FileConfigStore::new(),
    };
    let config = store.load();
    info!(path = %store.path().display(), "configuration loaded");
    config.validate()?;
    Ok((store, config))
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.json_logs);

    let (store, mut config) = load_config(&cli)?;

    match cli.command {
        Command::Metrics {
            csv,
            family,
            out,
            bucket_width,
        } => {
            if let Some(width) = bucket_width {
                config.buckets.width_sec = width;
                config.validate()?;
            }
            let session = loader::load_session(&csv)?;
            let overview = session.summary();
            info!(
                session = %overview.session_id,
                events = overview.total_events,
                duration_sec = overview.duration_sec,
                event_types = ?overview.event_types,
                "session overview"
            );
            let derived = KinematicDeriver::new().derive(&session.series(family));
            let summary = SessionSummary::new(&session.session_id, session.start_time, &derived);

            if let Some(dir) = out {
                let id = &session.session_id;
                report::write_metrics_csv(&dir.join(format!("{id}_metrics.csv")), &derived)?;
                report::write_json(&dir.join(format!("{id}_stats.json")), &summary)?;
                let buckets = bucket_statistics(&derived, &config.buckets);
                report::write_buckets_csv(&dir.join(format!("{id}_time_bins.csv")), &buckets)?;
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Gaze {
            csv,
            relabel_blinks,
            out,
        } => {
            let classifier = config.gaze_classifier();
            let mut frames = loader::load_gaze_frames(&csv)?;
            if relabel_blinks {
                frames = classifier.relabel_blinks(&frames);
            }
            let states = classifier.classify(&frames);

            if let Some(path) = out {
                report::write_gaze_csv(&path, &states)?;
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&GazeSummary::from_states(&states))?
            );
        }
        Command::Strokes { json, jitter, out } => {
            if let Some(threshold) = jitter {
                config.strokes.jitter_threshold = threshold;
                config.validate()?;
            }
            let analyzer = config.reversal_analyzer();
            let events = loader::load_stroke_events(&json)?;
            let strokes = segment_strokes(&events);

            let analyzed: Vec<_> = strokes
                .iter()
                .enumerate()
                .filter_map(|(i, s)| analyzer.analyze(&s.events).map(|r| (i, s, r)))
                .collect();
            let results: Vec<_> = analyzed.iter().map(|(_, _, r)| *r).collect();

            if let Some(path) = out {
                report::write_reversals_csv(&path, &analyzed)?;
            }
            println!("Total strokes: {}", strokes.len());
            println!(
                "{}",
                serde_json::to_string_pretty(&ReversalSummary::from_results(&results))?
            );
        }
        Command::Batch {
            dir,
            prefix,
            family,
            out,
        } => {
            let out_dir = out.unwrap_or_else(AppDirs::output_dir);
            let report = process_directory(&dir, &out_dir, &prefix, family, &config)?;

            println!("Sessions analyzed: {}", report.summaries.len());
            println!("Sessions skipped: {}", report.skipped.len());
            for (path, err) in &report.failures {
                eprintln!("failed: {}: {err}", path.display());
            }
            if let Some(path) = &report.summary_path {
                println!("Summary: {}", path.display());
            }
        }
        Command::Config { write } => {
            if write {
                store.save(&config)?;
                info!(path = %store.path().display(), "configuration written");
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
