// Library surface for the binary, integration tests and reuse.
// The derivation engines are pure functions over borrowed input; only
// loader, report, config and batch touch the filesystem.
pub mod aggregate;
pub mod app_dirs;
pub mod batch;
pub mod config;
pub mod error;
pub mod gaze;
pub mod kinematics;
pub mod loader;
pub mod logging;
pub mod report;
pub mod reversal;
pub mod sample;
pub mod stroke;
pub mod time_series;
pub mod util;

pub use error::{Error, Result};
