use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use super::constants::LOG_FILE;

/// Install the global tracing subscriber.
///
/// stdout belongs to the TUI, so events go to `<store_dir>/opsdeck.log`.
/// `RUST_LOG` wins over the configured level. Falls back to a sink when the
/// log file cannot be opened.
pub fn init_logging(store_dir: &Path, level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fs::create_dir_all(store_dir);
    let file = OpenOptions::new().create(true).append(true).open(store_dir.join(LOG_FILE));
    match file {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        Err(_) => {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::sink).try_init();
        }
    }
}
