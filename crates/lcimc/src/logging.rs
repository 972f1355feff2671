use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FILE_NAME: &str = "lcimc.log";

/// A log larger than this is trimmed at start-up (5 MB)
const MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;
/// Bytes of recent history kept when trimming (1 MB)
const KEEP_SIZE: u64 = 1024 * 1024;

const TRIM_BANNER: &[u8] = b"--- lcimc log trimmed, older entries removed ---\n";

/// Cut `log_path` down to its last `keep` bytes once it grows past `max`.
///
/// The kept tail starts at a line boundary. Returns whether the file changed.
fn trim_log(log_path: &Path, max: u64, keep: u64) -> io::Result<bool> {
    let len = match fs::metadata(log_path) {
        Ok(metadata) => metadata.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if len <= max {
        return Ok(false);
    }

    let mut tail = Vec::with_capacity(keep as usize);
    let mut file = File::open(log_path)?;
    file.seek(SeekFrom::Start(len.saturating_sub(keep)))?;
    file.read_to_end(&mut tail)?;

    let first_line = tail
        .iter()
        .position(|&b| b == b'\n')
        .map_or(0, |newline| newline + 1);
    let mut trimmed = File::create(log_path)?;
    trimmed.write_all(TRIM_BANNER)?;
    trimmed.write_all(&tail[first_line..])?;
    Ok(true)
}

/// Writer factory handing out handles to the shared log file
#[derive(Clone)]
struct LogWriterFactory {
    file: Arc<Mutex<File>>,
}

struct LogWriter {
    file: Arc<Mutex<File>>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        file.flush()
    }
}

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            file: self.file.clone(),
        }
    }
}

/// Default filter when `RUST_LOG` is not set
pub fn default_filter(level: &str) -> String {
    format!("lcimc={level},lcimc_core={level}")
}

/// Initialize logging to stderr and to `{output_root}/lcimc.log`.
///
/// When the log exceeds 5MB, older entries are removed keeping only the last
/// 1MB. Worker processes share the file with their parent and never rotate
/// it. The level can be overridden with the `RUST_LOG` environment variable.
pub fn init_logging(output_root: &Path, level: &str, rotate: bool) -> color_eyre::Result<()> {
    fs::create_dir_all(output_root)?;
    let log_path = output_root.join(LOG_FILE_NAME);

    if rotate && let Err(e) = trim_log(&log_path, MAX_LOG_SIZE, KEEP_SIZE) {
        eprintln!("warning: could not trim {}: {e}", log_path.display());
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    let writer_factory = LogWriterFactory {
        file: Arc::new(Mutex::new(file)),
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(writer_factory)
                .with_ansi(false)
                .with_target(true),
        )
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    tracing::debug!(log_path = %log_path.display(), "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_or_small_log_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        assert!(!trim_log(&path, 10, 5).unwrap());
        fs::write(&path, "line\n").unwrap();
        assert!(!trim_log(&path, 10, 5).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "line\n");
    }

    #[test]
    fn test_trim_keeps_recent_whole_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let content: String = (0..100).map(|i| format!("entry {i:03}\n")).collect();
        fs::write(&path, &content).unwrap();

        assert!(trim_log(&path, 500, 50).unwrap());
        let trimmed = fs::read_to_string(&path).unwrap();
        let mut lines = trimmed.lines();
        assert!(lines.next().unwrap().contains("trimmed"));
        let kept: Vec<_> = lines.collect();
        assert_eq!(kept.last(), Some(&"entry 099"));
        assert!(kept.iter().all(|l| l.len() == 9));
        assert!(kept.len() < 6);
    }

    #[test]
    fn test_default_filter_covers_both_crates() {
        assert_eq!(default_filter("debug"), "lcimc=debug,lcimc_core=debug");
    }
}
