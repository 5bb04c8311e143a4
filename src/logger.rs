//! Session logger - backs the `log` facade with a single file in the OS data
//! directory.
//!
//! The file is **truncated (overwritten) at each launch**, so it only ever
//! contains output from the most-recent session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\FilterFE\filterfe.log`
//!   Linux:    `~/.local/share/FilterFE/filterfe.log`
//!   macOS:    `~/Library/Application Support/FilterFE/filterfe.log`
//!
//! Every record goes to the file. Warnings and errors are mirrored to stderr;
//! with `verbose` every record is.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, Once, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{Level, LevelFilter, Log, Metadata, Record};

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOGGER: OnceLock<SessionLogger> = OnceLock::new();
static INIT: Once = Once::new();

struct SessionLogger {
    /// Records at or above this severity are mirrored to stderr.
    stderr_level: LevelFilter,
}

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(&timestamp(), record.level(), record.target(), &record.args().to_string());
        write_line(&line);
        if record.level() <= self.stderr_level {
            eprintln!("{}", line);
        }
    }

    fn flush(&self) {
        if let Some(mutex) = LOG_FILE.get()
            && let Ok(mut file) = mutex.lock()
        {
            let _ = file.flush();
        }
    }
}

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Write a raw line to the session log.  Silently ignores I/O errors so that
/// logging never crashes the application.
pub fn write_line(line: &str) {
    if let Some(mutex) = LOG_FILE.get()
        && let Ok(mut file) = mutex.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

fn format_line(ts: &str, level: Level, target: &str, msg: &str) -> String {
    format!("[{}] [{}] {}: {}", ts, level, target, msg)
}

/// Initialise the session logger. Later calls are no-ops.
///
/// * Creates (or truncates) the log file. Failure to open it is not fatal:
///   records then only reach stderr.
/// * Registers the logger with the `log` facade.
/// * Installs a panic hook that writes the panic message to the log before
///   propagating to the default handler.
pub fn init(verbose: bool) {
    INIT.call_once(|| {
        open_log_file();

        let stderr_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };
        let logger = LOGGER.get_or_init(|| SessionLogger { stderr_level });
        if log::set_logger(logger).is_ok() {
            log::set_max_level(LevelFilter::Debug);
        }

        let prev = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            write_line(&format!("[{}] [PANIC] {}", timestamp(), info));
            prev(info);
        }));
    });
}

fn open_log_file() {
    let path = log_file_path();

    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path);

    match file {
        Ok(f) => {
            let _ = LOG_PATH.set(path.clone());
            let _ = LOG_FILE.set(Mutex::new(f));
        }
        Err(e) => {
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            return;
        }
    }

    write_line(&format!(
        "=== FilterFE {} session started {} ===",
        env!("CARGO_PKG_VERSION"),
        human_timestamp()
    ));
    write_line(&format!("Log file: {}", path.display()));
    write_line("");
}

fn log_file_path() -> PathBuf {
    data_dir().join("FilterFE").join("filterfe.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support");
        }
    }
    // Linux / fallback
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    // Last resort: current working directory
    PathBuf::from(".")
}

/// Time of day (UTC) as `HH:MM:SS`.
fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => clock(d.as_secs()),
        Err(_) => "??:??:??".to_string(),
    }
}

fn clock(secs: u64) -> String {
    let h = (secs % 86400) / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

/// Date-time for the session header (no calendar dependency, so unix seconds).
fn human_timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format!("(unix {})", d.as_secs()),
        Err(_) => "(unknown time)".to_string(),
    }
}
