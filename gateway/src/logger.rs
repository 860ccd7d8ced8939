//! Logger initialization, modeled on a standard `logforth`-based setup
//! minus the OpenTelemetry/fastrace export path (no distributed tracing
//! backend is specified here) and plus a config-driven file appender.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{IsTerminal, Write as _};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use jiff::{Zoned, tz::TimeZone};
use logforth::append::{Append, Stderr};
use logforth::filter::EnvFilter;
use logforth::layout::Layout;

/// Formats each record as `<UTC timestamp> <level>  <message>`, colored when
/// stderr is a terminal.
#[derive(Debug)]
struct UtcLayout {
    no_color: bool,
}

impl UtcLayout {
    fn new() -> Self {
        Self { no_color: false }
    }

    fn no_color(mut self) -> Self {
        self.no_color = true;
        self
    }
}

impl Layout for UtcLayout {
    fn format(
        &self,
        record: &log::Record<'_>,
        _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        let mut output = String::new();
        let now = Zoned::now().with_time_zone(TimeZone::UTC);
        write!(output, "{} ", now.strftime("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level_str = if self.no_color {
            format!("{:>5}", record.level())
        } else {
            match record.level() {
                log::Level::Error => format!("\x1b[31m{:>5}\x1b[0m", record.level()),
                log::Level::Warn => format!("\x1b[33m{:>5}\x1b[0m", record.level()),
                log::Level::Info => format!("\x1b[32m{:>5}\x1b[0m", record.level()),
                log::Level::Debug => format!("\x1b[34m{:>5}\x1b[0m", record.level()),
                log::Level::Trace => format!("\x1b[35m{:>5}\x1b[0m", record.level()),
            }
        };
        write!(output, "{level_str}  ")?;
        write!(output, "{}", record.args())?;
        Ok(output.into_bytes())
    }
}

/// Appends plain (uncolored) `UtcLayout`-formatted lines to a single file,
/// reopened once at startup and held for the process lifetime — there is no
/// log rotation, matching the single `LOG_FILE` config key this wires to.
struct FileAppender {
    file: Mutex<std::fs::File>,
    layout: UtcLayout,
}

impl std::fmt::Debug for FileAppender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAppender").finish()
    }
}

impl Append for FileAppender {
    fn append(
        &self,
        record: &log::Record<'_>,
        diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<()> {
        let mut line = self.layout.format(record, diagnostics)?;
        line.push(b'\n');
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

/// Initializes stderr logging, always, plus a file appender when `log` is
/// true and `log_file` is set (the `LOG`/`LOG_FILE` config keys).
pub fn init(log_filter: &str, log: bool, log_file: Option<&Path>) {
    let parse_filter = |s: &str| {
        EnvFilter::from_str(s).unwrap_or_else(|_| EnvFilter::from_str("info").expect("default filter is valid"))
    };

    let mut builder = logforth::builder();

    let filter = log_filter.to_string();
    builder = builder.dispatch(move |d| {
        let layout = if std::io::stderr().is_terminal() {
            UtcLayout::new()
        } else {
            UtcLayout::new().no_color()
        };
        d.filter(parse_filter(&filter)).append(Stderr::default().with_layout(layout))
    });

    if log {
        if let Some(path) = log_file {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => {
                    let filter = log_filter.to_string();
                    let appender = FileAppender {
                        file: Mutex::new(file),
                        layout: UtcLayout::new().no_color(),
                    };
                    builder = builder.dispatch(move |d| d.filter(parse_filter(&filter)).append(appender));
                }
                Err(err) => {
                    eprintln!("failed to open log file {}: {err}", path.display());
                }
            }
        } else {
            eprintln!("LOG is enabled but LOG_FILE is not set; logging to stderr only");
        }
    }

    builder.apply();
}
