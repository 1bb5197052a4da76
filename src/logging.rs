use std::env;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

const QUIET_LOG_FILTER: &str = "warn";
const DEFAULT_LOG_FILE_PATH: &str = "logs/ai-cli.log";
const DEFAULT_LOG_FILE_NAME: &str = "ai-cli.log";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum LogOutput {
    #[default]
    Stderr,
    File,
    Both,
}

impl LogOutput {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("file") => Self::File,
            Some("both") => Self::Both,
            _ => Self::Stderr,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Stderr => "stderr",
            Self::File => "file",
            Self::Both => "both",
        }
    }
}

/// Logging knobs read from `LOG_FORMAT`, `LOG_OUTPUT` and `LOG_FILE_PATH`.
#[derive(Clone, Debug, PartialEq, Eq)]
struct LogSettings {
    format: LogFormat,
    output: LogOutput,
    file_path: PathBuf,
}

impl LogSettings {
    fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        Self {
            format: LogFormat::parse(get_var("LOG_FORMAT").as_deref()),
            output: LogOutput::parse(get_var("LOG_OUTPUT").as_deref()),
            file_path: get_var("LOG_FILE_PATH")
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE_PATH)),
        }
    }
}

/// Filter used when `RUST_LOG` is unset, chosen by the `-v` count.
fn filter_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => QUIET_LOG_FILTER,
        1 => "warn,ai_cli=info",
        2 => "warn,ai_cli=debug",
        _ => "trace",
    }
}

fn open_rolling_file(path: &Path) -> io::Result<(BoxMakeWriter, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .unwrap_or_else(|| OsStr::new(DEFAULT_LOG_FILE_NAME));

    fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((BoxMakeWriter::new(writer), guard))
}

/// Picks the writer for `settings`. A log file that cannot be opened is
/// reported once on stderr and logging continues there.
fn make_writer(settings: &LogSettings) -> (BoxMakeWriter, Option<WorkerGuard>) {
    if settings.output == LogOutput::Stderr {
        return (BoxMakeWriter::new(io::stderr), None);
    }

    match open_rolling_file(&settings.file_path) {
        Ok((file_writer, guard)) if settings.output == LogOutput::Both => {
            (BoxMakeWriter::new(io::stderr.and(file_writer)), Some(guard))
        }
        Ok((file_writer, guard)) => (file_writer, Some(guard)),
        Err(err) => {
            let fallback = match settings.output {
                LogOutput::Both => "using stderr only",
                _ => "using stderr instead",
            };
            eprintln!(
                "ai-cli: failed to initialize LOG_OUTPUT={} at '{}': {err}; {fallback}",
                settings.output.as_str(),
                settings.file_path.display(),
            );
            (BoxMakeWriter::new(io::stderr), None)
        }
    }
}

/// Installs the global subscriber. Logs never go to stdout, which carries
/// model output only.
///
/// The returned guard flushes the file writer on drop and must outlive the
/// command.
pub fn init(verbosity: u8) -> Option<WorkerGuard> {
    let settings = LogSettings::from_env_with(|key| env::var(key).ok());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_for_verbosity(verbosity)));
    let (writer, guard) = make_writer(&settings);

    let installed = match settings.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(writer)
            .try_init(),
    };

    installed.ok().and(guard)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::{
        DEFAULT_LOG_FILE_PATH, LogFormat, LogOutput, LogSettings, QUIET_LOG_FILTER,
        filter_for_verbosity,
    };

    fn settings_from_pairs(pairs: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<&str, &str> = pairs.iter().copied().collect();
        LogSettings::from_env_with(|key| vars.get(key).map(|value| value.to_string()))
    }

    #[test]
    fn verbosity_raises_crate_log_level() {
        assert_eq!(filter_for_verbosity(0), QUIET_LOG_FILTER);
        assert_eq!(filter_for_verbosity(1), "warn,ai_cli=info");
        assert_eq!(filter_for_verbosity(2), "warn,ai_cli=debug");
        assert_eq!(filter_for_verbosity(7), "trace");
    }

    #[test]
    fn settings_default_to_pretty_stderr() {
        let settings = settings_from_pairs(&[]);
        assert_eq!(settings.format, LogFormat::Pretty);
        assert_eq!(settings.output, LogOutput::Stderr);
        assert_eq!(settings.file_path, PathBuf::from(DEFAULT_LOG_FILE_PATH));
    }

    #[test]
    fn settings_read_values_case_insensitively() {
        let settings = settings_from_pairs(&[
            ("LOG_FORMAT", " JSON "),
            ("LOG_OUTPUT", "Both"),
            ("LOG_FILE_PATH", "custom/ai-cli.log"),
        ]);
        assert_eq!(settings.format, LogFormat::Json);
        assert_eq!(settings.output, LogOutput::Both);
        assert_eq!(settings.file_path, PathBuf::from("custom/ai-cli.log"));
    }

    #[test]
    fn unknown_values_fall_back_to_defaults() {
        let settings = settings_from_pairs(&[
            ("LOG_FORMAT", "xml"),
            ("LOG_OUTPUT", "syslog"),
            ("LOG_FILE_PATH", "   "),
        ]);
        assert_eq!(settings.format, LogFormat::Pretty);
        assert_eq!(settings.output, LogOutput::Stderr);
        assert_eq!(settings.file_path, PathBuf::from(DEFAULT_LOG_FILE_PATH));
    }

    #[test]
    fn file_output_parses_alone() {
        assert_eq!(LogOutput::parse(Some("file")), LogOutput::File);
        assert_eq!(LogOutput::parse(None), LogOutput::Stderr);
    }
}
