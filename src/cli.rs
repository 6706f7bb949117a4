//! Command-line interface for session-engine.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Milliseconds between shutdown-state polls.
    pub poll_interval_ms: Option<u64>,
    /// Seconds between heartbeats.
    pub heartbeat_secs: Option<u64>,
    /// Do not install signal handlers.
    pub no_signals: bool,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Long("poll-interval-ms") => {
                let value: String = parser.value()?.parse()?;
                let ms = value
                    .parse()
                    .map_err(|_| ArgsError::InvalidValue("poll-interval-ms", value))?;
                result.poll_interval_ms = Some(ms);
            }
            Long("heartbeat-secs") => {
                let value: String = parser.value()?.parse()?;
                let secs = value
                    .parse()
                    .map_err(|_| ArgsError::InvalidValue("heartbeat-secs", value))?;
                result.heartbeat_secs = Some(secs);
            }
            Long("no-signals") => {
                result.no_signals = true;
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"session-engine {version}
In-process lifecycle manager for interactive coding sessions

USAGE:
    session-engine [OPTIONS]

OPTIONS:
    -c, --config <FILE>           Path to configuration file (JSON)
    -l, --log-level <LVL>         Log level (error, warn, info, debug, trace)
        --poll-interval-ms <MS>   Shutdown poll interval [default: 100]
        --heartbeat-secs <SECS>   Heartbeat period [default: 3]
        --no-signals              Do not install SIGINT/SIGTERM handlers
    -h, --help                    Print help
    -V, --version                 Print version

ENVIRONMENT VARIABLES:
    SESSION_ENGINE_POLL_INTERVAL_MS  Poll interval (overrides config)
    SESSION_ENGINE_HEARTBEAT_SECS    Heartbeat period (overrides config)
    SESSION_ENGINE_LOG_LEVEL         Log level (overrides config)
    RUST_LOG                         Alternative log level setting

SIGNALS:
    First SIGINT/SIGTERM drains background tasks, a second one forces exit.

EXIT STATUS:
    0    graceful shutdown
    130  forced shutdown
    1    fatal error
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("session-engine {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
