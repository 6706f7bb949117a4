//! Session-engine binary entry point.

use std::process::ExitCode;

use session_engine::cli::{self, Args};
use session_engine::config::Config;
use session_engine::{logging, Engine};
use tracing::{error, info};

const EXIT_FATAL: u8 = 1;

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Run 'session-engine --help' for usage.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    run(&args)
}

fn run(args: &Args) -> ExitCode {
    let config = match Config::load(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    if let Err(e) = logging::init_with_filter(config.log_filter()) {
        eprintln!("warning: logging already initialized: {}", e);
    }

    let engine_config = match config.to_engine_config() {
        Ok(engine_config) => engine_config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    info!("session-engine v{}", env!("CARGO_PKG_VERSION"));

    let engine = Engine::new(engine_config);
    match engine.run(config.engine.install_signal_handlers) {
        Ok(outcome) => {
            info!(?outcome, "exiting");
            ExitCode::from(outcome.exit_code() as u8)
        }
        Err(e) => {
            // Already logged with its source chain by the engine
            eprintln!("session-engine: fatal: {}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}
