use chrono::Local;
use efmtune::param;
use efmtune::run;
use flexi_logger::{FileSpec, Logger, LoggerHandle};
use log::{error, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::process::exit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn init_logger(param: &param::Param) -> Result<LoggerHandle, flexi_logger::FlexiLoggerError> {
    let logger = Logger::try_with_env_or_str(&param.general.log_level)?;
    if param.general.log_base.is_empty() {
        logger.start()
    } else {
        logger
            .log_to_file(
                FileSpec::default()
                    .basename(param.general.log_base.as_str())
                    .suffix(param.general.log_suffix.as_str()),
            )
            .start()
    }
}

fn version() -> String {
    match option_env!("EFMTUNE_GIT_SHA") {
        Some(sha) => format!("{}#{}", env!("CARGO_PKG_VERSION"), sha),
        None => env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tune.yaml".to_string());
    let param = match param::get(&config_path) {
        Ok(param) => param,
        Err(e) => {
            eprintln!("cannot load {}: {}", config_path, e);
            exit(1);
        }
    };

    let _logger = match init_logger(&param) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("cannot initialize logging: {}", e);
            exit(1);
        }
    };

    info!(
        "efmtune {} starting at {}",
        version(),
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    if param.general.thread_number > 0 {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(param.general.thread_number)
            .build_global()
        {
            warn!("cannot size the worker pool: {}", e);
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    match Signals::new([SIGINT, SIGTERM]) {
        Ok(mut signals) => {
            let running = Arc::clone(&running);
            thread::spawn(move || {
                for signal in signals.forever() {
                    warn!("signal {} received, finishing the current generation", signal);
                    running.store(false, Ordering::Relaxed);
                }
            });
        }
        Err(e) => warn!("cannot install signal handlers: {}", e),
    }

    match run(&param, running) {
        Ok(population) => {
            for (rank, member) in population.ranked().iter().take(10).enumerate() {
                info!(
                    "#{} score {} (generation {}) {:?}",
                    rank + 1,
                    member.score.unwrap_or(0),
                    member.generation,
                    member.values
                );
            }
        }
        Err(e) => {
            error!("search aborted: {}", e);
            exit(1);
        }
    }
}
