/// Command-line runner.
///
/// Reads everything from the environment (a `.env` file is loaded first):
///
/// - `QW_REQUEST`     request TOML (required)
/// - `QW_CONFIG`      extraction config TOML (optional, defaults otherwise)
/// - `DATABASE_URL`   used when the request has no `data_source`
/// - `QW_OUTPUT_DIR`  where the CSV files go (default `.`)
/// - `QW_LOG_LEVEL`   debug, info, warn or error (default info)
/// - `QW_LOG_FILE`    append logs here instead of stderr

use std::env;
use std::process::ExitCode;

use qw_extract::backend::pg::PgConnector;
use qw_extract::export::write_tables;
use qw_extract::logging::{self, LogLevel};
use qw_extract::{ExtractError, ExtractionConfig, ExtractionRequest, extract};

fn run() -> qw_extract::Result<()> {
    let config = match env::var("QW_CONFIG") {
        Ok(path) => ExtractionConfig::load(path)?,
        Err(_) => ExtractionConfig::default(),
    };

    let request_path = env::var("QW_REQUEST")
        .map_err(|_| ExtractError::Config("QW_REQUEST must be set".to_string()))?;
    let mut request = ExtractionRequest::load(request_path)?;
    if request.data_source.trim().is_empty() {
        request.data_source = env::var("DATABASE_URL").map_err(|_| {
            ExtractError::Config(
                "request has no data_source and DATABASE_URL is not set".to_string(),
            )
        })?;
    }

    let extraction = extract(&PgConnector, &config, &request)?;
    for warning in &extraction.warnings {
        eprintln!("warning: {}", warning);
    }

    let output_dir = env::var("QW_OUTPUT_DIR").unwrap_or_else(|_| ".".to_string());
    let (plot_path, data_path) = write_tables(&extraction, output_dir)?;
    println!("{}", plot_path.display());
    println!("{}", data_path.display());
    Ok(())
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let level = env::var("QW_LOG_LEVEL")
        .ok()
        .and_then(|l| LogLevel::parse(&l))
        .unwrap_or(LogLevel::Info);
    let log_file = env::var("QW_LOG_FILE").ok();
    if let Err(e) = logging::init_logger(level, log_file.as_deref(), true) {
        eprintln!("could not open log file: {}", e);
        return ExitCode::FAILURE;
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
