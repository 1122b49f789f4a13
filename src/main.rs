//! gridhash - Main Application
//!
//! CLI for the parallel SHA-256 nonce search: builds a search engine from
//! configuration, runs one search, and reports the verified result.

use gridhash::{
    kernel::gpu, Config, Error, Result, RunReport, SearchEngine, APP_NAME, APP_VERSION,
};

use rand::distr::{Alphanumeric, SampleString};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().await?;

    // initialize tracing; RUST_LOG overrides the configured level
    let level: tracing::Level = config.log_level.into();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    if config.print_config {
        print_configuration(&config)?;
        return Ok(());
    }

    if config.list_devices {
        print_devices();
        return Ok(());
    }

    let input = resolve_input(&config)?;
    info!(
        "starting {} v{}: backend={} difficulty={}",
        APP_NAME, APP_VERSION, config.backend, config.difficulty
    );

    let engine = SearchEngine::new(&config).await?;

    // cooperative stop on Ctrl-C, observed at the next dispatch boundary
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current dispatch");
            signal_cancel.cancel();
        }
    });

    let report = engine.run(input.as_bytes(), config.difficulty, &cancel).await?;
    print_report(&config, &input, &report)?;

    Ok(())
}

/// Pick the configured input, or generate a random one on request
fn resolve_input(config: &Config) -> Result<String> {
    if let Some(input) = &config.input {
        return Ok(input.clone());
    }
    if config.random_input {
        let input = Alphanumeric.sample_string(&mut rand::rng(), 8);
        info!("generated random input: {}", input);
        return Ok(input);
    }
    Err(Error::config(
        "an input is required; use --input or --random-input",
    ))
}

/// Print the run report as text or JSON
fn print_report(config: &Config, input: &str, report: &RunReport) -> Result<()> {
    if config.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("input:      {}", input);
    println!("input hash: {}", report.input_hash);
    if let Some(final_hash) = &report.final_hash {
        println!("final hash: {}", final_hash);
        println!("nonce:      {}", report.nonce);
    } else {
        println!("nonce:      -1 (no nonce found)");
    }
    println!("candidates: {}", report.candidates_tried);
    println!("duration:   {} ms", report.duration_ms);
    Ok(())
}

/// Print available GPU adapters
fn print_devices() {
    let devices = gpu::enumerate_devices();
    if devices.is_empty() {
        println!("no GPU adapters found (the cpu backend is still available)");
        return;
    }
    for (index, name, device_type) in devices {
        println!("GPU {}: {} ({:?})", index, name, device_type);
    }
}

/// Print current configuration
fn print_configuration(config: &Config) -> Result<()> {
    let config_yaml = serde_yaml::to_string(config)?;
    println!("{}", config_yaml);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_resolve_input_prefers_explicit() {
        let config = Config::try_parse_from(["gridhash", "-i", "data"]).unwrap();
        assert_eq!(resolve_input(&config).unwrap(), "data");
    }

    #[test]
    fn test_resolve_input_generates_random() {
        let config = Config::try_parse_from(["gridhash", "--random-input"]).unwrap();
        let input = resolve_input(&config).unwrap();
        assert_eq!(input.len(), 8);
    }

    #[test]
    fn test_resolve_input_requires_something() {
        let config = Config::try_parse_from(["gridhash"]).unwrap();
        assert!(resolve_input(&config).is_err());
    }

    #[test]
    fn test_print_report_shapes() {
        let config = Config::try_parse_from(["gridhash"]).unwrap();
        let found = RunReport {
            input_hash: "aa".repeat(32),
            final_hash: Some("bb".repeat(32)),
            nonce: 77,
            duration_ms: 3,
            candidates_tried: 1024,
        };
        assert!(print_report(&config, "x", &found).is_ok());

        let exhausted = RunReport {
            final_hash: None,
            nonce: -1,
            ..found
        };
        assert!(print_report(&config, "x", &exhausted).is_ok());

        let json_config = Config::try_parse_from(["gridhash", "--json"]).unwrap();
        assert!(print_report(&json_config, "x", &exhausted).is_ok());
    }

    #[test]
    fn test_config_printing() {
        let config =
            Config::try_parse_from(["gridhash", "-b", "cpu", "--grid-width", "16"]).unwrap();
        assert!(print_configuration(&config).is_ok());
    }
}
