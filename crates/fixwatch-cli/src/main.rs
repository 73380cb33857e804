use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::time::Instant;
use tracing::{error, info};

use fixwatch_nav::fix::{FixState, FixStateMachine};
use fixwatch_nav::gnss::{GnssSource, ReadOutcome};
use fixwatch_nav::report::{Emission, EmissionRecord, ReportScheduler};
use fixwatch_nav::{doctor, GnssConfig, ReportConfig, ReportFormat};

#[derive(Debug, Parser)]
#[command(name = "fixwatch", version, about = "fixwatch - NMEA receiver fix monitor")]
struct Cli {
    /// TOML config; built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<String>,

    /// Override gnss.nmea_device (implies the nmea-serial source).
    #[arg(long)]
    device: Option<String>,

    #[arg(long)]
    baud: Option<u32>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration without opening the receiver.
    Doctor,
    /// Read sentences and print fix reports until interrupted.
    Run,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    gnss: GnssConfig,
    report: ReportConfig,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut cfg: Config = match &cli.config {
        Some(path) => {
            let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
            toml::from_str(&s).context("parse config toml")?
        }
        None => Config::default(),
    };
    if let Some(dev) = &cli.device {
        cfg.gnss.source = "nmea-serial".into();
        cfg.gnss.nmea_device = Some(dev.clone());
    }
    if let Some(baud) = cli.baud {
        cfg.gnss.baud = baud;
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;

    let res = match cli.cmd {
        Command::Doctor => check(&cfg),
        Command::Run => run(&cfg).await,
    };
    if let Err(e) = res {
        error!("{:#}", e);
        std::process::exit(1);
    }
    info!("finished");
    Ok(())
}

fn check(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    doctor::check_gnss(&cfg.gnss)?;
    doctor::check_report(&cfg.report)?;
    info!("doctor: OK");
    Ok(())
}

async fn run(cfg: &Config) -> Result<()> {
    let machine = cfg.report.state_machine()?;
    let mut scheduler = cfg.report.scheduler();

    let src = cfg.gnss.open()?;
    info!(
        "run: reading {} (full report every {}s with fix, status every {}s without)",
        src.name(),
        cfg.report.full_report_interval_s,
        cfg.report.waiting_notice_interval_s
    );

    if serve(cfg, src, &machine, &mut scheduler).await.is_err() {
        std::process::exit(1);
    }
    Ok(())
}

/// Runs the loop to completion. A fatal error is reported before the source
/// is dropped, so the diagnostic precedes the port release in the log.
async fn serve(
    cfg: &Config,
    mut src: GnssSource,
    machine: &FixStateMachine,
    scheduler: &mut ReportScheduler,
) -> Result<()> {
    let res = ingest(cfg, &mut src, machine, scheduler).await;
    if let Err(e) = &res {
        error!("{:#}", e);
    }
    drop(src);
    res
}

async fn ingest(
    cfg: &Config,
    src: &mut GnssSource,
    machine: &FixStateMachine,
    scheduler: &mut ReportScheduler,
) -> Result<()> {
    let timeout = cfg.gnss.read_timeout();
    let mut state = FixState::default();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let outcome = tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted by operator");
                return Ok(());
            }
            res = src.read_line(timeout) => res?,
        };

        match outcome {
            ReadOutcome::Line(line) => machine.ingest(&mut state, &line),
            ReadOutcome::Undecodable | ReadOutcome::Timeout => {}
            ReadOutcome::Eof => {
                info!("end of {}", src.name());
                return Ok(());
            }
        }

        if let Some(emission) = scheduler.evaluate(&state, Instant::now()) {
            emit(&emission, cfg.report.format)?;
        }
    }
}

fn emit(emission: &Emission, format: ReportFormat) -> Result<()> {
    let mut out = std::io::stdout().lock();
    match format {
        ReportFormat::Text => writeln!(out, "{}", emission)?,
        ReportFormat::Json => {
            serde_json::to_writer(&mut out, &EmissionRecord::from(emission))?;
            writeln!(out)?;
        }
    }
    out.flush().context("write report")
}
