use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use catalog_watch::alert::{apply_alert_rules, evaluate_alerts, AlertSink, ConsoleSink, WebhookSink};
use catalog_watch::catalog::textual_diff;
use catalog_watch::config::{Config, ConfigOverrides};
use catalog_watch::output::csv::report_to_csv;
use catalog_watch::output::json::render_json;
use catalog_watch::output::table::{render_report_table, render_sources_table};
use catalog_watch::pipeline::{Batch, BatchReport, HttpFetcher, PipelineRunner};
use catalog_watch::store::{DiffArchive, SnapshotStore};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "catalog-watch",
    about = "Track changes in externally published data catalogs"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[arg(long = "data-dir")]
    data_dir: Option<String>,
    /// Comma-separated source keys to restrict the run to.
    #[arg(short = 's', long)]
    sources: Option<String>,
    #[arg(long)]
    concurrency: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Observe every source once, archiving and persisting changes.
    Run,
    /// Observe without writing anything and print what changed.
    Check,
    Watch {
        #[arg(long, default_value_t = 3600)]
        interval_secs: u64,
        #[arg(long, default_value_t = 1)]
        iterations: u32,
    },
    Sources,
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    config.apply_overrides(ConfigOverrides {
        data_dir: cli.data_dir.clone(),
        max_concurrency: cli.concurrency,
    });

    if let Commands::Config { init, show } = &cli.command {
        handle_config_command(*init, *show, &config, &config_path)?;
        return Ok(ExitCode::SUCCESS);
    }

    let batch = resolve_batch(&config, cli.sources.as_deref())?;
    if let Commands::Sources = &cli.command {
        match cli.output {
            OutputFormat::Json => println!("{}", render_json(batch.sources())?),
            _ => println!("{}", render_sources_table(batch.sources())),
        }
        return Ok(ExitCode::SUCCESS);
    }

    let data_dir = config.resolved_data_dir();
    let fetcher = HttpFetcher::new(&config.fetch)?;
    let runner = PipelineRunner::new(
        Arc::new(fetcher),
        &config.extraction,
        SnapshotStore::new(&data_dir),
        DiffArchive::new(&data_dir),
    )?
    .with_max_concurrency(config.runner.max_concurrency);

    match &cli.command {
        Commands::Run => {
            let report = runner.run_batch(&batch).await;
            notify(&config, &report).await?;
            print_report(&report, cli.output)?;
            info!("done");
            if report.failed() > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Check => {
            run_check(&runner, &batch, cli.output).await?;
        }
        Commands::Watch {
            interval_secs,
            iterations,
        } => {
            run_watch_loop(&runner, &batch, &config, cli.output, *interval_secs, *iterations)
                .await?;
        }
        Commands::Sources | Commands::Config { .. } => {}
    }

    Ok(ExitCode::SUCCESS)
}

fn handle_config_command(init: bool, show: bool, config: &Config, config_path: &Path) -> Result<()> {
    if init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if show || !init {
        println!("{}", render_json(config)?);
    }
    Ok(())
}

fn resolve_batch(config: &Config, cli_sources: Option<&str>) -> Result<Batch> {
    let batch = config.batch()?;
    let Some(raw) = cli_sources else {
        return Ok(batch);
    };
    let keys = parse_source_list(raw)?;
    Ok(batch.select(&keys)?)
}

fn parse_source_list(raw: &str) -> Result<Vec<String>> {
    let mut keys: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();
    if keys.is_empty() {
        return Err(anyhow!("source filter is empty"));
    }
    keys.sort();
    keys.dedup();
    Ok(keys)
}

async fn run_check(runner: &PipelineRunner, batch: &Batch, format: OutputFormat) -> Result<()> {
    let started_at = Utc::now();
    let mut sources = Vec::with_capacity(batch.len());
    for source in batch.sources() {
        let (report, observation) = runner.check_source(source).await;
        if let (OutputFormat::Table, Some(observation)) = (format, observation) {
            if observation.diff.is_some() {
                println!("=== {source}");
                let previous = observation.previous.unwrap_or_default();
                print!("{}", textual_diff(&previous, &observation.current));
            }
        }
        sources.push(report);
    }
    let report = BatchReport {
        started_at,
        finished_at: Utc::now(),
        sources,
    };
    print_report(&report, format)
}

async fn run_watch_loop(
    runner: &PipelineRunner,
    batch: &Batch,
    config: &Config,
    format: OutputFormat,
    interval_secs: u64,
    iterations: u32,
) -> Result<()> {
    let interval = Duration::from_secs(interval_secs.max(1));
    let total_iterations = iterations.max(1);
    for i in 0..total_iterations {
        info!("watch iteration {}", i + 1);
        let report = runner.run_batch(batch).await;
        notify(config, &report).await?;
        print_report(&report, format)?;

        if i + 1 < total_iterations {
            tokio::time::sleep(interval).await;
        }
    }
    Ok(())
}

async fn notify(config: &Config, report: &BatchReport) -> Result<()> {
    let mut sinks: Vec<Box<dyn AlertSink>> = Vec::new();
    if config.alerts.enable_stdout {
        sinks.push(Box::new(ConsoleSink::stderr()));
    }
    if !config.alerts.webhook.trim().is_empty() {
        sinks.push(Box::new(WebhookSink::new(
            config.alerts.webhook.clone(),
            &config.fetch.user_agent,
        )?));
    }

    let alerts = apply_alert_rules(evaluate_alerts(report), &config.alerts.rules);
    for alert in &alerts {
        for sink in &sinks {
            if let Err(err) = sink.send(alert).await {
                warn!("failed sending alert: {err}");
            }
        }
    }
    Ok(())
}

fn print_report(report: &BatchReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_report_table(report)),
        OutputFormat::Json => println!("{}", render_json(report)?),
        OutputFormat::Csv => print!("{}", report_to_csv(report)?),
    }
    Ok(())
}
